//! Status broadcasting - Best-effort push of snapshots to connected subscribers

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error};

use super::status::StatusSnapshot;

/// Snapshots buffered per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 16;

/// Fan-out of status snapshots. Delivery is fire-and-forget: no acknowledgement,
/// no retry, and a slow subscriber only ever sees the newest snapshots.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<StatusSnapshot>,
    runtime: Handle,
}

impl Broadcaster {
    pub fn new(runtime: Handle) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, runtime }
    }

    /// Send a snapshot to every current subscriber; returns how many got it
    pub fn publish(&self, snapshot: StatusSnapshot) -> usize {
        // An error only means nobody is listening
        self.sender.send(snapshot).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish the snapshot produced by `capture` after `delay`, detached from the caller.
    ///
    /// `capture` runs on the blocking pool since it may wait on the registry lock.
    pub fn schedule<F>(&self, delay: Duration, capture: F)
    where
        F: FnOnce() -> Option<StatusSnapshot> + Send + 'static,
    {
        let this = self.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            match tokio::task::spawn_blocking(capture).await {
                Ok(Some(snapshot)) => {
                    let delivered = this.publish(snapshot);
                    debug!("Broadcast server status to {} subscriber(s)", delivered);
                }
                Ok(None) => {}
                Err(e) => error!("Error broadcasting server status: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Catalog;
    use crate::core::instance::InstanceTracker;
    use crate::core::status;
    use std::collections::HashMap;

    fn snapshot() -> StatusSnapshot {
        status::build(&Catalog::default(), &HashMap::new(), &InstanceTracker::default())
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let broadcaster = Broadcaster::new(Handle::current());
        assert_eq!(broadcaster.publish(snapshot()), 0);
    }

    #[tokio::test]
    async fn subscribers_only_see_later_publishes() {
        let broadcaster = Broadcaster::new(Handle::current());
        broadcaster.publish(snapshot());

        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert!(rx.try_recv().is_err());

        assert_eq!(broadcaster.publish(snapshot()), 1);
        assert_eq!(rx.recv().await.unwrap(), snapshot());
    }

    #[tokio::test]
    async fn scheduled_publish_waits_for_the_delay() {
        let broadcaster = Broadcaster::new(Handle::current());
        let mut rx = broadcaster.subscribe();

        let delay = Duration::from_millis(200);
        let started = tokio::time::Instant::now();
        broadcaster.schedule(delay, || Some(snapshot()));

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, snapshot());
        assert!(started.elapsed() >= delay);
    }
}
