//! Startup sequence - Bringing the default fleet up in dependency order

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::catalog::{Catalog, ServerKind};
use crate::core::{Supervisor, SupervisorError};

const FIRST_KIND: &str = "PROTOTYPE_LOBBY";

/// One step of the startup sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    /// Pause after a successful start
    pub stagger: Stagger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stagger {
    None,
    Service,
    Server,
}

/// Proxy, limbo, every service, then the default instances of each server kind
/// with the prototype lobby first
pub fn plan(catalog: &Catalog) -> Vec<Step> {
    let mut steps = vec![
        Step {
            id: "proxy".to_string(),
            stagger: Stagger::None,
        },
        Step {
            id: "nanolimbo".to_string(),
            stagger: Stagger::None,
        },
    ];

    steps.extend(catalog.services().iter().map(|service| Step {
        id: service.id(),
        stagger: Stagger::Service,
    }));

    let (first, rest): (Vec<&ServerKind>, Vec<&ServerKind>) = catalog
        .server_kinds()
        .iter()
        .partition(|kind| kind.name == FIRST_KIND);
    for kind in first.into_iter().chain(rest) {
        steps.extend((0..kind.default_instances).map(|instance| Step {
            id: format!("{}_{}", kind.id(), instance),
            stagger: Stagger::Server,
        }));
    }

    steps
}

/// Run the startup sequence, skipping units whose jars are missing.
///
/// Blocks between steps, so call it from a blocking task. Stops early once
/// `shutdown` flips to true. Returns the number of units started.
pub fn autostart(supervisor: &Arc<Supervisor>, shutdown: &watch::Receiver<bool>) -> usize {
    let settings = supervisor.settings();
    let service_stagger = Duration::from_millis(settings.service_stagger_ms as u64);
    let server_stagger = Duration::from_millis(settings.server_stagger_ms as u64);
    let mut started = 0;

    for step in plan(supervisor.catalog()) {
        if *shutdown.borrow() {
            info!("Startup sequence interrupted by shutdown");
            break;
        }

        match supervisor.start(&step.id) {
            Ok(message) => {
                info!("{}", message);
                started += 1;
                match step.stagger {
                    Stagger::None => {}
                    Stagger::Service => std::thread::sleep(service_stagger),
                    Stagger::Server => std::thread::sleep(server_stagger),
                }
            }
            Err(SupervisorError::ArtifactMissing { artifact, .. }) => {
                warn!("{} missing, skipping {}", artifact, step.id);
            }
            Err(e) => warn!("Failed to start {}: {}", step.id, e),
        }
    }

    info!("Startup complete, {} unit(s) running", started);
    started
}
