//! Supervisor - Lifecycle orchestration over the process table and instance tracker

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use tracing::{error, info};

use super::broadcast::Broadcaster;
use super::catalog::Catalog;
use super::error::{SupervisorError, SupervisorResult};
use super::instance::InstanceTracker;
use super::process::{ManagedProcess, ProcessTable};
use super::settings::Settings;
use super::status::{self, RawEntry, StatusSnapshot};
use super::unit::Unit;

/// The two collections every lifecycle action mutates together
#[derive(Debug, Default)]
pub struct Registry {
    pub table: ProcessTable,
    pub tracker: InstanceTracker,
}

/// Central orchestration state. All mutation goes through these methods while the
/// single registry lock is held; the wait for a stopping process happens outside it.
pub struct Supervisor {
    catalog: Catalog,
    settings: Settings,
    registry: Mutex<Registry>,
    broadcaster: Broadcaster,
}

impl Supervisor {
    pub fn new(catalog: Catalog, settings: Settings, broadcaster: Broadcaster) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            settings,
            registry: Mutex::new(Registry::default()),
            broadcaster,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    fn registry(&self) -> SupervisorResult<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|e| anyhow!("Registry lock poisoned: {}", e).into())
    }

    /// Start the unit named by `id`
    pub fn start(self: &Arc<Self>, id: &str) -> SupervisorResult<String> {
        let unit = Unit::resolve(&self.catalog, id)
            .map_err(|_| SupervisorError::NotFound("Server not found".to_string()))?;
        let name = unit.logical_name();
        let spec = unit.launch_spec(&self.settings);

        {
            let mut registry = self.registry()?;
            if registry.table.poll(&name).is_running() {
                return Err(SupervisorError::AlreadyRunning(unit.label()));
            }
            registry.table.spawn(&name, &spec)?;
            registry.tracker.add(name);
        }

        self.schedule_broadcast();
        Ok(format!("{} started", unit.label()))
    }

    /// Stop the running unit named by `id`; its tracker entry is kept
    pub fn stop(self: &Arc<Self>, id: &str) -> SupervisorResult<String> {
        let not_found = || SupervisorError::NotFound("Server not found or not running".to_string());
        let unit = Unit::resolve(&self.catalog, id).map_err(|_| not_found())?;
        let name = unit.logical_name();

        let process = {
            let mut registry = self.registry()?;
            if !registry.table.poll(&name).is_running() {
                return Err(not_found());
            }
            registry.table.detach(&name)
        };
        // A concurrent stop already owns the process; it settles the entry
        let Some(process) = process else {
            return Err(not_found());
        };
        self.finish_stop(&name, process)?;

        self.schedule_broadcast();
        Ok(format!("{} stopped", name))
    }

    /// Stop a game-server instance if alive and forget it entirely
    pub fn remove(self: &Arc<Self>, id: &str) -> SupervisorResult<String> {
        let unit = match Unit::resolve(&self.catalog, id) {
            Ok(unit @ Unit::Server { .. }) => unit,
            _ => return Err(SupervisorError::InvalidId(id.to_string())),
        };
        let name = unit.logical_name();

        let (process, was_tracked) = {
            let mut registry = self.registry()?;
            if registry.table.poll(&name).is_running() {
                info!("Stopping {} before removal", name);
            }
            (registry.table.detach(&name), registry.tracker.remove(&name))
        };

        let had_process = process.is_some();
        if let Some(process) = process {
            self.finish_stop(&name, process)?;
        }
        if !had_process && !was_tracked {
            return Err(SupervisorError::NotFound("Instance not found".to_string()));
        }

        info!("Removed {} from tracking", name);
        self.schedule_broadcast();
        Ok(format!("{} removed", name))
    }

    /// Terminate a detached process with the registry unlocked, then drop its entry
    fn finish_stop(&self, name: &str, mut process: ManagedProcess) -> SupervisorResult<()> {
        process.shutdown(self.settings.stop_timeout());
        self.registry()?.table.settle(name);
        Ok(())
    }

    /// Fresh snapshot of the whole fleet
    pub fn status(&self) -> SupervisorResult<StatusSnapshot> {
        let mut registry = self.registry()?;
        let liveness = registry.table.poll_all();
        Ok(status::build(&self.catalog, &liveness, &registry.tracker))
    }

    /// Raw per-LogicalName state
    pub fn raw_status(&self) -> SupervisorResult<BTreeMap<String, RawEntry>> {
        let mut registry = self.registry()?;
        let liveness = registry.table.poll_all();
        let started_at: HashMap<_, _> = liveness
            .keys()
            .filter_map(|name| {
                registry
                    .table
                    .started_at(name)
                    .map(|at| (name.clone(), at))
            })
            .collect();
        Ok(status::build_raw(&liveness, &started_at, &registry.tracker))
    }

    /// Path of the log file for `id`, if one has been written
    pub fn log_path(&self, id: &str) -> SupervisorResult<PathBuf> {
        let unit = Unit::resolve(&self.catalog, id)
            .map_err(|_| SupervisorError::NotFound("Log file not found".to_string()))?;
        let path = self.settings.logs_dir().join(unit.log_file_name());
        if !path.is_file() {
            return Err(SupervisorError::NotFound("Log file not found".to_string()));
        }
        Ok(path)
    }

    /// Publish a fresh snapshot after the settle delay, without waiting for it
    pub fn schedule_broadcast(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.broadcaster
            .schedule(self.settings.settle_delay(), move || match this.status() {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    error!("Error broadcasting server status: {}", e);
                    None
                }
            });
    }

    /// Terminate everything; used on shutdown
    pub fn shutdown(&self) -> SupervisorResult<()> {
        let mut registry = self.registry()?;
        registry
            .table
            .terminate_all(self.settings.stop_timeout(), self.settings.sweep_leftovers);
        Ok(())
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::core::broadcast::Broadcaster;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::OnceLock;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::runtime::Handle;

    fn script(cell: &'static OnceLock<PathBuf>, label: &str, body: &str) -> &'static Path {
        cell.get_or_init(|| {
            let path = std::env::temp_dir().join(format!("{}-{}", label, std::process::id()));
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        })
    }

    /// A stand-in for `java` that ignores its arguments and sleeps
    fn fake_java() -> &'static Path {
        static FAKE_JAVA: OnceLock<PathBuf> = OnceLock::new();
        script(&FAKE_JAVA, "fake-java", "#!/bin/sh\nexec sleep 30\n")
    }

    /// Like [`fake_java`] but shrugs off SIGTERM, so only the forced kill ends it
    fn stubborn_java() -> &'static Path {
        static STUBBORN_JAVA: OnceLock<PathBuf> = OnceLock::new();
        script(
            &STUBBORN_JAVA,
            "stubborn-java",
            "#!/bin/sh\ntrap '' TERM\nwhile :; do sleep 1; done\n",
        )
    }

    impl Supervisor {
        /// Number of entries in the process table and the tracker
        pub(crate) fn counts(&self) -> SupervisorResult<(usize, usize)> {
            let registry = self.registry()?;
            Ok((registry.table.len(), registry.tracker.len()))
        }

        pub(crate) fn is_tracked(&self, name: &str) -> SupervisorResult<bool> {
            Ok(self.registry()?.tracker.contains(name))
        }
    }

    pub(crate) struct Fleet {
        pub dir: TempDir,
        pub supervisor: Arc<Supervisor>,
    }

    impl Fleet {
        /// A supervisor over a scratch base directory holding the given jars
        pub(crate) fn with_jars(jars: &[&str]) -> Self {
            Self::with_java(fake_java(), jars)
        }

        fn with_java(java: &Path, jars: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for jar in jars {
                let path = dir.path().join(jar);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, b"").unwrap();
            }

            let settings = Settings {
                base_directory: Some(dir.path().to_path_buf()),
                java_path: java.to_path_buf(),
                stop_timeout_secs: 2,
                settle_delay_ms: 50,
                service_stagger_ms: 0,
                server_stagger_ms: 0,
                sweep_leftovers: false,
                ..Default::default()
            };
            let supervisor = Supervisor::new(
                Catalog::default(),
                settings,
                Broadcaster::new(Handle::current()),
            );
            Self { dir, supervisor }
        }

        pub(crate) fn standard() -> Self {
            Self::with_jars(STANDARD_JARS)
        }
    }

    const STANDARD_JARS: &[&str] = &[
        "proxy/velocity.jar",
        "limbo/NanoLimbo.jar",
        "services/ServiceFriend.jar",
        "gameserver/HypixelCore.jar",
    ];

    impl Fleet {
        fn stubborn() -> Self {
            Self::with_java(stubborn_java(), STANDARD_JARS)
        }
    }

    impl Drop for Fleet {
        fn drop(&mut self) {
            let _ = self.supervisor.shutdown();
        }
    }

    #[tokio::test]
    async fn fresh_fleet_reports_nothing_running() {
        let fleet = Fleet::standard();
        let snapshot = fleet.supervisor.status().unwrap();

        assert!(!snapshot.proxy.running);
        assert!(!snapshot.limbo.running);
        assert!(snapshot.services.iter().all(|s| !s.running));
        for kind in snapshot.gameservers.values() {
            assert_eq!(kind.instances.len(), 1);
            assert_eq!(kind.instances[0].instance, 0);
            assert!(!kind.instances[0].running);
        }
        assert_eq!(fleet.supervisor.counts().unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn start_proxy_then_query() {
        let fleet = Fleet::standard();
        assert_eq!(fleet.supervisor.start("proxy").unwrap(), "Proxy started");

        let snapshot = fleet.supervisor.status().unwrap();
        assert!(snapshot.proxy.running);
        assert!(snapshot.proxy.pid.is_some());
        assert!(fleet.supervisor.is_tracked("Proxy").unwrap());
        assert!(fleet.dir.path().join("logs/Proxy.log").exists());
    }

    #[tokio::test]
    async fn start_with_missing_jar_spawns_nothing() {
        let fleet = Fleet::standard();
        let err = fleet.supervisor.start("bazaar").unwrap_err();

        assert!(matches!(err, SupervisorError::ArtifactMissing { ref artifact, .. } if artifact == "ServiceBazaar.jar"));
        assert_eq!(fleet.supervisor.counts().unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let fleet = Fleet::standard();
        fleet.supervisor.start("skyblock_hub_3").unwrap();

        let err = fleet.supervisor.start("skyblock_hub_3").unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning(_)));
        assert_eq!(fleet.supervisor.counts().unwrap(), (1, 1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_starts_spawn_once() {
        let fleet = Fleet::standard();
        let supervisor = &fleet.supervisor;

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| supervisor.start("skyblock_hub_3")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SupervisorError::AlreadyRunning(_))));
        assert_eq!(supervisor.counts().unwrap(), (1, 1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_stop_leaves_the_registry_usable() {
        let fleet = Fleet::stubborn();
        fleet.supervisor.start("proxy").unwrap();
        // Let the shell install its trap before signalling it
        std::thread::sleep(Duration::from_millis(200));

        let stopper = {
            let supervisor = Arc::clone(&fleet.supervisor);
            std::thread::spawn(move || supervisor.stop("proxy"))
        };
        std::thread::sleep(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let snapshot = fleet.supervisor.status().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(snapshot.proxy.running);

        assert!(matches!(
            fleet.supervisor.start("proxy"),
            Err(SupervisorError::AlreadyRunning(_))
        ));
        let started = std::time::Instant::now();
        fleet.supervisor.start("nanolimbo").unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(stopper.join().unwrap().unwrap(), "Proxy stopped");
        assert!(!fleet.supervisor.status().unwrap().proxy.running);
        assert_eq!(fleet.supervisor.counts().unwrap(), (1, 2));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let fleet = Fleet::standard();
        for id in ["nothing", "skyblock_nowhere_0", "skyblock_hub_x"] {
            assert!(matches!(
                fleet.supervisor.start(id),
                Err(SupervisorError::NotFound(_))
            ));
            assert!(matches!(
                fleet.supervisor.stop(id),
                Err(SupervisorError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn stop_keeps_the_instance_known() {
        let fleet = Fleet::standard();
        fleet.supervisor.start("skyblock_hub_1").unwrap();
        assert_eq!(
            fleet.supervisor.stop("skyblock_hub_1").unwrap(),
            "SKYBLOCK_HUB_1 stopped"
        );

        assert_eq!(fleet.supervisor.counts().unwrap(), (0, 1));
        let snapshot = fleet.supervisor.status().unwrap();
        let hub = &snapshot.gameservers["skyblock_hub"];
        assert_eq!(hub.instances.len(), 1);
        assert_eq!(hub.instances[0].instance, 1);
        assert!(!hub.instances[0].running);
    }

    #[tokio::test]
    async fn stopping_a_stopped_unit_changes_nothing() {
        let fleet = Fleet::standard();
        fleet.supervisor.start("friend").unwrap();
        fleet.supervisor.stop("friend").unwrap();

        let before = fleet.supervisor.counts().unwrap();
        assert!(matches!(
            fleet.supervisor.stop("friend"),
            Err(SupervisorError::NotFound(_))
        ));
        assert_eq!(fleet.supervisor.counts().unwrap(), before);
    }

    #[tokio::test]
    async fn remove_running_instance_forgets_it() {
        let fleet = Fleet::standard();
        fleet.supervisor.start("skyblock_hub_3").unwrap();

        assert_eq!(
            fleet.supervisor.remove("skyblock_hub_3").unwrap(),
            "SKYBLOCK_HUB_3 removed"
        );
        assert_eq!(fleet.supervisor.counts().unwrap(), (0, 0));

        let snapshot = fleet.supervisor.status().unwrap();
        let hub = &snapshot.gameservers["skyblock_hub"];
        assert_eq!(hub.instances.len(), 1);
        assert_eq!(hub.instances[0].id, "skyblock_hub_0");
        assert!(!hub.instances[0].running);
    }

    #[tokio::test]
    async fn remove_of_stopped_instance_clears_the_tracker() {
        let fleet = Fleet::standard();
        fleet.supervisor.start("bedwars_game_2").unwrap();
        fleet.supervisor.stop("bedwars_game_2").unwrap();

        fleet.supervisor.remove("bedwars_game_2").unwrap();
        assert!(!fleet.supervisor.is_tracked("BEDWARS_GAME_2").unwrap());
        assert!(matches!(
            fleet.supervisor.remove("bedwars_game_2"),
            Err(SupervisorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_rejects_non_instance_ids() {
        let fleet = Fleet::standard();
        for id in ["proxy", "friend", "garbage", "skyblock_hub"] {
            assert!(matches!(
                fleet.supervisor.remove(id),
                Err(SupervisorError::InvalidId(_))
            ));
        }
    }

    #[tokio::test]
    async fn instances_are_listed_in_ascending_order() {
        let fleet = Fleet::standard();
        for id in ["skywars_game_5", "skywars_game_0", "skywars_game_12"] {
            fleet.supervisor.start(id).unwrap();
        }

        let snapshot = fleet.supervisor.status().unwrap();
        let numbers: Vec<u32> = snapshot.gameservers["skywars_game"]
            .instances
            .iter()
            .map(|i| i.instance)
            .collect();
        assert_eq!(numbers, vec![0, 5, 12]);

        let raw = fleet.supervisor.raw_status().unwrap();
        assert_eq!(raw.len(), 3);
        assert!(raw.values().all(|e| e.running && e.started_at.is_some()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_changes_are_broadcast() {
        let fleet = Fleet::standard();
        let mut rx = fleet.supervisor.broadcaster().subscribe();

        fleet.supervisor.start("nanolimbo").unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.limbo.running);
    }

    #[tokio::test]
    async fn log_lookup_requires_an_existing_file() {
        let fleet = Fleet::standard();
        assert!(matches!(
            fleet.supervisor.log_path("proxy"),
            Err(SupervisorError::NotFound(_))
        ));

        fleet.supervisor.start("proxy").unwrap();
        let path = fleet.supervisor.log_path("proxy").unwrap();
        assert_eq!(path, fleet.dir.path().join("logs").join("Proxy.log"));
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let fleet = Fleet::standard();
        fleet.supervisor.start("proxy").unwrap();
        fleet.supervisor.start("friend").unwrap();

        fleet.supervisor.shutdown().unwrap();
        let (processes, tracked) = fleet.supervisor.counts().unwrap();
        assert_eq!(processes, 0);
        assert_eq!(tracked, 2);
        assert!(!fleet.supervisor.status().unwrap().proxy.running);
    }
}
