//! Process management - Spawning, polling and terminating supervised processes

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::error::{SupervisorError, SupervisorResult};
use super::monitor;
use crate::platform;

/// How often a terminating process is checked for exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything needed to launch one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program to execute
    pub executable: PathBuf,
    /// Command line arguments
    pub arguments: Vec<String>,
    /// Working directory of the child
    pub working_dir: PathBuf,
    /// File that must exist before launching
    pub artifact: PathBuf,
    /// Merged stdout/stderr destination, opened in append mode
    pub log_path: PathBuf,
}

/// Result of a non-blocking liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running { pid: u32 },
    NotRunning,
}

impl Liveness {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Running { pid } => Some(*pid),
            Self::NotRunning => None,
        }
    }
}

/// Outcome of a terminate request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Stopped,
    NotFound,
}

/// A child process owned by the table
#[derive(Debug)]
pub struct ManagedProcess {
    name: String,
    child: Child,
    started_at: DateTime<Utc>,
}

impl ManagedProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Check whether the child has exited without reaping the table entry
    fn poll(&mut self) -> Liveness {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("{} exited with {}", self.name, status);
                Liveness::NotRunning
            }
            Ok(None) => Liveness::Running { pid: self.pid() },
            Err(e) => {
                error!("Error checking status of {}: {}", self.name, e);
                Liveness::NotRunning
            }
        }
    }

    /// SIGTERM, wait up to `timeout`, then SIGKILL
    pub fn shutdown(&mut self, timeout: Duration) {
        if !self.poll().is_running() {
            return;
        }

        let pid = self.pid();
        info!("Stopping {} (PID {})", self.name, pid);
        if let Err(e) = platform::terminate_process(pid) {
            warn!("Graceful termination of {} failed: {}, forcing kill", self.name, e);
            self.force_kill();
            return;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    info!("{} stopped with {}", self.name, status);
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Error waiting for {}: {}", self.name, e);
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
        }

        warn!("Force killing {}", self.name);
        self.force_kill();
    }

    fn force_kill(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!("Failed to kill {}: {}", self.name, e);
        }
        if let Err(e) = self.child.wait() {
            warn!("Failed to reap {}: {}", self.name, e);
        }
    }
}

/// A process handed out by [`ProcessTable::detach`] whose termination is in flight
#[derive(Debug, Clone, Copy)]
struct Stopping {
    pid: u32,
    started_at: DateTime<Utc>,
}

/// Live child processes keyed by LogicalName.
///
/// A detached entry counts as running until [`ProcessTable::settle`] confirms its exit,
/// so its name cannot be spawned again in the meantime.
#[derive(Debug, Default)]
pub struct ProcessTable {
    processes: HashMap<String, ManagedProcess>,
    stopping: HashMap<String, Stopping>,
}

impl ProcessTable {
    /// Spawn a process under `name`.
    ///
    /// A lingering entry for an exited process is replaced; a live one is rejected.
    pub fn spawn(&mut self, name: &str, spec: &LaunchSpec) -> SupervisorResult<u32> {
        if self.poll(name).is_running() {
            return Err(SupervisorError::AlreadyRunning(name.to_string()));
        }

        if !spec.artifact.is_file() {
            let artifact = spec
                .artifact
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| spec.artifact.display().to_string());
            warn!("{} missing, not starting {}", artifact, name);
            return Err(SupervisorError::ArtifactMissing {
                artifact,
                path: spec.artifact.clone(),
            });
        }

        info!("Spawning {} from {:?}", name, spec.artifact);
        let spawn_err = |source| SupervisorError::Spawn {
            name: name.to_string(),
            source,
        };

        if let Some(parent) = spec.log_path.parent() {
            std::fs::create_dir_all(parent).map_err(spawn_err)?;
        }
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)
            .map_err(spawn_err)?;
        let stderr = stdout.try_clone().map_err(spawn_err)?;

        let mut cmd = Command::new(&spec.executable);
        cmd.args(&spec.arguments)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Keep terminal signals aimed at the orchestrator away from the children
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", name, e);
            spawn_err(e)
        })?;

        let pid = child.id();
        info!("Started {} PID={}", name, pid);

        if self
            .processes
            .insert(
                name.to_string(),
                ManagedProcess {
                    name: name.to_string(),
                    child,
                    started_at: Utc::now(),
                },
            )
            .is_some()
        {
            debug!("Replaced exited process entry for {}", name);
        }

        Ok(pid)
    }

    /// Non-blocking liveness check; exited entries stay in the table
    pub fn poll(&mut self, name: &str) -> Liveness {
        if let Some(process) = self.processes.get_mut(name) {
            return process.poll();
        }
        self.stopping
            .get(name)
            .map(|s| Liveness::Running { pid: s.pid })
            .unwrap_or(Liveness::NotRunning)
    }

    /// Liveness of every entry in the table, including ones being stopped
    pub fn poll_all(&mut self) -> HashMap<String, Liveness> {
        let mut liveness: HashMap<String, Liveness> = self
            .processes
            .iter_mut()
            .map(|(name, process)| (name.clone(), process.poll()))
            .collect();
        for (name, stopping) in &self.stopping {
            liveness.insert(name.clone(), Liveness::Running { pid: stopping.pid });
        }
        liveness
    }

    /// Take `name` out of the table so it can be stopped without holding the table.
    ///
    /// The name keeps reporting as running until [`ProcessTable::settle`].
    pub fn detach(&mut self, name: &str) -> Option<ManagedProcess> {
        let process = self.processes.remove(name)?;
        self.stopping.insert(
            name.to_string(),
            Stopping {
                pid: process.pid(),
                started_at: process.started_at(),
            },
        );
        Some(process)
    }

    /// Forget a detached entry once its process is gone
    pub fn settle(&mut self, name: &str) {
        self.stopping.remove(name);
    }

    /// Stop `name` (graceful, then forced after `timeout`) and drop its entry
    pub fn terminate(&mut self, name: &str, timeout: Duration) -> Termination {
        let Some(mut process) = self.detach(name) else {
            return Termination::NotFound;
        };

        process.shutdown(timeout);
        self.settle(name);
        Termination::Stopped
    }

    /// Terminate every entry, then optionally sweep for leftover launcher processes
    pub fn terminate_all(&mut self, timeout: Duration, sweep_leftovers: bool) {
        info!("Shutting down all processes");
        let names: Vec<String> = self.processes.keys().cloned().collect();
        for name in names {
            self.terminate(&name, timeout);
        }
        if sweep_leftovers {
            monitor::sweep_leftovers();
        }
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.processes.contains_key(name) || self.stopping.contains_key(name)
    }

    /// When the process under `name` was spawned
    pub fn started_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.processes
            .get(name)
            .map(ManagedProcess::started_at)
            .or_else(|| self.stopping.get(name).map(|s| s.started_at))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.processes.len() + self.stopping.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("app.jar"), b"").unwrap();
            Self { dir }
        }

        fn spec(&self, script: &str) -> LaunchSpec {
            LaunchSpec {
                executable: PathBuf::from("sh"),
                arguments: vec!["-c".to_string(), script.to_string()],
                working_dir: self.dir.path().to_path_buf(),
                artifact: self.dir.path().join("app.jar"),
                log_path: self.dir.path().join("logs").join("app.log"),
            }
        }
    }

    fn wait_until_exited(table: &mut ProcessTable, name: &str) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while table.poll(name).is_running() {
            assert!(Instant::now() < deadline, "{name} never exited");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn spawn_poll_terminate() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();

        let pid = table.spawn("unit", &fixture.spec("sleep 30")).unwrap();
        assert_eq!(table.poll("unit"), Liveness::Running { pid });

        assert_eq!(
            table.terminate("unit", Duration::from_secs(5)),
            Termination::Stopped
        );
        assert!(!table.contains("unit"));
        assert_eq!(table.poll("unit"), Liveness::NotRunning);
    }

    #[test]
    fn missing_artifact_spawns_nothing() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        let mut spec = fixture.spec("sleep 30");
        spec.artifact = fixture.dir.path().join("absent.jar");

        let err = table.spawn("unit", &spec).unwrap_err();
        assert!(matches!(err, SupervisorError::ArtifactMissing { ref artifact, .. } if artifact == "absent.jar"));
        assert!(table.is_empty());
        assert!(!spec.log_path.exists());
    }

    #[test]
    fn exec_failure_leaves_no_entry() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        let mut spec = fixture.spec("");
        spec.executable = fixture.dir.path().join("no-such-binary");

        let err = table.spawn("unit", &spec).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn exited_entries_linger_until_terminated() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        table.spawn("unit", &fixture.spec("exit 0")).unwrap();

        wait_until_exited(&mut table, "unit");
        assert!(table.contains("unit"));
        assert_eq!(
            table.poll_all().get("unit").copied(),
            Some(Liveness::NotRunning)
        );

        assert_eq!(
            table.terminate("unit", Duration::from_secs(1)),
            Termination::Stopped
        );
        assert!(table.is_empty());
    }

    #[test]
    fn live_name_cannot_be_spawned_twice() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        table.spawn("unit", &fixture.spec("sleep 30")).unwrap();

        let err = table.spawn("unit", &fixture.spec("sleep 30")).unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning(_)));
        assert_eq!(table.len(), 1);

        table.terminate("unit", Duration::from_secs(5));
    }

    #[test]
    fn exited_entry_is_replaced_on_respawn() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        table.spawn("unit", &fixture.spec("exit 0")).unwrap();
        wait_until_exited(&mut table, "unit");

        let pid = table.spawn("unit", &fixture.spec("sleep 30")).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.poll("unit"), Liveness::Running { pid });

        table.terminate("unit", Duration::from_secs(5));
    }

    #[test]
    fn ignored_sigterm_escalates_to_kill() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        table
            .spawn("stubborn", &fixture.spec("trap '' TERM; while :; do sleep 1; done"))
            .unwrap();
        // Give the shell time to install its trap
        std::thread::sleep(Duration::from_millis(300));

        let timeout = Duration::from_millis(500);
        let started = Instant::now();
        assert_eq!(table.terminate("stubborn", timeout), Termination::Stopped);
        assert!(started.elapsed() >= timeout);
        assert!(!table.contains("stubborn"));
    }

    #[test]
    fn output_is_appended_to_the_log() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        let spec = fixture.spec("echo out; echo err 1>&2");

        for _ in 0..2 {
            table.spawn("unit", &spec).unwrap();
            wait_until_exited(&mut table, "unit");
        }

        let log = std::fs::read_to_string(&spec.log_path).unwrap();
        assert_eq!(log.matches("out").count(), 2);
        assert_eq!(log.matches("err").count(), 2);
    }

    #[test]
    fn terminate_all_empties_the_table() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        table.spawn("a", &fixture.spec("sleep 30")).unwrap();
        table.spawn("b", &fixture.spec("exit 0")).unwrap();

        table.terminate_all(Duration::from_secs(5), false);
        assert!(table.is_empty());
    }

    #[test]
    fn detached_entry_reports_running_until_settled() {
        let fixture = Fixture::new();
        let mut table = ProcessTable::default();
        let pid = table.spawn("unit", &fixture.spec("sleep 30")).unwrap();

        let mut process = table.detach("unit").unwrap();
        assert!(table.detach("unit").is_none());
        assert_eq!(table.poll("unit"), Liveness::Running { pid });
        assert_eq!(table.poll_all().get("unit").copied(), Some(Liveness::Running { pid }));
        assert!(table.started_at("unit").is_some());
        assert!(matches!(
            table.spawn("unit", &fixture.spec("sleep 30")),
            Err(SupervisorError::AlreadyRunning(_))
        ));

        process.shutdown(Duration::from_secs(5));
        table.settle("unit");
        assert!(table.is_empty());
        assert_eq!(table.poll("unit"), Liveness::NotRunning);
    }

    #[test]
    fn terminate_unknown_is_not_found() {
        let mut table = ProcessTable::default();
        assert_eq!(
            table.terminate("ghost", Duration::from_secs(1)),
            Termination::NotFound
        );
    }
}
