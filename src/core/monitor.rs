//! Leftover process sweep - Last-resort cleanup of stray launcher processes
//!
//! This is a safety net, not the primary cleanup path. It matches on command-line
//! shape only, so it can also hit unrelated `java -jar` processes owned by the same
//! user.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{info, warn};

use crate::platform;

/// Whether a command line looks like one of ours (`java ... -jar ...`)
pub fn is_launcher_command(cmd: &[String]) -> bool {
    let Some(program) = cmd.first() else {
        return false;
    };
    let program = std::path::Path::new(program)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    program == "java" && cmd.iter().skip(1).any(|arg| arg == "-jar")
}

/// PIDs of every visible process with a launcher-shaped command line
pub fn find_launcher_processes() -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
    );

    let own_pid = Pid::from_u32(std::process::id());
    system
        .processes()
        .iter()
        .filter(|(pid, _)| **pid != own_pid)
        .filter(|(_, process)| {
            let cmd: Vec<String> = process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy().to_string())
                .collect();
            is_launcher_command(&cmd)
        })
        .map(|(pid, _)| pid.as_u32())
        .collect()
}

/// Kill every leftover `java -jar` process
pub fn sweep_leftovers() {
    info!("Killing leftover java processes");
    let pids = find_launcher_processes();

    for &pid in &pids {
        if let Err(e) = platform::kill_process(pid) {
            warn!("Failed to kill leftover process {}: {}", pid, e);
        }
    }

    let survivors = pids
        .iter()
        .filter(|&&pid| platform::is_process_running(pid))
        .count();
    if survivors > 0 {
        warn!("{} leftover process(es) still present after sweep", survivors);
    }
}
