//! Unix signalling through libc

use anyhow::Result;

/// Terminate a process gracefully (SIGTERM)
pub fn terminate_process(pid: u32) -> Result<()> {
    signal(pid, libc::SIGTERM, "terminate")
}

/// Force kill a process (SIGKILL)
pub fn kill_process(pid: u32) -> Result<()> {
    signal(pid, libc::SIGKILL, "kill")
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    // Signal 0 only checks that the PID exists
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

fn signal(pid: u32, sig: libc::c_int, action: &str) -> Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if result == 0 {
        Ok(())
    } else {
        anyhow::bail!(
            "Failed to {} process {}: {}",
            action,
            pid,
            std::io::Error::last_os_error()
        )
    }
}
