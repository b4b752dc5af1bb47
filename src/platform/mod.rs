//! Platform-specific process signalling

#[cfg(unix)]
pub mod unix;

use anyhow::Result;

/// Ask a process to exit (SIGTERM on unix)
pub fn terminate_process(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        unix::terminate_process(pid)
    }
    #[cfg(not(unix))]
    {
        // No graceful signal here; callers escalate to a hard kill
        let _ = pid;
        anyhow::bail!("Graceful termination is not supported on this platform")
    }
}

/// Force kill a process by PID
pub fn kill_process(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        unix::kill_process(pid)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        anyhow::bail!("Killing by PID is not supported on this platform")
    }
}

/// Check if a process exists
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        unix::is_process_running(pid)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
