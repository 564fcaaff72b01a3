//! Concrete executors.
//!
//! Both executors spawn their work in a fresh process group so that
//! cancellation can signal the whole tree: SIGTERM first, then SIGKILL
//! after a bounded grace period.

pub mod agent;
pub mod shell;

pub use agent::AgentExecutor;
pub use shell::ShellExecutor;

use std::time::Duration;

use tokio::process::Child;

/// How long a signalled process gets to exit before escalation.
pub(crate) const KILL_GRACE: Duration = Duration::from_secs(5);

#[cfg(unix)]
pub(crate) fn signal_process_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        tracing::debug!(pid, %signal, error = %e, "Process group signal failed");
    }
}

/// Terminate a child cooperatively: SIGTERM its process group, wait up to
/// [`KILL_GRACE`], then SIGKILL. Returns the exit status when the child
/// could be reaped.
pub(crate) async fn terminate_child(child: &mut Child) -> Option<std::process::ExitStatus> {
    let pid = child.id();

    #[cfg(unix)]
    if let Some(pid) = pid {
        signal_process_group(pid, nix::sys::signal::Signal::SIGTERM);
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(status) => status.ok(),
        Err(_) => {
            tracing::warn!(?pid, "Process ignored SIGTERM, escalating to SIGKILL");
            #[cfg(unix)]
            if let Some(pid) = pid {
                signal_process_group(pid, nix::sys::signal::Signal::SIGKILL);
            }
            let _ = child.start_kill();
            child.wait().await.ok()
        }
    }
}
