// Child process termination
// SIGTERM to the whole process group, SIGKILL after a grace period.

use std::time::Duration;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{info, warn};

/// Grace period between SIGTERM and SIGKILL when a fetch is cancelled (5 seconds)
pub const GRACEFUL_KILL_TIMEOUT_MS: u64 = 5000;

/// Stop a child (and, on unix, everything in its process group)
///
/// The child must have been spawned as a process-group leader for the
/// group signal to reach grandchildren such as ffmpeg.
pub async fn terminate_gracefully(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped
        return Ok(());
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(pid as i32);
        info!(pid = %pid, "Sending SIGTERM to process group");
        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            warn!(pid = %pid, error = %e, "SIGTERM failed");
        }

        match timeout(grace, child.wait()).await {
            Ok(status) => {
                info!(pid = %pid, "Process exited after SIGTERM");
                status.map(|_| ())
            }
            Err(_) => {
                warn!(pid = %pid, "Process did not exit after SIGTERM, sending SIGKILL");
                if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                    warn!(pid = %pid, error = %e, "SIGKILL failed");
                }
                child.kill().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        info!(pid = %pid, "Killing process");
        child.kill().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_sigterm_stops_sleeping_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();

        let started = std::time::Instant::now();
        terminate_gracefully(&mut child, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sigkill_after_grace_when_sigterm_ignored() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 30"])
            .process_group(0)
            .spawn()
            .unwrap();
        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        terminate_gracefully(&mut child, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(child.try_wait().unwrap().is_some());
    }
}
