//! Registry of spawned processes.
//!
//! Every external process the engine starts is recorded here so that it can be
//! terminated later, either by the `exit` builtin or by an interrupt. The registry is
//! a cheap cloneable handle: the interrupt handler runs on its own thread and holds a
//! clone of the interpreter's registry.

use crate::command::ExitCode;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Convert a wait status into a shell exit code.
///
/// Processes killed by a signal report `128 + signal`, like POSIX shells do.
pub fn wait_status_code(status: WaitStatus) -> ExitCode {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
        _ => 0,
    }
}

/// Block until `pid` changes state, retrying when interrupted by a signal.
fn wait_blocking(pid: Pid) -> nix::Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    pids: Arc<Mutex<Vec<Pid>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Pid>> {
        self.pids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, pid: Pid) {
        log::debug!("registered job {}", pid);
        self.lock().push(pid);
    }

    /// Drop `pid` after it has been waited for elsewhere.
    pub fn forget(&self, pid: Pid) {
        self.lock().retain(|&p| p != pid);
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Collect every registered process that has already exited, without blocking.
    ///
    /// Returns the reaped identifiers with their exit codes; they are removed from the
    /// registry. Identifiers that no longer belong to us are dropped silently.
    pub fn reap_finished(&self) -> Vec<(Pid, ExitCode)> {
        let mut finished = Vec::new();
        self.lock()
            .retain(|&pid| match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    finished.push((pid, wait_status_code(status)));
                    false
                }
                Ok(_) => true,
                Err(Errno::ECHILD) => false,
                Err(e) => {
                    log::warn!("failed to poll job {}: {}", pid, e);
                    true
                }
            });
        finished
    }

    /// Send `SIGTERM` to every registered process and wait for each of them.
    ///
    /// Processes that are already gone are skipped. The registry is empty afterwards.
    /// Returns the exit code of the last process reaped, or 0 if none was.
    pub fn terminate_all(&self) -> ExitCode {
        let pids = std::mem::take(&mut *self.lock());
        let mut status = 0;
        for pid in pids {
            match kill(pid, Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => log::warn!("failed to signal job {}: {}", pid, e),
            }
            match wait_blocking(pid) {
                Ok(wait_status) => {
                    log::debug!("reaped job {}: {:?}", pid, wait_status);
                    status = wait_status_code(wait_status);
                }
                Err(Errno::ECHILD) => log::debug!("job {} was already reaped", pid),
                Err(e) => log::warn!("failed to wait for job {}: {}", pid, e),
            }
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::thread::sleep;
    use std::time::Duration;

    fn pid_of(child: &std::process::Child) -> Pid {
        Pid::from_raw(child.id() as i32)
    }

    #[test]
    fn test_register_and_forget() {
        let jobs = JobRegistry::new();
        jobs.register(Pid::from_raw(100_001));
        jobs.register(Pid::from_raw(100_002));
        assert_eq!(jobs.len(), 2);

        jobs.forget(Pid::from_raw(100_001));
        assert_eq!(jobs.pids(), vec![Pid::from_raw(100_002)]);
    }

    #[test]
    fn test_clones_share_state() {
        let jobs = JobRegistry::new();
        let handle = jobs.clone();
        handle.register(Pid::from_raw(100_003));
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn test_terminate_all_kills_running_process() {
        let child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        let jobs = JobRegistry::new();
        jobs.register(pid_of(&child));

        let status = jobs.terminate_all();

        assert_eq!(status, 128 + Signal::SIGTERM as i32);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_terminate_all_tolerates_reaped_process() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        child.wait().expect("wait true");

        let jobs = JobRegistry::new();
        jobs.register(pid_of(&child));

        assert_eq!(jobs.terminate_all(), 0);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_reap_finished_collects_exited_jobs() {
        let child = Command::new("sh")
            .args(["-c", "exit 7"])
            .spawn()
            .expect("spawn sh");
        let pid = pid_of(&child);
        drop(child);

        let jobs = JobRegistry::new();
        jobs.register(pid);

        let mut reaped = Vec::new();
        for _ in 0..100 {
            reaped = jobs.reap_finished();
            if !reaped.is_empty() {
                break;
            }
            sleep(Duration::from_millis(20));
        }

        assert_eq!(reaped, vec![(pid, 7)]);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_wait_status_code() {
        let pid = Pid::from_raw(1);
        assert_eq!(wait_status_code(WaitStatus::Exited(pid, 3)), 3);
        assert_eq!(
            wait_status_code(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            137
        );
        assert_eq!(wait_status_code(WaitStatus::StillAlive), 0);
    }
}
