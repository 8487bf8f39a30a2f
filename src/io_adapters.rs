//! Descriptor plumbing for the execution engine.
//!
//! Everything here hands out [`OwnedFd`]s, so a descriptor is closed as soon as its
//! owner goes out of scope, on every return path. All descriptors are opened with
//! close-on-exec; only the ones installed on 0 and 1 are inherited by children.

use nix::fcntl::OFlag;
use nix::libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::unistd::{dup2, pipe2};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, IntoRawFd, OwnedFd, RawFd};

/// Copies of the interpreter's own stdin and stdout, taken before a pipeline rewires
/// descriptors 0 and 1.
///
/// Dropping the guard puts the copies back onto 0 and 1 and closes them.
#[derive(Debug)]
pub struct SavedStdio {
    stdin: OwnedFd,
    stdout: OwnedFd,
}

impl SavedStdio {
    pub fn capture() -> io::Result<Self> {
        // Anything buffered so far belongs to the current stdout.
        io::stdout().flush()?;
        Ok(Self {
            stdin: io::stdin().as_fd().try_clone_to_owned()?,
            stdout: io::stdout().as_fd().try_clone_to_owned()?,
        })
    }

    /// A fresh descriptor for the original stdin.
    pub fn stdin_copy(&self) -> io::Result<OwnedFd> {
        self.stdin.try_clone()
    }

    /// A fresh descriptor for the original stdout.
    pub fn stdout_copy(&self) -> io::Result<OwnedFd> {
        self.stdout.try_clone()
    }
}

impl Drop for SavedStdio {
    fn drop(&mut self) {
        if let Err(e) = io::stdout().flush() {
            log::debug!("flushing stdout before restore failed: {}", e);
        }
        if let Err(e) = dup2(self.stdin.as_raw_fd(), STDIN_FILENO) {
            log::warn!("failed to restore stdin: {}", e);
        }
        if let Err(e) = dup2(self.stdout.as_raw_fd(), STDOUT_FILENO) {
            log::warn!("failed to restore stdout: {}", e);
        }
    }
}

/// Make `fd` the process's descriptor `target`, consuming `fd`.
pub fn install(fd: OwnedFd, target: RawFd) -> nix::Result<()> {
    if fd.as_raw_fd() == target {
        // Already in place; keep it open.
        let _ = fd.into_raw_fd();
        return Ok(());
    }
    dup2(fd.as_raw_fd(), target)?;
    Ok(())
}

pub fn install_stdin(fd: OwnedFd) -> nix::Result<()> {
    install(fd, STDIN_FILENO)
}

pub fn install_stdout(fd: OwnedFd) -> nix::Result<()> {
    // Bytes written by builtins must reach the stdout they were written for.
    if let Err(e) = io::stdout().flush() {
        log::debug!("flushing stdout before rewiring failed: {}", e);
    }
    install(fd, STDOUT_FILENO)
}

/// A new pipe as `(read_end, write_end)`.
pub fn pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    pipe2(OFlag::O_CLOEXEC)
}

pub fn open_input(path: &str) -> io::Result<OwnedFd> {
    let file = OpenOptions::new().read(true).open(path)?;
    Ok(file.into())
}

/// Open `path` for writing, creating it if needed. Truncates unless `append` is set.
pub fn open_output(path: &str, append: bool) -> io::Result<OwnedFd> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    Ok(file.into())
}
