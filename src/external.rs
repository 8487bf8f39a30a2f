use crate::command::{Command, ExitCode};
use crate::env::Environment;
use std::ffi::OsStr;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{self, Child, ExitStatus, Stdio};

/// Start `command` as a child process.
///
/// The child inherits the interpreter's current descriptors 0 and 1, which the engine
/// has already wired to pipes or redirection targets. Its environment is exactly the
/// interpreter's variables overlaid with the command's local assignments, and its
/// `argv[0]` is the program name as written. Background children get a process group
/// of their own.
pub fn spawn(command: &Command, env: &Environment, background: bool) -> io::Result<Child> {
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let executable = resolve_program(
        &env.current_dir,
        OsStr::new(&search_paths),
        Path::new(&command.program),
    )
    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "command not found"))?;

    let mut child = process::Command::new(&executable);
    child
        .arg0(&command.program)
        .args(&command.args)
        .env_clear()
        .envs(&env.vars)
        .envs(&command.local_vars)
        .current_dir(&env.current_dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit());
    if background {
        child.process_group(0);
    }
    child.spawn()
}

/// Shell exit code for a finished child.
pub fn exit_code(exit_status: ExitStatus) -> ExitCode {
    match exit_status.code() {
        Some(x) => x,
        None => terminated_by_signal(exit_status),
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

/// Resolve a program name the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Path with a separator (`bin/tool`, `./a.out`): resolved against `cwd`, returned if
///   it exists.
/// - Single component: search each directory in `search_paths` (PATH) and return the
///   first existing match.
/// - Empty name: returns `None`.
pub fn resolve_program(cwd: &Path, search_paths: &OsStr, program: &Path) -> Option<PathBuf> {
    if program.is_absolute() {
        return find_by_path(program);
    }

    let mut components = program.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()),
        _ => find_by_path(&cwd.join(program)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths).find_map(|dir| find_by_path(&dir.join(cmd)))
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        Some(path.to_path_buf())
    } else {
        None
    }
}
