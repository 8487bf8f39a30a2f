use crate::command::ExitCode;
use crate::history::History;
use crate::job::JobRegistry;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable state of one interpreter instance.
///
/// The environment contains:
/// - `vars`: variables handed to every started program (extended by `export`).
/// - `current_dir`: the working directory for command execution.
/// - `jobs`: identifiers of every spawned process, for bulk termination.
/// - `history`: previously executed lines, for the `history` builtin.
///
/// It is created once at startup, mutated only by the execution engine and the
/// builtins, and dropped when the interpreter exits.
#[derive(Debug)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    pub jobs: JobRegistry,
    pub history: History,
    exit_request: Option<ExitCode>,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_vars(vars, current_dir)
    }

    /// Build an environment from explicit parts, without looking at the process.
    pub fn with_vars(vars: HashMap<String, String>, current_dir: PathBuf) -> Self {
        Self {
            vars,
            current_dir,
            jobs: JobRegistry::new(),
            history: History::new(),
            exit_request: None,
        }
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Ask the read loop to terminate the interpreter with `code`.
    pub fn request_exit(&mut self, code: ExitCode) {
        self.exit_request = Some(code);
    }

    /// The exit status requested by `exit` (or a fatal error), if any.
    pub fn exit_requested(&self) -> Option<ExitCode> {
        self.exit_request
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
