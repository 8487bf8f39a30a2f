use crate::command::ExitCode;
use crate::env::Environment;
use crate::executor;
use anyhow::{Context, Result, anyhow};
use argh::{EarlyExit, FromArgs};
use colored::Colorize;
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process, so their effects (working directory,
/// variables, termination) are visible to the interpreter itself.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "exit".
    fn name() -> &'static str;

    /// Executes the command, writing its output to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

/// The closed set of builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Exit,
    Export,
    History,
    Help,
    Info,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Cd,
        Builtin::Exit,
        Builtin::Export,
        Builtin::History,
        Builtin::Help,
        Builtin::Info,
    ];

    /// Find the builtin called `program`, ignoring case.
    pub fn lookup(program: &str) -> Option<Builtin> {
        let name = program.to_lowercase();
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Cd => Cd::name(),
            Builtin::Exit => Exit::name(),
            Builtin::Export => Export::name(),
            Builtin::History => History::name(),
            Builtin::Help => Help::name(),
            Builtin::Info => Info::name(),
        }
    }

    /// Parse `args` for this builtin and run it.
    ///
    /// Never fails: argument errors and execution errors are reported on stderr and
    /// turned into status 1.
    pub fn run(self, args: &[String], stdout: &mut dyn Write, env: &mut Environment) -> ExitCode {
        match self {
            Builtin::Cd => invoke::<Cd>(args, stdout, env),
            Builtin::Exit => invoke::<Exit>(args, stdout, env),
            Builtin::Export => invoke::<Export>(args, stdout, env),
            Builtin::History => invoke::<History>(args, stdout, env),
            Builtin::Help => invoke::<Help>(args, stdout, env),
            Builtin::Info => invoke::<Info>(args, stdout, env),
        }
    }
}

fn invoke<T: BuiltinCommand>(
    args: &[String],
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> ExitCode {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let command = match T::from_args(&[T::name()], &args) {
        Ok(cmd) => cmd,
        Err(EarlyExit { output, status }) => {
            return match status {
                Ok(()) => match write!(stdout, "{}", output) {
                    Ok(()) => 0,
                    Err(_) => 1,
                },
                Err(()) => {
                    eprint!("{}", output);
                    1
                }
            };
        }
    };
    match command.execute(stdout, env) {
        Ok(x) => x,
        Err(e) => {
            eprintln!("pipesh: {:#}", e);
            1
        }
    }
}

/// Home directory: `$HOME` from the interpreter's variables, then the platform default.
fn home_dir(env: &Environment) -> Result<PathBuf> {
    env.get_var("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cd: home directory is unknown"))
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the home directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; a leading `~` stands for the home directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match self.target.as_deref() {
            None | Some("") => home_dir(env)?,
            Some(t) => match t.strip_prefix('~') {
                Some(rest) => home_dir(env)?.join(rest.trim_start_matches('/')),
                None => PathBuf::from(t),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical =
            fs::canonicalize(&new_dir).with_context(|| format!("cd: {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Stop every started process and leave the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the exit status is the one of the last stopped process.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let status = env.jobs.terminate_all();
        log::debug!("exit requested with status {}", status);
        env.request_exit(status);
        Ok(status)
    }
}

#[derive(FromArgs)]
/// Set a variable for every program started afterwards.
/// The arguments are joined without separators into `NAME=value`.
pub struct Export {
    #[argh(positional, greedy)]
    /// the assignment, possibly split over several words.
    pub parts: Vec<String>,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let joined = self.parts.concat();
        let (key, value) = joined
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("export: `{}`: expected NAME=value", joined))?;
        env.set_var(key.trim(), value);
        writeln!(stdout, "{}", joined)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Run a previous line again.
pub struct History {
    #[argh(positional)]
    /// which line to run; 1 is the most recent one.
    pub index: String,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let entry = self
            .index
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| env.history.get(n))
            .cloned()
            .ok_or_else(|| anyhow!("history: {}: no such entry", self.index))?;
        log::debug!("re-running history entry {}: {:?}", self.index, entry);
        // Output of the re-run line goes through the process descriptors.
        stdout.flush()?;
        Ok(executor::execute(&entry, env))
    }
}

const USAGE: &str = "\
Builtins:
  cd [dir]           change directory; no argument or `~` means the home directory
  exit               stop all started processes and leave the shell
  export NAME=value  set a variable for programs started afterwards
  history n          run the n-th most recent line again (1 is the latest)
  help               show this message
  info               show version information

Syntax:
  NAME=value prog args <in >out >>out   one command
  cmd1 | cmd2 | cmd3                      connect commands with pipes
  pipeline &                              run without waiting
  pipeline && pipeline                    run one after another
";

#[derive(FromArgs)]
/// Print a short usage summary.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        write!(stdout, "{}", USAGE)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the shell's name and version.
pub struct Info {}

impl BuiltinCommand for Info {
    fn name() -> &'static str {
        "info"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(
            stdout,
            "{} {}",
            env!("CARGO_PKG_NAME").green().bold(),
            env!("CARGO_PKG_VERSION")
        )?;
        writeln!(stdout, "{}", env!("CARGO_PKG_DESCRIPTION"))?;
        Ok(0)
    }
}
