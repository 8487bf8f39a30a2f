use crate::builtin::Builtin;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::executor;
use crate::job::JobRegistry;
use crate::parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result};

/// A line-oriented shell interpreter.
///
/// The interpreter owns the [`Environment`] (variables, working directory, started
/// processes and line history) and feeds every input line through the parser and the
/// execution engine.
///
/// Example
/// ```no_run
/// use pipesh::Interpreter;
/// let mut sh = Interpreter::new();
/// let code = sh.run_line("echo hello | tr a-z A-Z");
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
}

impl Interpreter {
    /// Create an interpreter that inherits the current process environment.
    pub fn new() -> Self {
        Self::with_environment(Environment::new())
    }

    pub fn with_environment(env: Environment) -> Self {
        Self { env }
    }

    /// A handle on the registry of started processes, for use from another thread.
    pub fn jobs(&self) -> JobRegistry {
        self.env.jobs.clone()
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// The status requested by `exit`, once the interpreter should stop.
    pub fn exit_requested(&self) -> Option<ExitCode> {
        self.env.exit_requested()
    }

    /// Parse and execute one input line.
    ///
    /// Background processes that have finished since the previous line are reported
    /// first. The line is recorded in the history unless it runs `history` itself.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        for (pid, code) in self.env.jobs.reap_finished() {
            eprintln!("[{}] done {}", pid, code);
        }

        let sequence = parser::parse(line);
        log::debug!("parsed {:?} into {:?}", line, sequence);

        if !sequence.invokes(Builtin::History.name()) {
            self.env.history.push(sequence.clone());
        }
        executor::execute(&sequence, &mut self.env)
    }

    /// Run `lines` one after another, stopping early when `exit` is executed.
    ///
    /// Returns the status requested by `exit`, or else the status of the last line.
    pub fn run_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> ExitCode {
        let mut status = 0;
        for line in lines {
            status = self.run_line(line.as_ref());
            if self.env.exit_requested().is_some() {
                break;
            }
        }
        self.env.exit_requested().unwrap_or(status)
    }

    /// Read-Eval-Print Loop on the terminal.
    ///
    /// Ends when `exit` is executed or the input is closed; returns the exit status.
    pub fn repl(&mut self) -> Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        let mut status = 0;

        while self.env.exit_requested().is_none() {
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    rl.add_history_entry(line.as_str())?;
                    status = self.run_line(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    self.env.jobs.terminate_all();
                    eprintln!("Stopped all processes");
                }
                Err(ReadlineError::Eof) => {
                    let code = self.env.jobs.terminate_all();
                    self.env.request_exit(code);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(self.env.exit_requested().unwrap_or(status))
    }

    fn prompt(&self) -> String {
        let user = self.env.get_var("USER").unwrap_or_default();
        let suffix = self.env.get_var("PS1").unwrap_or_else(|| "$ ".to_string());
        let dir = self.env.current_dir.display().to_string();
        format!("{}:{} {}", user.green().bold(), dir.red().bold(), suffix)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
