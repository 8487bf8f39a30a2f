//! In-memory representation of a parsed input line.
//!
//! A line is a [`Sequence`] of [`Pipeline`]s joined by `&&`; a pipeline is a chain of
//! [`Command`]s joined by `|`, optionally sent to the background with a trailing `&`.

use std::collections::HashMap;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Target of an output redirection (`>path` or `>>path`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRedirect {
    pub path: String,
    /// `true` for `>>`, `false` for `>` (truncate).
    pub append: bool,
}

/// A single executable invocation.
///
/// The program name may be empty when the command text was blank or could not be
/// understood; such a command is a no-op at execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// `NAME=value` assignments preceding the program, visible only to this command.
    pub local_vars: HashMap<String, String>,
    pub program: String,
    /// Arguments with quote delimiters stripped. Does not include the program name.
    pub args: Vec<String>,
    /// Last `<path` seen on the command, if any.
    pub input_path: Option<String>,
    /// Last `>path` / `>>path` seen on the command, if any.
    pub output: Option<OutputRedirect>,
}

impl Command {
    /// Whether there is nothing to run.
    pub fn is_noop(&self) -> bool {
        self.program.is_empty()
    }
}

/// Commands connected by pipes.
///
/// Only the input redirection of the first command and the output redirection of the
/// last command are honored; everything in between is wired to pipe ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub background: bool,
}

impl Pipeline {
    pub fn first(&self) -> Option<&Command> {
        self.commands.first()
    }

    pub fn last(&self) -> Option<&Command> {
        self.commands.last()
    }
}

/// One full input line: pipelines executed strictly left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub pipelines: Vec<Pipeline>,
}

impl Sequence {
    /// Iterate over every command of every pipeline.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.pipelines.iter().flat_map(|p| p.commands.iter())
    }

    /// Whether any command in the sequence runs `name` (compared case-insensitively).
    pub fn invokes(&self, name: &str) -> bool {
        self.commands()
            .any(|c| c.program.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(program: &str) -> Command {
        Command {
            program: program.to_string(),
            ..Command::default()
        }
    }

    #[test]
    fn test_empty_program_is_noop() {
        assert!(Command::default().is_noop());
        assert!(!cmd("ls").is_noop());
    }

    #[test]
    fn test_sequence_invokes_is_case_insensitive() {
        let seq = Sequence {
            pipelines: vec![
                Pipeline {
                    commands: vec![cmd("echo")],
                    background: false,
                },
                Pipeline {
                    commands: vec![cmd("cat"), cmd("HISTORY")],
                    background: true,
                },
            ],
        };

        assert!(seq.invokes("history"));
        assert!(!seq.invokes("cd"));
        assert_eq!(seq.commands().count(), 3);
    }
}
