//! Turns a raw input line into a [`Sequence`].
//!
//! Parsing is layered: the line is split on `&&` into pipelines, each pipeline loses a
//! trailing `&` and is split on `|` into commands, and each command is tokenized and
//! sorted into assignments, program, arguments and redirections.
//!
//! The parser is permissive. It never reports an error; text it cannot make sense of
//! degrades to a command with an empty program, which executes as a no-op.

use crate::command::{Command, OutputRedirect, Pipeline, Sequence};
use crate::lexer::{self, Token, Word};
use regex::Regex;
use std::sync::LazyLock;

static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_-]*)=").expect("assignment pattern is valid"));

/// Where we are inside a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Assignments,
    Arguments,
}

/// Kind of redirection waiting for its target word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRedirect {
    Input,
    Output,
    Append,
}

struct CommandBuilder {
    command: Command,
    stage: Stage,
    pending: Option<PendingRedirect>,
}

impl CommandBuilder {
    fn new() -> Self {
        CommandBuilder {
            command: Command::default(),
            stage: Stage::Assignments,
            pending: None,
        }
    }

    fn feed(&mut self, token: Token) {
        match token {
            Token::RedirectIn => self.start_redirect(PendingRedirect::Input),
            Token::RedirectOut => self.start_redirect(PendingRedirect::Output),
            Token::RedirectAppend => self.start_redirect(PendingRedirect::Append),
            Token::Word(word) => match self.pending.take() {
                Some(kind) => self.finish_redirect(kind, word.text.trim()),
                None => self.push_word(word),
            },
        }
    }

    /// An operator directly following another operator leaves the first one without
    /// a target, which makes it absent.
    fn start_redirect(&mut self, kind: PendingRedirect) {
        self.pending = Some(kind);
    }

    fn finish_redirect(&mut self, kind: PendingRedirect, target: &str) {
        if target.is_empty() {
            return;
        }
        let target = target.to_string();
        match kind {
            PendingRedirect::Input => self.command.input_path = Some(target),
            PendingRedirect::Output | PendingRedirect::Append => {
                self.command.output = Some(OutputRedirect {
                    path: target,
                    append: kind == PendingRedirect::Append,
                })
            }
        }
    }

    fn push_word(&mut self, word: Word) {
        if self.stage == Stage::Assignments {
            if let Some((key, value)) = split_assignment(&word) {
                let key = key.trim();
                if !key.is_empty() {
                    self.command
                        .local_vars
                        .insert(key.to_string(), value.to_string());
                }
                return;
            }
            self.command.program = word.text.trim().to_string();
            self.stage = Stage::Arguments;
            return;
        }
        self.command.args.push(word.text);
    }

    fn build(self) -> Command {
        self.command
    }
}

/// Split `NAME=value` into its parts if the `=` was written outside of quotes.
fn split_assignment(word: &Word) -> Option<(&str, &str)> {
    let captures = ASSIGNMENT.captures(&word.text)?;
    let key = captures.get(1)?;
    // `key.end()` is the position of the `=` sign.
    if key.end() >= word.unquoted_prefix {
        return None;
    }
    Some((key.as_str(), &word.text[key.end() + 1..]))
}

/// Parse the text of a single command (no `|`, `&&` or trailing `&`).
pub fn parse_command(text: &str) -> Command {
    let mut builder = CommandBuilder::new();
    for token in lexer::split_into_tokens(text) {
        builder.feed(token);
    }
    builder.build()
}

/// Parse the text of a pipeline (no `&&`).
pub fn parse_pipeline(text: &str) -> Pipeline {
    let (body, background) = lexer::strip_background(text);
    let commands = lexer::split_unquoted(&body, "|")
        .iter()
        .map(|piece| parse_command(piece))
        .collect();
    Pipeline {
        commands,
        background,
    }
}

/// Parse a full input line.
///
/// Total: every input, including the empty string, produces a sequence with at least
/// one pipeline holding at least one command.
pub fn parse(line: &str) -> Sequence {
    let pipelines = lexer::split_unquoted(line, "&&")
        .iter()
        .map(|piece| parse_pipeline(piece))
        .collect();
    Sequence { pipelines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn only_command(seq: &Sequence) -> &Command {
        assert_eq!(seq.pipelines.len(), 1);
        assert_eq!(seq.pipelines[0].commands.len(), 1);
        &seq.pipelines[0].commands[0]
    }

    #[test]
    fn test_quoted_argument_is_one_token() {
        let seq = parse("echo \"a b\"");
        let cmd = only_command(&seq);
        assert_eq!(cmd.program, "echo");
        assert_eq!(cmd.args, vec!["a b"]);
    }

    #[test]
    fn test_assignments_then_program() {
        let seq = parse("X=1 Y=2 prog a b");
        let cmd = only_command(&seq);

        let expected: HashMap<String, String> = [("X", "1"), ("Y", "2")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(cmd.local_vars, expected);
        assert_eq!(cmd.program, "prog");
        assert_eq!(cmd.args, vec!["a", "b"]);
    }

    #[test]
    fn test_quoted_assignment_values() {
        let seq = parse("A=\"x y\" B='z' C= run");
        let cmd = only_command(&seq);
        assert_eq!(cmd.local_vars.get("A").map(String::as_str), Some("x y"));
        assert_eq!(cmd.local_vars.get("B").map(String::as_str), Some("z"));
        assert_eq!(cmd.local_vars.get("C").map(String::as_str), Some(""));
        assert_eq!(cmd.program, "run");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_assignment_after_program_is_argument() {
        let seq = parse("env X=1");
        let cmd = only_command(&seq);
        assert!(cmd.local_vars.is_empty());
        assert_eq!(cmd.program, "env");
        assert_eq!(cmd.args, vec!["X=1"]);
    }

    #[test]
    fn test_quoted_equals_is_not_assignment() {
        let seq = parse("\"X=1\" arg");
        let cmd = only_command(&seq);
        assert!(cmd.local_vars.is_empty());
        assert_eq!(cmd.program, "X=1");
        assert_eq!(cmd.args, vec!["arg"]);
    }

    #[test]
    fn test_empty_assignment_key_is_dropped() {
        let seq = parse("=oops ls");
        let cmd = only_command(&seq);
        assert!(cmd.local_vars.is_empty());
        assert_eq!(cmd.program, "ls");
    }

    #[test]
    fn test_last_redirect_of_a_kind_wins() {
        let seq = parse("prog > out.txt >> out2.txt");
        let cmd = only_command(&seq);
        assert_eq!(
            cmd.output,
            Some(OutputRedirect {
                path: "out2.txt".to_string(),
                append: true
            })
        );
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_input_and_output_redirects() {
        let seq = parse("sort -r <in.txt > out.txt");
        let cmd = only_command(&seq);
        assert_eq!(cmd.program, "sort");
        assert_eq!(cmd.args, vec!["-r"]);
        assert_eq!(cmd.input_path.as_deref(), Some("in.txt"));
        assert_eq!(
            cmd.output,
            Some(OutputRedirect {
                path: "out.txt".to_string(),
                append: false
            })
        );
    }

    #[test]
    fn test_empty_redirect_target_is_absent() {
        let seq = parse("ls > a.txt >");
        let cmd = only_command(&seq);
        assert_eq!(cmd.output.as_ref().map(|o| o.path.as_str()), Some("a.txt"));

        let seq = parse("cat < \"  \"");
        let cmd = only_command(&seq);
        assert_eq!(cmd.input_path, None);
    }

    #[test]
    fn test_pipeline_and_background() {
        let seq = parse("cat file | grep x | wc -l &");
        assert_eq!(seq.pipelines.len(), 1);
        let pipeline = &seq.pipelines[0];
        assert!(pipeline.background);
        let programs: Vec<&str> = pipeline
            .commands
            .iter()
            .map(|c| c.program.as_str())
            .collect();
        assert_eq!(programs, vec!["cat", "grep", "wc"]);
        assert_eq!(pipeline.commands[2].args, vec!["-l"]);
    }

    #[test]
    fn test_and_separator_splits_pipelines() {
        let seq = parse("cd /tmp && A=1 ./a.out < b.txt | V='abc' run cde > out.txt &");
        assert_eq!(seq.pipelines.len(), 2);
        assert!(!seq.pipelines[0].background);
        assert!(seq.pipelines[1].background);

        let second = &seq.pipelines[1];
        assert_eq!(second.commands.len(), 2);
        assert_eq!(second.commands[0].program, "./a.out");
        assert_eq!(second.commands[0].input_path.as_deref(), Some("b.txt"));
        assert_eq!(second.commands[1].program, "run");
        assert_eq!(
            second.commands[1].local_vars.get("V").map(String::as_str),
            Some("abc")
        );
        assert_eq!(
            second.commands[1].output.as_ref().map(|o| o.path.as_str()),
            Some("out.txt")
        );
    }

    #[test]
    fn test_empty_line_is_single_noop_command() {
        let seq = parse("");
        let cmd = only_command(&seq);
        assert!(cmd.is_noop());
        assert!(!seq.pipelines[0].background);

        let seq = parse("   \t ");
        assert!(only_command(&seq).is_noop());
    }

    #[test]
    fn test_separators_inside_quotes_are_literal() {
        let seq = parse("echo 'a | b && c &'");
        let cmd = only_command(&seq);
        assert_eq!(cmd.args, vec!["a | b && c &"]);
        assert!(!seq.pipelines[0].background);
    }

    #[test]
    fn test_malformed_input_degrades() {
        let seq = parse("| && >");
        assert_eq!(seq.pipelines.len(), 2);
        assert!(seq.commands().all(Command::is_noop));
    }
}
