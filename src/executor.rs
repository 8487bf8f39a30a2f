//! Execution engine: runs parsed sequences by rewiring the interpreter's own
//! descriptors 0 and 1 stage by stage.
//!
//! For every pipeline the original stdin and stdout are saved aside first. Each stage
//! then gets the previous stage's pipe (or the pipeline's input) as fd 0 and a new
//! pipe (or the pipeline's output) as fd 1, and is either run in-process as a builtin
//! or spawned, inheriting both. Once every stage is dispatched the saved descriptors
//! are put back, and only then does a foreground pipeline wait for its children.

use crate::builtin::Builtin;
use crate::command::{Command, ExitCode, Pipeline, Sequence};
use crate::env::Environment;
use crate::external;
use crate::io_adapters::{self, SavedStdio};
use crate::job::JobRegistry;
use nix::unistd::Pid;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::process::Child;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot create pipe: {0}")]
    Pipe(#[source] nix::Error),
    #[error("cannot duplicate standard streams: {0}")]
    Save(#[source] io::Error),
    #[error("cannot redirect standard stream: {0}")]
    Rewire(#[source] nix::Error),
}

/// What the last dispatched stage of a pipeline amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Noop,
    Builtin(ExitCode),
    Spawned,
    SpawnFailed(ExitCode),
}

/// Run every pipeline of `sequence` in order and return the status of the last one.
///
/// `&&` does not short-circuit: a failing pipeline does not stop the next one. Only a
/// pending exit request (from `exit` or a fatal error) skips the rest of the line.
pub fn execute(sequence: &Sequence, env: &mut Environment) -> ExitCode {
    let mut status = 0;
    for pipeline in &sequence.pipelines {
        if env.exit_requested().is_some() {
            log::debug!("exit requested; skipping the rest of the line");
            break;
        }
        status = match execute_pipeline(pipeline, env) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("pipesh: {}", e);
                if matches!(e, ExecError::Pipe(_)) {
                    env.request_exit(1);
                }
                1
            }
        };
    }
    status
}

/// Run one pipeline.
///
/// The interpreter's stdin and stdout are the same before and after the call, whatever
/// the outcome. Background pipelines return 0 right after their stages are started.
pub fn execute_pipeline(pipeline: &Pipeline, env: &mut Environment) -> Result<ExitCode, ExecError> {
    let saved = SavedStdio::capture().map_err(ExecError::Save)?;
    let mut children = Vec::new();
    let dispatched = dispatch_stages(pipeline, &saved, env, &mut children);
    // Restore before waiting: the parent must not keep any pipe end open on 0 or 1.
    drop(saved);

    if pipeline.background {
        if let Some(child) = children.last() {
            eprintln!("[{}] sent to background", child.id());
        }
        log::debug!("detached {} process(es)", children.len());
        dispatched?;
        return Ok(0);
    }

    let last_code = wait_all(children, &env.jobs);
    Ok(match dispatched? {
        StageOutcome::Noop => 0,
        StageOutcome::Builtin(code) | StageOutcome::SpawnFailed(code) => code,
        StageOutcome::Spawned => last_code.unwrap_or(0),
    })
}

fn dispatch_stages(
    pipeline: &Pipeline,
    saved: &SavedStdio,
    env: &mut Environment,
    children: &mut Vec<Child>,
) -> Result<StageOutcome, ExecError> {
    let first_input = match pipeline.first().and_then(|c| c.input_path.as_deref()) {
        Some(path) => open_redirect(path, io_adapters::open_input(path))?,
        None => saved.stdin_copy().map_err(ExecError::Save)?,
    };
    let mut next_input: Option<OwnedFd> = Some(first_input);
    let mut outcome = StageOutcome::Noop;
    let last_index = pipeline.commands.len().saturating_sub(1);

    for (index, command) in pipeline.commands.iter().enumerate() {
        if let Some(input) = next_input.take() {
            io_adapters::install_stdin(input).map_err(ExecError::Rewire)?;
        }

        let output = if index < last_index {
            let (read_end, write_end) = io_adapters::pipe().map_err(ExecError::Pipe)?;
            next_input = Some(read_end);
            write_end
        } else {
            match &command.output {
                Some(redirect) => open_redirect(
                    &redirect.path,
                    io_adapters::open_output(&redirect.path, redirect.append),
                )?,
                None => saved.stdout_copy().map_err(ExecError::Save)?,
            }
        };
        io_adapters::install_stdout(output).map_err(ExecError::Rewire)?;

        log::trace!("stage {} of {}: {:?}", index + 1, last_index + 1, command);
        outcome = dispatch(command, pipeline.background, env, children);
    }
    Ok(outcome)
}

fn open_redirect(path: &str, opened: io::Result<OwnedFd>) -> Result<OwnedFd, ExecError> {
    opened.map_err(|source| ExecError::Redirect {
        path: path.to_string(),
        source,
    })
}

fn dispatch(
    command: &Command,
    background: bool,
    env: &mut Environment,
    children: &mut Vec<Child>,
) -> StageOutcome {
    if command.is_noop() {
        return StageOutcome::Noop;
    }

    if let Some(builtin) = Builtin::lookup(&command.program) {
        log::debug!("running builtin {}", builtin.name());
        let mut stdout = io::stdout();
        let code = builtin.run(&command.args, &mut stdout, env);
        if let Err(e) = stdout.flush() {
            log::debug!("flushing builtin output failed: {}", e);
        }
        return StageOutcome::Builtin(code);
    }

    match external::spawn(command, env, background) {
        Ok(child) => {
            let pid = Pid::from_raw(child.id() as i32);
            env.jobs.register(pid);
            log::debug!("spawned {} as {}", command.program, pid);
            children.push(child);
            StageOutcome::Spawned
        }
        Err(e) => {
            eprintln!("pipesh: {}: {}", command.program, e);
            let code = if e.kind() == io::ErrorKind::NotFound {
                127
            } else {
                126
            };
            StageOutcome::SpawnFailed(code)
        }
    }
}

/// Status reported for a foreground process whose exit status could not be collected.
const STATUS_LOST: ExitCode = 1;

/// Wait for every child in spawn order. Returns the status of the last one.
fn wait_all(children: Vec<Child>, jobs: &JobRegistry) -> Option<ExitCode> {
    let mut last = None;
    for mut child in children {
        let pid = Pid::from_raw(child.id() as i32);
        let code = match child.wait() {
            Ok(status) => external::exit_code(status),
            Err(e) => {
                // Reaped elsewhere (the interrupt handler); its real status is gone.
                log::warn!("status of process {} is lost: {}", pid, e);
                STATUS_LOST
            }
        };
        jobs.forget(pid);
        log::debug!("process {} finished with status {}", pid, code);
        last = Some(code);
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::collections::HashMap;
    use std::path::PathBuf;

    // Nothing here redirects output: descriptors 0 and 1 are only swapped for copies
    // of themselves, so the test harness's own streams are unaffected. The working
    // directory is fixed because builtin tests move the process around.
    fn test_env() -> Environment {
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        Environment::with_vars(vars, PathBuf::from("/"))
    }

    #[test]
    fn test_empty_line_is_noop() {
        let mut env = test_env();
        assert_eq!(execute(&parse(""), &mut env), 0);
        assert!(env.jobs.is_empty());
    }

    #[test]
    fn test_status_of_last_pipeline_wins() {
        let mut env = test_env();
        assert_eq!(execute(&parse("false && true"), &mut env), 0);
        assert_eq!(execute(&parse("true && false"), &mut env), 1);
        // Waited processes are pruned from the registry.
        assert!(env.jobs.is_empty());
    }

    #[test]
    fn test_missing_program_is_127() {
        let mut env = test_env();
        assert_eq!(execute(&parse("no-such-program-anywhere"), &mut env), 127);
    }

    #[test]
    fn test_missing_input_file_fails_only_that_pipeline() {
        let mut env = test_env();
        let seq = parse("true < /no/such/input/file && export AFTER=1");
        let status = execute(&seq, &mut env);
        assert_eq!(status, 0);
        assert_eq!(env.get_var("AFTER"), Some("1".to_string()));
        assert_eq!(env.exit_requested(), None);

        let err = execute_pipeline(&parse("true < /no/such/input/file").pipelines[0], &mut env)
            .unwrap_err();
        assert!(matches!(err, ExecError::Redirect { .. }));
    }

    #[test]
    fn test_exit_skips_remaining_pipelines() {
        let mut env = test_env();
        execute(&parse("exit && export SKIPPED=1"), &mut env);
        assert_eq!(env.exit_requested(), Some(0));
        assert_eq!(env.get_var("SKIPPED"), None);
    }

    #[test]
    fn test_wait_all_tolerates_child_reaped_elsewhere() {
        let reaped = std::process::Command::new("true").spawn().unwrap();
        let running = std::process::Command::new("sh")
            .args(["-c", "exit 4"])
            .spawn()
            .unwrap();
        let reaped_pid = Pid::from_raw(reaped.id() as i32);
        nix::sys::wait::waitpid(reaped_pid, None).unwrap();

        let jobs = JobRegistry::new();
        jobs.register(reaped_pid);
        jobs.register(Pid::from_raw(running.id() as i32));

        assert_eq!(wait_all(vec![running, reaped], &jobs), Some(STATUS_LOST));
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_wait_all_reports_last_child() {
        let first = std::process::Command::new("true").spawn().unwrap();
        let last = std::process::Command::new("sh")
            .args(["-c", "exit 4"])
            .spawn()
            .unwrap();
        assert_eq!(wait_all(vec![first, last], &JobRegistry::new()), Some(4));
    }

    #[test]
    fn test_background_returns_without_waiting() {
        let mut env = test_env();
        let started = std::time::Instant::now();
        let status = execute(&parse("sleep 5 &"), &mut env);

        assert_eq!(status, 0);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(env.jobs.len(), 1);

        env.jobs.terminate_all();
        assert!(env.jobs.is_empty());
    }
}
