//! A small line-oriented shell.
//!
//! Input lines are parsed into a [`command::Sequence`] of pipelines joined by `&&`;
//! each pipeline is a chain of commands joined by `|`, with optional `<`, `>` and
//! `>>` redirections and a trailing `&` for background execution. A handful of
//! builtins (`cd`, `exit`, `export`, `history`, `help`, `info`) run inside the
//! interpreter; everything else is started as a child process.
//!
//! The main entry point is [`Interpreter`]. [`parse`] is exposed on its own for
//! callers that only need the syntax tree, and [`JobRegistry`] lets an interrupt
//! handler stop every started process from another thread.

mod builtin;
pub mod command;
pub mod env;
mod executor;
mod external;
mod history;
mod interpreter;
mod io_adapters;
mod job;
mod lexer;
mod parser;

pub use history::History;
pub use interpreter::Interpreter;
pub use job::JobRegistry;
pub use parser::parse;
