pub mod commands;
mod context;
mod error;
mod help;
mod io;
pub mod output;
mod registry;
mod shell;

pub use context::{CliMode, ShellContext};
pub use error::{CliError, CommandError, CommandResult};
pub use registry::{CommandEntry, CommandRegistry};
pub use shell::run_cli;

#[cfg(test)]
mod tests;
