use std::io;

use thiserror::Error;

use copro_config::ConfigError;
use copro_engine::CoreError;

use crate::errors::CoproError;

/// Fatal errors that stop the shell.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Copro(#[from] CoproError),
    #[error("input error: {0}")]
    Input(String),
    #[error("{0}")]
    Command(String),
}

/// Errors raised by a single command; the shell reports them and keeps running.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("No book loaded. Use `book new` or `book load` first.")]
    BookNotLoaded,
    #[error("No residence selected. Use `residence use <name>` first.")]
    ResidenceNotSelected,
    #[error("{0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Dialoguer(#[from] dialoguer::Error),
    #[error("exit requested")]
    ExitRequested,
}

pub type CommandResult = Result<(), CommandError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopControl {
    Continue,
    Exit,
}

impl From<CommandError> for CliError {
    fn from(err: CommandError) -> Self {
        CliError::Command(err.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        CliError::Copro(CoproError::Io(err))
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError::Copro(CoproError::Core(err))
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Copro(CoproError::Config(err))
    }
}

impl From<rustyline::error::ReadlineError> for CliError {
    fn from(err: rustyline::error::ReadlineError) -> Self {
        CliError::Input(err.to_string())
    }
}
