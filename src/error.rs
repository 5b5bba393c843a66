//! Error types shared by every helper in the crate.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShellError>;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running `{command}`: {source}")]
    Process {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("running as user '{user}' requires root privileges")]
    PrivilegeRequired { user: String },

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("directory '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("the given location '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("'{}' already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("directory stack empty")]
    DirStackEmpty,

    #[error("invalid mode value {0:#o}")]
    InvalidMode(u32),

    #[error("unknown color '{0}'")]
    UnknownColor(String),

    #[error("no input available for prompt")]
    NoInput,

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ShellError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ShellError::Io {
            path: path.into(),
            source,
        }
    }
}
