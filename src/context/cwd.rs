//! Working directory tracking with a pushd/popd stack.
//!
//! Directory changes apply to the whole process, exactly like `cd` in a
//! shell script.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ShellError};
use crate::fsops::expand_path;

#[derive(Clone, Default, Debug)]
pub struct DirStack {
    stack: Vec<PathBuf>,
}

impl DirStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current working directory from the process.
    pub fn getcwd() -> Result<PathBuf> {
        env::current_dir().map_err(|e| ShellError::io(".", e))
    }

    /// Change the process working directory. `~` is expanded.
    pub fn chdir(directory: impl AsRef<Path>) -> Result<()> {
        let directory = expand_path(directory);
        if !directory.exists() {
            return Err(ShellError::NotFound(directory));
        }
        if !directory.is_dir() {
            return Err(ShellError::NotADirectory(directory));
        }
        env::set_current_dir(&directory).map_err(|e| ShellError::io(&directory, e))?;
        debug!("changed directory to {}", directory.display());
        Ok(())
    }

    /// Remember the current directory, then change to `directory`.
    ///
    /// The stack is left untouched when the change fails.
    pub fn pushd(&mut self, directory: impl AsRef<Path>) -> Result<()> {
        let current = Self::getcwd()?;
        Self::chdir(directory)?;
        self.stack.push(current);
        Ok(())
    }

    /// Return to the most recently pushed directory.
    pub fn popd(&mut self) -> Result<PathBuf> {
        let directory = self.stack.pop().ok_or(ShellError::DirStackEmpty)?;
        Self::chdir(&directory)?;
        Ok(directory)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
