//! File and directory helpers modeled on common shell commands.
//!
//! Every path argument is passed through [`expand_path`] first, so `~` works
//! the way it does on a command line. Operations on a missing source are
//! no-ops rather than errors, which keeps ported install scripts idempotent.

mod pattern;

pub use pattern::{pattern_find, pattern_replace, pattern_search, reconfig};

use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{self, Group, User};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, ShellError};

/// Expand a leading `~` or `~user` to a home directory.
///
/// Paths that do not start with `~`, or whose user cannot be resolved, are
/// returned unchanged.
pub fn expand_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Some(rest) = path.to_str().and_then(|s| s.strip_prefix('~')) else {
        return path.to_path_buf();
    };

    let (user, tail) = match rest.split_once('/') {
        Some((user, tail)) => (user, Some(tail)),
        None => (rest, None),
    };
    let home = if user.is_empty() {
        dirs::home_dir()
    } else {
        User::from_name(user).ok().flatten().map(|u| u.dir)
    };

    match (home, tail) {
        (Some(home), Some(tail)) if !tail.is_empty() => home.join(tail),
        (Some(home), _) => home,
        (None, _) => path.to_path_buf(),
    }
}

/// The current user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

pub fn exists(path: impl AsRef<Path>) -> bool {
    expand_path(path).exists()
}

pub fn is_dir(path: impl AsRef<Path>) -> bool {
    expand_path(path).is_dir()
}

/// Move a file or directory. A missing source is ignored.
///
/// Moving onto an existing directory places the source inside it. Moves
/// across filesystems fall back to copy and remove.
pub fn move_path(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
    let source = expand_path(source);
    let destination = into_dir(&source, expand_path(destination));
    if !source.exists() {
        return Ok(());
    }

    match fs::rename(&source, &destination) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            debug!("{} is on another device, copying", destination.display());
            copy_entry(&source, &destination)?;
            remove(&source)
        }
        Err(e) => Err(ShellError::io(&source, e)),
    }
}

/// Copy a file or directory tree. A missing source is ignored.
///
/// Directories are copied recursively and the destination must not exist.
/// A file copied onto an existing directory lands inside it.
pub fn copy_path(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
    let source = expand_path(source);
    if !source.exists() {
        return Ok(());
    }
    let destination = if source.is_dir() {
        expand_path(destination)
    } else {
        into_dir(&source, expand_path(destination))
    };
    copy_entry(&source, &destination)
}

fn into_dir(source: &Path, destination: PathBuf) -> PathBuf {
    match source.file_name() {
        Some(name) if destination.is_dir() => destination.join(name),
        _ => destination,
    }
}

fn copy_entry(source: &Path, destination: &Path) -> Result<()> {
    if source.is_dir() {
        copy_tree(source, destination)
    } else {
        fs::copy(source, destination)
            .map(|_| ())
            .map_err(|e| ShellError::io(destination, e))
    }
}

fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    if destination.exists() {
        return Err(ShellError::AlreadyExists(destination.to_path_buf()));
    }
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| walk_error(source, e))?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        let file_type = entry.file_type();

        let copied = if file_type.is_dir() {
            fs::create_dir_all(&target)
        } else if file_type.is_symlink() {
            fs::read_link(entry.path()).and_then(|link| std::os::unix::fs::symlink(link, &target))
        } else {
            fs::copy(entry.path(), &target).map(|_| ())
        };
        copied.map_err(|e| ShellError::io(&target, e))?;
    }
    Ok(())
}

fn walk_error(root: &Path, e: walkdir::Error) -> ShellError {
    let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
    ShellError::io(path, io::Error::from(e))
}

/// Set permission bits. Modes above `0o777` are rejected; a missing path is
/// ignored.
pub fn chmod(path: impl AsRef<Path>, mode: u32) -> Result<()> {
    if mode > 0o777 {
        return Err(ShellError::InvalidMode(mode));
    }
    let path = expand_path(path);
    if path.exists() {
        fs::set_permissions(&path, Permissions::from_mode(mode))
            .map_err(|e| ShellError::io(&path, e))?;
    }
    Ok(())
}

/// Change owner and group. The group defaults to the user's name.
///
/// With `recursive`, every entry below a directory is changed as well as the
/// directory itself.
pub fn chown(
    path: impl AsRef<Path>,
    user: &str,
    group: Option<&str>,
    recursive: bool,
) -> Result<()> {
    let uid = User::from_name(user)?
        .ok_or_else(|| ShellError::UnknownUser(user.to_string()))?
        .uid;
    let group = group.unwrap_or(user);
    let gid = Group::from_name(group)?
        .ok_or_else(|| ShellError::UnknownGroup(group.to_string()))?
        .gid;

    let path = expand_path(path);
    let change = |p: &Path| {
        unistd::chown(p, Some(uid), Some(gid)).map_err(|e| ShellError::io(p, io::Error::from(e)))
    };

    if recursive && path.is_dir() {
        for entry in WalkDir::new(&path) {
            let entry = entry.map_err(|e| walk_error(&path, e))?;
            change(entry.path())?;
        }
        Ok(())
    } else {
        change(&path)
    }
}

/// Remove a file or a whole directory tree, if it exists.
pub fn remove(path: impl AsRef<Path>) -> Result<()> {
    let path = expand_path(path);
    let Ok(meta) = fs::symlink_metadata(&path) else {
        return Ok(());
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(&path)
    } else {
        fs::remove_file(&path)
    };
    removed.map_err(|e| ShellError::io(&path, e))
}

/// Write `content` to a file.
///
/// Append mode creates the file if needed and puts the content on a new line;
/// otherwise the file is replaced.
pub fn write_text_file(path: impl AsRef<Path>, content: &str, append: bool) -> Result<()> {
    let path = expand_path(path);
    let written = if append {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .and_then(|mut file| write!(file, "\n{}", content))
    } else {
        fs::write(&path, content)
    };
    written.map_err(|e| ShellError::io(&path, e))
}
