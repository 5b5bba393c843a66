//! Regex search and replace inside files, in the spirit of `grep` and `sed -i`.
//!
//! By default patterns are applied to one line at a time, with the line
//! terminator removed, so `^` and `$` anchor to the line. Multi-line mode
//! treats the whole file as one string and lets `.` match newlines.

use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::{expand_path, write_text_file};
use crate::error::{Result, ShellError};

fn build(pattern: &str, multi_line: bool) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern)
        .dot_matches_new_line(multi_line)
        .build()?)
}

/// Contents of a regular file, or `None` when the path is missing or a
/// directory.
fn read_file(path: &Path) -> Result<Option<String>> {
    if !path.exists() || path.is_dir() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| ShellError::io(path, e))
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Return the first matching text in a file.
pub fn pattern_find(
    location: impl AsRef<Path>,
    pattern: &str,
    multi_line: bool,
) -> Result<Option<String>> {
    let regex = build(pattern, multi_line)?;
    let Some(text) = read_file(&expand_path(location))? else {
        return Ok(None);
    };

    if multi_line {
        return Ok(regex.find(&text).map(|m| m.as_str().to_string()));
    }
    Ok(text
        .split_inclusive('\n')
        .find_map(|line| regex.find(split_terminator(line).0))
        .map(|m| m.as_str().to_string()))
}

/// Whether a file contains a match for `pattern`.
pub fn pattern_search(location: impl AsRef<Path>, pattern: &str, multi_line: bool) -> Result<bool> {
    pattern_find(location, pattern, multi_line).map(|m| m.is_some())
}

/// Replace every match of `pattern` in a file.
///
/// `replacement` may refer to capture groups as `$1` or `${name}`. Returns
/// whether anything matched; files without a match are not rewritten.
pub fn pattern_replace(
    location: impl AsRef<Path>,
    pattern: &str,
    replacement: &str,
    multi_line: bool,
) -> Result<bool> {
    let location = expand_path(location);
    let regex = build(pattern, multi_line)?;
    let Some(text) = read_file(&location)? else {
        return Ok(false);
    };

    let updated = if multi_line {
        if !regex.is_match(&text) {
            return Ok(false);
        }
        regex.replace_all(&text, replacement).into_owned()
    } else {
        let mut found = false;
        let mut updated = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let (body, terminator) = split_terminator(line);
            if regex.is_match(body) {
                found = true;
                updated.push_str(&regex.replace_all(body, replacement));
            } else {
                updated.push_str(body);
            }
            updated.push_str(terminator);
        }
        if !found {
            return Ok(false);
        }
        updated
    };

    fs::write(&location, updated).map_err(|e| ShellError::io(&location, e))?;
    debug!("replaced /{}/ in {}", pattern, location.display());
    Ok(true)
}

/// Replace lines matching `pattern` with `replacement`, or append
/// `replacement` when nothing matches. Directories are left alone.
pub fn reconfig(file: impl AsRef<Path>, pattern: &str, replacement: &str) -> Result<()> {
    let file = expand_path(file);
    if file.is_dir() {
        return Ok(());
    }
    if pattern_search(&file, pattern, false)? {
        pattern_replace(&file, pattern, replacement, false)?;
    } else {
        write_text_file(&file, replacement, true)?;
    }
    Ok(())
}
