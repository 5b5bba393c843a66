//! Tests for directory stack and argument handling.

use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use crate::context::{Arguments, DirStack};
use crate::error::ShellError;

/// Restores the original working directory when dropped.
struct CwdGuard(std::path::PathBuf);

impl CwdGuard {
    fn new() -> Self {
        Self(DirStack::getcwd().unwrap())
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.0) {
            eprintln!("failed to restore cwd: {}", e);
        }
    }
}

#[test]
#[serial]
fn test_pushd_popd_round_trip() {
    let _guard = CwdGuard::new();
    let start = DirStack::getcwd().unwrap();
    let dir = TempDir::new().unwrap();
    let target = dir.path().canonicalize().unwrap();

    let mut stack = DirStack::new();
    stack.pushd(&target).unwrap();
    assert_eq!(DirStack::getcwd().unwrap().canonicalize().unwrap(), target);
    assert_eq!(stack.depth(), 1);

    let popped = stack.popd().unwrap();
    assert_eq!(popped, start);
    assert_eq!(DirStack::getcwd().unwrap(), start);
    assert!(stack.is_empty());
}

#[test]
#[serial]
fn test_popd_empty_stack() {
    let mut stack = DirStack::new();
    assert!(matches!(stack.popd(), Err(ShellError::DirStackEmpty)));
}

#[test]
#[serial]
fn test_chdir_errors() {
    let _guard = CwdGuard::new();
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x").unwrap();

    assert!(matches!(
        DirStack::chdir(dir.path().join("missing")),
        Err(ShellError::NotFound(_))
    ));
    assert!(matches!(DirStack::chdir(&file), Err(ShellError::NotADirectory(_))));
}

#[test]
#[serial]
fn test_failed_pushd_leaves_stack_untouched() {
    let _guard = CwdGuard::new();
    let mut stack = DirStack::new();
    assert!(stack.pushd("/definitely/not/here").is_err());
    assert!(stack.is_empty());
}

#[test]
fn test_arguments() {
    let args = Arguments::from_vec(vec![
        "./install".to_string(),
        "-y".to_string(),
        "--reboot".to_string(),
    ]);
    assert_eq!(args.script(), "./install");
    assert!(args.exists("y", "-"));
    assert!(args.exists("reboot", "--"));
    assert!(!args.exists("reboot", "-"));
    assert!(!args.exists("n", "-"));

    assert_eq!(Arguments::default().script(), "");
}
