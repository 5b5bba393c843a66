//! RustyShell - helpers for writing installer and setup programs
//!
//! The centre of the crate is a command runner that streams a child's stdout
//! and stderr to the console while it runs, can capture stdout instead of (or
//! as well as) echoing it, and can run the child as another user. Around it
//! sit the things install scripts reach for next:
//! - Grouped, colored console messages and yes/no prompts
//! - File operations and regex edits of config files
//! - Directory stack (`pushd`/`popd`) and argument checks
//! - OS, board, architecture and kernel detection
//!
//! # Example
//!
//! ```no_run
//! use rusty_shell::Shell;
//!
//! fn main() -> rusty_shell::Result<()> {
//!     let mut shell = Shell::new();
//!     shell.set_group("Blinka");
//!     shell.require_root();
//!
//!     if !shell.run_command("apt-get update")? {
//!         shell.bail(Some("apt-get update failed"));
//!     }
//!     let kernel = shell.run_command_output("uname -r")?;
//!     shell.info(&format!("Kernel {}", kernel.trim_end()));
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod context;
pub mod error;
pub mod fsops;
pub mod platform;
pub mod shell;
pub mod utils;

// Re-export commonly used types
pub use console::prompt::PromptOptions;
pub use console::{Color, ConsoleSink, MemoryConsole, Severity, TerminalConsole};
pub use error::{Result, ShellError};
pub use platform::{DebianCodename, OsRelease, PlatformReport};
pub use shell::{CommandLine, CommandRunner, ExecResult, Invocation, Shell, TargetUser};
