//! Command-line entry point for RustyShell.
//!
//! `rusty-shell run` executes one command through the streaming runner and
//! exits with the child's status. `rusty-shell platform` prints what the
//! platform detection sees.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rusty_shell::utils::logger;
use rusty_shell::{Invocation, PlatformReport, Shell, ShellError, TerminalConsole};

/// Exit status used when the command hit its timeout, as with `timeout(1)`.
const TIMEOUT_STATUS: u8 = 124;

#[derive(Parser, Debug)]
#[command(name = "rusty-shell", version, about = "Run commands the way installers do")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command, streaming its output.
    ///
    /// A single argument is run through `/bin/sh -c`; several arguments are
    /// executed directly.
    Run {
        /// Label printed before each line of output
        #[arg(long)]
        group: Option<String>,
        /// Print the captured stdout once the command finishes
        #[arg(long)]
        capture: bool,
        /// Do not echo output while the command runs
        #[arg(long)]
        quiet: bool,
        /// Run as this user (requires root)
        #[arg(long)]
        user: Option<String>,
        /// Kill the command after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
    /// Print the detected platform.
    Platform {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    logger::init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<ShellError>() {
                Some(ShellError::TimedOut { .. }) => ExitCode::from(TIMEOUT_STATUS),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let shell = Shell::with_console(Arc::new(TerminalConsole::new()));
    match cli.command {
        Commands::Run {
            group,
            capture,
            quiet,
            user,
            timeout,
            mut command,
        } => {
            let mut invocation = if command.len() == 1 {
                Invocation::shell(command.remove(0))
            } else {
                Invocation::argv(command)
            };
            if let Some(group) = group {
                invocation = invocation.group(group);
            }
            if capture {
                invocation = invocation.capture();
            }
            if quiet {
                invocation = invocation.suppress();
            }
            if let Some(user) = user {
                invocation = invocation.run_as(user);
            }
            if let Some(seconds) = timeout {
                let timeout = Duration::try_from_secs_f64(seconds).context("invalid --timeout")?;
                invocation = invocation.timeout(timeout);
            }

            let result = shell.run_async(invocation).await?;
            if capture {
                print!("{}", result.output.as_deref().unwrap_or_default());
            }
            let code = result
                .exit_code
                .map(|code| u8::try_from(code).unwrap_or(1))
                .unwrap_or(1);
            Ok(ExitCode::from(code))
        }
        Commands::Platform { json } => {
            let report = PlatformReport::collect(&shell.release_probe());
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let unknown = || "unknown".to_string();
                println!(
                    "os:          {}",
                    report.os.map(|os| os.to_string()).unwrap_or_else(unknown)
                );
                println!(
                    "codename:    {}",
                    report.codename.map(|c| c.to_string()).unwrap_or_else(unknown)
                );
                println!("machine:     {}", report.machine);
                println!("kernel:      {}", report.kernel);
                println!("board:       {}", report.board_model.clone().unwrap_or_else(unknown));
                println!("root:        {}", report.is_root);
                println!("32-bit user: {}", report.userspace_32bit);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
