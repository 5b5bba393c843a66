//! The `Shell` facade and command execution.
//!
//! `Shell` gathers the helpers an install script needs behind one value:
//! running commands, printing grouped messages, prompting, moving around the
//! filesystem and asking what machine it is running on. It holds the current
//! group label and directory stack as plain state and hands the label to the
//! console explicitly on every call.

mod identity;
mod runner;

pub use identity::TargetUser;
pub use runner::{CommandLine, CommandRunner, ExecResult, Invocation};

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use tracing::{info, warn};

use crate::console::prompt::{self, PromptOptions};
use crate::console::{Color, ConsoleSink, Severity, TerminalConsole};
use crate::context::{Arguments, DirStack};
use crate::error::{Result, ShellError};
use crate::fsops;
use crate::platform::{self, DebianCodename, OsRelease, ReleaseProbe};

const BOOT_CONFIG: &str = "/boot/config.txt";

pub struct Shell {
    group: Option<String>,
    dirs: DirStack,
    args: Arguments,
    runner: CommandRunner,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    /// A shell printing to the terminal, using this process's arguments.
    pub fn new() -> Self {
        Self::with_console(Arc::new(TerminalConsole::new()))
    }

    pub fn with_console(console: Arc<dyn ConsoleSink>) -> Self {
        Self {
            group: None,
            dirs: DirStack::new(),
            args: Arguments::capture(),
            runner: CommandRunner::new(console),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = Arguments::from_vec(args);
        self
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    fn console(&self) -> &Arc<dyn ConsoleSink> {
        self.runner.console()
    }

    // ---- group label and arguments ----

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Label shown in color before every message.
    pub fn set_group(&mut self, group: impl Display) {
        self.group = Some(group.to_string());
    }

    pub fn clear_group(&mut self) {
        self.group = None;
    }

    pub fn args(&self) -> &[String] {
        &self.args.args
    }

    /// Whether `-<arg>` was passed on the command line.
    pub fn argument_exists(&self, arg: &str) -> bool {
        self.args.exists(arg, "-")
    }

    pub fn argument_exists_with_prefix(&self, arg: &str, prefix: &str) -> bool {
        self.args.exists(arg, prefix)
    }

    /// Name of the running program.
    pub fn script(&self) -> &str {
        self.args.script()
    }

    // ---- console ----

    pub fn info(&self, message: &str) {
        self.console().write_line(Severity::Info, self.group(), message);
    }

    pub fn warn(&self, message: &str) {
        self.console().write_line(Severity::Warn, self.group(), message);
    }

    pub fn error(&self, message: &str) {
        self.console().write_line(Severity::Error, self.group(), message);
    }

    pub fn print_colored(&self, message: &str, color: Color) {
        self.console().write_colored(message, color);
    }

    /// Print an error and exit with status 1.
    pub fn bail(&self, message: Option<&str>) -> ! {
        match message {
            Some(message) => self.error(&format!("Exiting due to error: {}", message)),
            None => self.error("Exiting due to error"),
        }
        warn!("bailing out: {}", message.unwrap_or("no message"));
        std::process::exit(1)
    }

    pub fn exit(&self, status: i32) -> ! {
        std::process::exit(status)
    }

    /// Yes/no prompt on the terminal.
    ///
    /// If `options.force_arg` was passed on the command line the question is
    /// skipped and `options.force_value` returned.
    pub fn prompt(&self, message: &str, options: &PromptOptions) -> Result<bool> {
        if let Some(arg) = &options.force_arg {
            if self.argument_exists(arg) {
                return Ok(options.force_value);
            }
        }
        let mut input = io::stdin().lock();
        let mut output = io::stdout();
        prompt::confirm(&mut input, &mut output, message, options.default)
    }

    /// Numbered menu on the terminal; returns the 1-based choice.
    pub fn select_n<S: AsRef<str>>(&self, message: &str, selections: &[S]) -> Result<usize> {
        let mut input = io::stdin().lock();
        let mut output = io::stdout();
        prompt::select(&mut input, &mut output, message, selections)
    }

    pub fn clear(&self) -> Result<()> {
        execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))
            .map_err(|e| ShellError::io("<stdout>", e))
    }

    /// Current date and time in `ctime` format, e.g. `Sun Oct 18 09:15:02 2026`.
    pub fn date(&self) -> String {
        Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
    }

    // ---- commands ----

    /// Run an invocation. The shell's group label is used unless the
    /// invocation carries its own.
    pub fn run(&self, invocation: Invocation) -> Result<ExecResult> {
        self.runner.run(&self.with_group(invocation))
    }

    pub async fn run_async(&self, invocation: Invocation) -> Result<ExecResult> {
        self.runner.run_async(self.with_group(invocation)).await
    }

    fn with_group(&self, mut invocation: Invocation) -> Invocation {
        if invocation.group.is_none() {
            invocation.group = self.group.clone();
        }
        invocation
    }

    /// Run a shell command, streaming its output. Returns whether it exited 0.
    pub fn run_command(&self, command: &str) -> Result<bool> {
        Ok(self.run(Invocation::shell(command))?.success)
    }

    /// Run a shell command and return its stdout, whatever the exit status.
    pub fn run_command_output(&self, command: &str) -> Result<String> {
        Ok(self.run(Invocation::shell(command).capture())?.into_output())
    }

    /// Run a shell command as another user. Requires root.
    pub fn run_command_as(&self, command: &str, user: &str) -> Result<bool> {
        Ok(self.run(Invocation::shell(command).run_as(user))?.success)
    }

    /// `grep <term> <location>` without output; true when a line matched.
    pub fn grep(&self, search_term: &str, location: impl AsRef<Path>) -> Result<bool> {
        let location = fsops::expand_path(location);
        let command = format!("grep {} {}", search_term, location.display());
        Ok(self.run(Invocation::shell(command).suppress())?.success)
    }

    pub fn reboot(&self) -> Result<bool> {
        info!("rebooting");
        self.run_command("reboot")
    }

    // ---- directories and paths ----

    pub fn getcwd(&self) -> Result<PathBuf> {
        DirStack::getcwd()
    }

    pub fn chdir(&self, directory: impl AsRef<Path>) -> Result<()> {
        DirStack::chdir(directory)
    }

    pub fn pushd(&mut self, directory: impl AsRef<Path>) -> Result<()> {
        self.dirs.pushd(directory)
    }

    pub fn popd(&mut self) -> Result<PathBuf> {
        self.dirs.popd()
    }

    pub fn path(&self, path: impl AsRef<Path>) -> PathBuf {
        fsops::expand_path(path)
    }

    pub fn home_dir(&self) -> Option<PathBuf> {
        fsops::home_dir()
    }

    pub fn exists(&self, location: impl AsRef<Path>) -> bool {
        fsops::exists(location)
    }

    pub fn isdir(&self, location: impl AsRef<Path>) -> bool {
        fsops::is_dir(location)
    }

    // ---- files ----

    pub fn move_path(&self, source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
        fsops::move_path(source, destination)
    }

    pub fn copy(&self, source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<()> {
        fsops::copy_path(source, destination)
    }

    pub fn chmod(&self, location: impl AsRef<Path>, mode: u32) -> Result<()> {
        fsops::chmod(location, mode)
    }

    pub fn chown(
        &self,
        location: impl AsRef<Path>,
        user: &str,
        group: Option<&str>,
        recursive: bool,
    ) -> Result<()> {
        fsops::chown(location, user, group, recursive)
    }

    pub fn remove(&self, location: impl AsRef<Path>) -> Result<()> {
        fsops::remove(location)
    }

    pub fn write_text_file(
        &self,
        path: impl AsRef<Path>,
        content: &str,
        append: bool,
    ) -> Result<()> {
        fsops::write_text_file(path, content, append)
    }

    pub fn pattern_search(
        &self,
        location: impl AsRef<Path>,
        pattern: &str,
        multi_line: bool,
    ) -> Result<bool> {
        fsops::pattern_search(location, pattern, multi_line)
    }

    pub fn pattern_find(
        &self,
        location: impl AsRef<Path>,
        pattern: &str,
        multi_line: bool,
    ) -> Result<Option<String>> {
        fsops::pattern_find(location, pattern, multi_line)
    }

    pub fn pattern_replace(
        &self,
        location: impl AsRef<Path>,
        pattern: &str,
        replacement: &str,
        multi_line: bool,
    ) -> Result<bool> {
        fsops::pattern_replace(location, pattern, replacement, multi_line)
    }

    pub fn reconfig(&self, file: impl AsRef<Path>, pattern: &str, replacement: &str) -> Result<()> {
        fsops::reconfig(file, pattern, replacement)
    }

    // ---- privileges and platform ----

    pub fn is_root(&self) -> bool {
        platform::is_root()
    }

    /// Exit with status 1 unless running as root.
    pub fn require_root(&self) {
        if !self.is_root() {
            self.console()
                .write_line(Severity::Error, None, "Installer must be run as root.");
            self.console()
                .write_line(Severity::Error, None, &format!("Try 'sudo {}'", self.script()));
            std::process::exit(1);
        }
    }

    pub fn is_linux(&self) -> bool {
        platform::is_linux()
    }

    pub fn is_armhf(&self) -> bool {
        platform::is_armhf()
    }

    pub fn is_armv6(&self) -> bool {
        platform::is_armv6()
    }

    pub fn is_armv7(&self) -> bool {
        platform::is_armv7()
    }

    pub fn is_armv8(&self) -> bool {
        platform::is_armv8()
    }

    pub fn is_arm64(&self) -> bool {
        platform::is_arm64()
    }

    pub fn get_arch(&self) -> String {
        platform::machine()
    }

    pub fn release(&self) -> String {
        platform::kernel_release()
    }

    pub fn kernel_minimum(&self, version: impl ToString) -> bool {
        platform::kernel_minimum(version)
    }

    pub fn get_board_model(&self) -> Option<String> {
        platform::board_model()
    }

    pub fn is_raspberry_pi(&self) -> bool {
        platform::is_raspberry_pi()
    }

    /// Inputs for OS detection, including whether `apt-get` is available.
    pub fn release_probe(&self) -> ReleaseProbe {
        let has_apt = self
            .run(Invocation::shell("command -v apt-get").suppress())
            .map(|result| result.success)
            .unwrap_or(false);
        ReleaseProbe::gather(has_apt)
    }

    pub fn get_os(&self) -> Option<OsRelease> {
        platform::detect_os(&self.release_probe())
    }

    pub fn get_raspbian_version(&self) -> Option<DebianCodename> {
        platform::detect_codename(&self.release_probe())
    }

    pub fn is_raspberry_pi_os(&self) -> bool {
        self.get_os() == Some(OsRelease::Raspbian)
    }

    /// Ask to reboot, reboot if confirmed, then exit.
    pub fn prompt_reboot(&self, options: &PromptOptions) -> ! {
        let options = PromptOptions {
            default: options.default.or(Some(true)),
            ..options.clone()
        };
        match self.prompt("REBOOT NOW?", &options) {
            Ok(true) => {
                self.info("Reboot started...");
                nix::unistd::sync();
                if let Err(e) = self.reboot() {
                    self.error(&e.to_string());
                }
            }
            Ok(false) => self.info("Exiting without reboot."),
            Err(e) => self.error(&e.to_string()),
        }
        self.exit(0)
    }

    /// Offer a reboot when the running kernel has no installed modules,
    /// which happens after a kernel update until the next boot.
    pub fn check_kernel_update_reboot_required(&self) {
        if !platform::kernel_modules_present() {
            self.error(
                "OS has not been rebooted since last kernel update. \
                 Please reboot and re-run the script.",
            );
            self.prompt_reboot(&PromptOptions::new());
        }
    }

    /// A 64-bit kernel with a 32-bit userspace cannot build kernel modules.
    /// On Raspberry Pi OS offer to switch to the 32-bit kernel, otherwise bail.
    pub fn check_kernel_userspace_mismatch(&self) {
        if !(self.is_arm64() && platform::userspace_is_32bit()) {
            return;
        }
        self.error(
            "Unable to compile driver because kernel space is 64-bit, \
             but user space is 32-bit.",
        );
        let switch = self.is_raspberry_pi_os()
            && self
                .prompt(
                    &format!("Add parameter to {} to use 32-bit kernel?", BOOT_CONFIG),
                    &PromptOptions::new(),
                )
                .unwrap_or(false);
        if !switch {
            self.bail(Some("Unable to continue while mismatch is present."));
        }
        if let Err(e) = self.reconfig(BOOT_CONFIG, "^.*arm_64bit.*$", "arm_64bit=0") {
            self.bail(Some(&e.to_string()));
        }
        self.prompt_reboot(&PromptOptions::new());
    }
}
