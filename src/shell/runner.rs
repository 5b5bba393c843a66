//! Streaming command execution.
//!
//! The runner starts one child process with piped stdout and stderr, switches
//! both pipes to non-blocking mode and polls them while the child runs. Each
//! chunk is echoed to the console as soon as it arrives (stderr on the error
//! channel, stdout on the info channel), so long-running installs show their
//! progress live instead of dumping everything at the end. Polling both pipes
//! without blocking also means a child that fills one pipe while the other is
//! idle can never deadlock the caller.

use std::fmt;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use tracing::{debug, warn};

use super::identity::TargetUser;
use crate::console::{ConsoleSink, Severity};
use crate::error::{Result, ShellError};

const READ_CHUNK: usize = 8192; // bytes per read() call
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Interpreted by `/bin/sh -c`, so pipes and redirection work.
    Shell(String),
    /// Executed directly, no shell involved.
    Argv(Vec<String>),
}

impl CommandLine {
    fn build(&self) -> Result<Command> {
        match self {
            CommandLine::Shell(line) => {
                if line.trim().is_empty() {
                    return Err(ShellError::EmptyCommand);
                }
                let mut command = Command::new("/bin/sh");
                command.arg("-c").arg(line);
                Ok(command)
            }
            CommandLine::Argv(argv) => {
                let (program, args) = argv.split_first().ok_or(ShellError::EmptyCommand)?;
                if program.is_empty() {
                    return Err(ShellError::EmptyCommand);
                }
                let mut command = Command::new(program);
                command.args(args);
                Ok(command)
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Shell(line) => f.write_str(line),
            CommandLine::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

/// A single request to the runner.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: CommandLine,
    /// Do not echo anything to the console.
    pub suppress_output: bool,
    /// Return the child's stdout text in [`ExecResult::output`].
    pub capture_output: bool,
    /// Run as this user. Requires root.
    pub run_as: Option<String>,
    /// Label prefixed to echoed lines.
    pub group: Option<String>,
    /// Kill the child and fail with [`ShellError::TimedOut`] after this long.
    pub timeout: Option<Duration>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(command: CommandLine) -> Self {
        Self {
            command,
            suppress_output: false,
            capture_output: false,
            run_as: None,
            group: None,
            timeout: None,
            cwd: None,
        }
    }

    pub fn shell(line: impl Into<String>) -> Self {
        Self::new(CommandLine::Shell(line.into()))
    }

    pub fn argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(CommandLine::Argv(argv.into_iter().map(Into::into).collect()))
    }

    pub fn suppress(mut self) -> Self {
        self.suppress_output = true;
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture_output = true;
        self
    }

    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    pub command: String,
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Captured stdout, present only in capture mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub duration_ms: u64,
}

impl ExecResult {
    /// Captured stdout, or an empty string outside capture mode.
    pub fn into_output(self) -> String {
        self.output.unwrap_or_default()
    }
}

/// Runs commands and streams their output to a [`ConsoleSink`].
#[derive(Clone)]
pub struct CommandRunner {
    console: Arc<dyn ConsoleSink>,
    poll_interval: Duration,
}

impl fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRunner")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl CommandRunner {
    pub fn new(console: Arc<dyn ConsoleSink>) -> Self {
        Self {
            console,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How long to sleep when neither pipe had data.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn console(&self) -> &Arc<dyn ConsoleSink> {
        &self.console
    }

    /// Run a command to completion.
    ///
    /// A non-zero exit status is reported through [`ExecResult::success`], not
    /// as an error. Errors are reserved for commands that could not be started,
    /// impersonation that is not allowed, pipe failures and timeouts; in every
    /// case the child has been reaped before this returns.
    pub fn run(&self, invocation: &Invocation) -> Result<ExecResult> {
        let label = invocation.command.to_string();
        let mut command = invocation.command.build()?;

        if let Some(login) = &invocation.run_as {
            let target = TargetUser::resolve(login)?;
            debug!(
                user = %target.name,
                uid = target.uid,
                gid = target.gid,
                "impersonating for `{}`",
                label
            );
            target.apply(&mut command);
        }
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        // A timed command gets its own process group so the whole pipeline
        // can be killed, not just the shell. Untimed commands stay in the
        // foreground group so they can still read from the terminal.
        let own_group = invocation.timeout.is_some();
        if own_group {
            command.process_group(0);
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ShellError::Spawn {
            command: label.clone(),
            source,
        })?;
        debug!(pid = child.id(), "spawned `{}`", label);

        let (status, captured) = match self.pump(&mut child, invocation, &label, started) {
            Ok(done) => done,
            Err(e) => {
                reap(&mut child, own_group);
                return Err(e);
            }
        };

        let elapsed = started.elapsed();
        match status.code() {
            Some(code) => {
                debug!(code, elapsed_ms = elapsed.as_millis() as u64, "`{}` exited", label)
            }
            None => warn!("`{}` was terminated by a signal", label),
        }

        Ok(ExecResult {
            command: label,
            exit_code: status.code(),
            success: status.success(),
            output: invocation
                .capture_output
                .then(|| normalize_newlines(&captured)),
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// Same as [`CommandRunner::run`], on tokio's blocking thread pool.
    pub async fn run_async(&self, invocation: Invocation) -> Result<ExecResult> {
        let runner = self.clone();
        tokio::task::spawn_blocking(move || runner.run(&invocation))
            .await
            .map_err(|e| ShellError::Task(e.to_string()))?
    }

    /// Poll the child until it exits, forwarding output as it arrives.
    /// Both pipes are closed when this returns.
    fn pump(
        &self,
        child: &mut Child,
        invocation: &Invocation,
        label: &str,
        started: Instant,
    ) -> Result<(ExitStatus, Vec<u8>)> {
        let io_err = |source| ShellError::Process {
            command: label.to_string(),
            source,
        };

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        if let Some(pipe) = &stdout {
            set_nonblocking(pipe.as_raw_fd()).map_err(io_err)?;
        }
        if let Some(pipe) = &stderr {
            set_nonblocking(pipe.as_raw_fd()).map_err(io_err)?;
        }

        let deadline = invocation.timeout.map(|timeout| (started + timeout, timeout));
        let mut captured = Vec::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut err_text = Utf8Tail::default();
        let mut out_text = Utf8Tail::default();

        let status = loop {
            if let Some(status) = child.try_wait().map_err(io_err)? {
                break status;
            }
            if let Some((at, timeout)) = deadline {
                if Instant::now() >= at {
                    warn!("`{}` exceeded its {:?} timeout, killing it", label, timeout);
                    return Err(ShellError::TimedOut {
                        command: label.to_string(),
                        timeout,
                    });
                }
            }

            let err = drain(&mut stderr, &mut buf).map_err(io_err)?;
            let out = drain(&mut stdout, &mut buf).map_err(io_err)?;
            let idle = err.is_empty() && out.is_empty();
            let (err_echo, out_echo) = (err_text.push(&err), out_text.push(&out));
            self.forward(invocation, err_echo, out_echo, &out, &mut captured);
            if idle {
                thread::sleep(self.poll_interval);
            }
        };

        // Pick up whatever was written right before exit.
        let err = drain(&mut stderr, &mut buf).map_err(io_err)?;
        let out = drain(&mut stdout, &mut buf).map_err(io_err)?;
        let err_echo = err_text.push(&err) + &err_text.finish();
        let out_echo = out_text.push(&out) + &out_text.finish();
        self.forward(invocation, err_echo, out_echo, &out, &mut captured);

        drop(stdout);
        drop(stderr);
        Ok((status, captured))
    }

    /// Echo decoded text and capture raw stdout bytes.
    fn forward(
        &self,
        invocation: &Invocation,
        err: String,
        out: String,
        out_bytes: &[u8],
        captured: &mut Vec<u8>,
    ) {
        if !invocation.suppress_output {
            if !err.is_empty() {
                self.echo(Severity::Error, invocation, &err);
            }
            if !out.is_empty() {
                self.echo(Severity::Info, invocation, &out);
            }
        }
        if invocation.capture_output {
            captured.extend_from_slice(out_bytes);
        }
    }

    fn echo(&self, severity: Severity, invocation: &Invocation, text: &str) {
        let text = normalize_text(text);
        self.console
            .write_line(severity, invocation.group.as_deref(), text.trim_end());
    }
}

/// Incremental UTF-8 decoder for one stream.
///
/// A character split across two reads is held back until its remaining
/// bytes arrive, so it is never echoed as replacement characters.
#[derive(Debug, Default)]
struct Utf8Tail {
    pending: Vec<u8>,
}

impl Utf8Tail {
    /// Decode `bytes` after any held-back prefix. An incomplete character at
    /// the end is kept for the next call.
    fn push(&mut self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }
        self.pending.extend_from_slice(bytes);
        let complete = self.pending.len() - incomplete_suffix_len(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..complete]).into_owned();
        self.pending.drain(..complete);
        text
    }

    /// Whatever is still held back, decoded lossily.
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a truncated multi-byte sequence at the end of `bytes`, or 0.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` belongs to a pipe owned by the caller for the whole call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above; only the status flags are changed.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Read everything currently available from a pipe.
///
/// "No data ready" ends the read with whatever was collected. End of file
/// closes the pipe so later polls skip it.
fn drain<R: Read>(pipe: &mut Option<R>, buf: &mut [u8]) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut eof = false;
    if let Some(reader) = pipe.as_mut() {
        loop {
            match reader.read(buf) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
    if eof {
        *pipe = None;
    }
    Ok(data)
}

/// Kill the child, and its whole process group when it has one, then wait.
fn reap(child: &mut Child, own_group: bool) {
    if own_group {
        match i32::try_from(child.id()) {
            Ok(pid) => {
                if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                    debug!("killpg failed (group may have exited): {}", e);
                }
            }
            Err(e) => warn!("child pid out of range: {}", e),
        }
    }
    if let Err(e) = child.kill() {
        debug!("kill failed (child may have exited): {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("failed to reap child {}: {}", child.id(), e);
    }
}

/// `\r\n` and lone `\r` both become `\n`, as with universal newlines.
fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn normalize_newlines(bytes: &[u8]) -> String {
    normalize_text(&String::from_utf8_lossy(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Yields scripted results, then reports end of file.
    struct ScriptedReader {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    fn scripted(steps: Vec<io::Result<Vec<u8>>>) -> Option<ScriptedReader> {
        Some(ScriptedReader {
            steps: steps.into(),
        })
    }

    #[test]
    fn test_drain_would_block_is_empty_read() {
        let mut pipe = scripted(vec![Err(io::ErrorKind::WouldBlock.into())]);
        let mut buf = [0u8; 16];

        let data = drain(&mut pipe, &mut buf).unwrap();
        assert!(data.is_empty());
        assert!(pipe.is_some(), "pipe must stay open after a would-block read");
    }

    #[test]
    fn test_drain_collects_until_would_block() {
        let mut pipe = scripted(vec![
            Ok(b"ab".to_vec()),
            Err(io::ErrorKind::Interrupted.into()),
            Ok(b"cd".to_vec()),
            Err(io::ErrorKind::WouldBlock.into()),
            Ok(b"ef".to_vec()),
        ]);
        let mut buf = [0u8; 16];

        assert_eq!(drain(&mut pipe, &mut buf).unwrap(), b"abcd");
        assert_eq!(drain(&mut pipe, &mut buf).unwrap(), b"ef");
        assert!(pipe.is_none(), "end of file closes the pipe");
        assert!(drain(&mut pipe, &mut buf).unwrap().is_empty());
    }

    #[test]
    fn test_drain_propagates_real_errors() {
        let mut pipe = scripted(vec![Err(io::ErrorKind::BrokenPipe.into())]);
        let mut buf = [0u8; 16];
        assert!(drain(&mut pipe, &mut buf).is_err());
    }

    #[test]
    fn test_empty_commands_are_rejected() {
        assert!(matches!(
            CommandLine::Shell("   ".into()).build(),
            Err(ShellError::EmptyCommand)
        ));
        assert!(matches!(
            CommandLine::Argv(vec![]).build(),
            Err(ShellError::EmptyCommand)
        ));
        assert!(matches!(
            CommandLine::Argv(vec![String::new()]).build(),
            Err(ShellError::EmptyCommand)
        ));
    }

    #[test]
    fn test_shell_command_uses_sh() {
        let command = CommandLine::Shell("echo hi | wc -c".into()).build().unwrap();
        assert_eq!(command.get_program(), "/bin/sh");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec!["-c", "echo hi | wc -c"]);
    }

    #[test]
    fn test_command_line_display() {
        assert_eq!(CommandLine::Shell("ls -l".into()).to_string(), "ls -l");
        assert_eq!(
            CommandLine::Argv(vec!["grep".into(), "-q".into(), "x".into()]).to_string(),
            "grep -q x"
        );
    }

    #[test]
    fn test_invocation_builder() {
        let invocation = Invocation::argv(["ls", "-la"])
            .capture()
            .suppress()
            .group("Blinka")
            .timeout(Duration::from_secs(3));
        assert!(invocation.capture_output);
        assert!(invocation.suppress_output);
        assert_eq!(invocation.group.as_deref(), Some("Blinka"));
        assert_eq!(invocation.timeout, Some(Duration::from_secs(3)));
        assert!(invocation.run_as.is_none());
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines(b"a\r\nb\n"), "a\nb\n");
        assert_eq!(normalize_newlines(b" 10%\r 55%\r100%\n"), " 10%\n 55%\n100%\n");
    }

    #[test]
    fn test_utf8_tail_holds_split_character() {
        let mut tail = Utf8Tail::default();
        assert_eq!(tail.push(b"caf\xc3"), "caf");
        assert_eq!(tail.push(b"\xa9\n"), "\u{e9}\n");
        assert_eq!(tail.finish(), "");
    }

    #[test]
    fn test_utf8_tail_four_byte_character_in_pieces() {
        let mut tail = Utf8Tail::default();
        let crab = "\u{1f980}".as_bytes();
        assert_eq!(tail.push(&crab[..1]), "");
        assert_eq!(tail.push(&crab[1..3]), "");
        assert_eq!(tail.push(&crab[3..]), "\u{1f980}");
    }

    #[test]
    fn test_utf8_tail_flushes_truncated_input_lossily() {
        let mut tail = Utf8Tail::default();
        assert_eq!(tail.push(b"ok\xe2\x82"), "ok");
        assert_eq!(tail.finish(), "\u{fffd}");
        // Invalid bytes in the middle are replaced right away.
        assert_eq!(tail.push(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn test_incomplete_suffix_len() {
        assert_eq!(incomplete_suffix_len(b"abc"), 0);
        assert_eq!(incomplete_suffix_len("\u{e9}".as_bytes()), 0);
        assert_eq!(incomplete_suffix_len(b"a\xc3"), 1);
        assert_eq!(incomplete_suffix_len(b"a\xe2\x82"), 2);
        assert_eq!(incomplete_suffix_len(b"\xf0\x9f\xa6"), 3);
        assert_eq!(incomplete_suffix_len(b""), 0);
    }
}
