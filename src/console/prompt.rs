//! Interactive yes/no and numbered-choice prompts.
//!
//! The prompt functions are generic over their input and output so they can
//! be driven by in-memory buffers in tests; `Shell` wires them to the
//! process's stdin and stdout.

use std::io::{BufRead, Write};

use crate::error::{Result, ShellError};

/// Options for [`crate::Shell::prompt`].
#[derive(Debug, Clone)]
pub struct PromptOptions {
    /// Answer used when the reply is empty.
    pub default: Option<bool>,
    /// Command-line flag (without prefix) that skips the prompt.
    pub force_arg: Option<String>,
    /// Answer returned when `force_arg` is present.
    pub force_value: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptOptions {
    pub fn new() -> Self {
        Self {
            default: None,
            force_arg: None,
            force_value: true,
        }
    }

    pub fn default_yes(mut self) -> Self {
        self.default = Some(true);
        self
    }

    pub fn default_no(mut self) -> Self {
        self.default = Some(false);
        self
    }

    pub fn force_arg(mut self, arg: impl Into<String>, value: bool) -> Self {
        self.force_arg = Some(arg.into());
        self.force_value = value;
        self
    }
}

/// The choice box shown after a yes/no question.
pub fn choice_box(default: Option<bool>) -> &'static str {
    match default {
        None => "[y/n]",
        Some(true) => "[Y/n]",
        Some(false) => "[y/N]",
    }
}

/// Interpret a single reply. `None` means the question should be asked again.
pub fn parse_reply(reply: &str, default: Option<bool>) -> Option<bool> {
    let reply = reply.trim();
    if reply.is_empty() {
        return default;
    }
    // Anything starting with y/n counts, so "yep" and "nope" are accepted.
    match reply.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('y') => Some(true),
        Some('n') => Some(false),
        _ => None,
    }
}

/// Ask a yes/no question until a usable answer is given.
///
/// End of input returns the default, or [`ShellError::NoInput`] when there is
/// none.
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    message: &str,
    default: Option<bool>,
) -> Result<bool> {
    loop {
        write!(output, "{} {} ", message, choice_box(default))
            .and_then(|_| output.flush())
            .map_err(|e| ShellError::io("<stdout>", e))?;

        let mut reply = String::new();
        let read = input
            .read_line(&mut reply)
            .map_err(|e| ShellError::io("<stdin>", e))?;
        if read == 0 {
            return default.ok_or(ShellError::NoInput);
        }
        if let Some(answer) = parse_reply(&reply, default) {
            return Ok(answer);
        }
    }
}

/// Show a numbered list and return the 1-based index the user picked.
pub fn select<R: BufRead, W: Write, S: AsRef<str>>(
    input: &mut R,
    output: &mut W,
    message: &str,
    options: &[S],
) -> Result<usize> {
    if options.is_empty() {
        return Err(ShellError::NoInput);
    }
    let write_err = |e| ShellError::io("<stdout>", e);

    for (index, option) in options.iter().enumerate() {
        writeln!(output, "{}) {}", index + 1, option.as_ref()).map_err(write_err)?;
    }
    loop {
        write!(output, "{} ", message)
            .and_then(|_| output.flush())
            .map_err(write_err)?;

        let mut reply = String::new();
        let read = input
            .read_line(&mut reply)
            .map_err(|e| ShellError::io("<stdin>", e))?;
        if read == 0 {
            return Err(ShellError::NoInput);
        }
        match reply.trim().parse::<usize>() {
            Ok(choice) if (1..=options.len()).contains(&choice) => return Ok(choice),
            _ => {
                writeln!(output, "Enter a valid option").map_err(write_err)?;
            }
        }
    }
}
