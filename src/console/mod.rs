//! Console output channels.
//!
//! Messages are written with a semantic severity and an optional group label.
//! The group label is passed explicitly on every call; the sink never keeps
//! one of its own. `TerminalConsole` colors the label the way install scripts
//! traditionally do, while `MemoryConsole` records lines for tests and for
//! callers that want to post-process output.

pub mod prompt;

use std::fmt;
use std::io::{IsTerminal, Write};
use std::str::FromStr;
use std::sync::Mutex;

use crossterm::style::{Color as TermColor, Stylize};

use crate::error::ShellError;

/// Semantic channel of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Color used for the group label on this channel.
    pub fn label_color(self) -> Color {
        match self {
            Severity::Info => Color::Green,
            Severity::Warn => Color::Yellow,
            Severity::Error => Color::Red,
        }
    }
}

/// Named colors accepted by [`ConsoleSink::write_colored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Black,
    Magenta,
    Cyan,
    White,
}

impl Color {
    fn term(self) -> TermColor {
        match self {
            Color::Red => TermColor::DarkRed,
            Color::Green => TermColor::DarkGreen,
            Color::Yellow => TermColor::DarkYellow,
            Color::Blue => TermColor::DarkBlue,
            Color::Black => TermColor::Black,
            Color::Magenta => TermColor::DarkMagenta,
            Color::Cyan => TermColor::DarkCyan,
            Color::White => TermColor::Grey,
        }
    }
}

impl FromStr for Color {
    type Err = ShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Color::Red),
            "green" => Ok(Color::Green),
            "yellow" => Ok(Color::Yellow),
            "blue" => Ok(Color::Blue),
            "black" => Ok(Color::Black),
            "magenta" => Ok(Color::Magenta),
            "cyan" => Ok(Color::Cyan),
            "white" => Ok(Color::White),
            other => Err(ShellError::UnknownColor(other.to_string())),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Blue => "blue",
            Color::Black => "black",
            Color::Magenta => "magenta",
            Color::Cyan => "cyan",
            Color::White => "white",
        };
        f.write_str(name)
    }
}

/// Destination for severity-tagged console lines.
pub trait ConsoleSink: Send + Sync {
    fn write_line(&self, severity: Severity, group: Option<&str>, message: &str);

    /// Print a whole message in one color. Sinks without color support
    /// record it as an ungrouped info line.
    fn write_colored(&self, message: &str, _color: Color) {
        self.write_line(Severity::Info, None, message);
    }
}

/// Formats a line without any styling: `"<group> <message>"` or `message`.
pub fn format_line(group: Option<&str>, message: &str) -> String {
    match group {
        Some(group) => format!("{} {}", group, message),
        None => message.to_string(),
    }
}

/// Writes lines to stdout, coloring the group label.
#[derive(Debug, Clone)]
pub struct TerminalConsole {
    colors: bool,
}

impl Default for TerminalConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalConsole {
    /// Colors are enabled when stdout is a terminal and `NO_COLOR` is unset.
    pub fn new() -> Self {
        let colors = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self { colors }
    }

    pub fn with_colors(colors: bool) -> Self {
        Self { colors }
    }

    fn render(&self, severity: Severity, group: Option<&str>, message: &str) -> String {
        match group {
            Some(group) if self.colors => {
                format!("{} {}", group.with(severity.label_color().term()), message)
            }
            _ => format_line(group, message),
        }
    }
}

impl ConsoleSink for TerminalConsole {
    fn write_line(&self, severity: Severity, group: Option<&str>, message: &str) {
        emit(&self.render(severity, group, message));
    }

    fn write_colored(&self, message: &str, color: Color) {
        let line = if self.colors {
            message.with(color.term()).to_string()
        } else {
            message.to_string()
        };
        emit(&line);
    }
}

fn emit(line: &str) {
    let mut out = std::io::stdout().lock();
    // A closed stdout is not worth failing a command over.
    if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
        tracing::debug!("console write failed: {}", e);
    }
}

/// A line recorded by [`MemoryConsole`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub severity: Severity,
    pub group: Option<String>,
    pub message: String,
}

/// Records lines in memory instead of printing them.
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<ConsoleLine>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Messages written on one channel, in order.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.severity == severity)
            .map(|l| l.message)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl ConsoleSink for MemoryConsole {
    fn write_line(&self, severity: Severity, group: Option<&str>, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(ConsoleLine {
                severity,
                group: group.map(str::to_string),
                message: message.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_str() {
        assert_eq!("red".parse::<Color>().ok(), Some(Color::Red));
        assert_eq!("Cyan".parse::<Color>().ok(), Some(Color::Cyan));
        assert_eq!(" white ".parse::<Color>().ok(), Some(Color::White));
        assert!(matches!(
            "purple".parse::<Color>(),
            Err(ShellError::UnknownColor(name)) if name == "purple"
        ));
    }

    #[test]
    fn test_color_display_round_trips_names() {
        for color in [Color::Red, Color::Black, Color::Magenta] {
            assert_eq!(color.to_string().parse::<Color>().ok(), Some(color));
        }
    }

    #[test]
    fn test_severity_label_colors() {
        assert_eq!(Severity::Info.label_color(), Color::Green);
        assert_eq!(Severity::Warn.label_color(), Color::Yellow);
        assert_eq!(Severity::Error.label_color(), Color::Red);
    }

    #[test]
    fn test_format_line() {
        assert_eq!(format_line(Some("Blinka"), "hello"), "Blinka hello");
        assert_eq!(format_line(None, "hello"), "hello");
    }

    #[test]
    fn test_plain_render_has_no_escape_codes() {
        let console = TerminalConsole::with_colors(false);
        let line = console.render(Severity::Error, Some("Blinka"), "boom");
        assert_eq!(line, "Blinka boom");
    }

    #[test]
    fn test_colored_render_styles_only_group() {
        let console = TerminalConsole::with_colors(true);
        let line = console.render(Severity::Info, Some("Blinka"), "ok");
        assert!(line.contains("\x1b["));
        assert!(line.ends_with(" ok"));

        let line = console.render(Severity::Info, None, "ok");
        assert_eq!(line, "ok");
    }

    #[test]
    fn test_memory_console_records_lines() {
        let console = MemoryConsole::new();
        console.write_line(Severity::Info, Some("grp"), "one");
        console.write_line(Severity::Error, None, "two");

        let lines = console.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].group.as_deref(), Some("grp"));
        assert_eq!(console.messages(Severity::Error), vec!["two".to_string()]);

        console.write_colored("plain", Color::Blue);
        assert_eq!(console.messages(Severity::Info), vec!["plain".to_string()]);

        console.clear();
        assert!(console.lines().is_empty());
    }
}
