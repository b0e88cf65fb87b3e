//! Console output surface.
//!
//! Programs write text through the `console.*` intrinsics, which land
//! on whatever `Console` the embedder installed. The trait takes
//! `&self` and is `Send + Sync` so one console can serve execution
//! contexts on several threads.

use parking_lot::Mutex;
use std::io::{self, Write};

/// Text color selectable by programs through `console.color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Reset to the terminal default.
    Default,
    /// Black foreground.
    Black,
    /// Red foreground.
    Red,
    /// Green foreground.
    Green,
    /// Yellow foreground.
    Yellow,
    /// Blue foreground.
    Blue,
    /// Magenta foreground.
    Magenta,
    /// Cyan foreground.
    Cyan,
    /// White foreground.
    White,
}

impl Color {
    /// ANSI escape sequence selecting this color.
    pub fn ansi_code(self) -> &'static str {
        match self {
            Color::Default => "\x1b[0m",
            Color::Black => "\x1b[30m",
            Color::Red => "\x1b[31m",
            Color::Green => "\x1b[32m",
            Color::Yellow => "\x1b[33m",
            Color::Blue => "\x1b[34m",
            Color::Magenta => "\x1b[35m",
            Color::Cyan => "\x1b[36m",
            Color::White => "\x1b[37m",
        }
    }

    /// Maps the raw value passed by a program to a color. Values
    /// outside the known range reset to the default.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Color::Black,
            2 => Color::Red,
            3 => Color::Green,
            4 => Color::Yellow,
            5 => Color::Blue,
            6 => Color::Magenta,
            7 => Color::Cyan,
            8 => Color::White,
            _ => Color::Default,
        }
    }
}

/// Output sink for program text.
pub trait Console: Send + Sync {
    /// Writes text to the standard output stream. No newline is added.
    fn write_stdout(&self, text: &str);

    /// Writes text to the standard error stream. No newline is added.
    fn write_stderr(&self, text: &str);

    /// Flushes buffered output to the underlying streams.
    fn flush(&self);

    /// Switches the standard output color for subsequent writes.
    fn set_color(&self, color: Color);
}

/// Console backed by the process stdio streams.
pub struct StdoutConsole {
    colors: bool,
}

impl StdoutConsole {
    /// Creates a console with ANSI colors enabled.
    pub fn new() -> Self {
        StdoutConsole { colors: true }
    }

    /// Creates a console with colors on or off, for pipes and dumb
    /// terminals.
    pub fn with_colors(colors: bool) -> Self {
        StdoutConsole { colors }
    }
}

impl Default for StdoutConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdoutConsole {
    fn write_stdout(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
    }

    fn write_stderr(&self, text: &str) {
        let mut err = io::stderr().lock();
        let _ = err.write_all(text.as_bytes());
    }

    fn flush(&self) {
        let _ = io::stdout().lock().flush();
        let _ = io::stderr().lock().flush();
    }

    fn set_color(&self, color: Color) {
        if self.colors {
            self.write_stdout(color.ansi_code());
        }
    }
}

/// Console that captures both streams into in-memory buffers.
///
/// Color changes are recorded instead of rendered, so tests can assert
/// on them without parsing escape sequences.
#[derive(Default)]
pub struct CaptureConsole {
    stdout: Mutex<String>,
    stderr: Mutex<String>,
    colors: Mutex<Vec<Color>>,
}

impl CaptureConsole {
    /// Creates an empty capture console.
    pub fn new() -> Self {
        CaptureConsole::default()
    }

    /// Everything written to stdout so far.
    pub fn stdout_output(&self) -> String {
        self.stdout.lock().clone()
    }

    /// Everything written to stderr so far.
    pub fn stderr_output(&self) -> String {
        self.stderr.lock().clone()
    }

    /// Every color change requested, in order.
    pub fn color_changes(&self) -> Vec<Color> {
        self.colors.lock().clone()
    }

    /// Discards all captured output.
    pub fn clear(&self) {
        self.stdout.lock().clear();
        self.stderr.lock().clear();
        self.colors.lock().clear();
    }
}

impl Console for CaptureConsole {
    fn write_stdout(&self, text: &str) {
        self.stdout.lock().push_str(text);
    }

    fn write_stderr(&self, text: &str) {
        self.stderr.lock().push_str(text);
    }

    fn flush(&self) {}

    fn set_color(&self, color: Color) {
        self.colors.lock().push(color);
    }
}
