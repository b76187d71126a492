//! Colored terminal output via `termcolor`.
//!
//! Respects the `NO_COLOR` environment variable.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve the color choice from the environment.
pub fn resolve_color_choice() -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

/// Styled writer for summary lines.
pub struct StyledOutput {
    stdout: StandardStream,
}

impl StyledOutput {
    /// New writer with the given color choice.
    pub fn new(choice: ColorChoice) -> Self {
        StyledOutput {
            stdout: StandardStream::stdout(choice),
        }
    }

    fn write_colored(&mut self, text: &str, color: Color) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(true);
        let _ = self.stdout.set_color(&spec);
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Green bold line.
    pub fn success(&mut self, text: &str) {
        self.write_colored(text, Color::Green);
    }

    /// Yellow bold line.
    pub fn warn(&mut self, text: &str) {
        self.write_colored(text, Color::Yellow);
    }

    /// Red bold line.
    pub fn error(&mut self, text: &str) {
        self.write_colored(text, Color::Red);
    }

    /// Plain line.
    pub fn plain(&mut self, text: &str) {
        let _ = writeln!(self.stdout, "{}", text);
    }
}
