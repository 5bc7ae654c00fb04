//! Terminal colour detection and status styling

use owo_colors::{OwoColorize, Style};

/// Detects whether colored output should be enabled
pub fn supports_color() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

fn paint(text: &str, style: Style) -> String {
    if supports_color() {
        text.style(style).to_string()
    } else {
        text.to_string()
    }
}

/// Extension trait styling report lines by certificate status
pub trait Colorize {
    /// A certificate that is fine (green)
    fn success(&self) -> String;
    /// A certificate that needs renewal (yellow)
    fn warning(&self) -> String;
    /// A command about to run (blue)
    fn info(&self) -> String;
    /// Supporting detail
    fn dim(&self) -> String;
}

impl<T: AsRef<str> + ?Sized> Colorize for T {
    fn success(&self) -> String {
        paint(self.as_ref(), Style::new().green())
    }

    fn warning(&self) -> String {
        paint(self.as_ref(), Style::new().yellow())
    }

    fn info(&self) -> String {
        paint(self.as_ref(), Style::new().blue())
    }

    fn dim(&self) -> String {
        paint(self.as_ref(), Style::new().dimmed())
    }
}
