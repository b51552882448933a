//! Color constants for the terminal user interface.

use ratatui::style::Color;

use gestora::fields::{Severity, Status};

pub const DARK_GREEN: Color = Color::Rgb(0, 80, 0);
pub const GOLD: Color = Color::Rgb(255, 215, 0);
pub const DARK_RED: Color = Color::Rgb(114, 0, 0);
pub const DARK_PURPLE: Color = Color::Rgb(86, 60, 92);

/// Column accent for each status.
pub fn status_color(status: Status) -> Color {
    match status {
        Status::Pending => Color::Blue,
        Status::InProgress => GOLD,
        Status::Done => DARK_GREEN,
        Status::Closed => DARK_PURPLE,
        Status::Overdue => DARK_RED,
    }
}

/// Text drawn on top of an accent background.
pub fn text_on(background: Color) -> Color {
    match background {
        GOLD => Color::Rgb(20, 20, 20),
        _ => Color::White,
    }
}

pub fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Success => Color::Green,
        Severity::Info => Color::Cyan,
        Severity::Error => Color::Red,
    }
}
