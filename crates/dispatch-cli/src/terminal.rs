//! Terminal color detection and status coloring.

use dispatch_lib::{IncidentPriority, IncidentStatus, VehicleStatus};

/// ANSI escape codes used by the text renderer.
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const GRAY: &str = "\x1b[90m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
    /// Bold reverse red, for critical incidents.
    pub const ALERT: &str = "\x1b[1;7;31m";
}

/// Resolved color codes, or empty strings when color is disabled.
#[derive(Debug, Clone, Copy)]
pub struct ColorPalette {
    pub reset: &'static str,
    pub bold: &'static str,
    pub gray: &'static str,
    pub green: &'static str,
    pub yellow: &'static str,
    pub cyan: &'static str,
    pub red: &'static str,
    pub alert: &'static str,
}

impl ColorPalette {
    #[must_use]
    pub const fn colored() -> Self {
        Self {
            reset: colors::RESET,
            bold: colors::BOLD,
            gray: colors::GRAY,
            green: colors::GREEN,
            yellow: colors::YELLOW,
            cyan: colors::CYAN,
            red: colors::RED,
            alert: colors::ALERT,
        }
    }

    #[must_use]
    pub const fn plain() -> Self {
        Self {
            reset: "",
            bold: "",
            gray: "",
            green: "",
            yellow: "",
            cyan: "",
            red: "",
            alert: "",
        }
    }

    /// Colored when stdout is a color-capable terminal.
    #[must_use]
    pub fn detect() -> Self {
        if supports_color() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn vehicle_status(&self, status: VehicleStatus) -> &'static str {
        match status {
            VehicleStatus::Available => self.green,
            VehicleStatus::Busy => self.yellow,
            VehicleStatus::Dispatched => self.cyan,
        }
    }

    pub fn incident_status(&self, status: IncidentStatus) -> &'static str {
        match status {
            IncidentStatus::Pending => self.yellow,
            IncidentStatus::Dispatched | IncidentStatus::InProgress => self.cyan,
            IncidentStatus::Resolved => self.green,
            IncidentStatus::Cancelled => self.gray,
        }
    }

    pub fn priority(&self, priority: IncidentPriority) -> &'static str {
        match priority {
            IncidentPriority::Low => self.gray,
            IncidentPriority::Medium => "",
            IncidentPriority::High => self.red,
            IncidentPriority::Critical => self.alert,
        }
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::detect()
    }
}

/// Check whether stdout should receive ANSI color codes.
///
/// Respects the `NO_COLOR` convention (https://no-color.org/) and
/// `TERM=dumb`, and never colors output that is not a terminal.
pub fn supports_color() -> bool {
    use std::io::IsTerminal;

    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }
    std::io::stdout().is_terminal()
}

/// Render meters as `850 m` or `3.42 km`.
pub fn format_distance(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.2} km", meters / 1_000.0)
    }
}

/// Render seconds as `45 s`, `7 min 12 s` or `1 h 05 min`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as u64;
    if total < 60 {
        format!("{} s", total)
    } else if total < 3_600 {
        format!("{} min {:02} s", total / 60, total % 60)
    } else {
        format!("{} h {:02} min", total / 3_600, (total % 3_600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_palette_has_no_escapes() {
        let palette = ColorPalette::plain();
        assert_eq!(palette.vehicle_status(VehicleStatus::Available), "");
        assert_eq!(palette.priority(IncidentPriority::Critical), "");
    }

    #[test]
    fn colored_palette_maps_statuses() {
        let palette = ColorPalette::colored();
        assert_eq!(palette.vehicle_status(VehicleStatus::Available), colors::GREEN);
        assert_eq!(palette.incident_status(IncidentStatus::Cancelled), colors::GRAY);
        assert_eq!(palette.priority(IncidentPriority::Critical), colors::ALERT);
    }

    #[test]
    fn distance_formatting() {
        assert_eq!(format_distance(849.6), "850 m");
        assert_eq!(format_distance(3_421.0), "3.42 km");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(44.6), "45 s");
        assert_eq!(format_duration(432.0), "7 min 12 s");
        assert_eq!(format_duration(3_900.0), "1 h 05 min");
    }
}
