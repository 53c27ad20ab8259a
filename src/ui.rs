//! Terminal presentation for the scanner binary.
//!
//! Long-running phases (camera acquisition, waiting for a code) get a
//! spinner on a TTY and a plain `==>` line otherwise. Notifications are
//! printed as they arrive and never block the session.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::outcome::OutcomeSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Shown in place of the video when the camera cannot be used.
    pub fn camera_unavailable(&self, message: &str) {
        eprintln!("✘ {}", message);
    }

    pub fn sink(&self) -> TerminalSink {
        TerminalSink { ui: self.clone() }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("{} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("    {message}");
        }
    }
}

/// Notification sink writing to stderr.
pub struct TerminalSink {
    ui: Ui,
}

impl OutcomeSink for TerminalSink {
    fn report_success(&mut self, message: &str) {
        if self.ui.pretty() {
            eprintln!("\x1b[32m✔ {}\x1b[0m", message);
        } else {
            eprintln!("✔ {}", message);
        }
    }

    fn report_failure(&mut self, message: &str) {
        if self.ui.pretty() {
            eprintln!("\x1b[31m✘ {}\x1b[0m", message);
        } else {
            eprintln!("✘ {}", message);
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_flag_disables_pretty_output_on_tty() {
        assert!(!Ui::from_args(Some("plain"), true).pretty());
        assert!(Ui::from_args(None, true).pretty());
        assert!(!Ui::from_args(Some("pretty"), false).pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
