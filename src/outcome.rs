//! Outcome reporting and navigation capabilities.
//!
//! The scanning core never talks to a UI directly. It reports through an
//! `OutcomeSink` (transient notices) and moves the user on through a
//! `Navigator`. Both are fire-and-forget.

use crate::validate::{FailureReason, ValidationResult};

pub const SUCCESS_MESSAGE: &str = "Attendance marked successfully!";
pub const INVALID_CODE_MESSAGE: &str = "Invalid QR code. Please scan a valid code.";

/// Where the owner of a session is sent after a successful scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination(String);

impl Destination {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transient notifications.
pub trait OutcomeSink {
    fn report_success(&mut self, message: &str);
    fn report_failure(&mut self, message: &str);
}

pub trait Navigator {
    fn go_to(&mut self, destination: &Destination);
}

/// Sink that only writes to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl OutcomeSink for LogSink {
    fn report_success(&mut self, message: &str) {
        log::info!("{}", message);
    }

    fn report_failure(&mut self, message: &str) {
        log::warn!("{}", message);
    }
}

/// Notify, and navigate on success. Returns whether navigation happened.
pub fn report_outcome(
    result: &ValidationResult,
    sink: &mut dyn OutcomeSink,
    navigator: &mut dyn Navigator,
    destination: &Destination,
) -> bool {
    match result {
        ValidationResult::Success(_) => {
            sink.report_success(SUCCESS_MESSAGE);
            navigator.go_to(destination);
            true
        }
        ValidationResult::Failure(reason) => {
            match reason {
                FailureReason::Rejected(response) => log::info!(
                    "attendance rejected (status {})",
                    response.status.as_deref().unwrap_or("missing")
                ),
                FailureReason::Error(err) => log::warn!("attendance validation failed: {}", err),
            }
            sink.report_failure(INVALID_CODE_MESSAGE);
            false
        }
    }
}
