//! Attendance QR scanner
//!
//! Scanning core for the student attendance flow: acquire a rear-facing
//! camera, decode QR codes continuously, submit each scanned token to the
//! attendance endpoint at most once per scan event, report the verdict, and
//! release the camera deterministically.
//!
//! # Flow
//!
//! Camera acquisition → decode loop → submission gate → remote validation →
//! outcome reporting. Teardown reverses acquisition.
//!
//! # Module Structure
//!
//! - `camera`: Camera devices and media streams (stub, still image, V4L2)
//! - `decode`: QR decoders and the cancellable decode loop
//! - `gate`: Single-flight submission gate with post-completion cooldown
//! - `validate`: Attendance endpoint client
//! - `outcome`: Notification and navigation capabilities
//! - `session`: The scan session state machine tying it together
//! - `config`: File + environment configuration
//! - `ui`: Terminal stages and notifications for the binary

pub mod camera;
pub mod config;
pub mod decode;
pub mod error;
pub mod frame;
pub mod gate;
pub mod outcome;
pub mod session;
pub mod token;
pub mod ui;
pub mod validate;

pub use camera::{
    open_camera, CameraDevice, CameraRequest, FacingMode, LiveTracks, MediaStream, StubCamera,
    VideoTrack,
};
pub use config::{CameraSettings, ScannerConfig};
#[cfg(feature = "decode-rqrr")]
pub use decode::RqrrDecoder;
pub use decode::{DecodeAttempt, DecodeLoop, QrDecoder, ScriptedDecoder};
pub use error::{CameraError, ValidationError};
pub use frame::Frame;
pub use gate::{GateState, SubmissionGate, DEFAULT_COOLDOWN};
pub use outcome::{report_outcome, Destination, LogSink, Navigator, OutcomeSink};
pub use session::{ScanSession, SessionCapabilities, SessionState, SessionStats, StepOutcome};
pub use token::ScanToken;
pub use validate::{AttendanceResponse, HttpValidator, ValidationResult, Validator};
