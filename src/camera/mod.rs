//! Camera acquisition.
//!
//! A `CameraDevice` turns a `CameraRequest` into a `MediaStream`: a set of
//! live `VideoTrack`s that hold the capture hardware until stopped.
//!
//! Backends:
//! - Synthetic stub devices (`stub://...`), always available
//! - Still images looped as video (`file://...`, feature: camera-file)
//! - USB/V4L2 devices (`auto` or `/dev/videoN`, feature: camera-v4l2)
//!
//! Acquisition failures are classified into `CameraError` at this layer so
//! the session never has to inspect backend-specific errors.

#[cfg(feature = "camera-file")]
pub mod file;
pub mod stub;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::config::CameraSettings;
use crate::error::CameraError;
use crate::frame::Frame;

#[cfg(feature = "camera-file")]
pub use file::ImageCamera;
pub use stub::{LiveTracks, StubCamera};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

/// Which way the requested camera should face.
///
/// This is a preference: a device facing the other way is used when nothing
/// better exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera, pointed away from the student.
    Environment,
    /// Front camera.
    User,
}

impl FromStr for FacingMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "environment" | "rear" | "back" => Ok(FacingMode::Environment),
            "user" | "front" => Ok(FacingMode::User),
            other => Err(anyhow!(
                "unknown camera facing '{}'; expected environment or user",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CameraRequest {
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl From<&CameraSettings> for CameraRequest {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            facing: settings.facing,
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
        }
    }
}

impl Default for CameraRequest {
    fn default() -> Self {
        Self::from(&CameraSettings::default())
    }
}

/// A live video track. Holds its share of the camera until `stop` is called.
pub trait VideoTrack {
    fn label(&self) -> &str;

    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` once the track has ended or was stopped.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device. Idempotent.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// A source of video streams.
pub trait CameraDevice {
    fn name(&self) -> &str;

    fn acquire(&mut self, request: &CameraRequest) -> Result<MediaStream, CameraError>;
}

/// Tracks handed out by one acquisition.
///
/// Dropping the stream stops every track, so a stream that is lost on an
/// error path still releases the camera.
pub struct MediaStream {
    label: String,
    tracks: Vec<Box<dyn VideoTrack>>,
}

impl MediaStream {
    pub fn new(label: impl Into<String>, tracks: Vec<Box<dyn VideoTrack>>) -> Self {
        Self {
            label: label.into(),
            tracks,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// First track that is still live.
    pub fn video_track(&mut self) -> Option<&mut (dyn VideoTrack + 'static)> {
        self.tracks
            .iter_mut()
            .find(|track| track.is_live())
            .map(|track| &mut **track)
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|track| track.is_live()).count()
    }

    /// Stop every track. Returns how many were still live.
    pub fn stop_all(&mut self) -> usize {
        let mut stopped = 0;
        for track in self.tracks.iter_mut() {
            if track.is_live() {
                track.stop();
                stopped += 1;
            }
        }
        stopped
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("label", &self.label)
            .field("tracks", &self.tracks.len())
            .field("live", &self.live_track_count())
            .finish()
    }
}

/// Pick a camera backend from the configured device string.
pub fn open_camera(settings: &CameraSettings) -> Result<Box<dyn CameraDevice>> {
    let device = settings.device.as_str();
    if device.starts_with("stub://") {
        return Ok(Box::new(StubCamera::from_url(device)?));
    }
    if let Some(path) = device.strip_prefix("file://") {
        #[cfg(feature = "camera-file")]
        {
            return Ok(Box::new(ImageCamera::new(path)));
        }
        #[cfg(not(feature = "camera-file"))]
        {
            anyhow::bail!("image source {} requires the camera-file feature", path)
        }
    }
    #[cfg(feature = "camera-v4l2")]
    {
        Ok(Box::new(V4l2Camera::new(device)))
    }
    #[cfg(not(feature = "camera-v4l2"))]
    {
        anyhow::bail!("camera device {} requires the camera-v4l2 feature", device)
    }
}

/// Minimum spacing between frames for a target rate.
pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// Whether a frame captured at `now` should be kept under `interval` spacing.
pub(crate) fn frame_due(last_frame_at: Option<Instant>, interval: Duration, now: Instant) -> bool {
    match last_frame_at {
        Some(last) => now.saturating_duration_since(last) >= interval,
        None => true,
    }
}
