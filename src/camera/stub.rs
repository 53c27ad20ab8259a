//! Synthetic camera for tests and demos.
//!
//! `stub://<name>` devices always acquire successfully and produce a moving
//! gradient. A few reserved names reproduce acquisition failures:
//!
//! | url              | failure                        |
//! |------------------|--------------------------------|
//! | `stub://denied`  | `CameraError::PermissionDenied` |
//! | `stub://missing` | `CameraError::NotFound`         |
//! | `stub://broken`  | `CameraError::Unavailable`      |
//!
//! Every track handed out is counted in a shared `LiveTracks` handle, so
//! callers can check that the "hardware" was released after the camera
//! itself has been moved into a session.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{frame_interval, CameraDevice, CameraRequest, FacingMode, MediaStream, VideoTrack};
use crate::error::CameraError;
use crate::frame::Frame;

/// Shared count of stub tracks that have not been stopped yet.
#[derive(Clone, Debug, Default)]
pub struct LiveTracks(Arc<AtomicUsize>);

impl LiveTracks {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct StubCamera {
    name: String,
    failure: Option<CameraError>,
    frame_limit: Option<u64>,
    paced: bool,
    live: LiveTracks,
    acquisitions: u64,
}

impl StubCamera {
    /// Unpaced stub that never fails. Frames are produced as fast as they are read.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: None,
            frame_limit: None,
            paced: false,
            live: LiveTracks::default(),
            acquisitions: 0,
        }
    }

    /// Build from a `stub://` url. Paced at the requested frame rate.
    pub fn from_url(url: &str) -> Result<Self> {
        let name = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("stub camera url must start with stub://"))?;
        let failure = match name {
            "denied" => Some(CameraError::PermissionDenied),
            "missing" => Some(CameraError::NotFound),
            "broken" => Some(CameraError::Unavailable(
                "stub device reported a fault".to_string(),
            )),
            _ => None,
        };
        let mut camera = Self::new(url);
        camera.failure = failure;
        camera.paced = true;
        Ok(camera)
    }

    pub fn failing(name: impl Into<String>, failure: CameraError) -> Self {
        let mut camera = Self::new(name);
        camera.failure = Some(failure);
        camera
    }

    /// End each track after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn live_tracks(&self) -> LiveTracks {
        self.live.clone()
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }
}

impl CameraDevice for StubCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self, request: &CameraRequest) -> Result<MediaStream, CameraError> {
        if let Some(failure) = &self.failure {
            log::warn!("StubCamera: {} refused acquisition: {}", self.name, failure);
            return Err(failure.clone());
        }
        self.acquisitions += 1;
        if request.facing == FacingMode::User {
            log::debug!("StubCamera: {} has no front camera; using rear", self.name);
        }
        let track = SyntheticTrack::new(
            format!("{}#{}", self.name, self.acquisitions),
            request,
            self.frame_limit,
            self.paced,
            self.live.clone(),
        );
        log::info!(
            "StubCamera: acquired {} ({}x{})",
            self.name,
            request.width,
            request.height
        );
        Ok(MediaStream::new(self.name.clone(), vec![Box::new(track)]))
    }
}

struct SyntheticTrack {
    label: String,
    width: u32,
    height: u32,
    interval: Duration,
    paced: bool,
    frame_limit: Option<u64>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    live: bool,
    counter: LiveTracks,
}

impl SyntheticTrack {
    fn new(
        label: String,
        request: &CameraRequest,
        frame_limit: Option<u64>,
        paced: bool,
        counter: LiveTracks,
    ) -> Self {
        counter.0.fetch_add(1, Ordering::SeqCst);
        Self {
            label,
            width: request.width,
            height: request.height,
            interval: frame_interval(request.target_fps),
            paced,
            frame_limit,
            frame_count: 0,
            last_frame_at: None,
            live: true,
            counter,
        }
    }

    fn generate_luma(&self) -> Vec<u8> {
        let pixel_count = (self.width * self.height) as usize;
        (0..pixel_count)
            .map(|i| ((i as u64 + self.frame_count) % 256) as u8)
            .collect()
    }
}

impl VideoTrack for SyntheticTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.live {
            return Ok(None);
        }
        if let Some(limit) = self.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        if self.paced {
            if let Some(last) = self.last_frame_at {
                let elapsed = last.elapsed();
                if elapsed < self.interval {
                    std::thread::sleep(self.interval - elapsed);
                }
            }
        }
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        let frame = Frame::from_luma(self.generate_luma(), self.width, self.height)?;
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.counter.0.fetch_sub(1, Ordering::SeqCst);
            log::debug!("StubCamera: stopped track {}", self.label);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for SyntheticTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_request() -> CameraRequest {
        CameraRequest {
            width: 8,
            height: 6,
            ..CameraRequest::default()
        }
    }

    #[test]
    fn stub_camera_produces_frames() -> Result<()> {
        let mut camera = StubCamera::new("stub://test");
        let mut stream = camera.acquire(&small_request())?;
        let track = stream.video_track().expect("live track");
        let frame = track.next_frame()?.expect("frame");
        assert_eq!(frame.width, 8);
        assert_eq!(frame.height, 6);
        assert_eq!(frame.luma().len(), 48);
        Ok(())
    }

    #[test]
    fn reserved_names_reproduce_failures() -> Result<()> {
        let cases = [
            ("stub://denied", CameraError::PermissionDenied),
            ("stub://missing", CameraError::NotFound),
        ];
        for (url, expected) in cases {
            let mut camera = StubCamera::from_url(url)?;
            let err = camera.acquire(&small_request()).unwrap_err();
            assert_eq!(err, expected);
            assert_eq!(camera.live_tracks().count(), 0);
        }
        let mut broken = StubCamera::from_url("stub://broken")?;
        assert!(matches!(
            broken.acquire(&small_request()),
            Err(CameraError::Unavailable(_))
        ));
        Ok(())
    }

    #[test]
    fn stopping_and_dropping_release_tracks() -> Result<()> {
        let mut camera = StubCamera::new("stub://test");
        let live = camera.live_tracks();

        let mut first = camera.acquire(&small_request())?;
        let second = camera.acquire(&small_request())?;
        assert_eq!(live.count(), 2);

        assert_eq!(first.stop_all(), 1);
        assert_eq!(first.stop_all(), 0);
        assert_eq!(live.count(), 1);

        drop(second);
        assert_eq!(live.count(), 0);
        Ok(())
    }

    #[test]
    fn frame_limit_ends_track() -> Result<()> {
        let mut camera = StubCamera::new("stub://short").with_frame_limit(2);
        let mut stream = camera.acquire(&small_request())?;
        let track = stream.video_track().expect("live track");
        assert!(track.next_frame()?.is_some());
        assert!(track.next_frame()?.is_some());
        assert!(track.next_frame()?.is_none());
        Ok(())
    }
}
