//! Still-image camera.
//!
//! Loops a PNG/JPEG as a video track. Useful for kiosks that receive codes
//! as screenshots and for exercising the real decoder without hardware.

use anyhow::Result;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{frame_interval, CameraDevice, CameraRequest, MediaStream, VideoTrack};
use crate::error::CameraError;
use crate::frame::Frame;

pub struct ImageCamera {
    path: PathBuf,
    name: String,
    frame_limit: Option<u64>,
}

impl ImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("file://{}", path.display()),
            path,
            frame_limit: None,
        }
    }

    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }
}

impl CameraDevice for ImageCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self, request: &CameraRequest) -> Result<MediaStream, CameraError> {
        let image = image::open(&self.path).map_err(|err| match err {
            image::ImageError::IoError(io) => CameraError::from_io(&io),
            other => CameraError::Unavailable(format!(
                "cannot decode {}: {}",
                self.path.display(),
                other
            )),
        })?;
        let luma = image.into_luma8();
        let (width, height) = luma.dimensions();
        log::info!("ImageCamera: looping {} ({}x{})", self.name, width, height);
        let track = StillTrack {
            label: self.name.clone(),
            luma: luma.into_raw(),
            width,
            height,
            interval: frame_interval(request.target_fps),
            frame_limit: self.frame_limit,
            frame_count: 0,
            last_frame_at: None,
            live: true,
        };
        Ok(MediaStream::new(self.name.clone(), vec![Box::new(track)]))
    }
}

struct StillTrack {
    label: String,
    luma: Vec<u8>,
    width: u32,
    height: u32,
    interval: Duration,
    frame_limit: Option<u64>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    live: bool,
}

impl VideoTrack for StillTrack {
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
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Some(Frame::from_luma(
            self.luma.clone(),
            self.width,
            self.height,
        )?))
    }

    fn stop(&mut self) {
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
