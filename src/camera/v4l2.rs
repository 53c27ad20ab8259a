//! V4L2 camera.
//!
//! `auto` enumerates `/dev/video*` and honours the facing preference by
//! matching device names; an explicit node path is opened as-is. Frames are
//! captured through an mmap stream and converted to luma in place.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{frame_due, frame_interval, CameraDevice, CameraRequest, FacingMode, MediaStream, VideoTrack};
use crate::error::CameraError;
use crate::frame::Frame;

const REAR_HINTS: &[&str] = &["back", "rear", "world", "environment"];
const FRONT_HINTS: &[&str] = &["front", "user", "facetime", "integrated"];

pub struct V4l2Camera {
    device: String,
}

impl V4l2Camera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    fn resolve_path(&self, facing: FacingMode) -> Result<PathBuf, CameraError> {
        if self.device != "auto" {
            return Ok(PathBuf::from(&self.device));
        }
        let nodes = v4l::context::enum_devices();
        if nodes.is_empty() {
            return Err(CameraError::NotFound);
        }
        let hints = match facing {
            FacingMode::Environment => REAR_HINTS,
            FacingMode::User => FRONT_HINTS,
        };
        let preferred = nodes.iter().find(|node| {
            node.name()
                .map(|name| {
                    let name = name.to_lowercase();
                    hints.iter().any(|hint| name.contains(hint))
                })
                .unwrap_or(false)
        });
        let node = preferred.unwrap_or(&nodes[0]);
        Ok(node.path().to_path_buf())
    }
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.device
    }

    fn acquire(&mut self, request: &CameraRequest) -> Result<MediaStream, CameraError> {
        let path = self.resolve_path(request.facing)?;
        let track = DeviceTrack::open(path.clone(), request)?;
        Ok(MediaStream::new(
            path.display().to_string(),
            vec![Box::new(track)],
        ))
    }
}

#[derive(Clone, Copy, Debug)]
enum PixelLayout {
    Grey,
    Yuyv,
    Rgb,
}

#[self_referencing]
struct CaptureState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct DeviceTrack {
    label: String,
    state: Option<CaptureState>,
    layout: PixelLayout,
    width: u32,
    height: u32,
    interval: Duration,
    frame_count: u64,
    frames_skipped: u64,
    last_frame_at: Option<Instant>,
}

impl DeviceTrack {
    fn open(path: PathBuf, request: &CameraRequest) -> Result<Self, CameraError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let label = path.display().to_string();
        let mut device = v4l::Device::with_path(&path).map_err(|err| {
            log::warn!("V4l2Camera: failed to open {}: {}", label, err);
            CameraError::from_io(&err)
        })?;

        let mut format = device.format().map_err(|err| CameraError::from_io(&err))?;
        format.width = request.width;
        format.height = request.height;
        format.fourcc = v4l::FourCC::new(b"YUYV");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Camera: failed to set format on {}: {}", label, err);
                device.format().map_err(|err| CameraError::from_io(&err))?
            }
        };

        let layout = match &format.fourcc.repr {
            b"GREY" => PixelLayout::Grey,
            b"YUYV" => PixelLayout::Yuyv,
            b"RGB3" => PixelLayout::Rgb,
            other => {
                return Err(CameraError::Unavailable(format!(
                    "unsupported pixel format {}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        if request.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(request.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Camera: failed to set fps on {}: {}", label, err);
            }
        }

        let state = CaptureStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|err| CameraError::from_io(&err))?;

        log::info!(
            "V4l2Camera: streaming {} ({}x{} {:?})",
            label,
            format.width,
            format.height,
            layout
        );

        Ok(Self {
            label,
            state: Some(state),
            layout,
            width: format.width,
            height: format.height,
            interval: frame_interval(request.target_fps),
            frame_count: 0,
            frames_skipped: 0,
            last_frame_at: None,
        })
    }
}

impl VideoTrack for DeviceTrack {
    fn label(&self) -> &str {
        &self.label
    }

    /// Frames the driver delivers faster than the target rate are dropped here.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let (width, height, layout) = (self.width, self.height, self.layout);
        let (interval, last_frame_at) = (self.interval, self.last_frame_at);
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        loop {
            let captured = state.with_mut(|fields| -> Result<Option<Frame>> {
                let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
                if !frame_due(last_frame_at, interval, Instant::now()) {
                    return Ok(None);
                }
                to_frame(buf, width, height, layout).map(Some)
            })?;
            match captured {
                Some(frame) => {
                    self.frame_count += 1;
                    self.last_frame_at = Some(Instant::now());
                    return Ok(Some(frame));
                }
                None => self.frames_skipped += 1,
            }
        }
    }

    fn stop(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Camera: released {} after {} frames ({} skipped)",
                self.label,
                self.frame_count,
                self.frames_skipped
            );
        }
    }

    fn is_live(&self) -> bool {
        self.state.is_some()
    }
}

impl Drop for DeviceTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

fn to_frame(buf: &[u8], width: u32, height: u32, layout: PixelLayout) -> Result<Frame> {
    let pixels = (width as usize) * (height as usize);
    match layout {
        PixelLayout::Grey => {
            let luma = buf
                .get(..pixels)
                .ok_or_else(|| anyhow!("short GREY buffer: {} bytes", buf.len()))?;
            Frame::from_luma(luma.to_vec(), width, height)
        }
        // Y0 U Y1 V: luma is every even byte.
        PixelLayout::Yuyv => {
            if buf.len() < pixels * 2 {
                return Err(anyhow!("short YUYV buffer: {} bytes", buf.len()));
            }
            let luma = buf[..pixels * 2].iter().step_by(2).copied().collect();
            Frame::from_luma(luma, width, height)
        }
        PixelLayout::Rgb => Frame::from_rgb(buf, width, height),
    }
}
