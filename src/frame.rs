//! Video frames handed from camera tracks to decoders.
//!
//! Frames are greyscale: QR decoding only needs luminance, so tracks convert
//! at capture time and decoders never see colour data.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

/// One captured greyscale frame.
pub struct Frame {
    /// Row-major luma samples, `width * height` bytes.
    luma: Vec<u8>,
    pub width: u32,
    pub height: u32,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a luma buffer. The buffer length must match the dimensions.
    pub fn from_luma(luma: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize) * (height as usize);
        if luma.len() != expected {
            return Err(anyhow!(
                "luma buffer is {} bytes; expected {} for {}x{}",
                luma.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            luma,
            width,
            height,
            captured_at: Instant::now(),
        })
    }

    /// Convert packed RGB24 to luma (BT.601 integer weights).
    pub fn from_rgb(rgb: &[u8], width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * 3;
        if rgb.len() < expected {
            return Err(anyhow!(
                "rgb buffer is {} bytes; expected at least {} for {}x{}",
                rgb.len(),
                expected,
                width,
                height
            ));
        }
        let luma = rgb[..expected]
            .chunks_exact(3)
            .map(|px| {
                let y = 77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32;
                (y >> 8) as u8
            })
            .collect();
        Self::from_luma(luma, width, height)
    }

    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    /// Luma sample at `(x, y)`. Out-of-bounds reads return 0.
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.luma[(y as usize) * (self.width as usize) + x as usize]
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
