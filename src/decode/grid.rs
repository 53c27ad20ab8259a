use anyhow::Result;

use super::QrDecoder;
use crate::frame::Frame;

/// QR decoder backed by `rqrr`.
///
/// Every grid found in the frame is tried in detection order; the first one
/// that decodes wins. Grids that fail error correction are skipped.
#[derive(Debug, Default)]
pub struct RqrrDecoder {
    grids_rejected: u64,
}

impl RqrrDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grids_rejected(&self) -> u64 {
        self.grids_rejected
    }
}

impl QrDecoder for RqrrDecoder {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn decode(&mut self, frame: &Frame) -> Result<Option<String>> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
                frame.pixel(x as u32, y as u32)
            });
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, content)) => return Ok(Some(content)),
                Err(err) => {
                    self.grids_rejected += 1;
                    log::debug!("rqrr: grid rejected: {}", err);
                }
            }
        }
        Ok(None)
    }
}
