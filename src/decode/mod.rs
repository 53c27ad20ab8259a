//! Continuous QR decoding over a live stream.
//!
//! `DecodeLoop` is a one-shot subscription: `start` it once the stream is
//! bound, pull attempts from it, `stop` it on teardown. A stopped loop never
//! runs again; a fresh session builds a fresh loop.

#[cfg(feature = "decode-rqrr")]
mod grid;
mod scripted;

use anyhow::{anyhow, Result};

use crate::camera::MediaStream;
use crate::frame::Frame;
use crate::token::ScanToken;

#[cfg(feature = "decode-rqrr")]
pub use grid::RqrrDecoder;
pub use scripted::ScriptedDecoder;

/// Consecutive frame read failures tolerated before the stream is treated as ended.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 10;

/// Extracts a QR payload from a frame.
pub trait QrDecoder {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when no code is visible in the frame.
    fn decode(&mut self, frame: &Frame) -> Result<Option<String>>;
}

/// Outcome of analysing one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeAttempt {
    NoCode,
    Payload(ScanToken),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopState {
    Ready,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames_analyzed: u64,
    pub codes_found: u64,
    pub read_errors: u64,
}

pub struct DecodeLoop {
    decoder: Box<dyn QrDecoder>,
    state: LoopState,
    stats: DecodeStats,
    consecutive_read_errors: u32,
}

impl DecodeLoop {
    pub fn new(decoder: Box<dyn QrDecoder>) -> Self {
        Self {
            decoder,
            state: LoopState::Ready,
            stats: DecodeStats::default(),
            consecutive_read_errors: 0,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state {
            LoopState::Ready => {
                self.state = LoopState::Running;
                log::debug!("decode loop started ({})", self.decoder.name());
                Ok(())
            }
            LoopState::Running => Ok(()),
            LoopState::Stopped => Err(anyhow!("decode loop was stopped and cannot restart")),
        }
    }

    pub fn stop(&mut self) {
        if self.state != LoopState::Stopped {
            log::debug!(
                "decode loop stopped after {} frames, {} codes",
                self.stats.frames_analyzed,
                self.stats.codes_found
            );
        }
        self.state = LoopState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Analyse the next frame of `stream`.
    ///
    /// Returns `None` when the loop is not running or the stream has ended.
    pub fn poll(&mut self, stream: &mut MediaStream) -> Option<DecodeAttempt> {
        if !self.is_running() {
            return None;
        }
        let track = stream.video_track()?;
        let frame = match track.next_frame() {
            Ok(Some(frame)) => {
                self.consecutive_read_errors = 0;
                frame
            }
            Ok(None) => {
                log::info!("video track {} ended", track.label());
                return None;
            }
            Err(err) => {
                self.stats.read_errors += 1;
                self.consecutive_read_errors += 1;
                log::warn!("frame read failed on {}: {:#}", track.label(), err);
                if self.consecutive_read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    log::error!(
                        "giving up on {} after {} consecutive read failures",
                        track.label(),
                        self.consecutive_read_errors
                    );
                    return None;
                }
                return Some(DecodeAttempt::NoCode);
            }
        };

        self.stats.frames_analyzed += 1;
        match self.decoder.decode(&frame) {
            Ok(Some(payload)) => match ScanToken::new(payload) {
                Some(token) => {
                    self.stats.codes_found += 1;
                    Some(DecodeAttempt::Payload(token))
                }
                None => Some(DecodeAttempt::NoCode),
            },
            Ok(None) => Some(DecodeAttempt::NoCode),
            Err(err) => {
                log::debug!("decoder {} rejected frame: {:#}", self.decoder.name(), err);
                Some(DecodeAttempt::NoCode)
            }
        }
    }

    /// Lazy sequence of attempts; ends only when the loop stops or the stream ends.
    pub fn attempts<'a>(&'a mut self, stream: &'a mut MediaStream) -> DecodeAttempts<'a> {
        DecodeAttempts {
            decode_loop: self,
            stream,
        }
    }
}

pub struct DecodeAttempts<'a> {
    decode_loop: &'a mut DecodeLoop,
    stream: &'a mut MediaStream,
}

impl Iterator for DecodeAttempts<'_> {
    type Item = DecodeAttempt;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode_loop.poll(self.stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraDevice, CameraRequest, StubCamera};

    fn request() -> CameraRequest {
        CameraRequest {
            width: 4,
            height: 4,
            ..CameraRequest::default()
        }
    }

    #[test]
    fn loop_yields_nothing_until_started() -> Result<()> {
        let mut camera = StubCamera::new("stub://decode");
        let mut stream = camera.acquire(&request())?;
        let mut decode_loop = DecodeLoop::new(Box::new(ScriptedDecoder::new(["abc"])));
        assert!(decode_loop.poll(&mut stream).is_none());

        decode_loop.start()?;
        let token = ScanToken::new("abc").unwrap();
        assert_eq!(
            decode_loop.poll(&mut stream),
            Some(DecodeAttempt::Payload(token))
        );
        assert_eq!(decode_loop.poll(&mut stream), Some(DecodeAttempt::NoCode));
        Ok(())
    }

    #[test]
    fn stopped_loop_cannot_restart() -> Result<()> {
        let mut decode_loop = DecodeLoop::new(Box::new(ScriptedDecoder::default()));
        decode_loop.start()?;
        decode_loop.stop();
        assert!(!decode_loop.is_running());
        assert!(decode_loop.start().is_err());
        Ok(())
    }

    #[test]
    fn attempts_end_with_the_stream() -> Result<()> {
        let mut camera = StubCamera::new("stub://decode").with_frame_limit(5);
        let mut stream = camera.acquire(&request())?;
        let mut decode_loop =
            DecodeLoop::new(Box::new(ScriptedDecoder::from_frames([None, Some(""), Some("t1")])));
        decode_loop.start()?;

        let attempts: Vec<_> = decode_loop.attempts(&mut stream).collect();
        assert_eq!(attempts.len(), 5);
        let payloads = attempts
            .iter()
            .filter(|attempt| matches!(attempt, DecodeAttempt::Payload(_)))
            .count();
        assert_eq!(payloads, 1);
        assert_eq!(decode_loop.stats().frames_analyzed, 5);
        assert_eq!(decode_loop.stats().codes_found, 1);
        Ok(())
    }

    #[test]
    fn attempts_end_when_tracks_are_stopped() -> Result<()> {
        let mut camera = StubCamera::new("stub://decode");
        let mut stream = camera.acquire(&request())?;
        let mut decode_loop = DecodeLoop::new(Box::new(ScriptedDecoder::default()));
        decode_loop.start()?;
        assert!(decode_loop.poll(&mut stream).is_some());
        stream.stop_all();
        assert!(decode_loop.poll(&mut stream).is_none());
        Ok(())
    }
}
