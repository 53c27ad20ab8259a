use anyhow::Result;
use std::collections::VecDeque;

use super::QrDecoder;
use crate::frame::Frame;

/// Decoder that replays a fixed script, one entry per frame.
///
/// Pairs with stub cameras, whose synthetic frames contain no real codes.
/// Once the script is exhausted every frame decodes to nothing, unless a
/// repeating payload was configured.
#[derive(Debug, Default)]
pub struct ScriptedDecoder {
    script: VecDeque<Option<String>>,
    repeat: Option<String>,
}

impl ScriptedDecoder {
    /// A payload on each of the first frames.
    pub fn new<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: payloads.into_iter().map(|p| Some(p.into())).collect(),
            repeat: None,
        }
    }

    /// Explicit per-frame script; `None` entries are frames without a code.
    pub fn from_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            script: frames.into_iter().map(|f| f.map(Into::into)).collect(),
            repeat: None,
        }
    }

    /// The same code held in front of the camera on every frame.
    pub fn repeating(payload: impl Into<String>) -> Self {
        Self {
            script: VecDeque::new(),
            repeat: Some(payload.into()),
        }
    }
}

impl QrDecoder for ScriptedDecoder {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn decode(&mut self, _frame: &Frame) -> Result<Option<String>> {
        match self.script.pop_front() {
            Some(entry) => Ok(entry),
            None => Ok(self.repeat.clone()),
        }
    }
}
