use serde::Serialize;
use sha2::{Digest, Sha256};

/// Opaque payload decoded from an attendance QR code.
///
/// The backend is the only judge of validity; the client only guarantees the
/// token is non-empty. `Debug` prints a fingerprint so tokens never end up
/// verbatim in logs.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScanToken(String);

impl ScanToken {
    /// Returns `None` for empty payloads, which are treated as "no code".
    pub fn new(payload: impl Into<String>) -> Option<Self> {
        let payload = payload.into();
        if payload.is_empty() {
            None
        } else {
            Some(Self(payload))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 prefix for correlating log lines.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl std::fmt::Debug for ScanToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScanToken({})", self.fingerprint())
    }
}
