use thiserror::Error;

pub const PERMISSION_DENIED_MESSAGE: &str =
    "Camera access denied. Please allow access to use this feature.";
pub const NOT_FOUND_MESSAGE: &str = "No camera found on this device.";
pub const UNAVAILABLE_MESSAGE: &str =
    "Unable to access the camera. Please check your device settings.";

/// Camera acquisition failures. All of them are terminal for a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    NotFound,

    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

impl CameraError {
    /// Message shown to the student in place of the video sink.
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied => PERMISSION_DENIED_MESSAGE,
            CameraError::NotFound => NOT_FOUND_MESSAGE,
            CameraError::Unavailable(_) => UNAVAILABLE_MESSAGE,
        }
    }

    /// Classify an OS-level error raised while opening a capture device.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
            std::io::ErrorKind::NotFound => CameraError::NotFound,
            _ => CameraError::Unavailable(err.to_string()),
        }
    }
}

/// Failures of the remote validation call.
///
/// The student sees the same "invalid code" notice for every variant; the
/// distinction only exists for logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("attendance endpoint returned status {0}")]
    Status(u16),

    #[error("unparseable response body: {0}")]
    Body(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_camera_taxonomy() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "EACCES");
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "ENOENT");
        let busy = std::io::Error::new(std::io::ErrorKind::Other, "EBUSY");

        assert_eq!(CameraError::from_io(&denied), CameraError::PermissionDenied);
        assert_eq!(CameraError::from_io(&missing), CameraError::NotFound);
        assert!(matches!(
            CameraError::from_io(&busy),
            CameraError::Unavailable(detail) if detail.contains("EBUSY")
        ));
    }

    #[test]
    fn each_camera_error_has_a_distinct_message() {
        let messages = [
            CameraError::PermissionDenied.user_message(),
            CameraError::NotFound.user_message(),
            CameraError::Unavailable("x".into()).user_message(),
        ];
        assert_ne!(messages[0], messages[1]);
        assert_ne!(messages[1], messages[2]);
        assert_ne!(messages[0], messages[2]);
    }
}
