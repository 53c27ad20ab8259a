use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::camera::FacingMode;
use crate::outcome::Destination;

/// Path of the attendance endpoint, relative to the configured base URL.
pub const ATTENDANCE_PATH: &str = "api/v1/attendance/";

const DEFAULT_CAMERA_DEVICE: &str = "auto";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_COOLDOWN_MS: u64 = 5_000;
const DEFAULT_SUCCESS_DESTINATION: &str = "/dashboard";

#[derive(Debug, Deserialize, Default)]
struct ScannerConfigFile {
    base_url: Option<String>,
    success_destination: Option<String>,
    camera: Option<CameraConfigFile>,
    gate: Option<GateConfigFile>,
    http: Option<HttpConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    facing: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct GateConfigFile {
    cooldown_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HttpConfigFile {
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Backend origin, without a trailing slash once validated.
    pub base_url: String,
    pub camera: CameraSettings,
    pub cooldown: Duration,
    pub request_timeout: Option<Duration>,
    pub success_destination: Destination,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `auto`, a device node such as `/dev/video0`, `file://...` or `stub://...`.
    pub device: String,
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_CAMERA_DEVICE.to_string(),
            facing: FacingMode::Environment,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

impl ScannerConfig {
    /// Build a config with defaults around an explicit base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut cfg = Self::from_file(ScannerConfigFile {
            base_url: Some(base_url.to_string()),
            ..ScannerConfigFile::default()
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `SCANNER_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCANNER_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScannerConfigFile) -> Result<Self> {
        let base_url = file.base_url.unwrap_or_default();
        let success_destination = Destination::new(
            file.success_destination
                .unwrap_or_else(|| DEFAULT_SUCCESS_DESTINATION.to_string()),
        );
        let camera_file = file.camera.unwrap_or_default();
        let facing = match camera_file.facing.as_deref() {
            Some(raw) => raw.parse()?,
            None => FacingMode::Environment,
        };
        let camera = CameraSettings {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            facing,
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };
        let cooldown = Duration::from_millis(
            file.gate
                .and_then(|gate| gate.cooldown_ms)
                .unwrap_or(DEFAULT_COOLDOWN_MS),
        );
        let request_timeout = file
            .http
            .and_then(|http| http.request_timeout_ms)
            .map(Duration::from_millis);
        Ok(Self {
            base_url,
            camera,
            cooldown,
            request_timeout,
            success_destination,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(base_url) = std::env::var("SCANNER_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.base_url = base_url;
            }
        }
        if let Ok(device) = std::env::var("SCANNER_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(facing) = std::env::var("SCANNER_CAMERA_FACING") {
            if !facing.trim().is_empty() {
                self.camera.facing = facing.parse()?;
            }
        }
        if let Ok(fps) = std::env::var("SCANNER_TARGET_FPS") {
            self.camera.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("SCANNER_TARGET_FPS must be an integer"))?;
        }
        if let Ok(cooldown) = std::env::var("SCANNER_COOLDOWN_MS") {
            let millis: u64 = cooldown.parse().map_err(|_| {
                anyhow!("SCANNER_COOLDOWN_MS must be an integer number of milliseconds")
            })?;
            self.cooldown = Duration::from_millis(millis);
        }
        if let Ok(timeout) = std::env::var("SCANNER_REQUEST_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                anyhow!("SCANNER_REQUEST_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.request_timeout = Some(Duration::from_millis(millis));
        }
        if let Ok(destination) = std::env::var("SCANNER_SUCCESS_DESTINATION") {
            if !destination.trim().is_empty() {
                self.success_destination = Destination::new(destination);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let trimmed = self.base_url.trim().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(anyhow!(
                "base_url is required (set it in the config file or SCANNER_BASE_URL)"
            ));
        }
        self.base_url = trimmed;
        attendance_url(&self.base_url)?;

        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        Ok(())
    }

    /// Fully resolved attendance endpoint.
    pub fn attendance_url(&self) -> Result<Url> {
        attendance_url(&self.base_url)
    }
}

fn attendance_url(base_url: &str) -> Result<Url> {
    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
        .with_context(|| format!("invalid base_url {}", base_url))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(anyhow!(
            "base_url scheme '{}' is not supported; expected http or https",
            base.scheme()
        ));
    }
    base.join(ATTENDANCE_PATH)
        .with_context(|| format!("join attendance path onto {}", base_url))
}

fn read_config_file(path: &Path) -> Result<ScannerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
