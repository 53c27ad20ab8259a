use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use attendance_scanner::config::ScannerConfig;
use attendance_scanner::FacingMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SCANNER_CONFIG",
        "SCANNER_BASE_URL",
        "SCANNER_CAMERA_DEVICE",
        "SCANNER_CAMERA_FACING",
        "SCANNER_TARGET_FPS",
        "SCANNER_COOLDOWN_MS",
        "SCANNER_REQUEST_TIMEOUT_MS",
        "SCANNER_SUCCESS_DESTINATION",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "base_url": "https://attend.example.edu/",
            "success_destination": "/student/home",
            "camera": {
                "device": "stub://lecture-hall",
                "facing": "front",
                "width": 800,
                "height": 600,
                "target_fps": 12
            },
            "gate": {
                "cooldown_ms": 3000
            },
            "http": {
                "request_timeout_ms": 8000
            }
        }"#,
    );

    std::env::set_var("SCANNER_CONFIG", file.path());
    std::env::set_var("SCANNER_CAMERA_FACING", "environment");
    std::env::set_var("SCANNER_COOLDOWN_MS", "4500");

    let cfg = ScannerConfig::load().expect("load config");

    assert_eq!(cfg.base_url, "https://attend.example.edu");
    assert_eq!(cfg.success_destination.as_str(), "/student/home");
    assert_eq!(cfg.camera.device, "stub://lecture-hall");
    assert_eq!(cfg.camera.facing, FacingMode::Environment);
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.camera.target_fps, 12);
    assert_eq!(cfg.cooldown, Duration::from_millis(4500));
    assert_eq!(cfg.request_timeout, Some(Duration::from_secs(8)));
    assert_eq!(
        cfg.attendance_url().expect("endpoint").as_str(),
        "https://attend.example.edu/api/v1/attendance/"
    );

    clear_env();
}

#[test]
fn env_alone_is_enough_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCANNER_BASE_URL", "http://127.0.0.1:8000");
    std::env::set_var("SCANNER_CAMERA_DEVICE", "/dev/video2");
    std::env::set_var("SCANNER_SUCCESS_DESTINATION", "/attendance/done");

    let cfg = ScannerConfig::load().expect("load config");

    assert_eq!(cfg.base_url, "http://127.0.0.1:8000");
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!(cfg.success_destination.as_str(), "/attendance/done");
    assert_eq!(cfg.cooldown, Duration::from_secs(5));
    assert_eq!(cfg.request_timeout, None);

    clear_env();
}

#[test]
fn missing_base_url_fails_to_load() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "camera": { "device": "stub://front" } }"#);
    std::env::set_var("SCANNER_CONFIG", file.path());

    let err = ScannerConfig::load().expect_err("base_url is mandatory");
    assert!(err.to_string().contains("base_url is required"));

    clear_env();
}

#[test]
fn malformed_numeric_overrides_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCANNER_BASE_URL", "http://localhost:8000");
    std::env::set_var("SCANNER_COOLDOWN_MS", "five seconds");
    let err = ScannerConfig::load().expect_err("cooldown must be numeric");
    assert!(err.to_string().contains("SCANNER_COOLDOWN_MS"));

    std::env::remove_var("SCANNER_COOLDOWN_MS");
    std::env::set_var("SCANNER_TARGET_FPS", "0");
    let err = ScannerConfig::load().expect_err("zero fps is invalid");
    assert!(err.to_string().contains("target_fps"));

    clear_env();
}

#[test]
fn unknown_facing_mode_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCANNER_BASE_URL", "http://localhost:8000");
    std::env::set_var("SCANNER_CAMERA_FACING", "sideways");
    assert!(ScannerConfig::load().is_err());

    clear_env();
}
