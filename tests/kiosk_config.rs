use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use ktm_kiosk::config::{ConfigOverrides, KioskConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "KTM_CONFIG",
        "KTM_API_BASE",
        "KTM_CAMERA",
        "KTM_SCAN_INTERVAL_MS",
        "KTM_OVERLAY_PATH",
        "KTM_STATIONS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_toml_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
        stations = ["LabA", "LabB"]
        overlay_path = "/tmp/ktm-overlay.png"

        [api]
        base_url = "http://scanner.lab:8000/"
        timeout_secs = 15

        [camera]
        uri = "stub://front_desk"
        width = 640
        height = 480
        warmup_ms = 250

        [scan]
        interval_ms = 750
        jpeg_quality = 70
        confidence_threshold = 90.0
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("KTM_CONFIG", file.path());
    std::env::set_var("KTM_CAMERA", "http://10.0.0.5:81/stream");
    std::env::set_var("KTM_SCAN_INTERVAL_MS", "1000");

    let cfg = KioskConfig::load(None).expect("load config");

    assert_eq!(cfg.api.scan_url(), "http://scanner.lab:8000/api/v1/scan");
    assert_eq!(cfg.api.submit_url(), "http://scanner.lab:8000/api/v1/submit");
    assert_eq!(cfg.api.timeout, Some(Duration::from_secs(15)));
    assert_eq!(cfg.camera.uri, "http://10.0.0.5:81/stream");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.camera.warmup, Duration::from_millis(250));
    assert_eq!(cfg.scan.interval, Duration::from_millis(1000));
    assert_eq!(cfg.scan.jpeg_quality, 70);
    assert_eq!(cfg.scan.confidence_threshold, 90.0);
    assert_eq!(cfg.stations, vec!["LabA", "LabB"]);
    assert_eq!(
        cfg.overlay_path.as_deref(),
        Some(std::path::Path::new("/tmp/ktm-overlay.png"))
    );

    clear_env();
}

#[test]
fn loads_json_config_from_explicit_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "api": {"base_url": "https://kiosk.example"},
        "scan": {"confidence_threshold": 80}
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("KTM_STATIONS", "Lab 1, Lab 2,,Lab 1");

    let cfg = KioskConfig::load(Some(file.path())).expect("load config");

    assert_eq!(cfg.api.scan_url(), "https://kiosk.example/api/v1/scan");
    assert_eq!(cfg.scan.confidence_threshold, 80.0);
    assert_eq!(cfg.scan.interval, Duration::from_millis(500));
    assert_eq!(cfg.camera.uri, "/dev/video0");
    assert_eq!(cfg.stations, vec!["Lab 1", "Lab 2"]);

    clear_env();
}

#[test]
fn rejects_invalid_interval_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("KTM_SCAN_INTERVAL_MS", "soon");
    assert!(KioskConfig::load(None).is_err());

    std::env::set_var("KTM_SCAN_INTERVAL_MS", "0");
    assert!(KioskConfig::load(None).is_err());

    clear_env();
}

#[test]
fn rejects_unreadable_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");
    let err = KioskConfig::load(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}

#[test]
fn command_line_overrides_win_and_are_validated() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("KTM_API_BASE", "http://env.lab:8000");
    std::env::set_var("KTM_CAMERA", "stub://env");

    let overrides = ConfigOverrides {
        camera: Some("stub://flag".to_string()),
        api_base: Some("https://flag.lab".to_string()),
        overlay_path: Some("/tmp/flag-overlay.png".into()),
    };
    let cfg = KioskConfig::load_with_overrides(None, &overrides).expect("load config");
    assert_eq!(cfg.camera.uri, "stub://flag");
    assert_eq!(cfg.api.submit_url(), "https://flag.lab/api/v1/submit");
    assert_eq!(
        cfg.overlay_path.as_deref(),
        Some(std::path::Path::new("/tmp/flag-overlay.png"))
    );

    for bad in ["ftp://x", "garbage"] {
        let overrides = ConfigOverrides {
            api_base: Some(bad.to_string()),
            ..ConfigOverrides::default()
        };
        assert!(
            KioskConfig::load_with_overrides(None, &overrides).is_err(),
            "{bad} accepted"
        );
    }

    clear_env();
}
