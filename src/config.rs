use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "http://localhost:8000";
const DEFAULT_SCAN_PATH: &str = "/api/v1/scan";
const DEFAULT_SUBMIT_PATH: &str = "/api/v1/submit";
const DEFAULT_CAMERA_URI: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_WARMUP_MS: u64 = 0;
const DEFAULT_SCAN_INTERVAL_MS: u64 = 500;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 85.0;

#[derive(Debug, Deserialize, Default)]
struct KioskConfigFile {
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    scan: Option<ScanConfigFile>,
    stations: Option<Vec<String>>,
    overlay_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    base_url: Option<String>,
    scan_path: Option<String>,
    submit_path: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    uri: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    warmup_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ScanConfigFile {
    interval_ms: Option<u64>,
    jpeg_quality: Option<u8>,
    confidence_threshold: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct KioskConfig {
    pub api: ApiSettings,
    pub camera: CameraSettings,
    pub scan: ScanSettings,
    /// Lab/station names the location selector accepts. Empty accepts any.
    pub stations: Vec<String>,
    /// Where the overlay layer is written as PNG after each render.
    pub overlay_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub scan_path: String,
    pub submit_path: String,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ApiSettings {
    pub fn scan_url(&self) -> String {
        join_url(&self.base_url, &self.scan_path)
    }

    pub fn submit_url(&self) -> String {
        join_url(&self.base_url, &self.submit_path)
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub uri: String,
    /// Preferred width. Advisory; the device may negotiate another size.
    pub width: u32,
    /// Preferred height. Advisory; the device may negotiate another size.
    pub height: u32,
    /// Synthetic cameras withhold their frame size for this long.
    pub warmup: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_CAMERA_URI.to_string(),
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            warmup: Duration::from_millis(DEFAULT_WARMUP_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub interval: Duration,
    pub jpeg_quality: u8,
    pub confidence_threshold: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings {
                base_url: DEFAULT_API_BASE.to_string(),
                scan_path: DEFAULT_SCAN_PATH.to_string(),
                submit_path: DEFAULT_SUBMIT_PATH.to_string(),
                timeout: None,
            },
            camera: CameraSettings::default(),
            scan: ScanSettings::default(),
            stations: Vec::new(),
            overlay_path: None,
        }
    }
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub camera: Option<String>,
    pub api_base: Option<String>,
    pub overlay_path: Option<PathBuf>,
}

impl KioskConfig {
    /// Load configuration from `path` (or `KTM_CONFIG`), then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_overrides(path, &ConfigOverrides::default())
    }

    /// Like `load`, with command-line overrides applied before validation.
    pub fn load_with_overrides(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let env_path = std::env::var("KTM_CONFIG").ok().map(PathBuf::from);
        let config_path = path.map(Path::to_path_buf).or(env_path);
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: KioskConfigFile) -> Self {
        let defaults = Self::default();
        let api = file.api.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let scan = file.scan.unwrap_or_default();
        Self {
            api: ApiSettings {
                base_url: api.base_url.unwrap_or(defaults.api.base_url),
                scan_path: api.scan_path.unwrap_or(defaults.api.scan_path),
                submit_path: api.submit_path.unwrap_or(defaults.api.submit_path),
                timeout: api.timeout_secs.map(Duration::from_secs),
            },
            camera: CameraSettings {
                uri: camera.uri.unwrap_or(defaults.camera.uri),
                width: camera.width.unwrap_or(defaults.camera.width),
                height: camera.height.unwrap_or(defaults.camera.height),
                warmup: camera
                    .warmup_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.camera.warmup),
            },
            scan: ScanSettings {
                interval: scan
                    .interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.scan.interval),
                jpeg_quality: scan.jpeg_quality.unwrap_or(defaults.scan.jpeg_quality),
                confidence_threshold: scan
                    .confidence_threshold
                    .unwrap_or(defaults.scan.confidence_threshold),
            },
            stations: file.stations.unwrap_or_default(),
            overlay_path: file.overlay_path,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(base) = std::env::var("KTM_API_BASE") {
            if !base.trim().is_empty() {
                self.api.base_url = base.trim().to_string();
            }
        }
        if let Ok(uri) = std::env::var("KTM_CAMERA") {
            if !uri.trim().is_empty() {
                self.camera.uri = uri.trim().to_string();
            }
        }
        if let Ok(interval) = std::env::var("KTM_SCAN_INTERVAL_MS") {
            let millis: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("KTM_SCAN_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.scan.interval = Duration::from_millis(millis);
        }
        if let Ok(path) = std::env::var("KTM_OVERLAY_PATH") {
            if !path.trim().is_empty() {
                self.overlay_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(stations) = std::env::var("KTM_STATIONS") {
            let parsed = split_csv(&stations);
            if !parsed.is_empty() {
                self.stations = parsed;
            }
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(camera) = &overrides.camera {
            self.camera.uri = camera.trim().to_string();
        }
        if let Some(base) = &overrides.api_base {
            self.api.base_url = base.trim().to_string();
        }
        if let Some(path) = &overrides.overlay_path {
            self.overlay_path = Some(path.clone());
        }
    }

    fn validate(&mut self) -> Result<()> {
        let base = url::Url::parse(&self.api.base_url)
            .map_err(|e| anyhow!("invalid api base url '{}': {}", self.api.base_url, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!(
                "api base url must be http(s), got '{}'",
                base.scheme()
            ));
        }
        if self.scan.interval.is_zero() {
            return Err(anyhow!("scan interval must be greater than zero"));
        }
        if !(1..=100).contains(&self.scan.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be within 1..=100"));
        }
        if !(0.0..=100.0).contains(&self.scan.confidence_threshold) {
            return Err(anyhow!("confidence threshold must be within 0..=100"));
        }
        self.stations = dedup_stations(std::mem::take(&mut self.stations));
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<KioskConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn dedup_stations(stations: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(stations.len());
    for station in stations {
        let station = station.trim().to_string();
        if !station.is_empty() && !out.contains(&station) {
            out.push(station);
        }
    }
    out
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_path_with_single_slash() {
        assert_eq!(
            join_url("http://localhost:8000/", "/api/v1/scan"),
            "http://localhost:8000/api/v1/scan"
        );
        assert_eq!(
            join_url("http://kiosk", "api/v1/submit"),
            "http://kiosk/api/v1/submit"
        );
    }

    #[test]
    fn defaults_match_kiosk_contract() {
        let cfg = KioskConfig::default();
        assert_eq!(cfg.api.scan_url(), "http://localhost:8000/api/v1/scan");
        assert_eq!(cfg.api.submit_url(), "http://localhost:8000/api/v1/submit");
        assert_eq!(cfg.camera.width, 1280);
        assert_eq!(cfg.camera.height, 720);
        assert_eq!(cfg.scan.interval, Duration::from_millis(500));
        assert_eq!(cfg.scan.jpeg_quality, 80);
        assert_eq!(cfg.scan.confidence_threshold, 85.0);
    }

    #[test]
    fn validation_rejects_non_http_base() {
        let mut cfg = KioskConfig::default();
        cfg.api.base_url = "ftp://example.org".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_interval() {
        let mut cfg = KioskConfig::default();
        cfg.scan.interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn stations_are_trimmed_and_deduplicated() {
        assert_eq!(
            dedup_stations(vec![" LabA".into(), "LabB".into(), "LabA ".into(), "".into()]),
            vec!["LabA", "LabB"]
        );
    }
}
