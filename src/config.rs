use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::capture::CameraConfig;
use crate::endpoint::EndpointConfig;
use crate::pipeline::SamplingConfig;
use crate::status::Thresholds;

const DEFAULT_ENDPOINT_URL: &str = "http://127.0.0.1:5000/predict";
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CAMERA_URL: &str = "stub://front_camera";
const DEFAULT_CAMERA_WIDTH: u32 = 320;
const DEFAULT_CAMERA_HEIGHT: u32 = 240;
const DEFAULT_TICK_MS: u64 = 1_000;
const DEFAULT_CAPACITY: usize = 20;
const DEFAULT_LOW_THRESHOLD: f64 = 70.0;
const DEFAULT_HIGH_THRESHOLD: f64 = 140.0;

#[derive(Debug, Deserialize, Default)]
struct DaemonConfigFile {
    endpoint: Option<EndpointConfigFile>,
    camera: Option<CameraConfigFile>,
    sampling: Option<SamplingConfigFile>,
    thresholds: Option<ThresholdsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct EndpointConfigFile {
    url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    tick_ms: Option<u64>,
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdsConfigFile {
    low: Option<f64>,
    high: Option<f64>,
}

/// Resolved daemon configuration: file values, env overrides, defaults.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub endpoint: EndpointConfig,
    pub camera: CameraConfig,
    pub sampling: SamplingConfig,
}

impl DaemonConfig {
    /// Load from the JSON file named by `GLUCOWATCH_CONFIG` (if set), apply
    /// env overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GLUCOWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DaemonConfigFile) -> Self {
        let endpoint = EndpointConfig {
            url: file
                .endpoint
                .as_ref()
                .and_then(|endpoint| endpoint.url.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string()),
            timeout: Duration::from_millis(
                file.endpoint
                    .as_ref()
                    .and_then(|endpoint| endpoint.timeout_ms)
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        };
        let camera = CameraConfig {
            url: file
                .camera
                .as_ref()
                .and_then(|camera| camera.url.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };
        let sampling = SamplingConfig {
            tick: Duration::from_millis(
                file.sampling
                    .as_ref()
                    .and_then(|sampling| sampling.tick_ms)
                    .unwrap_or(DEFAULT_TICK_MS),
            ),
            capacity: file
                .sampling
                .as_ref()
                .and_then(|sampling| sampling.capacity)
                .unwrap_or(DEFAULT_CAPACITY),
            thresholds: Thresholds {
                low: file
                    .thresholds
                    .as_ref()
                    .and_then(|thresholds| thresholds.low)
                    .unwrap_or(DEFAULT_LOW_THRESHOLD),
                high: file
                    .thresholds
                    .as_ref()
                    .and_then(|thresholds| thresholds.high)
                    .unwrap_or(DEFAULT_HIGH_THRESHOLD),
            },
        };
        Self {
            endpoint,
            camera,
            sampling,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("GLUCOWATCH_ENDPOINT_URL") {
            if !url.trim().is_empty() {
                self.endpoint.url = url;
            }
        }
        if let Ok(timeout) = std::env::var("GLUCOWATCH_TIMEOUT_MS") {
            let ms: u64 = timeout.parse().map_err(|_| {
                anyhow!("GLUCOWATCH_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.endpoint.timeout = Duration::from_millis(ms);
        }
        if let Ok(url) = std::env::var("GLUCOWATCH_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(tick) = std::env::var("GLUCOWATCH_TICK_MS") {
            let ms: u64 = tick.parse().map_err(|_| {
                anyhow!("GLUCOWATCH_TICK_MS must be an integer number of milliseconds")
            })?;
            self.sampling.tick = Duration::from_millis(ms);
        }
        if let Ok(capacity) = std::env::var("GLUCOWATCH_CAPACITY") {
            let n: usize = capacity
                .parse()
                .map_err(|_| anyhow!("GLUCOWATCH_CAPACITY must be a positive integer"))?;
            self.sampling.capacity = n;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sampling.tick.is_zero() {
            return Err(anyhow!("tick period must be greater than zero"));
        }
        if self.sampling.capacity == 0 {
            return Err(anyhow!("trend capacity must be greater than zero"));
        }
        if self.endpoint.timeout.is_zero() {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        self.sampling.thresholds.validate()?;

        let endpoint_url = url::Url::parse(&self.endpoint.url)
            .map_err(|e| anyhow!("invalid endpoint url: {}", e))?;
        if !matches!(endpoint_url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "endpoint url scheme must be http(s), got '{}'",
                endpoint_url.scheme()
            ));
        }

        if !self.camera.url.starts_with("stub://") {
            let camera_url = url::Url::parse(&self.camera.url)
                .map_err(|e| anyhow!("invalid camera url: {}", e))?;
            if !matches!(camera_url.scheme(), "http" | "https") {
                return Err(anyhow!(
                    "camera url scheme must be stub or http(s), got '{}'",
                    camera_url.scheme()
                ));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DaemonConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
