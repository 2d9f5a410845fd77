//! Camera frame capture.
//!
//! This module provides `CameraSource` for capturing encoded frames from a
//! live camera feed.
//!
//! The capture layer is responsible for:
//! - Connecting to the configured source
//! - Yielding the current frame as an opaque JPEG payload on demand
//! - Failing the call when the source has not produced a frame yet
//!
//! The capture layer MUST NOT:
//! - Buffer or queue frames (every call reads the current frame)
//! - Inspect or analyse pixel content
//! - Retain frames beyond handoff to the scheduler

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use url::Url;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Opaque encoded frame payload.
///
/// The pipeline core never inspects the pixels; the bytes exist only to be
/// forwarded to the prediction endpoint.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    data: Vec<u8>,
}

impl EncodedFrame {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Encoded bytes, for forwarding to the endpoint client.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Source URL. Supported schemes: stub:// for a synthetic feed,
    /// http(s):// for a single-JPEG snapshot endpoint.
    pub url: String,
    /// Frame width (synthetic frames only).
    pub width: u32,
    /// Frame height (synthetic frames only).
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            width: 320,
            height: 240,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Pull-based frame source.
///
/// `capture` must be callable repeatedly without side effects beyond reading
/// the current frame, and must fail when no frame is available yet.
pub trait FrameSource: Send {
    /// Connect to the source.
    fn connect(&mut self) -> Result<()>;

    /// Capture the current frame.
    fn capture(&mut self) -> Result<EncodedFrame>;

    /// Get frame statistics.
    fn stats(&self) -> CaptureStats;
}

/// Camera frame source.
///
/// Uses HTTP snapshot fetches for real cameras, with a synthetic fallback for
/// `stub://` URLs.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    Http(SnapshotCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            });
        }
        let url = Url::parse(&config.url).context("parse camera url")?;
        match url.scheme() {
            "http" | "https" => Ok(Self {
                backend: CameraBackend::Http(SnapshotCamera::new(config)),
            }),
            other => Err(anyhow!(
                "unsupported camera scheme '{}'; expected stub or http(s)",
                other
            )),
        }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            CameraBackend::Http(source) => source.connect(),
        }
    }

    fn capture(&mut self) -> Result<EncodedFrame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.capture(),
            CameraBackend::Http(source) => source.capture(),
        }
    }

    fn stats(&self) -> CaptureStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            CameraBackend::Http(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("CameraSource: connected to {} (synthetic)", self.config.url);
        self.connected = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<EncodedFrame> {
        if !self.connected {
            return Err(anyhow!("camera not connected; call connect() first"));
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        let jpeg = encode_jpeg(&pixels, self.config.width, self.config.height)?;
        Ok(EncodedFrame::new(jpeg))
    }

    /// Generate synthetic RGB pixels for testing.
    ///
    /// A simple gradient with a per-frame phase shift, so consecutive frames
    /// differ without any camera hardware.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let phase = (self.frame_count % 251) as u8;
        let mut pixels = vec![0u8; pixel_count];
        for (i, px) in pixels.iter_mut().enumerate() {
            *px = ((i % 255) as u8).wrapping_add(phase);
        }
        pixels
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// HTTP snapshot source
// ----------------------------------------------------------------------------

struct SnapshotCamera {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
}

impl SnapshotCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        // Fetch one snapshot to verify the camera is reachable and serving.
        fetch_single_jpeg(&self.config.url).context("connect to camera snapshot endpoint")?;
        log::info!("CameraSource: connected to {}", self.config.url);
        self.connected = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<EncodedFrame> {
        if !self.connected {
            return Err(anyhow!("camera not connected; call connect() first"));
        }
        let jpeg = fetch_single_jpeg(&self.config.url)?;
        self.frame_count += 1;
        Ok(EncodedFrame::new(jpeg))
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

fn encode_jpeg(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 80);
    encoder
        .encode(pixels, width, height, image::ExtendedColorType::Rgb8)
        .context("encode jpeg frame")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_yields_jpeg_frames() {
        let mut source = CameraSource::new(CameraConfig::default()).unwrap();
        source.connect().unwrap();

        let frame = source.capture().unwrap();
        assert!(frame.byte_len() > 0);
        // JPEG start-of-image marker.
        assert_eq!(&frame.as_bytes()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn capture_before_connect_fails() {
        let mut source = CameraSource::new(CameraConfig::default()).unwrap();
        assert!(source.capture().is_err());
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut source = CameraSource::new(CameraConfig::default()).unwrap();
        source.connect().unwrap();

        let a = source.capture().unwrap();
        let b = source.capture().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn stats_count_captured_frames() {
        let mut source = CameraSource::new(CameraConfig::default()).unwrap();
        source.connect().unwrap();
        source.capture().unwrap();
        source.capture().unwrap();

        let stats = source.stats();
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.source, "stub://front_camera");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let config = CameraConfig {
            url: "rtsp://camera-1".to_string(),
            ..CameraConfig::default()
        };
        assert!(CameraSource::new(config).is_err());
    }
}
