//! Benchmark configuration (bench.toml)
//!
//! All settings are loaded once at startup and read-only thereafter.
//! Every section and field is defaulted so a partial file (or none at all,
//! for tests) still produces a usable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Top-level benchmark configuration.
///
/// Serialized to/from TOML. Sections mirror the lifecycle: which device and
/// model to load, which images to feed, how long to run, and how to display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Target backend device
    #[serde(default)]
    pub device: DeviceConfig,
    /// Model artifact and result interpretation
    #[serde(default)]
    pub model: ModelConfig,
    /// Input image set
    #[serde(default)]
    pub images: ImageConfig,
    /// Run length and concurrency
    #[serde(default)]
    pub run: RunConfig,
    /// Dashboard geometry and refresh cadence
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Which result-rendering strategy a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Single best label per image
    #[default]
    Classification,
    /// Bounding boxes with class, confidence and normalized coordinates
    Detection,
}

/// Backend device selection and tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Backend device identifier (default: "CPU")
    #[serde(default = "default_device")]
    pub target: String,
    /// Per-device backend tuning key/value pairs, passed through verbatim
    #[serde(default)]
    pub tuning: BTreeMap<String, String>,
}

/// Model artifact and result interpretation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the model artifact the backend loads
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// Result shape: classification or detection
    #[serde(default)]
    pub kind: ModelKind,
    /// Samples advanced per request/completion cycle (default: 1)
    #[serde(default = "default_batch")]
    pub batch: u64,
    /// Optional label file (one label per line, first comma field)
    #[serde(default)]
    pub labels: Option<PathBuf>,
    /// Detection confidence threshold (default: 0.6)
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

/// Input image set selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Directory scanned for input images
    #[serde(default = "default_image_dir")]
    pub dir: PathBuf,
    /// Extension filter, without the dot (default: "jpg")
    #[serde(default = "default_extension")]
    pub extension: String,
}

/// Run length, concurrency and shutdown pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Target iteration count; rounded up to a multiple of `model.batch`
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Number of concurrent in-flight inference requests (nireq)
    #[serde(default = "default_requests")]
    pub requests: usize,
    /// Seconds to keep the final 100% frame on screen before shutdown
    #[serde(default = "default_linger")]
    pub linger_secs: u64,
}

/// Dashboard resolution and refresh cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Canvas resolution as "WIDTHxHEIGHT" (default: "1920x1080")
    #[serde(default = "default_resolution")]
    pub resolution: String,
    /// Whether the window covers the whole monitor (default: true)
    #[serde(default = "default_true")]
    pub full_screen: bool,
    /// Presentation tick interval in milliseconds (default: 33)
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
    /// Redraw the status strip every N completions (default: 10)
    #[serde(default = "default_skip_interval")]
    pub skip_interval: u64,
    /// Normalization constant for the FPS gauge (default: 100)
    #[serde(default = "default_max_fps")]
    pub max_fps: f64,
}

fn default_device() -> String {
    "CPU".to_string()
}
fn default_model_path() -> PathBuf {
    PathBuf::from("model.bin")
}
fn default_batch() -> u64 {
    1
}
fn default_threshold() -> f32 {
    0.6
}
fn default_image_dir() -> PathBuf {
    PathBuf::from("images")
}
fn default_extension() -> String {
    "jpg".to_string()
}
fn default_iterations() -> u64 {
    1000
}
fn default_requests() -> usize {
    4
}
fn default_linger() -> u64 {
    5
}
fn default_resolution() -> String {
    "1920x1080".to_string()
}
fn default_refresh_ms() -> u64 {
    33
}
fn default_skip_interval() -> u64 {
    10
}
fn default_max_fps() -> f64 {
    100.0
}
fn default_true() -> bool {
    true
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            target: default_device(),
            tuning: BTreeMap::new(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            kind: ModelKind::default(),
            batch: default_batch(),
            labels: None,
            threshold: default_threshold(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            dir: default_image_dir(),
            extension: default_extension(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            requests: default_requests(),
            linger_secs: default_linger(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            full_screen: default_true(),
            refresh_ms: default_refresh_ms(),
            skip_interval: default_skip_interval(),
            max_fps: default_max_fps(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, fails to parse (this
    /// includes an unknown `model.kind`), or contains out-of-range values.
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let content = std::fs::read_to_string(path).map_err(|source| BenchError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| BenchError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.run.requests == 0 {
            return Err(BenchError::InvalidConfig(
                "run.requests must be at least 1".into(),
            ));
        }
        if self.model.batch == 0 {
            return Err(BenchError::InvalidConfig(
                "model.batch must be at least 1".into(),
            ));
        }
        if self.display.skip_interval == 0 {
            return Err(BenchError::InvalidConfig(
                "display.skip_interval must be at least 1".into(),
            ));
        }
        self.display_resolution()?;
        Ok(())
    }

    /// Parse `display.resolution` into (width, height) pixels.
    pub fn display_resolution(&self) -> Result<(u32, u32), BenchError> {
        let parse = || -> Option<(u32, u32)> {
            let (w, h) = self.display.resolution.split_once('x')?;
            let w: u32 = w.trim().parse().ok()?;
            let h: u32 = h.trim().parse().ok()?;
            if w == 0 || h == 0 {
                return None;
            }
            Some((w, h))
        };
        parse().ok_or_else(|| {
            BenchError::InvalidConfig(format!(
                "display.resolution '{}' is not of the form WIDTHxHEIGHT",
                self.display.resolution
            ))
        })
    }
}
