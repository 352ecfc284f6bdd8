//! Error taxonomy for the benchmark harness
//!
//! Startup errors (`NoImages`, `MissingModel`, `Config`) are fatal before any
//! inference begins and map to a non-zero process exit. Backend errors during
//! a run are fatal to the run and are not retried: silently dropping samples
//! would corrupt the throughput measurement.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the benchmark harness.
#[derive(Debug, Error)]
pub enum BenchError {
    /// No input images matched the configured directory/extension filter.
    #[error("no input images found in '{dir}' with extension '.{extension}'")]
    NoImages { dir: PathBuf, extension: String },

    /// The model artifact the backend should load does not exist.
    #[error("model artifact not found: {0}")]
    MissingModel(PathBuf),

    /// Configuration file could not be read.
    #[error("failed to read config '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed (includes unknown model kinds).
    #[error("failed to parse config '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An input image failed to decode.
    #[error("failed to decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The label file could not be read.
    #[error("failed to read label file '{path}': {source}")]
    LabelRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An inference worker thread could not be started.
    #[error("failed to start inference worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}
