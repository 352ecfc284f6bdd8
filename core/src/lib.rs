//! inferscope-core
//!
//! Engine-agnostic core of the live inference benchmark: configuration,
//! input loading, the slot-saturating dispatch loop, and the shared dashboard
//! canvas it renders into. The binary crate adds the window and the GPU blit;
//! everything measurable lives here and runs headless under test.

pub mod backend;
pub mod canvas;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod font;
pub mod inputs;
pub mod overlay;
pub mod slots;

pub use backend::{DetectionBox, InferenceBackend, InferenceOutput, SlotId, SyntheticBackend, Tensor};
pub use canvas::{Canvas, SharedCanvas};
pub use config::{Config, ModelKind};
pub use dispatch::{BenchReport, Dispatcher};
pub use error::BenchError;
pub use inputs::{SourceImage, load_image_set};
pub use overlay::{ResultOverlay, load_labels};
