//! Input image set
//!
//! Loads every matching image from the configured directory once at startup.
//! Each source carries two forms: a display copy pre-resized to the pane
//! interior (so the dispatch loop never resizes per frame) and the NCHW
//! float tensor fed to the backend.

use std::path::PathBuf;

use image::RgbImage;
use tracing::info;

use crate::backend::Tensor;
use crate::config::ImageConfig;
use crate::error::BenchError;

/// Model input edge length used for preprocessing.
const TENSOR_EDGE: u32 = 224;

/// One loaded input: what the backend sees and what the dashboard shows.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub path: PathBuf,
    /// Pre-resized copy for the result pane
    pub display: RgbImage,
    /// Preprocessed backend input
    pub tensor: Tensor,
}

/// Load all images matching the configured extension, sorted by file name.
///
/// `display_size` is the pane interior the display copies are resized to.
///
/// # Errors
///
/// Returns [`BenchError::NoImages`] when the directory is unreadable or no
/// file matches, and [`BenchError::ImageDecode`] when a matching file fails
/// to decode.
pub fn load_image_set(
    images: &ImageConfig,
    display_size: (u32, u32),
) -> Result<Vec<SourceImage>, BenchError> {
    let no_images = || BenchError::NoImages {
        dir: images.dir.clone(),
        extension: images.extension.clone(),
    };

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&images.dir)
        .map_err(|_| no_images())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&images.extension))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(no_images());
    }

    let mut set = Vec::with_capacity(paths.len());
    for path in paths {
        let decoded = image::open(&path)
            .map_err(|source| BenchError::ImageDecode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        let display = image::imageops::resize(
            &decoded,
            display_size.0.max(1),
            display_size.1.max(1),
            image::imageops::FilterType::Triangle,
        );
        let tensor = to_tensor(&decoded);
        set.push(SourceImage {
            path,
            display,
            tensor,
        });
    }
    info!(count = set.len(), dir = %images.dir.display(), "loaded input images");
    Ok(set)
}

/// Resize to the model edge and convert to a normalized NCHW float tensor.
fn to_tensor(img: &RgbImage) -> Tensor {
    let resized = image::imageops::resize(
        img,
        TENSOR_EDGE,
        TENSOR_EDGE,
        image::imageops::FilterType::Triangle,
    );
    let hw = (TENSOR_EDGE * TENSOR_EDGE) as usize;
    let mut data = vec![0.0_f32; 3 * hw];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            data[c * hw + i] = f32::from(pixel.0[c]) / 255.0;
        }
    }
    Tensor::new([1, 3, TENSOR_EDGE as usize, TENSOR_EDGE as usize], data)
}
