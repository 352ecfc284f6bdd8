//! Result overlays
//!
//! Annotates a copy of the source image with the completed inference output
//! before it lands in a dashboard pane. Classification stamps the best label
//! in the corner; detection outlines every box above the confidence
//! threshold with a per-class color.

use image::RgbImage;

use crate::backend::{DetectionBox, InferenceOutput};
use crate::config::{ModelConfig, ModelKind};
use crate::font;

/// Box outline palette, indexed by class id.
const PALETTE: [[u8; 3]; 6] = [
    [255, 80, 80],
    [80, 255, 80],
    [80, 160, 255],
    [255, 210, 60],
    [230, 90, 230],
    [90, 230, 230],
];

const LABEL_SCALE: usize = 2;

/// How a completed output is rendered onto its source image.
#[derive(Debug, Clone)]
pub enum ResultOverlay {
    /// Best-scoring label stamped in the corner
    Classification { labels: Vec<String> },
    /// Outlined boxes for every detection above the threshold
    Detection { labels: Vec<String>, threshold: f32 },
}

impl ResultOverlay {
    /// Pick the overlay matching the configured model kind.
    pub fn new(model: &ModelConfig, labels: Vec<String>) -> Self {
        match model.kind {
            ModelKind::Classification => Self::Classification { labels },
            ModelKind::Detection => Self::Detection {
                labels,
                threshold: model.threshold,
            },
        }
    }

    /// Render `output` onto `img` in place.
    ///
    /// A mismatched output kind (detection boxes for a classification
    /// overlay, or vice versa) draws nothing; the pane still shows the
    /// plain source image.
    pub fn annotate(&self, img: &mut RgbImage, output: &InferenceOutput) {
        match (self, output) {
            (Self::Classification { labels }, InferenceOutput::Classification(scores)) => {
                if let Some(top) = argmax(scores) {
                    let text = label_for(labels, top);
                    draw_text_shadowed(img, &text, 4, 4);
                }
            }
            (Self::Detection { labels, threshold }, InferenceOutput::Detection(boxes)) => {
                for b in boxes.iter().filter(|b| b.confidence >= *threshold) {
                    draw_box(img, b, labels);
                }
            }
            _ => {}
        }
    }
}

/// Load labels from a file, one per line, keeping only the first comma field.
///
/// Missing `labels` config yields an empty set and numeric fallbacks.
pub fn load_labels(model: &ModelConfig) -> Result<Vec<String>, crate::error::BenchError> {
    let Some(path) = &model.labels else {
        return Ok(Vec::new());
    };
    let content =
        std::fs::read_to_string(path).map_err(|source| crate::error::BenchError::LabelRead {
            path: path.clone(),
            source,
        })?;
    Ok(content
        .lines()
        .map(|line| {
            line.split(',')
                .next()
                .unwrap_or(line)
                .trim()
                .to_string()
        })
        .collect())
}

fn label_for(labels: &[String], class_id: usize) -> String {
    labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class {class_id}"))
}

fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

fn draw_box(img: &mut RgbImage, b: &DetectionBox, labels: &[String]) {
    let w = img.width() as f32;
    let h = img.height() as f32;
    let x0 = (b.x0.clamp(0.0, 1.0) * w) as u32;
    let y0 = (b.y0.clamp(0.0, 1.0) * h) as u32;
    let x1 = (b.x1.clamp(0.0, 1.0) * w) as u32;
    let y1 = (b.y1.clamp(0.0, 1.0) * h) as u32;
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let color = PALETTE[b.class_id % PALETTE.len()];
    outline(img, x0, y0, x1, y1, color);

    let text = format!("{} {:.0}%", label_for(labels, b.class_id), b.confidence * 100.0);
    let ty = y0.saturating_sub((font::GLYPH_SIZE * LABEL_SCALE) as u32 + 2);
    draw_text_shadowed(img, &text, x0, ty);
}

/// 2px rectangle outline, clipped to the image.
fn outline(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: [u8; 3]) {
    let x1 = x1.min(img.width());
    let y1 = y1.min(img.height());
    for t in 0..2u32 {
        for x in x0..x1 {
            put(img, x, y0 + t, color);
            put(img, x, y1.saturating_sub(1 + t), color);
        }
        for y in y0..y1 {
            put(img, x0 + t, y, color);
            put(img, x1.saturating_sub(1 + t), y, color);
        }
    }
}

fn put(img: &mut RgbImage, x: u32, y: u32, color: [u8; 3]) {
    if x < img.width() && y < img.height() {
        img.put_pixel(x, y, image::Rgb(color));
    }
}

/// White text over a 1px black drop shadow, so it reads on any image.
fn draw_text_shadowed(img: &mut RgbImage, text: &str, x: u32, y: u32) {
    draw_text(img, text, x + 1, y + 1, [0, 0, 0]);
    draw_text(img, text, x, y, [255, 255, 255]);
}

fn draw_text(img: &mut RgbImage, text: &str, x: u32, y: u32, color: [u8; 3]) {
    let mut cx = x;
    for c in text.chars() {
        let rows = font::glyph(c);
        for (ry, bits) in rows.iter().enumerate() {
            for rx in 0..font::GLYPH_SIZE {
                if bits & (1 << rx) != 0 {
                    for dy in 0..LABEL_SCALE as u32 {
                        for dx in 0..LABEL_SCALE as u32 {
                            put(
                                img,
                                cx + (rx * LABEL_SCALE) as u32 + dx,
                                y + (ry * LABEL_SCALE) as u32 + dy,
                                color,
                            );
                        }
                    }
                }
            }
        }
        cx += (font::GLYPH_SIZE * LABEL_SCALE) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn blank(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb([10, 10, 10]))
    }

    #[test]
    fn classification_stamps_the_best_label() {
        let overlay = ResultOverlay::Classification {
            labels: vec!["cat".into(), "dog".into()],
        };
        let mut img = blank(128, 128);
        let before = img.clone();
        let mut scores = vec![0.0; 10];
        scores[1] = 0.9;
        overlay.annotate(&mut img, &InferenceOutput::Classification(scores));
        assert_ne!(img, before, "label text should modify the image");
    }

    #[test]
    fn detection_draws_only_confident_boxes() {
        let overlay = ResultOverlay::Detection {
            labels: Vec::new(),
            threshold: 0.6,
        };
        let mut img = blank(100, 100);
        let before = img.clone();
        let weak = DetectionBox {
            class_id: 0,
            confidence: 0.3,
            x0: 0.1,
            y0: 0.1,
            x1: 0.5,
            y1: 0.5,
        };
        overlay.annotate(&mut img, &InferenceOutput::Detection(vec![weak]));
        assert_eq!(img, before, "sub-threshold box must not be drawn");

        let strong = DetectionBox {
            confidence: 0.9,
            ..weak
        };
        overlay.annotate(&mut img, &InferenceOutput::Detection(vec![strong]));
        // bottom edge of the outline, clear of the label text
        assert_eq!(*img.get_pixel(30, 49), image::Rgb(PALETTE[0]));
    }

    #[test]
    fn mismatched_output_kind_is_a_no_op() {
        let overlay = ResultOverlay::Classification { labels: Vec::new() };
        let mut img = blank(64, 64);
        let before = img.clone();
        overlay.annotate(&mut img, &InferenceOutput::Detection(Vec::new()));
        assert_eq!(img, before);
    }

    #[test]
    fn unknown_class_falls_back_to_numeric_label() {
        assert_eq!(label_for(&[], 7), "class 7");
        assert_eq!(label_for(&["cat".to_string()], 0), "cat");
    }

    #[test]
    fn labels_keep_the_first_comma_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "tabby, tabby cat").unwrap();
        writeln!(file, "goldfish").unwrap();

        let model = ModelConfig {
            labels: Some(path),
            ..ModelConfig::default()
        };
        let labels = load_labels(&model).unwrap();
        assert_eq!(labels, vec!["tabby".to_string(), "goldfish".to_string()]);
    }

    #[test]
    fn absent_label_file_yields_empty_set() {
        let model = ModelConfig::default();
        assert!(load_labels(&model).unwrap().is_empty());
    }
}
