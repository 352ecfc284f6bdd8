//! Shared dashboard canvas
//!
//! One RGB pixel surface shared between the dispatch thread (writer) and the
//! presentation loop (reader), guarded by a single whole-buffer mutex. The
//! top three quarters form a 10x5 grid of result panes; the bottom quarter is
//! the status strip with the progress and FPS gauges.
//!
//! Pane rectangles and the status strip never overlap, so a pane write can
//! never corrupt a neighbor or the gauges. Composite draws (gauge erase +
//! redraw) are single methods; callers hold the lock across the whole call,
//! so the reader never observes a half-drawn status strip.

use std::sync::{Arc, Mutex};

use image::RgbImage;

use crate::font;

/// Result pane grid columns.
pub const GRID_COLS: usize = 10;
/// Result pane grid rows.
pub const GRID_ROWS: usize = 5;

/// Gauge fill for the progress bar.
const PROGRESS_COLOR: [u8; 3] = [255, 220, 40];
/// Gauge fill for the FPS bar.
const FPS_COLOR: [u8; 3] = [90, 230, 90];
/// Unfilled gauge remainder.
const GAUGE_REST_COLOR: [u8; 3] = [32, 32, 32];
/// Marker tile for the pane awaiting its next result.
const MARKER_COLOR: [u8; 3] = [64, 64, 64];
/// Status text.
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

/// Canvas shared between the dispatch and presentation threads.
pub type SharedCanvas = Arc<Mutex<Canvas>>;

/// Axis-aligned pixel rectangle, half-open on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }
}

/// The single mutable pixel surface everything renders into.
///
/// Allocated once at the configured display resolution and never resized.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    /// Pane cell size
    pane_w: u32,
    pane_h: u32,
    /// Y coordinate where the status strip begins
    status_y: u32,
    /// Status layout unit (1/80 of the canvas width)
    gs: u32,
    /// Integer text scale derived from resolution
    text_scale: usize,
    /// Next pane to receive a completed result
    cursor: usize,
}

impl Canvas {
    /// Allocate a black canvas at the given resolution.
    pub fn new(width: u32, height: u32) -> Self {
        let pane_w = width / GRID_COLS as u32;
        let pane_h = (height * 3 / 4) / GRID_ROWS as u32;
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 3],
            pane_w,
            pane_h,
            status_y: pane_h * GRID_ROWS as u32,
            gs: (width / 80).max(1),
            text_scale: (width as usize / 960).max(1),
            cursor: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB pixel data, row-major, 3 bytes per pixel.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pane_count(&self) -> usize {
        GRID_COLS * GRID_ROWS
    }

    /// Pane size in pixels (full cell, including the 2px border gap).
    pub fn pane_size(&self) -> (u32, u32) {
        (self.pane_w, self.pane_h)
    }

    /// Rectangle of a pane; indices wrap modulo the pane count.
    pub fn pane_rect(&self, idx: usize) -> Rect {
        let idx = idx % self.pane_count();
        let col = (idx % GRID_COLS) as u32;
        let row = (idx / GRID_COLS) as u32;
        let x0 = col * self.pane_w;
        let y0 = row * self.pane_h;
        Rect {
            x0,
            y0,
            x1: x0 + self.pane_w,
            y1: y0 + self.pane_h,
        }
    }

    /// Rectangle of the status strip below the pane grid.
    pub fn status_rect(&self) -> Rect {
        Rect {
            x0: 0,
            y0: self.status_y,
            x1: self.width,
            y1: self.height,
        }
    }

    /// Fill a rectangle with a solid color, clipped to the canvas.
    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 3]) {
        let x1 = rect.x1.min(self.width);
        let y1 = rect.y1.min(self.height);
        for y in rect.y0.min(y1)..y1 {
            let row = (y as usize * self.width as usize + rect.x0.min(x1) as usize) * 3;
            for x in 0..(x1 - rect.x0.min(x1)) as usize {
                let i = row + x * 3;
                self.pixels[i..i + 3].copy_from_slice(&color);
            }
        }
    }

    /// Copy an image onto the canvas at (x, y), clipped to the canvas.
    pub fn blit(&mut self, img: &RgbImage, x: u32, y: u32) {
        let w = img.width().min(self.width.saturating_sub(x));
        let h = img.height().min(self.height.saturating_sub(y));
        if w == 0 || h == 0 {
            return;
        }
        for sy in 0..h {
            let dst = ((y + sy) as usize * self.width as usize + x as usize) * 3;
            let src_row = &img.as_raw()[(sy * img.width() * 3) as usize..];
            self.pixels[dst..dst + w as usize * 3]
                .copy_from_slice(&src_row[..w as usize * 3]);
        }
    }

    /// Draw a string with the embedded 8x8 font at an integer scale.
    pub fn draw_text(&mut self, text: &str, x: u32, y: u32, scale: usize, color: [u8; 3]) {
        let mut cx = x;
        for c in text.chars() {
            let rows = font::glyph(c);
            for (ry, bits) in rows.iter().enumerate() {
                for rx in 0..font::GLYPH_SIZE {
                    if bits & (1 << rx) != 0 {
                        self.fill_rect(
                            Rect {
                                x0: cx + (rx * scale) as u32,
                                y0: y + (ry * scale) as u32,
                                x1: cx + ((rx + 1) * scale) as u32,
                                y1: y + ((ry + 1) * scale) as u32,
                            },
                            color,
                        );
                    }
                }
            }
            cx += (font::GLYPH_SIZE * scale) as u32;
        }
    }

    /// Index of the pane the next completed result will land in.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Write a result image into the next pane and advance the cursor.
    ///
    /// The image is resized to the pane interior (a 2px gap is left so the
    /// marker tile stays visible around freshly busy panes).
    pub fn display_pane(&mut self, img: &RgbImage) {
        let rect = self.pane_rect(self.cursor);
        self.cursor = (self.cursor + 1) % self.pane_count();
        let inner_w = rect.width().saturating_sub(2).max(1);
        let inner_h = rect.height().saturating_sub(2).max(1);
        let resized = if img.width() == inner_w && img.height() == inner_h {
            img.clone()
        } else {
            image::imageops::resize(img, inner_w, inner_h, image::imageops::FilterType::Triangle)
        };
        self.blit(&resized, rect.x0, rect.y0);
    }

    /// Fill the cursor pane with the marker tile, flagging it as busy.
    pub fn mark_pane(&mut self) {
        let rect = self.pane_rect(self.cursor);
        self.fill_rect(rect, MARKER_COLOR);
    }

    /// Draw the static model/device header into the status strip.
    pub fn draw_header(&mut self, model: &str, device: &str, batch: u64, skip: u64) {
        let gs = self.gs;
        let y = self.status_y;
        let scale = self.text_scale;
        self.draw_text(
            &format!("model: {model} ({device})"),
            gs,
            y + gs * 8,
            scale,
            TEXT_COLOR,
        );
        self.draw_text(
            &format!("batch: {batch}, skip frame: {skip}"),
            gs,
            y + gs * 10,
            scale,
            TEXT_COLOR,
        );
    }

    /// Redraw the progress and FPS gauges plus their counters.
    ///
    /// This erases the number column and repaints both bars in one call; the
    /// caller holds the canvas lock for the duration, so a presentation read
    /// can never catch the strip between erase and redraw.
    pub fn draw_status(&mut self, completed: u64, target: u64, elapsed_secs: f64, max_fps: f64) {
        let gs = self.gs;
        let y = self.status_y;
        let scale = self.text_scale;

        // erase the numbers on the right
        self.fill_rect(
            Rect {
                x0: gs * 66,
                y0: y,
                x1: self.width,
                y1: self.height,
            },
            [0, 0, 0],
        );

        let progress = if target == 0 {
            0.0
        } else {
            (completed as f64 / target as f64).min(1.0)
        };
        self.draw_text("Progress:", gs, y + gs * 2, scale, TEXT_COLOR);
        self.draw_gauge(gs * 8, y + gs, gs * 64, y + gs * 3, progress, PROGRESS_COLOR);
        self.draw_text(
            &format!("{completed}/{target}"),
            gs * 66,
            y + gs * 2,
            scale,
            TEXT_COLOR,
        );

        let throughput = if elapsed_secs > 0.0 {
            completed as f64 / elapsed_secs
        } else {
            0.0
        };
        self.draw_text("FPS:", gs, y + gs * 5, scale, TEXT_COLOR);
        self.draw_gauge(
            gs * 8,
            y + gs * 4,
            gs * 64,
            y + gs * 6,
            (throughput / max_fps).min(1.0),
            FPS_COLOR,
        );
        self.draw_text(
            &format!("{throughput:5.2} inf/sec"),
            gs * 66,
            y + gs * 5,
            scale,
            TEXT_COLOR,
        );

        self.draw_text(
            &format!("Time: {elapsed_secs:5.1}"),
            gs * 66,
            y + gs * 8,
            scale,
            TEXT_COLOR,
        );
    }

    /// Horizontal bar gauge: a filled prefix and a dark remainder.
    fn draw_gauge(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, fill: f64, color: [u8; 3]) {
        let fill = fill.clamp(0.0, 1.0);
        let split = x0 + ((x1 - x0) as f64 * fill) as u32;
        self.fill_rect(
            Rect {
                x0,
                y0,
                x1: split,
                y1,
            },
            color,
        );
        self.fill_rect(
            Rect {
                x0: split,
                y0,
                x1,
                y1,
            },
            GAUGE_REST_COLOR,
        );
    }

    /// Wrap the canvas for sharing between threads.
    pub fn into_shared(self) -> SharedCanvas {
        Arc::new(Mutex::new(self))
    }

    #[cfg(test)]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pane_rects_are_pairwise_disjoint() {
        let canvas = Canvas::new(1920, 1080);
        let rects: Vec<Rect> = (0..canvas.pane_count()).map(|i| canvas.pane_rect(i)).collect();
        for (i, a) in rects.iter().enumerate() {
            for b in rects.iter().skip(i + 1) {
                assert!(!a.intersects(b), "panes {a:?} and {b:?} overlap");
            }
        }
    }

    #[test]
    fn panes_do_not_touch_the_status_strip() {
        let canvas = Canvas::new(1920, 1080);
        let status = canvas.status_rect();
        for i in 0..canvas.pane_count() {
            assert!(
                !canvas.pane_rect(i).intersects(&status),
                "pane {i} overlaps the status strip"
            );
        }
    }

    #[test]
    fn pane_indices_wrap() {
        let canvas = Canvas::new(640, 480);
        assert_eq!(canvas.pane_rect(0), canvas.pane_rect(canvas.pane_count()));
    }

    #[test]
    fn display_pane_advances_cursor_and_writes_inside_the_pane() {
        let mut canvas = Canvas::new(640, 480);
        let img = RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]));
        assert_eq!(canvas.cursor(), 0);
        canvas.display_pane(&img);
        assert_eq!(canvas.cursor(), 1);

        let rect = canvas.pane_rect(0);
        assert_eq!(canvas.pixel(rect.x0 + 1, rect.y0 + 1)[0], 200);
        // the 2px gap on the far edge stays untouched
        assert_eq!(canvas.pixel(rect.x1 - 1, rect.y0 + 1), [0, 0, 0]);
    }

    #[test]
    fn marked_pane_is_grey() {
        let mut canvas = Canvas::new(640, 480);
        canvas.mark_pane();
        let rect = canvas.pane_rect(0);
        assert_eq!(canvas.pixel(rect.x0, rect.y0), MARKER_COLOR);
        assert_eq!(canvas.pixel(rect.x1 - 1, rect.y1 - 1), MARKER_COLOR);
    }

    #[test]
    fn gauge_fill_is_a_prefix() {
        let mut canvas = Canvas::new(640, 480);
        canvas.draw_status(50, 100, 1.0, 100.0);
        // top of the bar, above the label row
        let y = canvas.status_y + canvas.gs + 2;
        let x0 = canvas.gs * 8;
        let x1 = canvas.gs * 64;
        let mut seen_rest = false;
        for x in x0..x1 {
            let px = canvas.pixel(x, y);
            if px == GAUGE_REST_COLOR {
                seen_rest = true;
            } else if px == PROGRESS_COLOR {
                assert!(!seen_rest, "fill pixel after the remainder at x={x}");
            }
        }
        assert!(seen_rest, "a 50% bar must leave a remainder");
    }

    #[test]
    fn full_progress_fills_the_whole_bar() {
        let mut canvas = Canvas::new(640, 480);
        canvas.draw_status(100, 100, 2.5, 100.0);
        let y = canvas.status_y + canvas.gs + 2;
        for x in canvas.gs * 8..canvas.gs * 64 {
            assert_eq!(canvas.pixel(x, y), PROGRESS_COLOR);
        }
    }

    #[test]
    fn blit_clips_at_the_canvas_edge() {
        let mut canvas = Canvas::new(64, 64);
        let img = RgbImage::from_pixel(32, 32, image::Rgb([1, 2, 3]));
        canvas.blit(&img, 48, 48); // only a 16x16 corner fits
        assert_eq!(canvas.pixel(63, 63), [1, 2, 3]);
    }

    #[test]
    fn blit_fully_off_canvas_is_a_no_op() {
        let mut canvas = Canvas::new(64, 64);
        let img = RgbImage::from_pixel(8, 8, image::Rgb([9, 9, 9]));
        canvas.blit(&img, 64, 63); // right edge of the last row
        canvas.blit(&img, 200, 63); // past the right edge, row still valid
        canvas.blit(&img, 200, 200);
        assert!(canvas.pixels().iter().all(|&b| b == 0));
    }
}
