//! Dispatch loop behavior against a scripted backend.
//!
//! The fake backend completes instantly (optionally newest-first to force
//! out-of-order completion) and records every submission, so tests can pin
//! down input ordering, render counts and abort behavior without a real
//! engine or a window.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use image::RgbImage;

use inferscope_core::backend::{InferenceBackend, InferenceOutput, SlotId, Tensor};
use inferscope_core::canvas::{Canvas, SharedCanvas};
use inferscope_core::config::Config;
use inferscope_core::dispatch::Dispatcher;
use inferscope_core::inputs::SourceImage;
use inferscope_core::overlay::ResultOverlay;

/// Distinct solid colors so each pane identifies its source input.
const INPUT_COLORS: [[u8; 3]; 4] = [
    [210, 40, 40],
    [40, 210, 40],
    [40, 40, 210],
    [210, 210, 40],
];

struct FakeBackend {
    slots: usize,
    idle: VecDeque<SlotId>,
    /// (slot, input marker) pairs in flight
    pending: Vec<(SlotId, usize)>,
    ready: HashMap<SlotId, InferenceOutput>,
    /// Complete the newest submission first instead of the oldest
    newest_first: bool,
    /// Artificial per-completion latency
    delay: Duration,
    /// Input markers in submission order
    submissions: Arc<Mutex<Vec<usize>>>,
    /// Raise the flag once this many results have been fetched
    abort_after_fetches: Option<(u64, Arc<AtomicBool>)>,
    fetches: u64,
}

impl FakeBackend {
    fn new(slots: usize) -> Self {
        Self {
            slots,
            idle: (0..slots).collect(),
            pending: Vec::new(),
            ready: HashMap::new(),
            newest_first: false,
            delay: Duration::ZERO,
            submissions: Arc::new(Mutex::new(Vec::new())),
            abort_after_fetches: None,
            fetches: 0,
        }
    }

    fn submissions(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.submissions)
    }
}

impl InferenceBackend for FakeBackend {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn submit(&mut self, slot: SlotId, tensor: &Tensor) -> anyhow::Result<()> {
        let marker = tensor.data[0] as usize;
        self.submissions.lock().unwrap().push(marker);
        self.pending.push((slot, marker));
        Ok(())
    }

    fn wait_for_ready(&mut self, _timeout: Duration) -> anyhow::Result<SlotId> {
        if let Some(slot) = self.idle.pop_front() {
            return Ok(slot);
        }
        anyhow::ensure!(!self.pending.is_empty(), "nothing in flight");
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let idx = if self.newest_first {
            self.pending.len() - 1
        } else {
            0
        };
        let (slot, _marker) = self.pending.remove(idx);
        self.ready
            .insert(slot, InferenceOutput::Detection(Vec::new()));
        Ok(slot)
    }

    fn fetch_result(&mut self, slot: SlotId) -> anyhow::Result<InferenceOutput> {
        self.fetches += 1;
        if let Some((after, flag)) = &self.abort_after_fetches {
            if self.fetches >= *after {
                flag.store(true, Ordering::Relaxed);
            }
        }
        self.ready.remove(&slot).context("no result on slot")
    }
}

/// Inputs with distinct solid display colors and a marker tensor.
fn make_inputs(count: usize) -> Vec<SourceImage> {
    (0..count)
        .map(|i| SourceImage {
            path: format!("input-{i}.png").into(),
            display: RgbImage::from_pixel(10, 10, image::Rgb(INPUT_COLORS[i])),
            tensor: Tensor::new([1, 1, 1, 1], vec![i as f32]),
        })
        .collect()
}

fn test_config(iterations: u64, batch: u64) -> Config {
    let mut config = Config::default();
    config.run.iterations = iterations;
    config.run.linger_secs = 0;
    config.model.batch = batch;
    config.display.resolution = "640x480".into();
    config.display.skip_interval = 1;
    config
}

fn no_op_overlay() -> ResultOverlay {
    ResultOverlay::Detection {
        labels: Vec::new(),
        threshold: 0.6,
    }
}

fn shared_canvas() -> SharedCanvas {
    Canvas::new(640, 480).into_shared()
}

fn pixel(canvas: &Canvas, x: u32, y: u32) -> [u8; 3] {
    let i = (y as usize * canvas.width() as usize + x as usize) * 3;
    let px = canvas.pixels();
    [px[i], px[i + 1], px[i + 2]]
}

/// Sample the center of pane `idx`.
fn pane_center(canvas: &Canvas, idx: usize) -> [u8; 3] {
    let rect = canvas.pane_rect(idx);
    pixel(canvas, (rect.x0 + rect.x1) / 2, (rect.y0 + rect.y1) / 2)
}

#[test]
fn run_completes_target_and_cycles_inputs() {
    let backend = FakeBackend::new(2);
    let submissions = backend.submissions();
    let config = test_config(6, 1);
    let dispatcher = Dispatcher::new(
        backend,
        make_inputs(3),
        no_op_overlay(),
        shared_canvas(),
        Arc::new(AtomicBool::new(false)),
        &config,
    );

    let report = dispatcher.run().unwrap().expect("run should complete");
    assert_eq!(report.completed, 6);
    assert_eq!(*submissions.lock().unwrap(), vec![0, 1, 2, 0, 1, 2]);
}

#[test]
fn target_rounds_up_to_a_batch_multiple() {
    let backend = FakeBackend::new(2);
    let config = test_config(21, 4);
    let dispatcher = Dispatcher::new(
        backend,
        make_inputs(2),
        no_op_overlay(),
        shared_canvas(),
        Arc::new(AtomicBool::new(false)),
        &config,
    );

    let report = dispatcher.run().unwrap().expect("run should complete");
    assert_eq!(report.completed, 24);
}

#[test]
fn batched_requests_advance_the_input_cursor_by_batch() {
    // target 20, batch 4, 3 inputs, 2 slots: five requests fed from
    // inputs 0, 1, 2, 0, 1
    let backend = FakeBackend::new(2);
    let submissions = backend.submissions();
    let canvas = shared_canvas();
    let config = test_config(20, 4);
    let dispatcher = Dispatcher::new(
        backend,
        make_inputs(3),
        no_op_overlay(),
        Arc::clone(&canvas),
        Arc::new(AtomicBool::new(false)),
        &config,
    );

    let report = dispatcher.run().unwrap().expect("run should complete");
    assert_eq!(report.completed, 20);

    let expected = vec![0, 1, 2, 0, 1];
    assert_eq!(*submissions.lock().unwrap(), expected);

    // each completion landed in the next pane, showing its source image
    let canvas = canvas.lock().unwrap();
    assert_eq!(canvas.cursor(), 5);
    for (pane, &src) in expected.iter().enumerate() {
        assert_eq!(
            pane_center(&canvas, pane),
            INPUT_COLORS[src],
            "pane {pane} should show input {src}"
        );
    }
}

#[test]
fn single_input_feeds_every_slot() {
    let backend = FakeBackend::new(4);
    let submissions = backend.submissions();
    let config = test_config(8, 1);
    let dispatcher = Dispatcher::new(
        backend,
        make_inputs(1),
        no_op_overlay(),
        shared_canvas(),
        Arc::new(AtomicBool::new(false)),
        &config,
    );

    let report = dispatcher.run().unwrap().expect("run should complete");
    assert_eq!(report.completed, 8);
    assert_eq!(*submissions.lock().unwrap(), vec![0; 8]);
}

#[test]
fn out_of_order_completions_each_render_exactly_once() {
    let mut backend = FakeBackend::new(3);
    backend.newest_first = true;
    let canvas = shared_canvas();
    let config = test_config(9, 1);
    let dispatcher = Dispatcher::new(
        backend,
        make_inputs(3),
        no_op_overlay(),
        Arc::clone(&canvas),
        Arc::new(AtomicBool::new(false)),
        &config,
    );

    let report = dispatcher.run().unwrap().expect("run should complete");
    assert_eq!(report.completed, 9);

    // nine completions, nine panes, three renders of each input
    let canvas = canvas.lock().unwrap();
    assert_eq!(canvas.cursor(), 9);
    let mut counts = [0usize; 3];
    for pane in 0..9 {
        let color = pane_center(&canvas, pane);
        let src = INPUT_COLORS
            .iter()
            .position(|c| *c == color)
            .unwrap_or_else(|| panic!("pane {pane} holds no input image"));
        counts[src] += 1;
    }
    assert_eq!(counts, [3, 3, 3]);
}

#[test]
fn abort_stops_the_run_without_a_report() {
    let abort = Arc::new(AtomicBool::new(false));
    let mut backend = FakeBackend::new(2);
    backend.abort_after_fetches = Some((3, Arc::clone(&abort)));
    let canvas = shared_canvas();
    let config = test_config(1000, 1);
    let dispatcher = Dispatcher::new(
        backend,
        make_inputs(2),
        no_op_overlay(),
        Arc::clone(&canvas),
        Arc::clone(&abort),
        &config,
    );

    let outcome = dispatcher.run().unwrap();
    assert!(outcome.is_none(), "aborted run must not produce a report");
    assert!(abort.load(Ordering::Relaxed));

    // the flag was raised during the third fetch; the loop finished that
    // iteration and stopped at the next check
    assert_eq!(canvas.lock().unwrap().cursor(), 3);
}

#[test]
fn empty_input_set_is_an_error() {
    let backend = FakeBackend::new(2);
    let config = test_config(10, 1);
    let dispatcher = Dispatcher::new(
        backend,
        Vec::new(),
        no_op_overlay(),
        shared_canvas(),
        Arc::new(AtomicBool::new(false)),
        &config,
    );

    assert!(dispatcher.run().is_err());
}

#[test]
fn preset_abort_exits_before_any_work() {
    let backend = FakeBackend::new(2);
    let submissions = backend.submissions();
    let config = test_config(100, 1);
    let dispatcher = Dispatcher::new(
        backend,
        make_inputs(2),
        no_op_overlay(),
        shared_canvas(),
        Arc::new(AtomicBool::new(true)),
        &config,
    );

    assert!(dispatcher.run().unwrap().is_none());
    assert!(submissions.lock().unwrap().is_empty());
}

#[test]
fn concurrent_reader_never_sees_a_half_drawn_status_strip() {
    // learn the gauge colors from an isolated draw
    let mut probe = Canvas::new(640, 480);
    probe.draw_status(50, 100, 1.0, 100.0);
    let status = probe.status_rect();
    let gs = 640 / 80;
    // top of the progress bar, above the label row
    let bar_y = status.y0 + gs + 2;
    let fill = pixel(&probe, gs * 8, bar_y);
    let rest = pixel(&probe, gs * 64 - 1, bar_y);
    assert_ne!(fill, rest);

    let mut backend = FakeBackend::new(2);
    backend.delay = Duration::from_micros(300);
    let canvas = shared_canvas();
    let config = test_config(300, 1);
    let dispatcher = Dispatcher::new(
        backend,
        make_inputs(2),
        no_op_overlay(),
        Arc::clone(&canvas),
        Arc::new(AtomicBool::new(false)),
        &config,
    );

    let reader_canvas = Arc::clone(&canvas);
    let done = Arc::new(AtomicBool::new(false));
    let reader_done = Arc::clone(&done);
    let reader = std::thread::spawn(move || {
        let mut observations = 0u64;
        while !reader_done.load(Ordering::Relaxed) {
            let canvas = reader_canvas.lock().unwrap();
            // a complete gauge is always a fill prefix then a remainder
            let mut past_fill = false;
            for x in gs * 8..gs * 64 {
                let px = pixel(&canvas, x, bar_y);
                if px == rest {
                    past_fill = true;
                } else if px == fill {
                    assert!(!past_fill, "fill pixel after remainder at x={x}");
                }
            }
            observations += 1;
        }
        observations
    });

    let report = dispatcher.run().unwrap().expect("run should complete");
    done.store(true, Ordering::Relaxed);
    let observations = reader.join().unwrap();

    assert_eq!(report.completed, 300);
    assert!(observations > 0, "reader never got the lock");
}
