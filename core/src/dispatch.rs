//! Dispatch loop
//!
//! Keeps the backend's request slots saturated until the target iteration
//! count completes, rendering every completed result into the shared canvas
//! exactly once. Runs on its own thread; the presentation loop only ever
//! reads the canvas.
//!
//! One loop turn handles one ready slot: a slot carrying live work yields
//! its result (render, count, release), an idle warm-up slot yields nothing.
//! Either way the slot is refilled while samples remain to issue, so the
//! pipeline depth stays at the slot count whenever enough work is left.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};

use crate::backend::InferenceBackend;
use crate::canvas::SharedCanvas;
use crate::config::Config;
use crate::inputs::SourceImage;
use crate::overlay::ResultOverlay;
use crate::slots::{SlotPool, round_up_to_batch};

/// How long a single slot wait may block before the run is declared stuck.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Granularity of abort checks during the post-run linger.
const LINGER_STEP: Duration = Duration::from_millis(100);

/// Final throughput numbers for a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchReport {
    pub completed: u64,
    pub elapsed: Duration,
    pub throughput: f64,
}

impl BenchReport {
    fn new(completed: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        Self {
            completed,
            elapsed,
            throughput: if secs > 0.0 { completed as f64 / secs } else { 0.0 },
        }
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inferences in {:.2} s ({:.2} inf/sec)",
            self.completed,
            self.elapsed.as_secs_f64(),
            self.throughput
        )
    }
}

/// Owns the backend and drives the whole benchmark run.
pub struct Dispatcher<B> {
    backend: B,
    inputs: Vec<SourceImage>,
    overlay: ResultOverlay,
    canvas: SharedCanvas,
    abort: Arc<AtomicBool>,
    /// Effective sample target, already batch-aligned
    target: u64,
    batch: u64,
    skip_interval: u64,
    max_fps: f64,
    linger: Duration,
    model_name: String,
    device_name: String,
}

impl<B: InferenceBackend> Dispatcher<B> {
    /// Assemble a dispatcher from loaded parts and the run configuration.
    ///
    /// The iteration target is rounded up to the next batch multiple.
    pub fn new(
        backend: B,
        inputs: Vec<SourceImage>,
        overlay: ResultOverlay,
        canvas: SharedCanvas,
        abort: Arc<AtomicBool>,
        config: &Config,
    ) -> Self {
        let batch = config.model.batch;
        let target = round_up_to_batch(config.run.iterations, batch);
        if target != config.run.iterations {
            warn!(
                requested = config.run.iterations,
                effective = target,
                batch,
                "iteration target rounded up to a batch multiple"
            );
        }
        let model_name = config
            .model
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        Self {
            backend,
            inputs,
            overlay,
            canvas,
            abort,
            target,
            batch,
            skip_interval: config.display.skip_interval,
            max_fps: config.display.max_fps,
            linger: Duration::from_secs(config.run.linger_secs),
            model_name,
            device_name: config.device.target.clone(),
        }
    }

    /// Run the benchmark to completion or abort.
    ///
    /// Returns `Ok(None)` when the run was aborted. The abort flag is raised
    /// on every exit path so the presentation loop always winds down.
    ///
    /// # Errors
    ///
    /// Any backend failure ends the run; partial runs are not reported.
    pub fn run(mut self) -> anyhow::Result<Option<BenchReport>> {
        let result = self.run_inner();
        self.abort.store(true, Ordering::Relaxed);
        result
    }

    /// Run on a dedicated named thread.
    ///
    /// # Errors
    ///
    /// Fails only if the thread cannot be spawned.
    pub fn spawn(self) -> anyhow::Result<JoinHandle<anyhow::Result<Option<BenchReport>>>>
    where
        B: Send + 'static,
    {
        thread::Builder::new()
            .name("dispatch".to_string())
            .spawn(move || self.run())
            .context("failed to spawn dispatch thread")
    }

    fn run_inner(&mut self) -> anyhow::Result<Option<BenchReport>> {
        anyhow::ensure!(!self.inputs.is_empty(), "input set is empty");
        let mut pool = SlotPool::new(self.backend.slot_count());
        let mut issued: u64 = 0;
        let mut completed: u64 = 0;
        let mut completions: u64 = 0;

        info!(
            target = self.target,
            batch = self.batch,
            slots = pool.len(),
            inputs = self.inputs.len(),
            "starting benchmark run"
        );
        {
            let mut canvas = lock_canvas(&self.canvas);
            canvas.draw_header(
                &self.model_name,
                &self.device_name,
                self.batch,
                self.skip_interval,
            );
            canvas.mark_pane();
            canvas.draw_status(0, self.target, 0.0, self.max_fps);
        }

        let start = Instant::now();
        while completed < self.target {
            if self.abort.load(Ordering::Relaxed) {
                info!(completed, target = self.target, "run aborted");
                return Ok(None);
            }

            let slot = self
                .backend
                .wait_for_ready(READY_TIMEOUT)
                .context("waiting for a ready inference slot")?;

            if pool.is_in_use(slot) {
                let output = self
                    .backend
                    .fetch_result(slot)
                    .with_context(|| format!("fetching result from slot {slot}"))?;
                let source = pool.source_index(slot);
                pool.release(slot);
                completed += self.batch;
                completions += 1;

                let mut img = self.inputs[source].display.clone();
                self.overlay.annotate(&mut img, &output);

                let mut canvas = lock_canvas(&self.canvas);
                canvas.display_pane(&img);
                canvas.mark_pane();
                if completions % self.skip_interval == 0 || completed >= self.target {
                    canvas.draw_status(
                        completed,
                        self.target,
                        start.elapsed().as_secs_f64(),
                        self.max_fps,
                    );
                }
            }

            if issued < self.target {
                let source = (issued % self.inputs.len() as u64) as usize;
                self.backend
                    .submit(slot, &self.inputs[source].tensor)
                    .with_context(|| format!("submitting to slot {slot}"))?;
                pool.issue(slot, source);
                issued += self.batch;
            }
        }

        let report = BenchReport::new(completed, start.elapsed());
        info!(%report, "benchmark complete");
        {
            let mut canvas = lock_canvas(&self.canvas);
            canvas.draw_status(
                completed,
                self.target,
                report.elapsed.as_secs_f64(),
                self.max_fps,
            );
        }
        self.linger_on_final_frame();
        Ok(Some(report))
    }

    /// Hold the 100% frame on screen, still honoring a user abort.
    fn linger_on_final_frame(&self) {
        let deadline = Instant::now() + self.linger;
        while Instant::now() < deadline {
            if self.abort.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(LINGER_STEP.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
}

/// Take the canvas lock, recovering the buffer if the other side panicked.
fn lock_canvas(canvas: &SharedCanvas) -> std::sync::MutexGuard<'_, crate::canvas::Canvas> {
    match canvas.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
