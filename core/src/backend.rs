//! Inference backend abstraction
//!
//! The dispatcher drives any engine through three calls: submit work on a
//! slot, wait until some slot is ready (idle or completed), and fetch the
//! completed output. `wait_for_ready` returns idle never-run slots first so
//! the pipeline fills to its slot count before the first completion arrives.
//!
//! [`SyntheticBackend`] is the built-in engine: a pool of worker threads
//! that produce deterministic outputs with a little latency jitter, enough
//! to exercise the whole pipeline on any host.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, bail};
use rand::Rng;
use tracing::{debug, info};

use crate::config::{DeviceConfig, ModelConfig, ModelKind};
use crate::error::BenchError;

/// Identifier of a backend request slot, `0..nireq`.
pub type SlotId = usize;

/// A planar float tensor in NCHW layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// (batch, channels, height, width)
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }
}

/// One detected object, coordinates normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionBox {
    pub class_id: usize,
    pub confidence: f32,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Completed inference output, shaped by the model kind.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutput {
    /// Per-class scores; the overlay picks the argmax
    Classification(Vec<f32>),
    /// Candidate boxes; the overlay filters by confidence
    Detection(Vec<DetectionBox>),
}

/// An asynchronous inference engine with a fixed set of request slots.
pub trait InferenceBackend {
    /// Number of request slots the engine was created with.
    fn slot_count(&self) -> usize;

    /// Start inference on `slot` with the given input.
    ///
    /// # Errors
    ///
    /// Fails if the engine has shut down or rejects the input.
    fn submit(&mut self, slot: SlotId, tensor: &Tensor) -> anyhow::Result<()>;

    /// Block until some slot is ready and return its id.
    ///
    /// Slots that have never run are returned first (warm-up); after that,
    /// the call blocks for the next completion.
    ///
    /// # Errors
    ///
    /// Fails if no slot becomes ready within `timeout`.
    fn wait_for_ready(&mut self, timeout: Duration) -> anyhow::Result<SlotId>;

    /// Take the completed output of `slot`.
    ///
    /// # Errors
    ///
    /// Fails if `slot` has no completed result pending.
    fn fetch_result(&mut self, slot: SlotId) -> anyhow::Result<InferenceOutput>;
}

struct Job {
    slot: SlotId,
    tensor: Tensor,
    kind: ModelKind,
}

/// Built-in engine backed by a pool of worker threads.
///
/// Outputs are a deterministic function of the input tensor, so tests can
/// assert on what the overlay renders. Per-job latency is jittered to make
/// out-of-order completion actually happen under more than one slot.
#[derive(Debug)]
pub struct SyntheticBackend {
    kind: ModelKind,
    slots: usize,
    /// Never-run slots, handed out before any completion is awaited
    idle: VecDeque<SlotId>,
    /// Completed outputs keyed by slot, awaiting `fetch_result`
    ready: HashMap<SlotId, InferenceOutput>,
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<(SlotId, InferenceOutput)>,
    workers: Vec<JoinHandle<()>>,
}

impl SyntheticBackend {
    /// "Load" a model and spin up one worker per request slot.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::MissingModel`] if the model artifact does not
    /// exist, mirroring what a real engine would hit at load time.
    pub fn load(
        model: &ModelConfig,
        device: &DeviceConfig,
        slots: usize,
    ) -> Result<Self, BenchError> {
        if !model.path.exists() {
            return Err(BenchError::MissingModel(model.path.clone()));
        }
        info!(
            model = %model.path.display(),
            device = %device.target,
            slots,
            "loading synthetic engine"
        );
        for (key, value) in &device.tuning {
            debug!(key, value, "applying device tuning");
        }

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (done_tx, done_rx) = mpsc::channel();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = Vec::with_capacity(slots);
        for id in 0..slots {
            let job_rx = Arc::clone(&job_rx);
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("infer-{id}"))
                .spawn(move || worker_loop(&job_rx, &done_tx))
                .map_err(BenchError::WorkerSpawn)?;
            workers.push(handle);
        }

        Ok(Self {
            kind: model.kind,
            slots,
            idle: (0..slots).collect(),
            ready: HashMap::new(),
            job_tx: Some(job_tx),
            done_rx,
            workers,
        })
    }
}

impl InferenceBackend for SyntheticBackend {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn submit(&mut self, slot: SlotId, tensor: &Tensor) -> anyhow::Result<()> {
        let tx = self
            .job_tx
            .as_ref()
            .context("inference engine has shut down")?;
        tx.send(Job {
            slot,
            tensor: tensor.clone(),
            kind: self.kind,
        })
        .context("inference workers are gone")?;
        Ok(())
    }

    fn wait_for_ready(&mut self, timeout: Duration) -> anyhow::Result<SlotId> {
        if let Some(slot) = self.idle.pop_front() {
            return Ok(slot);
        }
        match self.done_rx.recv_timeout(timeout) {
            Ok((slot, output)) => {
                self.ready.insert(slot, output);
                Ok(slot)
            }
            Err(RecvTimeoutError::Timeout) => {
                bail!("no inference slot became ready within {timeout:?}")
            }
            Err(RecvTimeoutError::Disconnected) => {
                bail!("inference workers are gone")
            }
        }
    }

    fn fetch_result(&mut self, slot: SlotId) -> anyhow::Result<InferenceOutput> {
        self.ready
            .remove(&slot)
            .with_context(|| format!("slot {slot} has no completed result"))
    }
}

impl Drop for SyntheticBackend {
    fn drop(&mut self) {
        // closing the job channel lets every worker drain and exit
        drop(self.job_tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(job_rx: &Mutex<Receiver<Job>>, done_tx: &Sender<(SlotId, InferenceOutput)>) {
    loop {
        let job = {
            let rx = match job_rx.lock() {
                Ok(rx) => rx,
                Err(_) => return,
            };
            match rx.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        };
        let jitter_us = rand::rng().random_range(200..1500);
        thread::sleep(Duration::from_micros(jitter_us));
        let output = synthesize(&job.tensor, job.kind);
        if done_tx.send((job.slot, output)).is_err() {
            return;
        }
    }
}

/// Deterministic fake inference: everything derives from the tensor sum.
fn synthesize(tensor: &Tensor, kind: ModelKind) -> InferenceOutput {
    let sum: f32 = tensor.data.iter().sum();
    let seed = (sum.abs() as u64).wrapping_mul(2_654_435_761);
    match kind {
        ModelKind::Classification => {
            let mut scores = vec![0.0_f32; 1000];
            let top = (seed % 1000) as usize;
            scores[top] = 0.93;
            scores[(top + 1) % 1000] = 0.04;
            InferenceOutput::Classification(scores)
        }
        ModelKind::Detection => {
            let cx = 0.2 + (seed % 50) as f32 / 100.0;
            let cy = 0.2 + (seed / 50 % 50) as f32 / 100.0;
            InferenceOutput::Detection(vec![
                DetectionBox {
                    class_id: (seed % 90) as usize,
                    confidence: 0.88,
                    x0: cx - 0.15,
                    y0: cy - 0.15,
                    x1: cx + 0.15,
                    y1: cy + 0.15,
                },
                DetectionBox {
                    class_id: (seed % 7) as usize,
                    confidence: 0.31,
                    x0: 0.05,
                    y0: 0.05,
                    x1: 0.25,
                    y1: 0.25,
                },
            ])
        }
    }
}
