//! inferscope
//!
//! Live visual throughput benchmark for accelerated inference backends.
//! Loads a model and an image set, keeps the engine's request slots
//! saturated from a dispatch thread, and presents the shared result
//! dashboard in a window at a fixed cadence. `--headless` skips the window
//! and just waits for the run to finish.

mod display;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;

use inferscope_core::canvas::Canvas;
use inferscope_core::{Config, Dispatcher, ResultOverlay, SyntheticBackend};

#[derive(Parser, Debug)]
#[command(name = "inferscope", version, about = "Live visual inference benchmark")]
struct Cli {
    /// Benchmark configuration file
    #[arg(short, long, default_value = "bench.toml")]
    config: PathBuf,

    /// Run without a window; the process exits when the run completes
    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let (width, height) = config.display_resolution()?;

    let canvas = Canvas::new(width, height);
    let (pane_w, pane_h) = canvas.pane_size();
    let pane_interior = (pane_w.saturating_sub(2).max(1), pane_h.saturating_sub(2).max(1));
    let canvas = canvas.into_shared();
    let abort = Arc::new(AtomicBool::new(false));

    let inputs = inferscope_core::load_image_set(&config.images, pane_interior)?;
    let labels = inferscope_core::load_labels(&config.model)?;
    let overlay = ResultOverlay::new(&config.model, labels);
    let backend = SyntheticBackend::load(&config.model, &config.device, config.run.requests)?;

    let dispatcher = Dispatcher::new(
        backend,
        inputs,
        overlay,
        Arc::clone(&canvas),
        Arc::clone(&abort),
        &config,
    );
    let dispatch = dispatcher.spawn()?;

    let display_result = if cli.headless {
        info!("running headless");
        while !abort.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    } else {
        display::run(
            Arc::clone(&canvas),
            Arc::clone(&abort),
            display::DisplayOptions {
                full_screen: config.display.full_screen,
                refresh: Duration::from_millis(config.display.refresh_ms),
            },
        )
    };

    let outcome = dispatch
        .join()
        .map_err(|_| anyhow!("dispatch thread panicked"))??;
    display_result?;

    match outcome {
        Some(report) => println!("{report}"),
        None => info!("run aborted before completion"),
    }
    Ok(())
}
