mod cli;
mod config;
mod logging;

pub use cli::{Cli, Command, RunArgs};
pub use config::{config_path, load_config, models_dir, save_config, AppConfig, ConfigError};
pub use logging::init_logging;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use scansort_core::{
    CancellationToken, EngineFactory, EngineSlot, OcrBackend, PdfWriter, PipelineController,
    PipelineError, PipelineWorker, RunRequest, RunStatus,
};
use scansort_ocr::PaddleOcrEngine;
use scansort_render::PdfiumRasterizer;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const BAR_SCALE: f32 = 1000.0;

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config_path()?,
    };
    let mut config =
        load_config(&path).with_context(|| format!("loading {}", path.display()))?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run(args) => {
            args.apply(&mut config);
            config.validate()?;
            if args.save_config {
                save_config(&path, &config)
                    .with_context(|| format!("saving {}", path.display()))?;
                log::info!("[Config] saved to {}", path.display());
            }
            run_pipeline(&config, &args)
        }
    }
}

fn build_controller(config: &AppConfig) -> anyhow::Result<PipelineController> {
    let ocr_config = config.ocr_config()?;
    for path in scansort_ocr::missing_models(&ocr_config) {
        log::warn!("[OCR] model not found: {}", path.display());
    }

    // Loading the models is deferred to the first run that needs them.
    let factory: EngineFactory = Box::new(move || {
        let engine = PaddleOcrEngine::new(&ocr_config)
            .map_err(|e| PipelineError::Engine(e.to_string()))?;
        Ok(Box::new(engine) as Box<dyn OcrBackend>)
    });

    Ok(PipelineController::new(
        config.controller_options(),
        config.classifier()?,
        EngineSlot::new(factory),
        Box::new(PdfiumRasterizer::new(config.render_options())),
        Box::new(PdfWriter),
    ))
}

fn run_pipeline(config: &AppConfig, args: &RunArgs) -> anyhow::Result<()> {
    let request = RunRequest {
        inputs: args.inputs.clone(),
        export_root: config.export_dir.clone(),
    };
    let worker = PipelineWorker::spawn(build_controller(config)?)?;
    let ticket = worker.submit(request)?;

    let bar = if args.quiet {
        ProgressBar::hidden()
    } else {
        watch_stdin(ticket.cancel_token());
        let bar = ProgressBar::new(BAR_SCALE as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.println("Type q or stop and press Enter to stop after the current page.");
        bar
    };

    let result = loop {
        if let Some(result) = ticket.wait_timeout(POLL_INTERVAL) {
            break result;
        }
        let status = worker.status();
        bar.set_position((status.progress.clamp(0.0, 1.0) * BAR_SCALE) as u64);
        bar.set_message(format!("{}: {}", status.state, status.message));
    };
    bar.finish_and_clear();

    let outcome = result?;
    print!("{}", outcome.summary);
    if outcome.status == RunStatus::StoppedByRequest {
        println!("Stopped by request; documents already written are kept.");
    }
    Ok(())
}

/// A `q` or `stop` line on stdin acts as the stop button.
fn watch_stdin(cancel: CancellationToken) {
    let spawned = thread::Builder::new()
        .name("scansort-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if is_stop_command(&line) {
                    cancel.cancel();
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("[Cli] stop input unavailable: {}", e);
    }
}

fn is_stop_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "q" | "stop")
}
