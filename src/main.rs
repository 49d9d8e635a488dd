mod cli;
mod config;
mod dataset;
mod error;
mod inference;
mod metrics;
mod model;
mod plot;
mod windows;

use crate::config::Config;
use crate::error::Result;
use crate::metrics::RunSummary;
use chrono::Local;
use log::{LevelFilter, error, info, warn};
use ndarray::Axis;
use std::fs;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let start_time = Instant::now();

    let args = cli::parse_args();
    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logging(&config, args.log) {
        eprintln!("Error setting up logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting predscore run...");
    info!("Configuration: {:?}", config);

    match run(&config) {
        Ok(summary) => {
            let duration = start_time.elapsed();
            info!("Scoring completed successfully in {:.2?}", duration);
            println!(
                "Scored {} sequences ({} rows) in {:.2?}",
                summary.sequences, summary.rows, duration
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            let duration = start_time.elapsed();
            error!("Scoring failed after {:.2?}: {}", duration, e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up logging to console and optionally to a file in the output directory.
fn setup_logging(config: &Config, log_to_file: bool) -> std::result::Result<(), fern::InitError> {
    let base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Info)
        .level_for("predscore", LevelFilter::Debug);

    let mut logger = base_config.chain(fern::Dispatch::new().chain(std::io::stdout()));

    let mut log_path = None;
    if log_to_file {
        let dir = config.output_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("predscore_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
        logger = logger.chain(fern::log_file(&path)?);
        log_path = Some(path);
    }

    logger.apply()?;
    if let Some(path) = log_path {
        info!("Logging to file: {}", path.display());
    }
    Ok(())
}

/// Loads the test set and model, predicts every sequence and writes the
/// per-frame error table.
fn run(config: &Config) -> Result<RunSummary> {
    let output_dir = config.output_dir();
    if !output_dir.exists() {
        info!("Creating output directory: {}", output_dir.display());
        fs::create_dir_all(&output_dir)?;
    }

    // --- 1. Load Inputs ---
    let stream = dataset::load(&config.frames_path(), &config.sources_path())?;
    let (model, predictor) = model::load_predictor(
        &config.architecture_path(),
        &config.weights_path(),
        config.nt,
    )?;
    model.check_frame_shape(stream.frame_shape())?;

    // --- 2. Build Sequences ---
    let data_format = predictor.data_format();
    let inputs = windows::create_all(&stream, config.nt, config.n_seq, data_format);
    if inputs.len_of(Axis(0)) == 0 {
        warn!(
            "No source video has {} consecutive frames; writing an empty table",
            config.nt
        );
    }

    // --- 3. Predict ---
    let predictions = inference::predict_all(predictor.as_ref(), &inputs, config.batch_size)?;
    let inputs = inference::to_channels_last(inputs, data_format);
    let predictions = inference::to_channels_last(predictions, data_format);

    // --- 4. Score & Save ---
    let table = metrics::score_windows(&inputs, &predictions)?;
    table.write_npz(&config.table_path())?;
    let summary = metrics::summarize(&table, &config.dataset, config.nt);
    metrics::write_summary(&summary, &config.summary_path())?;

    // --- 5. Visualize ---
    if config.n_plot > 0 {
        plot::plot_sequences(&table, config.nt, config.n_plot, &config.plot_dir())?;
    }
    if config.save_error_frames {
        let errors = metrics::squared_errors(&inputs, &predictions)?;
        plot::save_error_frames(&metrics::error_maps(&errors), &config.error_frames_dir())?;
    }

    Ok(summary)
}
