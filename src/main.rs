//! EM Registration - drift correction for electron-microscopy z-stacks.
//!
//! This binary wires the CLI to the registration library.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use em_registration::{
    config::{AutocropConfig, Cli, Command, OutputFormat, RegisterConfig, ResampleConfig},
    format_duration, list_slices, non_black_region, resampled_paths, spawn_registration,
    CorrelationEngine, EngineStats, IoError, RegistrationJob, ResampleMapping, RunOutcome,
    RunStatus, SliceImage,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Register(config) => run_register(config).await,
        Command::Resample(config) => run_resample(config),
        Command::Autocrop(config) => run_autocrop(config),
    }
}

// =============================================================================
// Register Command
// =============================================================================

async fn run_register(config: RegisterConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    info!("  Input folder: {}", config.input.display());
    info!("  Output folder: {}", config.output.display());
    info!("  Template patch: {}", config.template);
    info!("  Max shift: X={} Y={}", config.max_shift_x, config.max_shift_y);
    info!("  Auto-crop: {}", if config.auto_crop { "enabled" } else { "disabled" });
    info!("  Metric: {}", config.metric);

    let slices = match list_slices(&config.input, &config.extensions) {
        Ok(slices) if slices.is_empty() => {
            error!(
                "No slices with extension(s) {} found in {}",
                config.extensions.join(","),
                config.input.display()
            );
            return ExitCode::FAILURE;
        }
        Ok(slices) => slices,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Found {} slice(s)", slices.len());

    let mut mapping = None;
    let slices = match config.thickness_correction() {
        Some(correction) => {
            info!(
                "Slice thickness correction: {} nm, {:?} policy",
                correction.slice_thickness_nm, correction.policy
            );
            match correction.resampler().resample_paths(&slices) {
                Ok(resampled) if resampled.is_empty() => {
                    error!(
                        "Thickness correction left no slices; the z-range is shorter than {} nm",
                        correction.slice_thickness_nm
                    );
                    return ExitCode::FAILURE;
                }
                Ok(resampled) => {
                    let paths = resampled_paths(&resampled);
                    mapping = Some(resampled);
                    paths
                }
                Err(e) => {
                    error!("{}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        None => slices,
    };

    let engine = match CorrelationEngine::open(config.metric) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to open correlation engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let job = RegistrationJob {
        config: config.registration_config(),
        slices,
        matcher: engine,
    };
    let mut handle = spawn_registration(job, config.progress_queue);

    let token = handle.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current slice");
            token.cancel();
        }
    });

    while let Some(event) = handle.next_progress().await {
        info!(
            "Progress: {:.1}% ({}/{}), ETA {}",
            100.0 * event.fraction,
            event.slice,
            event.total,
            format_duration(event.eta)
        );
    }

    let joined = handle.join().await;
    interrupt.abort();

    let (result, engine) = match joined {
        Ok(joined) => joined,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let stats = engine.close();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Registration aborted: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match outcome.status {
        RunStatus::Completed => info!(
            "Registration complete: {} slice(s) written to {}",
            outcome.processed(),
            config.output.display()
        ),
        RunStatus::Cancelled => warn!(
            "Registration cancelled: {} of {} slice(s) written to {}",
            outcome.processed(),
            outcome.total_slices,
            config.output.display()
        ),
    }

    if let Some(ref path) = config.report {
        if let Err(e) = write_report(path, &outcome, mapping.as_deref(), stats) {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
        info!("Run report written to {}", path.display());
    }

    ExitCode::SUCCESS
}

/// Write the run outcome, the resample mapping and engine counters as JSON.
fn write_report(
    path: &Path,
    outcome: &RunOutcome,
    mapping: Option<&[ResampleMapping]>,
    stats: EngineStats,
) -> Result<(), IoError> {
    let report = serde_json::json!({
        "outcome": outcome,
        "resample": mapping,
        "engine": stats,
    });

    let to_io = |message: String| IoError::Report {
        path: path.to_path_buf(),
        message,
    };

    let body = serde_json::to_string_pretty(&report).map_err(|e| to_io(e.to_string()))?;
    std::fs::write(path, body).map_err(|e| to_io(e.to_string()))
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so that JSON printed by the inspection commands stays
/// parseable.
///
/// Every subcommand installs it; `verbose` only raises the level.
fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn log_filter(verbose: bool) -> &'static str {
    if verbose {
        "em_registration=debug"
    } else {
        "em_registration=info"
    }
}

// =============================================================================
// Resample Command
// =============================================================================

fn run_resample(config: ResampleConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let slices = match list_slices(&config.input, &config.extensions) {
        Ok(slices) => slices,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mapping = match config.thickness_correction().resampler().resample_paths(&slices) {
        Ok(mapping) => mapping,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.format {
        OutputFormat::Text => {
            for m in &mapping {
                println!(
                    "{} -> {} -> {}",
                    m.desired_z,
                    m.original_z,
                    file_name(&m.original_path)
                );
            }
            eprintln!();
            eprintln!(
                "{} original slice(s) -> {} resampled slice(s)",
                slices.len(),
                mapping.len()
            );
        }
        OutputFormat::Json => match serde_json::to_string_pretty(&mapping) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// =============================================================================
// Autocrop Command
// =============================================================================

fn run_autocrop(config: AutocropConfig) -> ExitCode {
    init_logging(config.verbose);

    let image = match SliceImage::open(&config.image) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let region = non_black_region(&image);
    let (width, height) = image.dimensions();
    debug!("Image is {}x{}", width, height);

    match config.format {
        OutputFormat::Text => {
            if region.is_empty() {
                println!("{}: image is entirely black", config.image.display());
            } else {
                println!("{}: {}", config.image.display(), region);
                println!(
                    "Margins: top={} bottom={} left={} right={}",
                    region.y,
                    height as u64 - region.bottom(),
                    region.x,
                    width as u64 - region.right()
                );
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "image": config.image,
                "width": width,
                "height": height,
                "region": region,
                "all_black": region.is_empty(),
            });
            match serde_json::to_string_pretty(&json) {
                Ok(body) => println!("{}", body),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Tests
// =============================================================================
