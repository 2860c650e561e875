use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use headtrim::detect::Container;
use headtrim::{TrimRequest, config, error, file, init_tracing};

/// Removes leading audio from a WAVE or FLAC file in place, keeping its metadata and shifting its
/// loop points.
#[derive(Parser)]
#[command(name = "headtrim", version)]
struct Cli {
    /// File to rewrite
    file: PathBuf,

    /// Amount of audio to remove, in milliseconds
    #[arg(allow_negative_numbers = true)]
    delay_ms: f64,

    /// Sample rate to use instead of the file's own, 0 keeps the file's rate
    #[arg(default_value_t = 0)]
    sample_rate: u32,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, overrides the configuration file
    #[arg(long)]
    log: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Could not parse config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(filter) = cli.log {
        config.log.filter = filter;
    }
    if let Err(e) = init_tracing(&config.log) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    tracing::debug!("{config:?}");

    if cli.delay_ms.is_nan() || cli.delay_ms <= 0.0 {
        tracing::error!(delay_ms = cli.delay_ms, "Delay must be a positive number of milliseconds");
        return ExitCode::FAILURE;
    }
    let request = match TrimRequest::new(cli.delay_ms, cli.sample_rate) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let path = cli.file.display();
    match file::trim_file(&cli.file, &request, &config.encoder) {
        Ok(Container::Wave(summary)) => {
            tracing::info!(
                %path,
                delay_samples = summary.delay_samples,
                delay_bytes = summary.delay_bytes,
                loops_shifted = summary.loops_shifted,
                "trimmed wave file"
            );
            ExitCode::SUCCESS
        }
        Ok(Container::Flac(summary)) => {
            tracing::info!(
                %path,
                delay_samples = summary.delay_samples,
                samples_written = summary.samples_written,
                loops_shifted = summary.loops_shifted,
                decode_errors = summary.decode_errors,
                "trimmed flac file"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.kind() {
                error::Kind::UnknownContainer => tracing::error!(%path, "Unknown file type"),
                _ => tracing::error!(%path, "{e}"),
            }
            ExitCode::FAILURE
        }
    }
}
