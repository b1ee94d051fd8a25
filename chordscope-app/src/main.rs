//! chordscope CLI entry point

mod batch;
mod cli;
mod config;
mod report;

use anyhow::{anyhow, Context, Result};
use batch::{AnalysisProgress, BatchAnalyzer, FileOutcome};
use chordscope_analysis::Analyzer;
use chordscope_signal::SignalProvider;
use clap::Parser;
use cli::{Cli, Settings};
use config::Config;
use report::OutputFormat;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli);

    match run(&cli) {
        Ok(outcomes) => {
            if outcomes.iter().any(|o| o.result.is_err()) {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = if cli.quiet { "error" } else { filter };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to read config file {}", path.display())),
        None => {
            debug!("Reading settings from {}", Config::config_path().display());
            Ok(Config::load())
        }
    }
}

fn run(cli: &Cli) -> Result<Vec<FileOutcome>> {
    let config = load_config(cli)?;
    let settings = Settings::resolve(cli, &config);
    info!(
        "Analyzing {} file(s) with the {} engine on {} worker(s)",
        settings.files.len(),
        settings.options.engine,
        settings.jobs
    );

    let analyzer = Analyzer::new(Arc::new(SignalProvider::standard()))
        .with_precise(Arc::new(SignalProvider::precise()))
        .with_config(settings.pipeline.clone());
    let batch = BatchAnalyzer::new(analyzer, settings.options, settings.jobs);

    let outcomes = if settings.show_progress {
        let (progress_rx, handle) = batch.run_async(settings.files.clone());
        for event in progress_rx.iter() {
            print_progress(&event);
        }
        handle
            .join()
            .map_err(|_| anyhow!("Batch analysis thread panicked"))?
    } else {
        batch.run(settings.files.clone(), None)
    };

    let output = match settings.format {
        OutputFormat::Text => report::render_text_batch(&outcomes),
        OutputFormat::Json => {
            report::render_json(&outcomes).context("Failed to serialize results")? + "\n"
        }
    };
    print!("{output}");

    Ok(outcomes)
}

fn print_progress(event: &AnalysisProgress) {
    match event {
        AnalysisProgress::Started { total } => eprintln!("Analyzing {total} files"),
        AnalysisProgress::Analyzing {
            current,
            total,
            path,
        } => eprintln!("[{current}/{total}] {}", path.display()),
        AnalysisProgress::Done { path } => debug!("Finished {}", path.display()),
        AnalysisProgress::Failed { path, message } => {
            eprintln!("Failed {}: {message}", path.display())
        }
        AnalysisProgress::Complete { analyzed, failed } => {
            eprintln!("Done: {analyzed} analyzed, {failed} failed")
        }
    }
}
