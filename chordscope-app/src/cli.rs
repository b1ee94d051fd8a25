//! Command-line arguments and effective settings

use crate::config::Config;
use crate::report::OutputFormat;
use chordscope_analysis::{AnalysisOptions, Engine, PipelineConfig};
use clap::Parser;
use std::path::PathBuf;
use std::thread;

/// chordscope - key, tempo and chord progression analysis
///
/// Estimates the key (with modulations), tempo, chord progression and
/// matching scales of audio files.
#[derive(Parser, Debug)]
#[command(name = "chordscope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Audio files to analyze
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Analysis engine: standard, precise or demo
    #[arg(short, long, value_name = "ENGINE", value_parser = parse_engine)]
    pub engine: Option<Engine>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Request stem separation (not available, logged only)
    #[arg(long, default_value = "false")]
    pub stems: bool,

    /// Number of files analyzed in parallel (defaults to CPU count)
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Settings file (defaults to the user config directory)
    #[arg(long, value_name = "PATH", env = "CHORDSCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only, no progress)
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}

fn parse_engine(value: &str) -> Result<Engine, String> {
    Engine::from_name(value)
        .ok_or_else(|| format!("unknown engine '{value}' (expected standard, precise or demo)"))
}

/// Worker limit for the precise engine unless set explicitly
///
/// Each precise worker holds several full-track spectrograms at once.
const PRECISE_DEFAULT_JOBS: usize = 2;

/// Settings after merging the config file and the command line
#[derive(Debug, Clone)]
pub struct Settings {
    pub files: Vec<PathBuf>,
    pub options: AnalysisOptions,
    pub pipeline: PipelineConfig,
    pub format: OutputFormat,
    pub jobs: usize,
    pub show_progress: bool,
}

impl Settings {
    /// Command-line values win over the file
    pub fn resolve(cli: &Cli, file: &Config) -> Self {
        let engine = cli.engine.or(file.engine).unwrap_or_default();
        let jobs = cli
            .jobs
            .filter(|n| *n > 0)
            .or(file.jobs)
            .unwrap_or_else(|| match engine {
                Engine::Precise => default_jobs().min(PRECISE_DEFAULT_JOBS),
                _ => default_jobs(),
            });

        Self {
            files: cli.files.clone(),
            options: AnalysisOptions {
                engine,
                separate_stems: cli.stems,
            },
            pipeline: file.pipeline_config(),
            format: cli.format,
            jobs: jobs.min(cli.files.len()).max(1),
            show_progress: !cli.quiet && cli.files.len() > 1,
        }
    }
}

fn default_jobs() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
