//! User settings file
//!
//! An optional `key=value` file overriding engine, worker count and a few
//! pipeline tunables. Command-line flags take precedence over it.

use chordscope_analysis::{Engine, PipelineConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings read from the config file
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Config {
    pub engine: Option<Engine>,
    /// Worker threads for batch analysis
    pub jobs: Option<usize>,
    pub sample_rate: Option<u32>,
    pub key_segment_secs: Option<f64>,
    pub min_key_occurrence: Option<f32>,
    pub chord_window_secs: Option<f64>,
}

impl Config {
    /// Load from the default location
    ///
    /// A missing or unreadable file yields empty settings.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chordscope")
            .join("config.txt")
    }

    /// Parse the `key=value` format
    ///
    /// Unknown keys and values that fail to parse are skipped.
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "engine" => config.engine = Engine::from_name(value).or(config.engine),
                "jobs" => config.jobs = parse_positive(value).or(config.jobs),
                "sample_rate" => {
                    config.sample_rate = value
                        .parse()
                        .ok()
                        .filter(|sr| *sr > 0)
                        .or(config.sample_rate)
                }
                "key_segment_secs" => {
                    config.key_segment_secs = parse_secs(value).or(config.key_segment_secs)
                }
                "min_key_occurrence" => {
                    config.min_key_occurrence = value
                        .parse::<f32>()
                        .ok()
                        .filter(|v| (0.0..=1.0).contains(v))
                        .or(config.min_key_occurrence)
                }
                "chord_window_secs" => {
                    config.chord_window_secs = parse_secs(value).or(config.chord_window_secs)
                }
                _ => debug!("Ignoring unknown config key '{key}'"),
            }
        }

        config
    }

    /// Pipeline tunables with this file's overrides applied
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut pipeline = PipelineConfig::default();
        if let Some(sample_rate) = self.sample_rate {
            pipeline.sample_rate = sample_rate;
        }
        if let Some(secs) = self.key_segment_secs {
            pipeline.key_segment_secs = secs;
        }
        if let Some(occurrence) = self.min_key_occurrence {
            pipeline.min_key_occurrence = occurrence;
        }
        if let Some(secs) = self.chord_window_secs {
            pipeline.chord_window_secs = secs;
        }
        pipeline
    }
}

fn parse_positive(value: &str) -> Option<usize> {
    value.parse().ok().filter(|n| *n > 0)
}

fn parse_secs(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert_eq!(Config::parse(""), Config::default());
    }

    #[test]
    fn test_parse_all_keys() {
        let content = "engine = precise\njobs=3\nsample_rate=44100\n\
                       key_segment_secs=10\nmin_key_occurrence=0.2\nchord_window_secs=20.5";
        let config = Config::parse(content);
        assert_eq!(config.engine, Some(Engine::Precise));
        assert_eq!(config.jobs, Some(3));
        assert_eq!(config.sample_rate, Some(44100));
        assert_eq!(config.key_segment_secs, Some(10.0));
        assert_eq!(config.min_key_occurrence, Some(0.2));
        assert_eq!(config.chord_window_secs, Some(20.5));
    }

    #[test]
    fn test_parse_with_comments_and_unknown_keys() {
        let content = "# chordscope\nengine=demo\ntheme=dark\n# trailing";
        let config = Config::parse(content);
        assert_eq!(config.engine, Some(Engine::Demo));
        assert_eq!(config.jobs, None);
    }

    #[test]
    fn test_malformed_values_are_ignored() {
        let content = "engine=turbo\njobs=0\nsample_rate=fast\n\
                       min_key_occurrence=1.5\nchord_window_secs=-3\nnot a pair";
        assert_eq!(Config::parse(content), Config::default());
    }

    #[test]
    fn test_pipeline_overrides() {
        let config = Config::parse("sample_rate=16000\nchord_window_secs=12");
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.sample_rate, 16000);
        assert_eq!(pipeline.chord_window_secs, 12.0);
        assert_eq!(pipeline.key_segment_secs, PipelineConfig::default().key_segment_secs);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        fs::write(&path, "jobs=2\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().jobs, Some(2));
        assert!(Config::load_from(&dir.path().join("missing.txt")).is_err());
    }
}
