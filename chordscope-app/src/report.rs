//! Rendering of analysis outcomes

use crate::batch::FileOutcome;
use chordscope_analysis::AnalysisResult;
use serde::Serialize;
use std::fmt::Write;

/// One file in a batch JSON report
#[derive(Serialize)]
struct FileEntry<'a> {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// The analysis result as JSON
    Json,
}

/// `m:ss.cc`
fn format_time(secs: f64) -> String {
    let secs = secs.max(0.0);
    let minutes = (secs / 60.0).floor() as u64;
    format!("{}:{:05.2}", minutes, secs - minutes as f64 * 60.0)
}

/// Text summary of one result
pub fn render_text(result: &AnalysisResult) -> String {
    let meta = &result.metadata;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "  Key:      {} {} (confidence {:.2})",
        meta.detected_key, meta.scale, meta.confidence
    );
    if let Some(keys) = &meta.detected_keys {
        for key in keys.iter().skip(1) {
            let _ = writeln!(
                out,
                "            {} {} ({:.0}% of the track, confidence {:.2})",
                key.root,
                key.mode,
                key.occurrence * 100.0,
                key.confidence
            );
        }
    }
    let _ = writeln!(out, "  Tempo:    {:.1} BPM ({})", meta.tempo, meta.time_signature);
    let _ = writeln!(out, "  Duration: {}", format_time(meta.duration));

    let _ = writeln!(out, "  Chords:");
    for chord in &result.chord_progression {
        let _ = writeln!(
            out,
            "    {} - {}  {:<6} {:.2}",
            format_time(chord.start_time),
            format_time(chord.end_time),
            chord.label,
            chord.confidence
        );
    }

    if result.scale_match.matching_scales.is_empty() {
        let _ = writeln!(out, "  Scales:   none");
    } else {
        let _ = writeln!(out, "  Scales:");
        for scale in &result.scale_match.matching_scales {
            let name = format!("{} {}", scale.root_note, scale.scale);
            let _ = writeln!(
                out,
                "    {:<14} {:>3.0}%  {}",
                name,
                scale.match_rate * 100.0,
                scale.matching_chords.join(" ")
            );
        }
    }

    for stage in &result.degraded_stages {
        let _ = writeln!(
            out,
            "  Fallback: {} ({})",
            stage,
            stage.fallback_description()
        );
    }

    out
}

/// Text report for a batch: one block per file
pub fn render_text_batch(outcomes: &[FileOutcome]) -> String {
    let mut out = String::new();
    for (i, outcome) in outcomes.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}", outcome.path.display());
        match &outcome.result {
            Ok(result) => out.push_str(&render_text(result)),
            Err(e) => {
                let _ = writeln!(out, "  Error: {e}");
            }
        }
    }
    out
}

/// JSON report for a batch
///
/// A single successful file is emitted as the bare result object. Otherwise
/// the output is an array of `{"file", "result"}` or `{"file", "error"}`.
pub fn render_json(outcomes: &[FileOutcome]) -> serde_json::Result<String> {
    if let [FileOutcome {
        result: Ok(result), ..
    }] = outcomes
    {
        return serde_json::to_string_pretty(result);
    }

    let entries: Vec<FileEntry> = outcomes
        .iter()
        .map(|outcome| {
            let (result, error) = match &outcome.result {
                Ok(result) => (Some(result), None),
                Err(e) => (None, Some(e.to_string())),
            };
            FileEntry {
                file: outcome.path.display().to_string(),
                result,
                error,
            }
        })
        .collect();

    serde_json::to_string_pretty(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordscope_analysis::{demo_result, AnalysisError, Stage};
    use serde_json::Value;
    use std::path::PathBuf;

    fn demo_outcome(name: &str) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from(name),
            result: Ok(demo_result()),
        }
    }

    fn missing_outcome(name: &str) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from(name),
            result: Err(AnalysisError::FileNotFound(PathBuf::from(name))),
        }
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00.00");
        assert_eq!(format_time(4.5), "0:04.50");
        assert_eq!(format_time(125.25), "2:05.25");
    }

    #[test]
    fn test_text_contains_key_tempo_and_chords() {
        let text = render_text(&demo_result());
        assert!(text.contains("Key:      G major (confidence 0.95)"));
        assert!(text.contains("Tempo:    120.0 BPM (4/4)"));
        assert!(text.contains("Duration: 2:00.00"));
        assert!(text.contains("0:28.00 - 0:32.00  D"));
        assert!(text.contains("G major"));
        assert!(text.contains("E minor"));
        assert!(!text.contains("Fallback"));
    }

    #[test]
    fn test_text_lists_fallbacks() {
        let mut result = demo_result();
        result.degraded_stages.push(Stage::TempoDetection);
        result.scale_match.matching_scales.clear();
        let text = render_text(&result);
        assert!(text.contains("Fallback: tempo detection (120 BPM without beats)"));
        assert!(text.contains("Scales:   none"));
    }

    #[test]
    fn test_text_batch_reports_errors() {
        let text = render_text_batch(&[demo_outcome("a.mp3"), missing_outcome("b.mp3")]);
        assert!(text.starts_with("a.mp3\n"));
        assert!(text.contains("b.mp3\n  Error: Audio file not found: b.mp3"));
    }

    #[test]
    fn test_single_result_json_is_bare_object() {
        let json = render_json(&[demo_outcome("a.mp3")]).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metadata"]["detectedKey"], "G");
        assert_eq!(value["chordProgression"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn test_batch_json_is_array() {
        let json = render_json(&[demo_outcome("a.mp3"), missing_outcome("b.mp3")]).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["file"], "a.mp3");
        assert_eq!(entries[0]["result"]["metadata"]["scale"], "メジャー");
        assert!(entries[1]["error"].as_str().unwrap().contains("not found"));

        let single_failure = render_json(&[missing_outcome("c.mp3")]).unwrap();
        assert!(serde_json::from_str::<Value>(&single_failure)
            .unwrap()
            .is_array());
    }
}
