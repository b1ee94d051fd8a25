//! Parallel analysis of several files
//!
//! Paths are queued on a channel and drained by a fixed set of worker
//! threads, each running an independent pipeline through a shared
//! `Analyzer`. Progress is reported on an optional channel.

use chordscope_analysis::{AnalysisError, AnalysisOptions, AnalysisResult, Analyzer};
use crossbeam_channel::{self, Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Progress updates during a batch
#[derive(Debug, Clone)]
pub enum AnalysisProgress {
    /// Batch started
    Started {
        /// Number of files queued
        total: usize,
    },
    /// A worker picked up a file
    Analyzing {
        /// Position of the file in the input (1-indexed)
        current: usize,
        total: usize,
        path: PathBuf,
    },
    /// A file produced a result
    Done { path: PathBuf },
    /// A file failed fatally
    Failed { path: PathBuf, message: String },
    /// Every file has been processed
    Complete { analyzed: usize, failed: usize },
}

/// Outcome for one input file
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<AnalysisResult, AnalysisError>,
}

/// Runs one analyzer over many files
#[derive(Clone)]
pub struct BatchAnalyzer {
    analyzer: Arc<Analyzer>,
    options: AnalysisOptions,
    jobs: usize,
}

impl BatchAnalyzer {
    pub fn new(analyzer: Analyzer, options: AnalysisOptions, jobs: usize) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            options,
            jobs: jobs.max(1),
        }
    }

    /// Analyze every file, returning outcomes in input order
    pub fn run(
        &self,
        files: Vec<PathBuf>,
        progress_tx: Option<Sender<AnalysisProgress>>,
    ) -> Vec<FileOutcome> {
        let total = files.len();
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(AnalysisProgress::Started { total });
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, PathBuf)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, FileOutcome)>();
        for job in files.into_iter().enumerate() {
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let thread_count = self.jobs.min(total).max(1);
        debug!("Analyzing {total} file(s) on {thread_count} worker(s)");

        let mut handles = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let progress_tx = progress_tx.clone();
            let analyzer = Arc::clone(&self.analyzer);
            let options = self.options;

            handles.push(thread::spawn(move || {
                // Queue is closed, so the loop ends once it drains
                for (idx, path) in job_rx.iter() {
                    if let Some(ref tx) = progress_tx {
                        let _ = tx.send(AnalysisProgress::Analyzing {
                            current: idx + 1,
                            total,
                            path: path.clone(),
                        });
                    }

                    let result = analyzer.analyze(&path, &options);

                    if let Some(ref tx) = progress_tx {
                        let event = match &result {
                            Ok(_) => AnalysisProgress::Done { path: path.clone() },
                            Err(e) => AnalysisProgress::Failed {
                                path: path.clone(),
                                message: e.to_string(),
                            },
                        };
                        let _ = tx.send(event);
                    }

                    let _ = result_tx.send((idx, FileOutcome { path, result }));
                }
            }));
        }
        drop(result_tx);

        let mut outcomes: Vec<(usize, FileOutcome)> = result_rx.iter().collect();

        for handle in handles {
            if handle.join().is_err() {
                warn!("Analysis worker panicked");
            }
        }

        outcomes.sort_by_key(|(idx, _)| *idx);
        let outcomes: Vec<FileOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();

        if let Some(ref tx) = progress_tx {
            let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
            let _ = tx.send(AnalysisProgress::Complete {
                analyzed: outcomes.len() - failed,
                failed,
            });
        }

        outcomes
    }

    /// Run the batch on a background thread
    ///
    /// Returns a receiver for progress updates and a handle yielding the
    /// outcomes.
    pub fn run_async(
        &self,
        files: Vec<PathBuf>,
    ) -> (Receiver<AnalysisProgress>, JoinHandle<Vec<FileOutcome>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let batch = self.clone();

        let handle = thread::spawn(move || batch.run(files, Some(tx)));

        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordscope_analysis::{ChromaFrame, Engine, FeatureProvider, ProviderError};
    use std::path::Path;

    /// Provider that never gets called by the demo engine
    struct Unused;

    impl FeatureProvider for Unused {
        fn name(&self) -> &'static str {
            "unused"
        }

        fn load(&self, _: &Path, _: u32, _: bool) -> Result<(Vec<f32>, u32), ProviderError> {
            Err(ProviderError::Load("not available".into()))
        }

        fn harmonic_percussive_split(
            &self,
            _: &[f32],
        ) -> Result<(Vec<f32>, Vec<f32>), ProviderError> {
            Err(ProviderError::Extraction("not available".into()))
        }

        fn chroma_features(
            &self,
            _: &[f32],
            _: u32,
            _: usize,
        ) -> Result<Vec<ChromaFrame>, ProviderError> {
            Err(ProviderError::Extraction("not available".into()))
        }

        fn detect_beats(&self, _: &[f32], _: u32) -> Result<(f32, Vec<f64>), ProviderError> {
            Err(ProviderError::NoOnsets)
        }
    }

    fn batch(engine: Engine, jobs: usize) -> BatchAnalyzer {
        let options = AnalysisOptions {
            engine,
            separate_stems: false,
        };
        BatchAnalyzer::new(Analyzer::new(Arc::new(Unused)), options, jobs)
    }

    fn demo_files(dir: &tempfile::TempDir, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.path().join(format!("track{i}.wav"));
                std::fs::write(&path, b"").unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_outcomes_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = demo_files(&dir, 6);
        files.insert(2, dir.path().join("missing.wav"));

        let outcomes = batch(Engine::Demo, 3).run(files.clone(), None);

        assert_eq!(outcomes.len(), files.len());
        for (outcome, path) in outcomes.iter().zip(&files) {
            assert_eq!(&outcome.path, path);
        }
        assert!(matches!(
            outcomes[2].result,
            Err(AnalysisError::FileNotFound(_))
        ));
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 6);
    }

    #[test]
    fn test_undecodable_file_fails_alone() {
        let dir = tempfile::tempdir().unwrap();
        let files = demo_files(&dir, 2);

        let outcomes = batch(Engine::Standard, 2).run(files, None);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, Err(AnalysisError::Load { .. }))));
    }

    #[test]
    fn test_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = demo_files(&dir, 3);
        files.push(dir.path().join("missing.wav"));

        let (rx, handle) = batch(Engine::Demo, 2).run_async(files);
        let events: Vec<AnalysisProgress> = rx.iter().collect();
        let outcomes = handle.join().unwrap();
        assert_eq!(outcomes.len(), 4);

        assert!(matches!(events.first(), Some(AnalysisProgress::Started { total: 4 })));
        assert!(matches!(
            events.last(),
            Some(AnalysisProgress::Complete {
                analyzed: 3,
                failed: 1
            })
        ));
        let analyzing = events
            .iter()
            .filter(|e| matches!(e, AnalysisProgress::Analyzing { .. }))
            .count();
        let failed = events
            .iter()
            .filter(|e| matches!(e, AnalysisProgress::Failed { .. }))
            .count();
        assert_eq!(analyzing, 4);
        assert_eq!(failed, 1);
    }

    #[test]
    fn test_empty_batch() {
        let outcomes = batch(Engine::Demo, 4).run(Vec::new(), None);
        assert!(outcomes.is_empty());
    }
}
