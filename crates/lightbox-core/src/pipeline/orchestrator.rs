//! Pipeline orchestration: runs the ingestion stages in order and owns
//! every cross-stage decision.
//!
//! Stage order: discover, derive, audit, propagate, score, assemble.
//! Parallel stages run twice: a bounded fan-out pass first, then a
//! serial retry pass over whatever failed, which separates transient
//! contention failures from files that are genuinely bad. Workers
//! return [`Outcome`] values; only the orchestrator decides what a
//! failure means.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tokio::sync::Semaphore;

use crate::cache::RatingCache;
use crate::config::Config;
use crate::error::{Outcome, Result, StageError};
use crate::metadata::MetadataExtractor;
use crate::pipeline::audit::MetadataAuditor;
use crate::pipeline::derive::{ArtifactLayout, ArtifactWriter};
use crate::pipeline::propagate::{job_for, PropagationJob, PropagationReport, Propagator};
use crate::pipeline::scan::Scanner;
use crate::progress::{LogReporter, ProgressCounter, ProgressMonitor, ProgressReporter};
use crate::scoring::{AestheticScorer, ScoreBackend, NEUTRAL_SCORE};
use crate::types::{ArtifactPair, Orientation, PhotoRecord, SourceImage};

/// What this run was asked to do.
///
/// With neither flag set the run is read-only: existing artifacts and
/// cached ratings are replayed into records, and nothing is derived,
/// audited, or scored.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunIntent {
    /// Run the full enrichment pipeline from the source directory:
    /// derive, audit, propagate, score.
    pub reprocess: bool,

    /// Ignore cached ratings and score every photo again.
    pub rescan_ratings: bool,
}

/// Counts reported at the end of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub photos: Vec<PhotoRecord>,
    pub discovered: usize,
    pub derive_failures: usize,
    pub propagation: PropagationReport,
    pub scored_fresh: usize,
    pub scored_cached: usize,
    pub fallback_scores: usize,
}

/// The ingestion pipeline.
pub struct Pipeline {
    config: Config,
    scorer: Option<Arc<AestheticScorer>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    /// Build a pipeline that scores through the production ONNX backend.
    ///
    /// The model is not loaded here: a read-only run never needs it.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            scorer: None,
            reporter: Arc::new(LogReporter),
        }
    }

    /// Build a pipeline around an injected scoring backend.
    pub fn with_backend(config: Config, backend: Arc<dyn ScoreBackend>) -> Self {
        Self {
            config,
            scorer: Some(Arc::new(AestheticScorer::with_backend(backend))),
            reporter: Arc::new(LogReporter),
        }
    }

    /// The scoring backend for an enrichment run.
    ///
    /// A load failure here is fatal, and it happens before any
    /// derivation work is spent.
    fn scorer(&self) -> Result<Arc<AestheticScorer>> {
        if let Some(scorer) = &self.scorer {
            return Ok(scorer.clone());
        }
        let model_path = self
            .config
            .model_dir()
            .join(format!("{}.onnx", self.config.scoring.model));
        let scorer = AestheticScorer::load(&model_path, self.config.scoring.image_size)?;
        Ok(Arc::new(scorer))
    }

    /// Replace the progress reporter (the CLI installs a progress bar).
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run the pipeline and return the assembled photo records.
    ///
    /// The intent selects the mode: `reprocess` runs the full
    /// enrichment sequence, `rescan_ratings` alone re-scores the
    /// existing artifacts, and neither replays the library read-only.
    pub async fn run(&self, intent: &RunIntent) -> Result<RunSummary> {
        let layout = ArtifactLayout::new(
            &self.config.output_dir(),
            &self.config.processing.compressed_format,
        );

        let sources = self.discover(&layout, intent)?;
        tracing::info!("Discovered {} source photographs", sources.len());
        if sources.is_empty() {
            return Ok(RunSummary::default());
        }

        if !intent.reprocess && !intent.rescan_ratings {
            return Ok(self.replay(&layout, &sources));
        }

        let scorer = self.scorer()?;

        let (derived, derive_failures, propagation) = if intent.reprocess {
            layout.ensure_dirs()?;
            let (mut derived, failures) = self.derive_pass(&layout, &sources).await;
            // Retries finish out of order; restore the time-sorted order
            // that photo ids are assigned from.
            derived.sort_by_key(|(source, _)| source.modified);

            let jobs = self.audit_pass(&derived);
            let propagation = self.propagate_pass(&jobs);
            (derived, failures, propagation)
        } else {
            // Rescan only: score what earlier runs derived.
            (
                self.existing_pairs(&layout, &sources),
                0,
                PropagationReport::default(),
            )
        };

        let (ratings, scored_fresh, scored_cached, fallback_scores) =
            self.score_pass(&scorer, &derived, intent).await;

        let photos = self.assemble(&layout, &derived, &ratings);
        tracing::info!(
            "Run complete: {} photos ({} derive failures, {} scored, {} from cache, {} fallback)",
            photos.len(),
            derive_failures,
            scored_fresh,
            scored_cached,
            fallback_scores
        );

        Ok(RunSummary {
            photos,
            discovered: sources.len(),
            derive_failures,
            propagation,
            scored_fresh,
            scored_cached,
            fallback_scores,
        })
    }

    /// Find the photographs this run operates on.
    fn discover(&self, layout: &ArtifactLayout, intent: &RunIntent) -> Result<Vec<SourceImage>> {
        match Scanner::scan(&self.config.source_dir()) {
            Ok(sources) => Ok(sources),
            Err(StageError::DirectoryNotFound(dir)) if !intent.reprocess => {
                // Sources are gone but the derived library may be whole.
                tracing::warn!(
                    "Source directory {} missing; serving from derived library",
                    dir.display()
                );
                Ok(Scanner::scan(layout.original_dir())?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The no-intent run: replay what earlier runs derived and rated,
    /// touching neither the artifacts nor the scoring backend.
    fn replay(&self, layout: &ArtifactLayout, sources: &[SourceImage]) -> RunSummary {
        let derived = self.existing_pairs(layout, sources);
        let cache = RatingCache::load(&self.config.ratings_file());

        let mut ratings = HashMap::new();
        for (source, _) in &derived {
            let key = source.file_name().to_string();
            if let Some(rating) = cache.get(&key) {
                ratings.insert(key, rating);
            }
        }
        let scored_cached = ratings.len();

        let photos = self.assemble(layout, &derived, &ratings);
        tracing::info!(
            "Read-only run: {} photos, {} rated from cache",
            photos.len(),
            scored_cached
        );

        RunSummary {
            photos,
            discovered: sources.len(),
            scored_cached,
            ..Default::default()
        }
    }

    /// Pair each source with its expected artifacts, keeping only the
    /// pairs already derived on disk.
    fn existing_pairs(
        &self,
        layout: &ArtifactLayout,
        sources: &[SourceImage],
    ) -> Vec<(SourceImage, ArtifactPair)> {
        let mut derived = Vec::with_capacity(sources.len());
        let mut missing = 0;
        for source in sources {
            let pair = layout.pair_for(source.file_name());
            if layout.is_derived(&pair) {
                derived.push((source.clone(), pair));
            } else {
                missing += 1;
            }
        }
        if missing > 0 {
            tracing::warn!(
                "{} sources have no derived artifacts; reprocess to include them",
                missing
            );
        }
        derived
    }

    /// Derive artifacts: bounded parallel pass, then serial retry.
    async fn derive_pass(
        &self,
        layout: &ArtifactLayout,
        sources: &[SourceImage],
    ) -> (Vec<(SourceImage, ArtifactPair)>, usize) {
        let writer = Arc::new(ArtifactWriter::new(layout.clone()));
        let counter = ProgressCounter::new();
        let monitor = ProgressMonitor::start(
            "derive",
            counter.clone(),
            sources.len() as u64 * 2,
            &self.config.progress,
            self.reporter.clone(),
        );

        let semaphore = Arc::new(Semaphore::new(self.config.processing.workers));
        let mut handles = Vec::with_capacity(sources.len());
        for source in sources.iter().cloned() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                tracing::warn!("Derivation semaphore closed unexpectedly, stopping pass");
                break;
            };
            let writer = writer.clone();
            let counter = counter.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                writer.derive(&source, &counter)
            }));
        }

        let mut derived = Vec::with_capacity(sources.len());
        let mut retry = Vec::new();
        for (handle, source) in handles.into_iter().zip(sources.iter()) {
            match handle.await {
                Ok(Outcome::Success(pair)) => derived.push((source.clone(), pair)),
                Ok(Outcome::Recoverable(_)) => retry.push(source.clone()),
                Err(e) => {
                    tracing::error!("Derivation task panicked for {:?}: {}", source.path, e);
                    retry.push(source.clone());
                }
            }
        }
        monitor.stop();

        let mut failures = 0;
        if !retry.is_empty() {
            tracing::info!("Retrying {} failed derivations serially", retry.len());
            let counter = ProgressCounter::new();
            let monitor = ProgressMonitor::start(
                "derive-retry",
                counter.clone(),
                retry.len() as u64 * 2,
                &self.config.progress,
                self.reporter.clone(),
            );
            for source in retry {
                let writer = writer.clone();
                let counter = counter.clone();
                let task_source = source.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || writer.derive(&task_source, &counter))
                        .await;
                match outcome {
                    Ok(Outcome::Success(pair)) => derived.push((source, pair)),
                    _ => {
                        failures += 1;
                        tracing::warn!("Giving up on {:?} after retry", source.path);
                    }
                }
            }
            monitor.stop();
        }

        (derived, failures)
    }

    /// Audit every display artifact against its source's date tags.
    fn audit_pass(&self, derived: &[(SourceImage, ArtifactPair)]) -> Vec<PropagationJob> {
        let auditor = MetadataAuditor::new(&self.config.processing.exiftool_bin);
        let counter = ProgressCounter::new();
        let monitor = ProgressMonitor::start(
            "audit",
            counter.clone(),
            derived.len() as u64,
            &self.config.progress,
            self.reporter.clone(),
        );

        let mut jobs = Vec::new();
        let mut failed = 0;
        for (source, pair) in derived {
            match auditor.audit(&source.path, &pair.compressed_path, &counter) {
                Outcome::Success(action) => {
                    if let Some(job) = job_for(&source.path, &pair.compressed_path, action) {
                        jobs.push(job);
                    }
                }
                Outcome::Recoverable(e) => {
                    failed += 1;
                    tracing::debug!("Audit failed: {}", e);
                }
            }
        }
        monitor.stop();

        if failed > 0 {
            tracing::warn!("{} audits failed; their artifacts keep current tags", failed);
        }
        jobs
    }

    /// Apply the audit's propagation jobs through one exiftool session.
    fn propagate_pass(&self, jobs: &[PropagationJob]) -> PropagationReport {
        if jobs.is_empty() {
            return PropagationReport::default();
        }
        let counter = ProgressCounter::new();
        let monitor = ProgressMonitor::start(
            "propagate",
            counter.clone(),
            jobs.len() as u64,
            &self.config.progress,
            self.reporter.clone(),
        );

        let propagator = Propagator::new(&self.config.processing.exiftool_bin);
        let report = match propagator.run(jobs, &counter) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Metadata propagation aborted: {}; re-run to repair", e);
                PropagationReport {
                    applied: 0,
                    failed: jobs.len(),
                }
            }
        };
        monitor.stop();
        report
    }

    /// Score display artifacts: cache lookup, bounded parallel pass,
    /// serial retry, neutral fallback.
    async fn score_pass(
        &self,
        scorer: &Arc<AestheticScorer>,
        derived: &[(SourceImage, ArtifactPair)],
        intent: &RunIntent,
    ) -> (HashMap<String, f32>, usize, usize, usize) {
        let mut cache = RatingCache::load(&self.config.ratings_file());
        let mut ratings = HashMap::new();
        let mut pending = Vec::new();
        for (source, pair) in derived {
            let key = source.file_name().to_string();
            match cache.get(&key) {
                Some(rating) if !intent.rescan_ratings => {
                    ratings.insert(key, rating);
                }
                _ => pending.push((key, pair.clone())),
            }
        }
        let scored_cached = ratings.len();

        let counter = ProgressCounter::new();
        let monitor = ProgressMonitor::start(
            "score",
            counter.clone(),
            pending.len() as u64,
            &self.config.progress,
            self.reporter.clone(),
        );

        let semaphore = Arc::new(Semaphore::new(self.config.processing.workers));
        let mut handles = Vec::with_capacity(pending.len());
        for (key, pair) in pending {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                tracing::warn!("Scoring semaphore closed unexpectedly, stopping pass");
                break;
            };
            let scorer = scorer.clone();
            let counter = counter.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let outcome = scorer.score(&pair);
                counter.add(1);
                (key, pair, outcome)
            }));
        }

        let mut retry = Vec::new();
        let mut scored_fresh = 0;
        for handle in handles {
            match handle.await {
                Ok((key, _, Outcome::Success(rating))) => {
                    cache.insert(&key, rating);
                    ratings.insert(key, rating);
                    scored_fresh += 1;
                }
                Ok((key, pair, Outcome::Recoverable(e))) => {
                    tracing::debug!("Scoring failed for {}: {}", key, e);
                    retry.push((key, pair));
                }
                Err(e) => tracing::error!("Scoring task panicked: {}", e),
            }
        }
        monitor.stop();

        let mut fallback_scores = 0;
        if !retry.is_empty() {
            tracing::info!("Retrying {} failed scores serially", retry.len());
            let counter = ProgressCounter::new();
            let monitor = ProgressMonitor::start(
                "score-retry",
                counter.clone(),
                retry.len() as u64,
                &self.config.progress,
                self.reporter.clone(),
            );
            for (key, pair) in retry {
                let scorer = scorer.clone();
                let counter = counter.clone();
                let task_pair = pair.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    let outcome = scorer.score(&task_pair);
                    counter.add(1);
                    outcome
                })
                .await;
                match outcome {
                    Ok(Outcome::Success(rating)) => {
                        cache.insert(&key, rating);
                        ratings.insert(key, rating);
                        scored_fresh += 1;
                    }
                    _ => {
                        // Neutral scores are deliberately not cached so a
                        // later run with a working backend replaces them.
                        tracing::warn!("Assigning neutral score to {}", key);
                        ratings.insert(key, NEUTRAL_SCORE);
                        fallback_scores += 1;
                    }
                }
            }
            monitor.stop();
        }

        if let Err(e) = cache.save() {
            tracing::warn!("Could not persist rating cache: {}", e);
        }

        (ratings, scored_fresh, scored_cached, fallback_scores)
    }

    /// Build the final records in time-sorted order.
    fn assemble(
        &self,
        layout: &ArtifactLayout,
        derived: &[(SourceImage, ArtifactPair)],
        ratings: &HashMap<String, f32>,
    ) -> Vec<PhotoRecord> {
        derived
            .iter()
            .enumerate()
            .map(|(idx, (source, pair))| {
                let metadata =
                    MetadataExtractor::extract_with_fallback(&source.path, &pair.original_path);
                let (width, height) = match image::image_dimensions(&pair.original_path) {
                    Ok(dims) => dims,
                    Err(e) => {
                        tracing::warn!("Cannot read dimensions of {:?}: {}", pair.original_path, e);
                        (0, 0)
                    }
                };
                let rating = ratings
                    .get(source.file_name())
                    .copied()
                    .unwrap_or(NEUTRAL_SCORE);

                PhotoRecord {
                    id: idx + 1,
                    rating,
                    orientation: Orientation::classify(width, height, metadata.orientation_tag),
                    sort_date: sort_date(metadata.date_taken.as_deref(), source.modified),
                    url: layout.url_for(pair),
                    metadata,
                }
            })
            .collect()
    }
}

/// The record's sort date: the EXIF capture date when present, else the
/// source file's modification time, both in RFC 3339.
fn sort_date(date_taken: Option<&str>, modified: SystemTime) -> String {
    if let Some(raw) = date_taken {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S") {
            return dt.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
    }
    DateTime::<Utc>::from(modified).to_rfc3339_opts(SecondsFormat::Secs, true)
}
