//! The `lightbox ingest` command: run the pipeline and write the manifest.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use lightbox_core::{
    Config, OutputFormat, OutputWriter, Pipeline, ProgressReporter, ProgressSnapshot, RunIntent,
    RunSummary,
};

/// Arguments for the `ingest` command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Source directory (overrides config)
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Output root for derived artifacts (overrides config)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Manifest file (defaults to <output>/photos.json)
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Manifest format: json or jsonl
    #[arg(short, long, default_value = "json")]
    pub format: String,

    /// Number of parallel workers (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Derive, audit, and score from the source directory (without
    /// this, ingest replays the existing library read-only)
    #[arg(long)]
    pub reprocess: bool,

    /// Ignore cached ratings and score every photo again
    #[arg(long)]
    pub rescan_ratings: bool,

    /// Disable the progress bar (progress still goes to the log)
    #[arg(long)]
    pub no_progress: bool,
}

/// Apply CLI overrides on top of the loaded configuration.
fn apply_overrides(mut config: Config, args: &IngestArgs) -> Config {
    if let Some(source) = &args.source {
        config.general.source_dir = source.clone();
    }
    if let Some(output) = &args.output {
        config.general.output_dir = output.clone();
    }
    if let Some(workers) = args.workers {
        config.processing.workers = workers.max(1);
    }
    config
}

/// Execute the ingest command.
pub async fn execute(args: IngestArgs, config: Config) -> anyhow::Result<()> {
    let config = apply_overrides(config, &args);
    let format = OutputFormat::parse(&args.format)
        .ok_or_else(|| anyhow::anyhow!("unknown manifest format {:?}", args.format))?;
    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| config.output_dir().join("photos.json"));

    let mut pipeline = Pipeline::new(config);
    if !args.no_progress {
        pipeline = pipeline.with_reporter(Arc::new(BarReporter::new()));
    }

    let intent = RunIntent {
        reprocess: args.reprocess,
        rescan_ratings: args.rescan_ratings,
    };

    let start = std::time::Instant::now();
    let summary = pipeline.run(&intent).await?;

    let file = File::create(&manifest_path)?;
    let mut writer = OutputWriter::new(BufWriter::new(file), format, true);
    writer.write_all(&summary.photos)?;
    writer.flush()?;
    tracing::info!(
        "Wrote {} records to {}",
        summary.photos.len(),
        manifest_path.display()
    );

    print_summary(&summary, start.elapsed());
    Ok(())
}

/// Renders pipeline progress snapshots as an indicatif bar.
///
/// The pipeline runs one monitored pass at a time; when the snapshot
/// label changes, the previous bar is finished and a fresh one started.
struct BarReporter {
    state: Mutex<Option<(String, ProgressBar)>>,
}

impl BarReporter {
    fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    fn bar_for(&self, snapshot: &ProgressSnapshot) -> Option<ProgressBar> {
        let mut state = self.state.lock().ok()?;
        match state.as_ref() {
            Some((label, bar)) if *label == snapshot.label => Some(bar.clone()),
            _ => {
                if let Some((_, old)) = state.take() {
                    old.finish_and_clear();
                }
                let bar = create_progress_bar(snapshot.total, &snapshot.label);
                *state = Some((snapshot.label.clone(), bar.clone()));
                Some(bar)
            }
        }
    }
}

impl ProgressReporter for BarReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        if let Some(bar) = self.bar_for(snapshot) {
            bar.set_position(snapshot.completed);
            bar.set_message(format!("{:.1}/s", snapshot.window_rate));
        }
    }

    fn finish(&self, snapshot: &ProgressSnapshot) {
        if let Ok(mut state) = self.state.lock() {
            if let Some((_, bar)) = state.take() {
                bar.set_position(snapshot.completed);
                bar.finish_and_clear();
            }
        }
        eprintln!(
            "  {}: {} items in {:.1}s ({:.1}/s)",
            snapshot.label,
            snapshot.completed,
            snapshot.elapsed.as_secs_f64(),
            snapshot.overall_rate
        );
    }
}

/// Create a progress bar for one pipeline pass.
fn create_progress_bar(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{prefix:>9} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_prefix(label.to_string());
    pb
}

/// Print a formatted summary table after an ingest run.
fn print_summary(summary: &RunSummary, elapsed: std::time::Duration) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Photos:       {:>8}", summary.photos.len());
    eprintln!("    Discovered:   {:>8}", summary.discovered);
    if summary.derive_failures > 0 {
        eprintln!("    Failed:       {:>8}", summary.derive_failures);
    }
    eprintln!("    Scored:       {:>8}", summary.scored_fresh);
    eprintln!("    From cache:   {:>8}", summary.scored_cached);
    if summary.fallback_scores > 0 {
        eprintln!("    Fallback:     {:>8}", summary.fallback_scores);
    }
    if summary.propagation.applied > 0 || summary.propagation.failed > 0 {
        eprintln!(
            "    Tags synced:  {:>8} ({} failed)",
            summary.propagation.applied, summary.propagation.failed
        );
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("  ====================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> IngestArgs {
        IngestArgs {
            source: None,
            output: None,
            manifest: None,
            format: "json".to_string(),
            workers: None,
            reprocess: false,
            rescan_ratings: false,
            no_progress: true,
        }
    }

    #[test]
    fn test_apply_overrides() {
        let mut args = base_args();
        args.source = Some(PathBuf::from("/photos"));
        args.workers = Some(8);

        let config = apply_overrides(Config::default(), &args);
        assert_eq!(config.general.source_dir, PathBuf::from("/photos"));
        assert_eq!(config.processing.workers, 8);
        // Untouched fields keep their configured values.
        assert_eq!(config.processing.compressed_format, "avif");
    }

    #[test]
    fn test_apply_overrides_clamps_zero_workers() {
        let mut args = base_args();
        args.workers = Some(0);
        let config = apply_overrides(Config::default(), &args);
        assert_eq!(config.processing.workers, 1);
    }
}
