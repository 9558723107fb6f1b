//! Live progress telemetry for long pipeline passes.
//!
//! Workers bump a shared atomic counter; a background monitor thread
//! samples it on a fixed interval and reports the cumulative count,
//! percent of the known total, an instantaneous rate over a trailing
//! sliding window, and the overall rate since pass start. The monitor
//! never blocks producers; the counter read is its only shared access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::ProgressConfig;

/// Bound on how long `stop()` waits for the monitor thread to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// A cloneable, thread-safe item counter shared by all workers of a pass.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<AtomicU64>);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter. Called by workers on success *and* failure,
    /// so a stalled display specifically signals a hang.
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// Current count.
    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// One sampled view of a pass in flight.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Name of the pass being monitored
    pub label: String,
    /// Items completed so far
    pub completed: u64,
    /// Known total for this pass
    pub total: u64,
    /// Completed as a percentage of total
    pub percent: f64,
    /// Rate over the trailing sliding window, items/sec
    pub window_rate: f64,
    /// Rate since pass start, items/sec
    pub overall_rate: f64,
    /// Time since pass start
    pub elapsed: Duration,
}

/// Receives monitor snapshots. The core ships a tracing-based reporter;
/// the CLI renders the same snapshots through a progress bar.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, snapshot: &ProgressSnapshot);

    /// Called once with the final snapshot when the pass ends.
    fn finish(&self, _snapshot: &ProgressSnapshot) {}
}

/// Reporter that logs snapshots through tracing.
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, s: &ProgressSnapshot) {
        tracing::info!(
            "{}: {}/{} ({:.1}%) at {:.1}/s now, {:.1}/s overall",
            s.label,
            s.completed,
            s.total,
            s.percent,
            s.window_rate,
            s.overall_rate
        );
    }

    fn finish(&self, s: &ProgressSnapshot) {
        tracing::info!(
            "{} done: {} items in {:.1}s ({:.1}/s)",
            s.label,
            s.completed,
            s.elapsed.as_secs_f64(),
            s.overall_rate
        );
    }
}

/// Drop samples older than the window, keeping at least the one sample
/// needed as the rate baseline.
fn prune_window(samples: &mut VecDeque<(Duration, u64)>, now: Duration, window: Duration) {
    let cutoff = now.checked_sub(window).unwrap_or(Duration::ZERO);
    while samples.len() > 1 {
        // Second-oldest still covers the window? Then the oldest is stale.
        match samples.get(1) {
            Some(&(t, _)) if t <= cutoff => {
                samples.pop_front();
            }
            _ => break,
        }
    }
}

/// Instantaneous rate across the retained window samples.
fn window_rate(samples: &VecDeque<(Duration, u64)>) -> f64 {
    let (Some(&(t0, c0)), Some(&(t1, c1))) = (samples.front(), samples.back()) else {
        return 0.0;
    };
    let dt = t1.saturating_sub(t0).as_secs_f64();
    if dt <= 0.0 {
        return 0.0;
    }
    (c1.saturating_sub(c0)) as f64 / dt
}

/// Background rate/percentage reporter, scoped to exactly one pass.
pub struct ProgressMonitor {
    stop: Arc<AtomicBool>,
    done_rx: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
    label: String,
}

impl ProgressMonitor {
    /// Start monitoring a pass with a known item total.
    pub fn start(
        label: &str,
        counter: ProgressCounter,
        total: u64,
        config: &ProgressConfig,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();

        let thread_stop = stop.clone();
        let thread_label = label.to_string();
        let interval = Duration::from_millis(config.interval_ms);
        let window = Duration::from_secs(config.window_secs);

        let spawned = std::thread::Builder::new()
            .name(format!("progress-{}", label))
            .spawn(move || {
                let start = Instant::now();
                let mut samples: VecDeque<(Duration, u64)> = VecDeque::new();
                samples.push_back((Duration::ZERO, counter.value()));

                loop {
                    std::thread::sleep(interval);
                    let elapsed = start.elapsed();
                    let completed = counter.value();
                    samples.push_back((elapsed, completed));
                    prune_window(&mut samples, elapsed, window);

                    let snapshot = make_snapshot(&thread_label, completed, total, elapsed, &samples);
                    if thread_stop.load(Ordering::Relaxed) {
                        reporter.finish(&snapshot);
                        break;
                    }
                    reporter.report(&snapshot);
                }
                let _ = done_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Could not start progress monitor {:?}: {}", label, e);
                None
            }
        };

        Self {
            stop,
            done_rx,
            handle,
            label: label.to_string(),
        }
    }

    /// Stop the monitor and join its thread with a bounded timeout.
    ///
    /// Must complete before the next pass's monitor starts so reports
    /// from two passes never interleave.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.is_none() {
            return;
        }
        match self.done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
            }
            Err(_) => {
                tracing::warn!("Progress monitor {:?} did not stop in time", self.label);
            }
        }
    }
}

fn make_snapshot(
    label: &str,
    completed: u64,
    total: u64,
    elapsed: Duration,
    samples: &VecDeque<(Duration, u64)>,
) -> ProgressSnapshot {
    let percent = if total > 0 {
        completed as f64 / total as f64 * 100.0
    } else {
        100.0
    };
    let overall_rate = if elapsed.as_secs_f64() > 0.0 {
        completed as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    ProgressSnapshot {
        label: label.to_string(),
        completed,
        total,
        percent,
        window_rate: window_rate(samples),
        overall_rate,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_counter_add_and_value() {
        let counter = ProgressCounter::new();
        let clone = counter.clone();
        counter.add(2);
        clone.add(3);
        assert_eq!(counter.value(), 5);
    }

    #[test]
    fn test_prune_window_discards_stale_samples() {
        let mut samples: VecDeque<(Duration, u64)> =
            [(secs(1), 10), (secs(2), 20), (secs(6), 60), (secs(8), 80)]
                .into_iter()
                .collect();
        // Window of 5s at t=8: everything at or before t=3 is stale, but
        // one baseline sample is always kept.
        prune_window(&mut samples, secs(8), secs(5));
        assert_eq!(samples.front(), Some(&(secs(2), 20)));
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn test_window_rate_over_trailing_span() {
        let samples: VecDeque<(Duration, u64)> =
            [(secs(3), 30), (secs(8), 80)].into_iter().collect();
        // 50 items over 5 seconds.
        assert!((window_rate(&samples) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_rate_degenerate_cases() {
        let empty: VecDeque<(Duration, u64)> = VecDeque::new();
        assert_eq!(window_rate(&empty), 0.0);

        let single: VecDeque<(Duration, u64)> = [(secs(1), 5)].into_iter().collect();
        assert_eq!(window_rate(&single), 0.0);
    }

    #[test]
    fn test_snapshot_percent_and_overall_rate() {
        let samples: VecDeque<(Duration, u64)> =
            [(secs(0), 0), (secs(4), 20)].into_iter().collect();
        let snap = make_snapshot("derive", 20, 80, secs(4), &samples);
        assert!((snap.percent - 25.0).abs() < 1e-9);
        assert!((snap.overall_rate - 5.0).abs() < 1e-9);
        assert!((snap.window_rate - 5.0).abs() < 1e-9);
    }

    struct CollectingReporter(Mutex<Vec<ProgressSnapshot>>);

    impl ProgressReporter for CollectingReporter {
        fn report(&self, s: &ProgressSnapshot) {
            self.0.lock().unwrap().push(s.clone());
        }
    }

    #[test]
    fn test_monitor_reports_and_stops() {
        let counter = ProgressCounter::new();
        let reporter = Arc::new(CollectingReporter(Mutex::new(Vec::new())));
        let config = ProgressConfig {
            interval_ms: 10,
            window_secs: 5,
        };

        let monitor = ProgressMonitor::start("test", counter.clone(), 10, &config, reporter.clone());
        counter.add(4);
        std::thread::sleep(Duration::from_millis(60));
        monitor.stop();

        let reports = reporter.0.lock().unwrap();
        assert!(!reports.is_empty());
        let last = reports.last().unwrap();
        assert_eq!(last.total, 10);
        assert_eq!(last.completed, 4);
    }
}
