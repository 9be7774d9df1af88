//! Opt-in per-command timing (`LANES_TIMING=1` or `--timing`).
//!
//! Samples are kept per thread; the CLI records around each phase of a
//! command (load, drop, write, save) and prints the report on exit.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

thread_local! {
    static SAMPLES: RefCell<Vec<(&'static str, Duration)>> = const { RefCell::new(Vec::new()) };
}

static ENABLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimingReport {
    pub operations: Vec<OpTiming>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpTiming {
    pub name: &'static str,
    pub count: usize,
    #[serde(rename = "p50_us", serialize_with = "as_micros")]
    pub p50: Duration,
    #[serde(rename = "p95_us", serialize_with = "as_micros")]
    pub p95: Duration,
    #[serde(rename = "total_us", serialize_with = "as_micros")]
    pub total: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn as_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_micros())
}

/// True when `LANES_TIMING` is `1`, `true`, `yes` or `on`.
#[must_use]
pub fn enabled_from_env() -> bool {
    std::env::var("LANES_TIMING").is_ok_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        SAMPLES.with(|s| s.borrow_mut().clear());
    }
}

#[must_use]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Run `f`, recording its duration under `name` when timing is on.
pub fn timed<R>(name: &'static str, f: impl FnOnce() -> R) -> R {
    if !is_enabled() {
        return f();
    }
    let started = Instant::now();
    let out = f();
    record(name, started.elapsed());
    out
}

fn record(name: &'static str, elapsed: Duration) {
    SAMPLES.with(|s| s.borrow_mut().push((name, elapsed)));
}

/// Drain this thread's samples into a report, operations sorted by name.
#[must_use]
pub fn take_report() -> TimingReport {
    let samples = SAMPLES.with(|s| std::mem::take(&mut *s.borrow_mut()));
    let mut by_name: BTreeMap<&'static str, Vec<Duration>> = BTreeMap::new();
    for (name, elapsed) in samples {
        by_name.entry(name).or_default().push(elapsed);
    }

    let operations = by_name
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            OpTiming {
                name,
                count: values.len(),
                p50: nearest_rank(&values, 50),
                p95: nearest_rank(&values, 95),
                total: values.iter().sum(),
            }
        })
        .collect();
    TimingReport { operations }
}

fn nearest_rank(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct.min(100) * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Plain table for stderr.
    #[must_use]
    pub fn display_table(&self) -> String {
        if self.is_empty() {
            return "No timing samples recorded.".to_string();
        }
        let mut out = format!("{:<20} {:>5} {:>10} {:>10} {:>10}\n", "operation", "count", "p50", "p95", "total");
        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<20} {:>5} {:>10} {:>10} {:>10}",
                op.name,
                op.count,
                format!("{:.3?}", op.p50),
                format!("{:.3?}", op.p95),
                format!("{:.3?}", op.total),
            );
        }
        out
    }
}
