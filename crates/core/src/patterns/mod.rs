//! The five pattern computations. Each is a pure function of
//! (event window, now) → pattern rows: no IO, no shared state, deterministic
//! output order by primary key so repeated refreshes over the same window
//! produce identical snapshots.
//!
//! Window lengths are owned by the computations, not by callers: the reader
//! is asked for exactly the window its consumer defines.

pub mod association;
pub mod behavior;
pub mod preference;
pub mod reorder;
pub mod session;

/// Fractional days between two instants.
pub(crate) fn days_between(
    earlier: chrono::DateTime<chrono::Utc>,
    later: chrono::DateTime<chrono::Utc>,
) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 86_400_000.0
}

/// Population standard deviation; 0.0 for fewer than two samples.
pub(crate) fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    variance.sqrt()
}
