// Periodic samplers
//
// Each sampler owns its cross-tick baselines and produces one result per
// call. Samplers run on the blocking pool; the scheduler applies their
// results to shared state.

use std::time::Instant;

pub mod connections;
pub mod interface;
pub mod process_io;

pub use connections::{ConnectionSampler, ConnectionTable, ObservedProcess};
pub use interface::InterfaceSampler;
pub use process_io::ProcessIoSampler;

/// A periodic data source
pub trait Sampler: Send + 'static {
    type Output: Send + 'static;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Take one sample; never fails, degrades to empty or zero output
    fn sample(&mut self, now: Instant) -> Self::Output;
}

/// Bytes per second between two cumulative counter readings
///
/// A counter that went backwards (reset, wrap) yields a negative delta,
/// reported as zero when `clamp_negative` is set.
pub(crate) fn counter_rate(
    previous: u64,
    current: u64,
    elapsed_secs: f64,
    clamp_negative: bool,
) -> f64 {
    let rate = (current as f64 - previous as f64) / elapsed_secs;
    if clamp_negative { rate.max(0.0) } else { rate }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_rate() {
        assert_eq!(counter_rate(1_000, 3_000, 2.0, true), 1_000.0);
        assert_eq!(counter_rate(5_000, 1_000, 1.0, true), 0.0);
        assert_eq!(counter_rate(5_000, 1_000, 1.0, false), -4_000.0);
        assert_eq!(counter_rate(0, 0, 0.5, true), 0.0);
    }
}
