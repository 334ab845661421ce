// Per-process network rate estimation from cumulative I/O counters

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Sampler, counter_rate};
use crate::backends::process::{IoCounters, ProcessUtils};
use crate::heuristic::NetworkHeuristic;
use crate::process::ProcessSample;

/// Last counters seen for a pid
#[derive(Debug, Clone, Copy)]
struct IoBaseline {
    counters: IoCounters,
    /// Distinguishes a reused pid from the process the baseline belongs to
    start_time: u64,
    sampled_at: Instant,
    /// Rates reported for the last completed interval
    download: f64,
    upload: f64,
}

impl IoBaseline {
    fn fresh(counters: IoCounters, start_time: u64, now: Instant) -> Self {
        Self {
            counters,
            start_time,
            sampled_at: now,
            download: 0.0,
            upload: 0.0,
        }
    }
}

/// Estimates per-process network rates
///
/// Reads are attributed to download and writes to upload, scaled by the
/// heuristic factor for the process name. The first observation of a pid
/// only establishes its baseline and reports zero.
pub struct ProcessIoSampler {
    utils: Arc<dyn ProcessUtils>,
    heuristic: NetworkHeuristic,
    baselines: HashMap<i32, IoBaseline>,
    min_elapsed: Duration,
    clamp_negative: bool,
}

impl ProcessIoSampler {
    pub fn new(
        utils: Arc<dyn ProcessUtils>,
        heuristic: NetworkHeuristic,
        min_elapsed: Duration,
        clamp_negative: bool,
    ) -> Self {
        Self {
            utils,
            heuristic,
            baselines: HashMap::new(),
            min_elapsed,
            clamp_negative,
        }
    }

    pub fn tracked_pids(&self) -> usize {
        self.baselines.len()
    }

    /// Rate for one process with readable counters, advancing its baseline
    fn rate_for(
        &mut self,
        pid: i32,
        name: &str,
        start_time: u64,
        counters: IoCounters,
        now: Instant,
    ) -> (f64, f64) {
        let Some(baseline) = self.baselines.get_mut(&pid) else {
            self.baselines
                .insert(pid, IoBaseline::fresh(counters, start_time, now));
            return (0.0, 0.0);
        };

        if baseline.start_time != start_time {
            log::debug!("PID {} was reused by {}, discarding its baseline", pid, name);
            *baseline = IoBaseline::fresh(counters, start_time, now);
            return (0.0, 0.0);
        }

        let elapsed = now.saturating_duration_since(baseline.sampled_at);
        if elapsed < self.min_elapsed {
            return (baseline.download, baseline.upload);
        }

        let secs = elapsed.as_secs_f64();
        let factor = self.heuristic.factor_for(name);
        let download = counter_rate(
            baseline.counters.read_bytes,
            counters.read_bytes,
            secs,
            self.clamp_negative,
        ) * factor;
        let upload = counter_rate(
            baseline.counters.write_bytes,
            counters.write_bytes,
            secs,
            self.clamp_negative,
        ) * factor;

        *baseline = IoBaseline {
            counters,
            start_time,
            sampled_at: now,
            download,
            upload,
        };

        (download, upload)
    }
}

impl Sampler for ProcessIoSampler {
    type Output = Vec<ProcessSample>;

    fn name(&self) -> &'static str {
        "process-io"
    }

    fn sample(&mut self, now: Instant) -> Vec<ProcessSample> {
        self.utils.refresh_caches();

        let processes = match self.utils.get_all_processes() {
            Ok(processes) => processes,
            Err(e) => {
                log::warn!("Process enumeration failed: {:#}", e);
                return Vec::new();
            }
        };

        let mut samples = Vec::with_capacity(processes.len());
        let mut present = HashSet::with_capacity(processes.len());

        for process in processes {
            if process.pid == 0 || process.name.is_empty() {
                continue;
            }
            present.insert(process.pid);

            // Unreadable counters: show the process, leave its baseline alone
            let Some(counters) = process.io else {
                samples.push(ProcessSample::idle(process.pid, process.name));
                continue;
            };

            let (download, upload) = self.rate_for(
                process.pid,
                &process.name,
                process.start_time,
                counters,
                now,
            );

            samples.push(ProcessSample {
                pid: process.pid,
                name: process.name,
                download_bytes_per_sec: download,
                upload_bytes_per_sec: upload,
            });
        }

        self.baselines.retain(|pid, _| present.contains(pid));

        log::debug!(
            "Sampled {} processes ({} baselines)",
            samples.len(),
            self.baselines.len()
        );
        samples
    }
}
