// Aggregate download/upload rate of the primary network interface

use chrono::Local;
use std::time::{Duration, Instant};

use super::{Sampler, counter_rate};
use crate::backends::interface::{InterfaceBackend, choose_interface};
use crate::process::InterfaceSample;

#[derive(Debug, Clone, Copy)]
struct CounterBaseline {
    rx_bytes: u64,
    tx_bytes: u64,
    at: Instant,
}

/// Measures the interface chosen at construction
///
/// The interface is picked once. When none qualifies the sampler reports
/// zero forever instead of failing.
pub struct InterfaceSampler {
    backend: Box<dyn InterfaceBackend>,
    interface: Option<String>,
    baseline: Option<CounterBaseline>,
    last: InterfaceSample,
    min_elapsed: Duration,
    clamp_negative: bool,
}

impl InterfaceSampler {
    pub fn new(
        mut backend: Box<dyn InterfaceBackend>,
        preferred: Option<&str>,
        min_elapsed: Duration,
        clamp_negative: bool,
        now: Instant,
    ) -> Self {
        let (interface, baseline) = match backend.list_interfaces() {
            Ok(list) => match choose_interface(&list, preferred) {
                Some(iface) => {
                    log::info!(
                        "Sampling interface {} ({:?}) via {}",
                        iface.name,
                        iface.kind,
                        backend.name()
                    );
                    let baseline = CounterBaseline {
                        rx_bytes: iface.rx_bytes,
                        tx_bytes: iface.tx_bytes,
                        at: now,
                    };
                    (Some(iface.name.clone()), Some(baseline))
                }
                None => {
                    log::warn!("No active network interface found; rates stay at zero");
                    (None, None)
                }
            },
            Err(e) => {
                log::warn!("Failed to enumerate network interfaces: {:#}", e);
                (None, None)
            }
        };

        Self {
            backend,
            last: InterfaceSample::zero(interface.clone()),
            interface,
            baseline,
            min_elapsed,
            clamp_negative,
        }
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    fn read_counters(&mut self, name: &str) -> Option<(u64, u64)> {
        match self.backend.list_interfaces() {
            Ok(list) => {
                let found = list
                    .into_iter()
                    .find(|i| i.name == name)
                    .map(|i| (i.rx_bytes, i.tx_bytes));
                if found.is_none() {
                    log::debug!("Interface {} disappeared", name);
                }
                found
            }
            Err(e) => {
                log::debug!("Failed to read counters for {}: {:#}", name, e);
                None
            }
        }
    }
}

impl Sampler for InterfaceSampler {
    type Output = InterfaceSample;

    fn name(&self) -> &'static str {
        "interface"
    }

    fn sample(&mut self, now: Instant) -> InterfaceSample {
        let (Some(name), Some(baseline)) = (self.interface.clone(), self.baseline) else {
            return InterfaceSample::zero(None);
        };

        let elapsed = now.saturating_duration_since(baseline.at);
        if elapsed < self.min_elapsed {
            return self.last.clone();
        }

        let Some((rx_bytes, tx_bytes)) = self.read_counters(&name) else {
            self.last = InterfaceSample::zero(Some(name));
            return self.last.clone();
        };

        let secs = elapsed.as_secs_f64();
        let download = counter_rate(baseline.rx_bytes, rx_bytes, secs, self.clamp_negative);
        let upload = counter_rate(baseline.tx_bytes, tx_bytes, secs, self.clamp_negative);
        self.last = InterfaceSample {
            interface: Some(name),
            download_bytes_per_sec: download,
            upload_bytes_per_sec: upload,
            sampled_at: Local::now(),
        };
        self.baseline = Some(CounterBaseline {
            rx_bytes,
            tx_bytes,
            at: now,
        });

        self.last.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendPriority;
    use crate::backends::interface::{InterfaceEntry, InterfaceKind};
    use anyhow::Result;
    use std::collections::VecDeque;

    /// Replays counter readings for a single `eth0`, then repeats the last one
    struct ScriptedBackend {
        readings: VecDeque<(u64, u64)>,
        last: (u64, u64),
    }

    impl ScriptedBackend {
        fn boxed(readings: &[(u64, u64)]) -> Box<dyn InterfaceBackend> {
            Box::new(Self {
                readings: readings.iter().copied().collect(),
                last: (0, 0),
            })
        }
    }

    impl InterfaceBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn priority(&self) -> BackendPriority {
            BackendPriority::Fallback
        }

        fn is_available() -> bool {
            true
        }

        fn list_interfaces(&mut self) -> Result<Vec<InterfaceEntry>> {
            if let Some(next) = self.readings.pop_front() {
                self.last = next;
            }
            Ok(vec![
                InterfaceEntry {
                    name: "lo".to_string(),
                    is_up: true,
                    kind: InterfaceKind::Loopback,
                    rx_bytes: 999_999,
                    tx_bytes: 999_999,
                },
                InterfaceEntry {
                    name: "eth0".to_string(),
                    is_up: true,
                    kind: InterfaceKind::Ethernet,
                    rx_bytes: self.last.0,
                    tx_bytes: self.last.1,
                },
            ])
        }
    }

    struct EmptyBackend;

    impl InterfaceBackend for EmptyBackend {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn priority(&self) -> BackendPriority {
            BackendPriority::Fallback
        }

        fn is_available() -> bool {
            true
        }

        fn list_interfaces(&mut self) -> Result<Vec<InterfaceEntry>> {
            Ok(Vec::new())
        }
    }

    const MIN: Duration = Duration::from_millis(100);

    #[test]
    fn test_rate_is_delta_over_elapsed() {
        let t0 = Instant::now();
        let backend = ScriptedBackend::boxed(&[(1_000, 500), (5_000, 1_500)]);
        let mut sampler = InterfaceSampler::new(backend, None, MIN, true, t0);
        assert_eq!(sampler.interface(), Some("eth0"));

        let sample = sampler.sample(t0 + Duration::from_secs(2));
        assert_eq!(sample.download_bytes_per_sec, 2_000.0);
        assert_eq!(sample.upload_bytes_per_sec, 500.0);
    }

    #[test]
    fn test_short_interval_keeps_previous_values() {
        let t0 = Instant::now();
        let backend = ScriptedBackend::boxed(&[(0, 0), (1_000, 1_000), (9_000, 9_000)]);
        let mut sampler = InterfaceSampler::new(backend, None, MIN, true, t0);

        let first = sampler.sample(t0 + Duration::from_secs(1));
        assert_eq!(first.download_bytes_per_sec, 1_000.0);

        // 50ms later: no read, no baseline change
        let again = sampler.sample(t0 + Duration::from_millis(1_050));
        assert_eq!(again, first);

        let next = sampler.sample(t0 + Duration::from_secs(2));
        assert_eq!(next.download_bytes_per_sec, 8_000.0);
    }

    #[test]
    fn test_counter_reset_is_clamped() {
        let t0 = Instant::now();
        let backend = ScriptedBackend::boxed(&[(10_000, 10_000), (100, 100)]);
        let mut sampler = InterfaceSampler::new(backend, None, MIN, true, t0);

        let sample = sampler.sample(t0 + Duration::from_secs(1));
        assert_eq!(sample.download_bytes_per_sec, 0.0);
        assert_eq!(sample.upload_bytes_per_sec, 0.0);
    }

    #[test]
    fn test_no_interface_is_always_zero() {
        let t0 = Instant::now();
        let mut sampler = InterfaceSampler::new(Box::new(EmptyBackend), None, MIN, true, t0);

        assert_eq!(sampler.interface(), None);
        for secs in 1..4 {
            let sample = sampler.sample(t0 + Duration::from_secs(secs));
            assert_eq!(sample.download_bytes_per_sec, 0.0);
            assert_eq!(sample.upload_bytes_per_sec, 0.0);
            assert!(sample.interface.is_none());
        }
    }
}
