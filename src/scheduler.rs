//! Periodic sampling and the shared state presentation code reads from
//!
//! Every sampler gets its own tokio task and interval. A pass runs on the
//! blocking pool and is awaited before the next tick is taken, so at most
//! one pass per sampler is in flight; ticks that fire meanwhile are skipped.
//! Firewall commands and kills also run on the blocking pool, never on a
//! sampler task.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::backends::firewall::{
    FirewallBackend, SystemCommandRunner, UnavailableFirewall, select_firewall_backend,
};
use crate::backends::interface::select_interface_backend;
use crate::backends::process::{ProcessUtils, create_process_utils_with_socket_mapper};
use crate::blocklist_store::BlocklistStore;
use crate::config::Config;
use crate::events::{CoreEvent, EventBus};
use crate::firewall::{FirewallReconciler, UnblockSummary};
use crate::groups::{GroupSummary, ProcessGroup, ProcessGroupAggregator};
use crate::heuristic::NetworkHeuristic;
use crate::process::{InterfaceSample, ProcessConnections};
use crate::resolver::{DnsLookupResolver, HostnameResolver};
use crate::sampler::{
    ConnectionSampler, ConnectionTable, InterfaceSampler, ProcessIoSampler, Sampler,
};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latest applied results, one lock per collection
pub struct SharedState {
    interface: Mutex<InterfaceSample>,
    groups: Mutex<ProcessGroupAggregator>,
    connections: Mutex<ConnectionTable>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            interface: Mutex::new(InterfaceSample::zero(None)),
            groups: Mutex::new(ProcessGroupAggregator::new()),
            connections: Mutex::new(ConnectionTable::new()),
        }
    }
}

/// Cloneable handle for consumers: read accessors plus commands
#[derive(Clone)]
pub struct CoreHandle {
    state: Arc<SharedState>,
    firewall: Arc<FirewallReconciler>,
    utils: Arc<dyn ProcessUtils>,
    events: EventBus,
}

impl CoreHandle {
    pub fn new(
        utils: Arc<dyn ProcessUtils>,
        firewall: Arc<FirewallReconciler>,
        events: EventBus,
    ) -> Self {
        Self {
            state: Arc::new(SharedState::default()),
            firewall,
            utils,
            events,
        }
    }

    /// Process and firewall plumbing for the host, without any samplers
    pub fn from_config(config: &Config) -> Self {
        let events = EventBus::new();
        let utils: Arc<dyn ProcessUtils> = Arc::from(create_process_utils_with_socket_mapper(
            config.preferred_socket_mapper.as_deref(),
        ));

        let firewall_backend = build_firewall_backend(config);
        log::info!(
            "Using firewall backend: {} ({:?})",
            firewall_backend.name(),
            firewall_backend.priority()
        );

        let firewall = Arc::new(FirewallReconciler::new(
            Arc::clone(&utils),
            firewall_backend,
            BlocklistStore::default_location(),
            config.rule_tag.clone(),
            events.clone(),
        ));

        Self::new(utils, firewall, events)
    }

    pub fn interface_sample(&self) -> InterfaceSample {
        lock(&self.state.interface).clone()
    }

    pub fn groups(&self) -> Vec<ProcessGroup> {
        lock(&self.state.groups).groups().to_vec()
    }

    /// Mutate group presentation state (sorting, expansion)
    pub fn with_groups<R>(&self, f: impl FnOnce(&mut ProcessGroupAggregator) -> R) -> R {
        let result = f(&mut lock(&self.state.groups));
        self.events.publish(CoreEvent::GroupsChanged);
        result
    }

    pub fn summary(&self) -> GroupSummary {
        lock(&self.state.groups).summary()
    }

    pub fn connections(&self) -> Vec<ProcessConnections> {
        lock(&self.state.connections).entries().to_vec()
    }

    pub fn with_connections<R>(&self, f: impl FnOnce(&mut ConnectionTable) -> R) -> R {
        let result = f(&mut lock(&self.state.connections));
        self.events.publish(CoreEvent::ConnectionsChanged);
        result
    }

    pub fn firewall(&self) -> &Arc<FirewallReconciler> {
        &self.firewall
    }

    /// Against the last refreshed blocked set
    pub fn is_blocked(&self, process_name: &str) -> bool {
        self.firewall.is_blocked(process_name)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub async fn list_blocked(&self) -> Result<Vec<String>> {
        let firewall = Arc::clone(&self.firewall);
        run_blocking(move || Ok(firewall.list_blocked())).await
    }

    pub async fn block(&self, process_name: &str, pid: i32) -> Result<()> {
        let firewall = Arc::clone(&self.firewall);
        let name = process_name.to_string();
        run_blocking(move || firewall.block(&name, pid)).await
    }

    pub async fn unblock(&self, process_name: &str) -> Result<()> {
        let firewall = Arc::clone(&self.firewall);
        let name = process_name.to_string();
        run_blocking(move || firewall.unblock(&name)).await
    }

    pub async fn unblock_all(&self) -> Result<UnblockSummary> {
        let firewall = Arc::clone(&self.firewall);
        run_blocking(move || Ok(firewall.unblock_all())).await
    }

    pub async fn process_name(&self, pid: i32) -> Result<String> {
        let utils = Arc::clone(&self.utils);
        run_blocking(move || utils.get_process_name(pid)).await
    }

    pub async fn kill_process(&self, pid: i32) -> Result<()> {
        let utils = Arc::clone(&self.utils);
        run_blocking(move || utils.kill_process(pid)).await
    }

    fn apply_interface(&self, sample: InterfaceSample) {
        *lock(&self.state.interface) = sample;
        self.events.publish(CoreEvent::InterfaceSampled);
    }

    fn apply_processes(&self, samples: Vec<crate::process::ProcessSample>) {
        lock(&self.state.groups).apply_tick(samples);
        self.events.publish(CoreEvent::GroupsChanged);
    }

    fn apply_connections(
        &self,
        observed: Vec<crate::sampler::ObservedProcess>,
        resolver: &dyn HostnameResolver,
    ) {
        lock(&self.state.connections).reconcile(observed, resolver);
        self.events.publish(CoreEvent::ConnectionsChanged);
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Background task failed")?
}

/// The three samplers driven by the scheduler
pub struct Samplers {
    pub interface: InterfaceSampler,
    pub process_io: ProcessIoSampler,
    pub connections: ConnectionSampler,
}

/// Sampling periods
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub sample: Duration,
    pub connections: Duration,
}

impl Intervals {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sample: Duration::from_millis(config.sample_interval_ms.max(1)),
            connections: Duration::from_millis(config.connection_interval_ms.max(1)),
        }
    }
}

pub struct Scheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn one task per sampler; must be called inside a tokio runtime
    pub fn start(
        samplers: Samplers,
        handle: &CoreHandle,
        resolver: Arc<dyn HostnameResolver>,
        intervals: Intervals,
    ) -> Self {
        let interface_handle = handle.clone();
        let process_handle = handle.clone();
        let connection_handle = handle.clone();

        let tasks = vec![
            spawn_sampler(samplers.interface, intervals.sample, move |sample| {
                interface_handle.apply_interface(sample)
            }),
            spawn_sampler(samplers.process_io, intervals.sample, move |samples| {
                process_handle.apply_processes(samples)
            }),
            spawn_sampler(samplers.connections, intervals.connections, move |observed| {
                connection_handle.apply_connections(observed, resolver.as_ref())
            }),
        ];

        log::info!(
            "Started samplers (every {:?}, connections every {:?})",
            intervals.sample,
            intervals.connections
        );
        Self { tasks }
    }

    /// Build the core and start sampling with the host's backends
    pub fn from_config(config: &Config) -> Result<(Self, CoreHandle)> {
        let handle = CoreHandle::from_config(config);
        let utils = Arc::clone(&handle.utils);

        let interface_backend = select_interface_backend()?;
        let samplers = Samplers {
            interface: InterfaceSampler::new(
                interface_backend,
                config.preferred_interface.as_deref(),
                config.min_elapsed(),
                config.clamp_negative_rates,
                Instant::now(),
            ),
            process_io: ProcessIoSampler::new(
                Arc::clone(&utils),
                NetworkHeuristic::from_config(config),
                config.min_elapsed(),
                config.clamp_negative_rates,
            ),
            connections: ConnectionSampler::new(utils),
        };

        let resolver: Arc<dyn HostnameResolver> = Arc::new(DnsLookupResolver::current()?);
        let scheduler = Self::start(samplers, &handle, resolver, Intervals::from_config(config));

        Ok((scheduler, handle))
    }

    /// Stop all sampler tasks; in-flight blocking passes finish on their own
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        log::debug!("Scheduler stopped");
    }
}

fn build_firewall_backend(config: &Config) -> Box<dyn FirewallBackend> {
    let runner = Arc::new(SystemCommandRunner::new(config.elevation_command.clone()));
    match select_firewall_backend(config.preferred_firewall_backend.as_deref(), runner) {
        Ok(backend) => backend,
        Err(e) => {
            log::warn!("Blocking disabled: {:#}", e);
            Box::new(UnavailableFirewall::new(e.to_string()))
        }
    }
}

/// Drive one sampler: tick, sample on the blocking pool, apply
fn spawn_sampler<S, F>(mut sampler: S, period: Duration, apply: F) -> JoinHandle<()>
where
    S: Sampler,
    F: Fn(S::Output) + Send + 'static,
{
    tokio::spawn(async move {
        let name = sampler.name();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let pass = tokio::task::spawn_blocking(move || {
                let output = sampler.sample(Instant::now());
                (sampler, output)
            })
            .await;

            match pass {
                Ok((returned, output)) => {
                    sampler = returned;
                    apply(output);
                }
                Err(e) => {
                    log::error!("{} sampler stopped: {}", name, e);
                    break;
                }
            }
        }
    })
}
