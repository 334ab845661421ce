//! chadwall: per-process network activity monitor with firewall-backed blocking
//!
//! The core samples interface throughput, estimates per-process rates,
//! tracks live TCP connections per process and maintains the set of
//! processes blocked through the host firewall. Presentation layers read
//! the shared state through [`CoreHandle`] and listen for [`CoreEvent`]s.

pub mod address_filter;
pub mod backends;
pub mod blocklist_store;
pub mod config;
pub mod events;
pub mod firewall;
pub mod groups;
pub mod heuristic;
pub mod process;
pub mod resolver;
pub mod sampler;
pub mod scheduler;

pub use config::Config;
pub use events::{CoreEvent, EventBus};
pub use firewall::{FirewallReconciler, UnblockSummary};
pub use groups::{GroupSortKey, GroupSummary, ProcessGroup, ProcessGroupAggregator};
pub use process::{
    ConnectionRecord, InterfaceSample, ProcessConnections, ProcessSample, format_rate,
};
pub use scheduler::{CoreHandle, Intervals, Samplers, Scheduler};
