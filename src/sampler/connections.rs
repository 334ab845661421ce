// TCP connection attribution and the per-process connection table

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use super::Sampler;
use crate::backends::process::{ConnectionEntry, ProcessUtils, TcpState};
use crate::process::{ConnectionRecord, ProcessConnections};
use crate::resolver::{HostnameResolver, resolve_if_public};

/// Connections of one process as read from the system table this tick
#[derive(Debug, Clone)]
pub struct ObservedProcess {
    pub pid: i32,
    pub name: String,
    pub connections: Vec<ConnectionEntry>,
}

/// Reads the connection table and groups owned connections by pid
pub struct ConnectionSampler {
    utils: Arc<dyn ProcessUtils>,
}

impl ConnectionSampler {
    pub fn new(utils: Arc<dyn ProcessUtils>) -> Self {
        Self { utils }
    }

    fn process_name(&self, pid: i32, mapped: &str) -> String {
        if !mapped.is_empty() && !mapped.starts_with("PID ") {
            return mapped.to_string();
        }
        self.utils
            .get_process_name(pid)
            .unwrap_or_else(|_| format!("PID {}", pid))
    }
}

impl Sampler for ConnectionSampler {
    type Output = Vec<ObservedProcess>;

    fn name(&self) -> &'static str {
        "connections"
    }

    fn sample(&mut self, _now: Instant) -> Vec<ObservedProcess> {
        let map = match self.utils.get_connection_map() {
            Ok(map) => map,
            Err(e) => {
                log::debug!("Connection table unavailable: {:#}", e);
                return Vec::new();
            }
        };

        let mut observed: Vec<ObservedProcess> = Vec::new();
        let mut index: HashMap<i32, usize> = HashMap::new();

        for entry in map.all_tcp() {
            if entry.state == TcpState::Listen {
                continue;
            }
            // Owner unknown (other user's socket, exited) or the idle process
            let Some((pid, mapped_name)) = map.owner_of(entry) else {
                continue;
            };

            let slot = *index.entry(pid).or_insert_with(|| {
                observed.push(ObservedProcess {
                    pid,
                    name: self.process_name(pid, mapped_name),
                    connections: Vec::new(),
                });
                observed.len() - 1
            });
            observed[slot].connections.push(entry.clone());
        }

        log::debug!("Sampled connections for {} processes", observed.len());
        observed
    }
}

/// Connection list as presented: one entry per pid, most connections first
///
/// Reconciled in place rather than replaced so records keep their pending
/// hostname lookups and entries keep their presentation flags.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: Vec<ProcessConnections>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ProcessConnections] {
        &self.entries
    }

    pub fn entry_mut(&mut self, pid: i32) -> Option<&mut ProcessConnections> {
        self.entries.iter_mut().find(|e| e.pid == pid)
    }

    /// Hostnames already known for remote addresses in the current table
    fn known_hostnames(&self) -> HashMap<IpAddr, String> {
        self.entries
            .iter()
            .flat_map(|e| e.connections.iter())
            .filter_map(|c| c.remote_hostname().map(|h| (c.remote_addr, h.to_string())))
            .collect()
    }

    pub fn reconcile(&mut self, observed: Vec<ObservedProcess>, resolver: &dyn HostnameResolver) {
        let known = self.known_hostnames();

        self.entries
            .retain(|e| observed.iter().any(|o| o.pid == e.pid));

        for process in observed {
            let previous: &[Arc<ConnectionRecord>] = self
                .entries
                .iter()
                .find(|e| e.pid == process.pid)
                .map(|e| e.connections.as_slice())
                .unwrap_or(&[]);

            let connections: Vec<Arc<ConnectionRecord>> = process
                .connections
                .iter()
                .map(|c| {
                    let record =
                        ConnectionRecord::new(c.remote_addr, c.remote_port, c.local_port, c.state);
                    if let Some(existing) = previous.iter().find(|p| p.same_connection(&record)) {
                        return Arc::clone(existing);
                    }

                    let record = Arc::new(record);
                    match known.get(&record.remote_addr) {
                        Some(host) => {
                            record.set_remote_hostname(host.clone());
                        }
                        None => {
                            resolve_if_public(resolver, &record);
                        }
                    }
                    record
                })
                .collect();

            match self.entry_mut(process.pid) {
                Some(entry) => {
                    entry.name = process.name;
                    entry.connections = connections;
                }
                None => self.entries.push(ProcessConnections {
                    pid: process.pid,
                    name: process.name,
                    connections,
                    expanded: false,
                }),
            }
        }

        // Stable: equal counts keep their previous relative order
        self.entries
            .sort_by(|a, b| b.connection_count().cmp(&a.connection_count()));
    }

    pub fn total_connections(&self) -> usize {
        self.entries.iter().map(|e| e.connection_count()).sum()
    }
}
