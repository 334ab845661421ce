// sysinfo-only interface backend
//
// Works everywhere sysinfo does. There are no operational flags, so an
// interface counts as up once it has moved any traffic, and the kind is
// inferred from its name.

use super::{InterfaceBackend, InterfaceEntry, InterfaceKind};
use crate::backends::BackendPriority;
use anyhow::Result;
use sysinfo::Networks;

pub struct SysinfoInterfaceBackend {
    networks: Networks,
}

impl SysinfoInterfaceBackend {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoInterfaceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceBackend for SysinfoInterfaceBackend {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Fallback
    }

    fn is_available() -> bool {
        sysinfo::IS_SUPPORTED_SYSTEM
    }

    fn list_interfaces(&mut self) -> Result<Vec<InterfaceEntry>> {
        self.networks.refresh();

        let mut entries: Vec<InterfaceEntry> = self
            .networks
            .iter()
            .map(|(name, data)| {
                let rx_bytes = data.total_received();
                let tx_bytes = data.total_transmitted();
                InterfaceEntry {
                    name: name.clone(),
                    is_up: rx_bytes > 0 || tx_bytes > 0,
                    kind: InterfaceKind::from_name(name),
                    rx_bytes,
                    tx_bytes,
                }
            })
            .collect();

        // Networks is hash-ordered; sort so "first match" is stable between runs
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries)
    }
}
