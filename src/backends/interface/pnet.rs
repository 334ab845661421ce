// pnet-based interface backend
//
// pnet_datalink supplies the interface list with real up/loopback/p2p flags;
// byte counters come from sysinfo since pnet only offers packet capture.

use super::{InterfaceBackend, InterfaceEntry, InterfaceKind};
use crate::backends::BackendPriority;
use anyhow::Result;
use pnet_datalink::NetworkInterface;
use sysinfo::Networks;

pub struct PnetInterfaceBackend {
    networks: Networks,
}

impl PnetInterfaceBackend {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }

    fn classify(iface: &NetworkInterface) -> InterfaceKind {
        if iface.is_loopback() {
            return InterfaceKind::Loopback;
        }
        if iface.is_point_to_point() {
            return InterfaceKind::Tunnel;
        }
        if is_wireless(&iface.name) {
            return InterfaceKind::Wireless;
        }
        InterfaceKind::from_name(&iface.name)
    }
}

impl Default for PnetInterfaceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceBackend for PnetInterfaceBackend {
    fn name(&self) -> &'static str {
        "pnet"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Better
    }

    fn is_available() -> bool {
        // Interface names from pnet match sysinfo's on Unix; on Windows pnet
        // reports NPF device paths instead of adapter names
        cfg!(target_os = "linux")
            || cfg!(target_os = "macos")
            || cfg!(target_os = "freebsd")
            || cfg!(target_os = "openbsd")
            || cfg!(target_os = "netbsd")
    }

    fn list_interfaces(&mut self) -> Result<Vec<InterfaceEntry>> {
        self.networks.refresh();

        let entries = pnet_datalink::interfaces()
            .into_iter()
            .map(|iface| {
                let (rx_bytes, tx_bytes) = self
                    .networks
                    .iter()
                    .find(|(name, _)| **name == iface.name)
                    .map(|(_, data)| (data.total_received(), data.total_transmitted()))
                    .unwrap_or((0, 0));

                InterfaceEntry {
                    kind: Self::classify(&iface),
                    is_up: iface.is_up(),
                    name: iface.name,
                    rx_bytes,
                    tx_bytes,
                }
            })
            .collect();

        Ok(entries)
    }
}

/// Linux exposes a `wireless` directory for 802.11 devices
fn is_wireless(name: &str) -> bool {
    cfg!(target_os = "linux")
        && std::path::Path::new("/sys/class/net")
            .join(name)
            .join("wireless")
            .exists()
}
