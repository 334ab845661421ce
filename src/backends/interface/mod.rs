// Network interface backends: enumeration, status, kind and byte counters

use super::{BackendInfo, BackendPriority};
use anyhow::Result;

#[cfg(feature = "monitor-pnet")]
pub mod pnet;
pub mod counters;

/// Interface enumeration backend
///
/// Counters are cumulative totals since the interface came up; the sampler
/// turns them into rates.
pub trait InterfaceBackend: Send {
    /// Backend name (e.g., "pnet", "sysinfo")
    fn name(&self) -> &'static str;

    /// Backend priority for auto-selection
    fn priority(&self) -> BackendPriority;

    /// Check if this backend is available on the current system
    fn is_available() -> bool
    where
        Self: Sized;

    /// List every interface with its current counters
    fn list_interfaces(&mut self) -> Result<Vec<InterfaceEntry>>;
}

/// Coarse interface type, enough to pick the primary adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Ethernet,
    Wireless,
    Loopback,
    Tunnel,
    Other,
}

impl InterfaceKind {
    /// Infer the kind from an interface name across Linux, macOS and Windows naming schemes
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();

        if lower == "lo" || lower.starts_with("lo0") || lower.contains("loopback") {
            return InterfaceKind::Loopback;
        }

        const TUNNEL_PREFIXES: &[&str] = &[
            "tun", "tap", "wg", "ppp", "utun", "ipsec", "gif", "stf", "tailscale", "zt",
        ];
        if TUNNEL_PREFIXES.iter().any(|p| lower.starts_with(p))
            || lower.contains("tunnel")
            || lower.contains("vpn")
        {
            return InterfaceKind::Tunnel;
        }

        if lower.starts_with("wl") || lower.starts_with("wifi") || lower.starts_with("wi-fi") {
            return InterfaceKind::Wireless;
        }

        if lower.starts_with("eth")
            || lower.starts_with("en")
            || lower.starts_with("em")
            || lower.starts_with("ethernet")
        {
            return InterfaceKind::Ethernet;
        }

        InterfaceKind::Other
    }

    pub fn is_preferred(&self) -> bool {
        matches!(self, InterfaceKind::Ethernet | InterfaceKind::Wireless)
    }
}

/// One network interface as seen by a backend
#[derive(Debug, Clone)]
pub struct InterfaceEntry {
    pub name: String,
    pub is_up: bool,
    pub kind: InterfaceKind,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Pick the interface to sample
///
/// Candidates are up, non-loopback, non-tunnel. A wired or wireless adapter
/// wins over anything else; ties go to enumeration order. An explicit
/// `preferred` name bypasses the heuristic when it exists.
pub fn choose_interface<'a>(
    interfaces: &'a [InterfaceEntry],
    preferred: Option<&str>,
) -> Option<&'a InterfaceEntry> {
    if let Some(name) = preferred {
        match interfaces.iter().find(|i| i.name == name) {
            Some(iface) => return Some(iface),
            None => log::warn!("Preferred interface '{}' not found, auto-selecting", name),
        }
    }

    let mut candidates = interfaces
        .iter()
        .filter(|i| i.is_up && !matches!(i.kind, InterfaceKind::Loopback | InterfaceKind::Tunnel))
        .peekable();

    let first = *candidates.peek()?;
    Some(candidates.find(|i| i.kind.is_preferred()).unwrap_or(first))
}

/// Detect all interface backends on current system
pub fn detect_interface_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "monitor-pnet")]
    {
        backends.push(BackendInfo {
            name: "pnet",
            priority: BackendPriority::Better,
            available: pnet::PnetInterfaceBackend::is_available(),
        });
    }

    backends.push(BackendInfo {
        name: "sysinfo",
        priority: BackendPriority::Fallback,
        available: counters::SysinfoInterfaceBackend::is_available(),
    });

    backends
}

/// Auto-select best available interface backend
pub fn select_interface_backend() -> Result<Box<dyn InterfaceBackend>> {
    detect_interface_backends()
        .iter()
        .filter(|b| b.available)
        .max_by_key(|b| b.priority)
        .and_then(|info| create_interface_backend(info.name).ok())
        .ok_or_else(|| anyhow::anyhow!("No interface backend available"))
}

fn create_interface_backend(name: &str) -> Result<Box<dyn InterfaceBackend>> {
    match name {
        #[cfg(feature = "monitor-pnet")]
        "pnet" => Ok(Box::new(pnet::PnetInterfaceBackend::new())),
        "sysinfo" => Ok(Box::new(counters::SysinfoInterfaceBackend::new())),
        _ => Err(anyhow::anyhow!("Unknown interface backend: {}", name)),
    }
}
