// Backend trait definitions and core types

pub mod firewall;
pub mod interface;
pub mod process;

/// Backend priority ranking (higher = better)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendPriority {
    Fallback = 1, // Works but limited (name-based guesses, no flags)
    Good = 2,     // Solid implementation (sysinfo, netsh)
    Better = 3,   // Modern, efficient (nftables)
    Best = 4,     // Optimal (native APIs, procfs)
}

/// Backend metadata for listing and selection
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub name: &'static str,
    pub priority: BackendPriority,
    pub available: bool,
}
