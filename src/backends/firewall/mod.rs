// Firewall backend trait and implementations
//
// A backend only knows how to list, add and delete named rules. Which
// processes are blocked is derived from those names one level up.

use super::{BackendInfo, BackendPriority};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

pub mod command;
pub mod netsh;
pub mod nftables;
pub mod rule_name;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use rule_name::{BlockRuleName, DEFAULT_RULE_TAG, Direction};

/// Everything a backend may need to install one directional block rule
#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub rule: BlockRuleName,
    /// Executable of the process being blocked
    pub program: PathBuf,
    pub pid: i32,
}

/// Host firewall rule store
pub trait FirewallBackend: Send + Sync {
    /// Backend name (e.g., "netsh", "nftables")
    fn name(&self) -> &'static str;

    /// Backend priority for auto-selection
    fn priority(&self) -> BackendPriority;

    /// Check if this backend is available on the current system
    fn is_available() -> bool
    where
        Self: Sized;

    /// Names of every rule in the store, ours or not
    fn list_rule_names(&self) -> Result<Vec<String>>;

    /// Install one block rule; fails if the firewall tool reports failure
    fn add_block_rule(&self, request: &BlockRequest) -> Result<()>;

    /// Delete a rule by name; fails if no such rule exists
    fn delete_rule(&self, rule_name: &str) -> Result<()>;
}

/// Stand-in when no firewall backend works here; every operation fails
pub struct UnavailableFirewall {
    reason: String,
}

impl UnavailableFirewall {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl FirewallBackend for UnavailableFirewall {
    fn name(&self) -> &'static str {
        "none"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Fallback
    }

    fn is_available() -> bool {
        false
    }

    fn list_rule_names(&self) -> Result<Vec<String>> {
        Err(anyhow::anyhow!("Firewall unavailable: {}", self.reason))
    }

    fn add_block_rule(&self, _request: &BlockRequest) -> Result<()> {
        Err(anyhow::anyhow!("Firewall unavailable: {}", self.reason))
    }

    fn delete_rule(&self, _rule_name: &str) -> Result<()> {
        Err(anyhow::anyhow!("Firewall unavailable: {}", self.reason))
    }
}

/// Detect all firewall backends on current system
pub fn detect_firewall_backends() -> Vec<BackendInfo> {
    vec![
        BackendInfo {
            name: "netsh",
            priority: BackendPriority::Good,
            available: netsh::NetshFirewall::is_available(),
        },
        BackendInfo {
            name: "nftables",
            priority: BackendPriority::Better,
            available: nftables::NftablesFirewall::is_available(),
        },
    ]
}

/// Select a firewall backend, honoring an explicit preference
pub fn select_firewall_backend(
    preference: Option<&str>,
    runner: Arc<dyn CommandRunner>,
) -> Result<Box<dyn FirewallBackend>> {
    if let Some(name) = preference {
        // User explicitly requested a backend
        return create_firewall_backend(name, runner);
    }

    let best = detect_firewall_backends()
        .into_iter()
        .filter(|b| b.available)
        .max_by_key(|b| b.priority)
        .ok_or_else(|| anyhow::anyhow!("No firewall backend available on this platform"))?;

    log::info!("Selected firewall backend: {}", best.name);
    create_firewall_backend(best.name, runner)
}

fn create_firewall_backend(
    name: &str,
    runner: Arc<dyn CommandRunner>,
) -> Result<Box<dyn FirewallBackend>> {
    match name {
        "netsh" => Ok(Box::new(netsh::NetshFirewall::new(runner))),
        "nftables" => Ok(Box::new(nftables::NftablesFirewall::new(runner))),
        _ => Err(anyhow::anyhow!("Unknown firewall backend: {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_backend_rejected() {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::default());
        let err = select_firewall_backend(Some("pf"), runner).err().unwrap();
        assert!(err.to_string().contains("Unknown firewall backend"));
    }

    #[test]
    fn test_detect_lists_every_backend() {
        let names: Vec<_> = detect_firewall_backends().iter().map(|b| b.name).collect();
        assert_eq!(names, ["netsh", "nftables"]);
    }
}
