//! Blocked-process registry backed by live firewall rules
//!
//! The firewall rule store is the source of truth. The in-memory set is a
//! snapshot of the last authoritative refresh (or of the fallback file
//! before the first one), updated optimistically after successful
//! mutations. Names are compared case-insensitively throughout.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backends::firewall::{BlockRequest, BlockRuleName, Direction, FirewallBackend};
use crate::backends::process::ProcessUtils;
use crate::blocklist_store::BlocklistStore;
use crate::events::{CoreEvent, EventBus};

/// Outcome of unblocking every known process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnblockSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

pub struct FirewallReconciler {
    utils: Arc<dyn ProcessUtils>,
    backend: Box<dyn FirewallBackend>,
    store: BlocklistStore,
    tag: String,
    events: EventBus,
    blocked: Mutex<HashSet<String>>,
}

impl FirewallReconciler {
    pub fn new(
        utils: Arc<dyn ProcessUtils>,
        backend: Box<dyn FirewallBackend>,
        store: BlocklistStore,
        tag: impl Into<String>,
        events: EventBus,
    ) -> Self {
        let seed = store.load();
        log::debug!("Seeded blocked set with {} cached names", seed.len());

        Self {
            utils,
            backend,
            store,
            tag: tag.into(),
            events,
            blocked: Mutex::new(seed),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn blocked(&self) -> MutexGuard<'_, HashSet<String>> {
        self.blocked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn rule_name(&self, process_name: &str, direction: Direction) -> BlockRuleName {
        BlockRuleName::new(&self.tag, process_name, direction)
    }

    /// Re-derive the blocked set from the firewall and persist it
    ///
    /// If the firewall can't be read the previous set is kept.
    pub fn list_blocked(&self) -> Vec<String> {
        match self.backend.list_rule_names() {
            Ok(rule_names) => {
                let found: HashSet<String> = rule_names
                    .iter()
                    .filter_map(|name| BlockRuleName::parse(name, &self.tag))
                    .map(|rule| rule.process_name)
                    .collect();

                log::debug!("Refreshed from firewall: {} blocked processes", found.len());
                self.store.save(&found);
                *self.blocked() = found;
            }
            Err(e) => log::warn!("Failed to refresh blocked set from firewall: {:#}", e),
        }

        self.blocked_snapshot()
    }

    /// Check against the last refreshed set; call `list_blocked` first for freshness
    pub fn is_blocked(&self, process_name: &str) -> bool {
        self.blocked().contains(&process_name.to_lowercase())
    }

    /// Sorted copy of the current set
    pub fn blocked_snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blocked().iter().cloned().collect();
        names.sort();
        names
    }

    /// Install OUT and IN block rules for the executable behind `pid`
    ///
    /// Succeeds only when both rules were created.
    pub fn block(&self, process_name: &str, pid: i32) -> Result<()> {
        let name = normalize(process_name)?;

        // Rules we could not read back would never show as blocked or be removed
        let rule = self.rule_name(&name, Direction::Out).to_string();
        let parsed = BlockRuleName::parse(&rule, &self.tag).map(|r| r.process_name);
        if parsed.as_deref() != Some(name.as_str()) {
            anyhow::bail!("Cannot block {}: rule {} would not parse back", name, rule);
        }

        let program = self
            .utils
            .get_executable_path(pid)
            .with_context(|| format!("Cannot block {}: executable path unknown", name))?;

        let mut failures = Vec::new();
        for direction in Direction::BOTH {
            let request = BlockRequest {
                rule: self.rule_name(&name, direction),
                program: program.clone(),
                pid,
            };
            if let Err(e) = self.backend.add_block_rule(&request) {
                log::error!("Failed to add {} rule for {}: {:#}", direction, name, e);
                failures.push(format!("{}: {:#}", direction, e));
            }
        }

        if !failures.is_empty() {
            anyhow::bail!("Failed to block {}: {}", name, failures.join("; "));
        }

        self.commit(|set| {
            set.insert(name.clone());
        });
        log::info!("Blocked {} (PID {}, {})", name, pid, program.display());
        Ok(())
    }

    /// Delete both rules; succeeds if at least one was removed
    pub fn unblock(&self, process_name: &str) -> Result<()> {
        let name = normalize(process_name)?;

        let results: Vec<(Direction, Result<()>)> = Direction::BOTH
            .into_iter()
            .map(|direction| {
                let rule = self.rule_name(&name, direction).to_string();
                (direction, self.backend.delete_rule(&rule))
            })
            .collect();

        if results.iter().all(|(_, r)| r.is_err()) {
            let reasons: Vec<String> = results
                .iter()
                .filter_map(|(d, r)| r.as_ref().err().map(|e| format!("{}: {:#}", d, e)))
                .collect();
            anyhow::bail!("Failed to unblock {}: {}", name, reasons.join("; "));
        }

        for (direction, result) in &results {
            if let Err(e) = result {
                log::warn!("{} rule for {} was already gone: {:#}", direction, name, e);
            }
        }

        self.commit(|set| {
            set.remove(&name);
        });
        log::info!("Unblocked {}", name);
        Ok(())
    }

    /// Unblock every process the firewall currently blocks
    pub fn unblock_all(&self) -> UnblockSummary {
        let mut summary = UnblockSummary::default();

        for name in self.list_blocked() {
            match self.unblock(&name) {
                Ok(()) => summary.succeeded.push(name),
                Err(e) => {
                    log::error!("{:#}", e);
                    summary.failed.push(name);
                }
            }
        }

        summary
    }

    fn commit(&self, change: impl FnOnce(&mut HashSet<String>)) {
        {
            let mut blocked = self.blocked();
            change(&mut blocked);
            self.store.save(&blocked);
        }
        self.events.publish(CoreEvent::BlockedSetChanged);
    }
}

fn normalize(process_name: &str) -> Result<String> {
    let name = process_name.trim().to_lowercase();
    if name.is_empty() {
        anyhow::bail!("Process name must not be empty");
    }
    Ok(name)
}
