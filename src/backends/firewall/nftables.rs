//! nftables firewall backend (Linux)
//!
//! nftables cannot match on a program path, so a block is expressed through
//! cgroup v2 instead:
//!
//! 1. Create cgroup `/sys/fs/cgroup/chadwall/<process>`
//! 2. Write the target PID to its `cgroup.procs`
//! 3. Add `socket cgroupv2 level 2 "chadwall/<process>" counter drop` to the
//!    `output_block` or `input_block` chain of table `inet chadwall`
//! 4. The rule carries its name as `comment`, which is how rules are listed
//!    and deleted again
//!
//! Children forked after the block inherit the cgroup. Other already-running
//! instances of the same program are not moved.

use super::command::{CommandOutput, CommandRunner};
use super::rule_name::Direction;
use super::{BlockRequest, FirewallBackend};
use crate::backends::BackendPriority;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const NFT_TABLE: &str = "chadwall";
const NFT_CHAIN_OUTPUT: &str = "output_block";
const NFT_CHAIN_INPUT: &str = "input_block";
const CGROUP_V2_BASE: &str = "/sys/fs/cgroup";
const CHADWALL_CGROUP: &str = "chadwall";

/// One of our rules as listed by `nft -a`
#[derive(Debug, Clone, PartialEq, Eq)]
struct NftRule {
    chain: String,
    handle: u64,
    comment: String,
}

pub struct NftablesFirewall {
    runner: Arc<dyn CommandRunner>,
    /// Root of the cgroup v2 hierarchy
    cgroup_root: PathBuf,
}

impl NftablesFirewall {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_cgroup_root(runner, PathBuf::from(CGROUP_V2_BASE))
    }

    pub fn with_cgroup_root(runner: Arc<dyn CommandRunner>, cgroup_root: PathBuf) -> Self {
        Self {
            runner,
            cgroup_root,
        }
    }

    fn chain_for(direction: Direction) -> &'static str {
        match direction {
            Direction::Out => NFT_CHAIN_OUTPUT,
            Direction::In => NFT_CHAIN_INPUT,
        }
    }

    fn nft(&self, args: &[&str]) -> Result<CommandOutput> {
        self.runner.run("nft", args)
    }

    /// Create table and chains if they don't exist yet
    fn ensure_table(&self) -> Result<()> {
        if self.nft(&["list", "table", "inet", NFT_TABLE])?.success {
            return Ok(());
        }

        self.nft(&["add", "table", "inet", NFT_TABLE])?
            .into_result("Creating nftables table")?;

        for (chain, hook) in [(NFT_CHAIN_OUTPUT, "output"), (NFT_CHAIN_INPUT, "input")] {
            self.nft(&[
                "add", "chain", "inet", NFT_TABLE, chain, "{", "type", "filter", "hook", hook,
                "priority", "0", ";", "}",
            ])?
            .into_result("Creating nftables chain")?;
        }

        log::info!("Initialized nftables table inet {}", NFT_TABLE);
        Ok(())
    }

    fn list_rules(&self) -> Result<Vec<NftRule>> {
        let output = self.nft(&["-a", "list", "table", "inet", NFT_TABLE])?;

        // Table not created yet: nothing is blocked
        if !output.success && output.stderr.contains("No such file or directory") {
            return Ok(Vec::new());
        }

        let output = output.into_result("nft list table")?;
        Ok(parse_rules(&output.stdout))
    }

    fn cgroup_dir(&self, process_name: &str) -> PathBuf {
        self.cgroup_root
            .join(CHADWALL_CGROUP)
            .join(cgroup_component(process_name))
    }

    /// Path relative to the cgroup root, as `socket cgroupv2` expects it
    fn relative_cgroup(process_name: &str) -> String {
        format!("{}/{}", CHADWALL_CGROUP, cgroup_component(process_name))
    }

    fn move_into_cgroup(&self, process_name: &str, pid: i32) -> Result<()> {
        let dir = self.cgroup_dir(process_name);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create cgroup at {:?}", dir))?;

        fs::write(dir.join("cgroup.procs"), pid.to_string())
            .with_context(|| format!("Failed to add PID {} to cgroup {:?}", pid, dir))?;

        log::debug!("Moved PID {} into cgroup {:?}", pid, dir);
        Ok(())
    }

    /// Release a process cgroup once neither direction references it
    fn release_cgroup(&self, process_name: &str) {
        let dir = self.cgroup_dir(process_name);
        if !dir.exists() {
            return;
        }

        // A populated cgroup can't be removed; hand its members back to the root
        if let Ok(contents) = fs::read_to_string(dir.join("cgroup.procs")) {
            let root_procs = self.cgroup_root.join("cgroup.procs");
            for pid in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if let Err(e) = fs::write(&root_procs, pid) {
                    log::debug!("Failed to move PID {} back to root cgroup: {}", pid, e);
                }
            }
        }

        match fs::remove_dir(&dir) {
            Ok(()) => log::debug!("Removed cgroup {:?}", dir),
            Err(e) => log::warn!("Failed to remove cgroup directory {:?}: {}", dir, e),
        }
    }
}

impl FirewallBackend for NftablesFirewall {
    fn name(&self) -> &'static str {
        "nftables"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Better
    }

    fn is_available() -> bool {
        let cgroup_v2 = Path::new(CGROUP_V2_BASE).join("cgroup.controllers").exists();
        let nft = std::process::Command::new("nft")
            .arg("--version")
            .output()
            .is_ok();

        cfg!(target_os = "linux") && cgroup_v2 && nft
    }

    fn list_rule_names(&self) -> Result<Vec<String>> {
        Ok(self.list_rules()?.into_iter().map(|r| r.comment).collect())
    }

    fn add_block_rule(&self, request: &BlockRequest) -> Result<()> {
        self.ensure_table()?;
        self.move_into_cgroup(&request.rule.process_name, request.pid)?;

        let rule = format!(
            "socket cgroupv2 level 2 \"{}\" counter drop comment \"{}\"",
            Self::relative_cgroup(&request.rule.process_name),
            request.rule
        );
        let chain = Self::chain_for(request.rule.direction);

        self.nft(&["add", "rule", "inet", NFT_TABLE, chain, &rule])?
            .into_result("nft add rule")?;

        log::info!(
            "Added nftables rule {} for PID {} ({})",
            request.rule,
            request.pid,
            request.program.display()
        );
        Ok(())
    }

    fn delete_rule(&self, rule_name: &str) -> Result<()> {
        let rules = self.list_rules()?;
        let matching: Vec<&NftRule> = rules
            .iter()
            .filter(|r| r.comment.eq_ignore_ascii_case(rule_name))
            .collect();

        if matching.is_empty() {
            anyhow::bail!("No rules match {}", rule_name);
        }

        for rule in &matching {
            let chain = rule.chain.as_str();
            let id = rule.handle.to_string();
            let args: [&str; 7] = ["delete", "rule", "inet", NFT_TABLE, chain, "handle", &id];
            self.nft(&args)?.into_result("nft delete rule")?;
        }
        log::info!("Deleted nftables rule {}", rule_name);

        // Drop the cgroup when this was the last rule pointing at it
        if let Some(process) = rule_process_name(rule_name) {
            let still_referenced = rules.iter().any(|r| {
                !r.comment.eq_ignore_ascii_case(rule_name)
                    && rule_process_name(&r.comment)
                        .is_some_and(|p| p.eq_ignore_ascii_case(&process))
            });
            if !still_referenced {
                self.release_cgroup(&process);
            }
        }

        Ok(())
    }
}

/// Process token of a rule name, kept verbatim so the cgroup path matches
fn rule_process_name(rule_name: &str) -> Option<String> {
    let parts: Vec<&str> = rule_name.split('_').collect();
    (parts.len() >= 4).then(|| parts[2..parts.len() - 1].join("_"))
}

/// Process names may contain characters that are awkward in paths or nft strings
fn cgroup_component(process_name: &str) -> String {
    process_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Parse `nft -a list table` output into our commented rules
fn parse_rules(output: &str) -> Vec<NftRule> {
    let mut rules = Vec::new();
    let mut chain: Option<String> = None;

    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("chain ") {
            chain = rest.split_whitespace().next().map(str::to_string);
            continue;
        }
        if line.starts_with('}') {
            chain = None;
            continue;
        }

        let Some(chain_name) = &chain else {
            continue;
        };

        let comment = line
            .split_once("comment \"")
            .and_then(|(_, rest)| rest.split_once('"'))
            .map(|(comment, _)| comment.to_string());
        let handle = line
            .rsplit_once("# handle ")
            .and_then(|(_, h)| h.trim().parse::<u64>().ok());

        if let (Some(comment), Some(handle)) = (comment, handle) {
            rules.push(NftRule {
                chain: chain_name.clone(),
                handle,
                comment,
            });
        }
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::firewall::rule_name::BlockRuleName;
    use std::sync::Mutex;

    const LISTING: &str = r#"table inet chadwall { # handle 12
	chain output_block { # handle 1
		type filter hook output priority filter; policy accept;
		socket cgroupv2 level 2 "chadwall/firefox" counter packets 4 bytes 240 drop comment "ChadWall_Block_firefox_OUT" # handle 3
		socket cgroupv2 level 2 "chadwall/curl" counter packets 0 bytes 0 drop comment "ChadWall_Block_curl_OUT" # handle 5
	}
	chain input_block { # handle 2
		type filter hook input priority filter; policy accept;
		socket cgroupv2 level 2 "chadwall/firefox" counter packets 0 bytes 0 drop comment "ChadWall_Block_firefox_IN" # handle 4
	}
}
"#;

    /// Replays a fixed listing and records mutations
    struct FakeNft {
        listing: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeNft {
        fn new(listing: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                listing: listing.map(str::to_string),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl CommandRunner for FakeNft {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            assert_eq!(program, "nft");
            self.calls.lock().unwrap().push(args.join(" "));

            let listing_cmd = args.contains(&"list");
            Ok(match (&self.listing, listing_cmd) {
                (Some(listing), true) => CommandOutput {
                    success: true,
                    stdout: listing.clone(),
                    stderr: String::new(),
                },
                (None, true) => CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: "Error: No such file or directory\n".to_string(),
                },
                (_, false) => CommandOutput {
                    success: true,
                    ..Default::default()
                },
            })
        }
    }

    #[test]
    fn test_parse_rules() {
        let rules = parse_rules(LISTING);
        assert_eq!(
            rules,
            vec![
                NftRule {
                    chain: "output_block".to_string(),
                    handle: 3,
                    comment: "ChadWall_Block_firefox_OUT".to_string(),
                },
                NftRule {
                    chain: "output_block".to_string(),
                    handle: 5,
                    comment: "ChadWall_Block_curl_OUT".to_string(),
                },
                NftRule {
                    chain: "input_block".to_string(),
                    handle: 4,
                    comment: "ChadWall_Block_firefox_IN".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_missing_table_lists_nothing() {
        let nft = NftablesFirewall::new(FakeNft::new(None));
        assert!(nft.list_rule_names().unwrap().is_empty());
    }

    #[test]
    fn test_add_rule_creates_table_and_cgroup() {
        let root = tempfile::tempdir().unwrap();
        let runner = FakeNft::new(None);
        let nft = NftablesFirewall::with_cgroup_root(runner.clone(), root.path().to_path_buf());

        let request = BlockRequest {
            rule: BlockRuleName::new("ChadWall", "curl", Direction::Out),
            program: PathBuf::from("/usr/bin/curl"),
            pid: 31337,
        };
        nft.add_block_rule(&request).unwrap();

        let procs = fs::read_to_string(root.path().join("chadwall/curl/cgroup.procs")).unwrap();
        assert_eq!(procs, "31337");

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0], "list table inet chadwall");
        assert_eq!(calls[1], "add table inet chadwall");
        assert!(calls[2].starts_with("add chain inet chadwall output_block"));
        assert!(calls[3].starts_with("add chain inet chadwall input_block"));
        assert_eq!(
            calls[4],
            "add rule inet chadwall output_block socket cgroupv2 level 2 \"chadwall/curl\" counter drop comment \"ChadWall_Block_curl_OUT\""
        );
    }

    #[test]
    fn test_delete_rule_by_handle() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("chadwall/curl")).unwrap();
        fs::create_dir_all(root.path().join("chadwall/firefox")).unwrap();

        let runner = FakeNft::new(Some(LISTING));
        let nft = NftablesFirewall::with_cgroup_root(runner.clone(), root.path().to_path_buf());

        nft.delete_rule("ChadWall_Block_firefox_OUT").unwrap();
        nft.delete_rule("chadwall_block_curl_out").unwrap();

        let calls = runner.calls.lock().unwrap();
        assert!(calls.contains(&"delete rule inet chadwall output_block handle 3".to_string()));
        assert!(calls.contains(&"delete rule inet chadwall output_block handle 5".to_string()));

        // firefox still has its IN rule in the listing; curl had only one
        assert!(root.path().join("chadwall/firefox").exists());
        assert!(!root.path().join("chadwall/curl").exists());
    }

    #[test]
    fn test_delete_missing_rule_fails() {
        let nft = NftablesFirewall::new(FakeNft::new(Some(LISTING)));
        assert!(nft.delete_rule("ChadWall_Block_steam_IN").is_err());
    }

    #[test]
    fn test_cgroup_component_sanitizes() {
        assert_eq!(cgroup_component("firefox"), "firefox");
        assert_eq!(cgroup_component("Web Content"), "Web-Content");
        assert_eq!(cgroup_component("kworker/0:1"), "kworker-0-1");
    }
}
