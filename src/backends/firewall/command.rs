// External command execution for firewall tools

use anyhow::{Context, Result};
use std::process::Command;

/// Captured result of an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit status was zero
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Fold a failed status into an error carrying the tool's stderr
    pub fn into_result(self, what: &str) -> Result<CommandOutput> {
        if self.success {
            Ok(self)
        } else {
            let detail = if self.stderr.trim().is_empty() {
                self.stdout.trim().to_string()
            } else {
                self.stderr.trim().to_string()
            };
            Err(anyhow::anyhow!("{} failed: {}", what, detail))
        }
    }
}

/// Runs firewall tooling; swapped for a fake in tests
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runs commands on the host, optionally behind an elevation helper
///
/// With `elevation = ["sudo", "-n"]`, `nft list ruleset` becomes
/// `sudo -n nft list ruleset`.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    elevation: Vec<String>,
}

impl SystemCommandRunner {
    pub fn new(elevation: Option<Vec<String>>) -> Self {
        let elevation = elevation.unwrap_or_default();

        if elevation.is_empty() && !is_elevated() {
            log::warn!("Not running with elevated privileges; firewall changes will likely fail");
        }

        Self { elevation }
    }

    fn build(&self, program: &str, args: &[&str]) -> Command {
        match self.elevation.split_first() {
            Some((helper, helper_args)) => {
                let mut cmd = Command::new(helper);
                cmd.args(helper_args).arg(program).args(args);
                cmd
            }
            None => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("Running: {} {}", program, args.join(" "));

        let output = self
            .build(program, args)
            .output()
            .with_context(|| format!("Failed to execute {}", program))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Whether the current process can modify the firewall without a helper
pub fn is_elevated() -> bool {
    #[cfg(target_os = "linux")]
    {
        nix::unistd::geteuid().is_root()
    }

    // netsh reports access denied itself; nothing cheap to check beforehand
    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_prefix() {
        let runner = SystemCommandRunner {
            elevation: vec!["sudo".to_string(), "-n".to_string()],
        };
        let cmd = runner.build("nft", &["list", "tables"]);

        assert_eq!(cmd.get_program(), "sudo");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-n", "nft", "list", "tables"]);
    }

    #[test]
    fn test_no_elevation_prefix() {
        let runner = SystemCommandRunner::default();
        let cmd = runner.build("netsh", &["advfirewall", "show"]);

        assert_eq!(cmd.get_program(), "netsh");
        assert_eq!(cmd.get_args().count(), 2);
    }

    #[test]
    fn test_into_result_prefers_stderr() {
        let failed = CommandOutput {
            success: false,
            stdout: "ignored".to_string(),
            stderr: "Error: No such file or directory\n".to_string(),
        };
        let err = failed.into_result("nft list").unwrap_err();
        assert_eq!(
            err.to_string(),
            "nft list failed: Error: No such file or directory"
        );

        let ok = CommandOutput {
            success: true,
            ..Default::default()
        };
        assert!(ok.into_result("nft list").is_ok());
    }
}
