// Windows Defender Firewall backend driven through `netsh advfirewall`

use super::command::CommandRunner;
use super::{BlockRequest, FirewallBackend};
use crate::backends::BackendPriority;
use anyhow::Result;
use std::sync::Arc;

const RULE_NAME_PREFIX: &str = "Rule Name:";

/// Program-path block rules in Windows Defender Firewall
///
/// Rule names are matched by netsh case-insensitively, and `show rule`
/// output uses the English `Rule Name:` label.
pub struct NetshFirewall {
    runner: Arc<dyn CommandRunner>,
}

impl NetshFirewall {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl FirewallBackend for NetshFirewall {
    fn name(&self) -> &'static str {
        "netsh"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Good
    }

    fn is_available() -> bool {
        cfg!(target_os = "windows")
    }

    fn list_rule_names(&self) -> Result<Vec<String>> {
        let args = ["advfirewall", "firewall", "show", "rule", "name=all"];
        let output = self
            .runner
            .run("netsh", &args)?
            .into_result("netsh show rule")?;

        Ok(parse_rule_names(&output.stdout))
    }

    fn add_block_rule(&self, request: &BlockRequest) -> Result<()> {
        let name = format!("name={}", request.rule);
        let dir = format!("dir={}", request.rule.direction.as_suffix().to_lowercase());
        let program = format!("program={}", request.program.display());

        self.runner
            .run(
                "netsh",
                &[
                    "advfirewall",
                    "firewall",
                    "add",
                    "rule",
                    &name,
                    &dir,
                    &program,
                    "action=block",
                ],
            )?
            .into_result("netsh add rule")?;

        log::info!("Added firewall rule {} for {}", request.rule, request.program.display());
        Ok(())
    }

    fn delete_rule(&self, rule_name: &str) -> Result<()> {
        let name = format!("name={}", rule_name);
        let args = ["advfirewall", "firewall", "delete", "rule", name.as_str()];
        self.runner
            .run("netsh", &args)?
            .into_result("netsh delete rule")?;

        log::info!("Deleted firewall rule {}", rule_name);
        Ok(())
    }
}

/// Extract every `Rule Name:` value from `netsh advfirewall firewall show rule` output
fn parse_rule_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let head = line.get(..RULE_NAME_PREFIX.len())?;
            if head.eq_ignore_ascii_case(RULE_NAME_PREFIX) {
                Some(line[RULE_NAME_PREFIX.len()..].trim().to_string())
            } else {
                None
            }
        })
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::firewall::command::CommandOutput;
    use crate::backends::firewall::rule_name::{BlockRuleName, Direction};
    use std::path::PathBuf;
    use std::sync::Mutex;

    const SHOW_RULE_OUTPUT: &str = "\r
Rule Name:                            ChadWall_Block_notepad_OUT\r
----------------------------------------------------------------------\r
Enabled:                              Yes\r
Direction:                            Out\r
Profiles:                             Domain,Private,Public\r
Action:                               Block\r
\r
Rule Name:                            Core Networking - DNS (UDP-Out)\r
----------------------------------------------------------------------\r
Enabled:                              Yes\r
\r
rule name:                            ChadWall_Block_notepad_IN\r
----------------------------------------------------------------------\r
Ok.\r
";

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().map(|a| a.to_string()));
            self.calls.lock().unwrap().push(call);
            Ok(CommandOutput {
                success: true,
                stdout: SHOW_RULE_OUTPUT.to_string(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_parse_rule_names() {
        assert_eq!(
            parse_rule_names(SHOW_RULE_OUTPUT),
            vec![
                "ChadWall_Block_notepad_OUT",
                "Core Networking - DNS (UDP-Out)",
                "ChadWall_Block_notepad_IN",
            ]
        );
        assert!(parse_rule_names("No rules match the specified criteria.").is_empty());
    }

    #[test]
    fn test_add_rule_arguments() {
        let runner = Arc::new(RecordingRunner::default());
        let netsh = NetshFirewall::new(runner.clone());

        let request = BlockRequest {
            rule: BlockRuleName::new("ChadWall", "notepad", Direction::Out),
            program: PathBuf::from(r"C:\Windows\System32\notepad.exe"),
            pid: 4242,
        };
        netsh.add_block_rule(&request).unwrap();
        netsh.delete_rule("ChadWall_Block_notepad_IN").unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![
                "netsh",
                "advfirewall",
                "firewall",
                "add",
                "rule",
                "name=ChadWall_Block_notepad_OUT",
                "dir=out",
                r"program=C:\Windows\System32\notepad.exe",
                "action=block",
            ]
        );
        assert_eq!(
            calls[1],
            vec![
                "netsh",
                "advfirewall",
                "firewall",
                "delete",
                "rule",
                "name=ChadWall_Block_notepad_IN",
            ]
        );
    }
}
