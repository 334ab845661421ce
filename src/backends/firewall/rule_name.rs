//! Firewall rule naming convention
//!
//! Every rule this tool installs is named `<tag>_Block_<process>_<IN|OUT>`.
//! The name is the only state kept in the firewall, so it doubles as the
//! wire format for discovering what is blocked:
//!
//! - fields are separated by `_`; at least four are required
//! - field 1 is the application tag, field 2 the literal `Block`
//!   (both compared case-insensitively)
//! - field 3 is the process name, lower-cased on parse
//! - the last field is the direction
//!
//! A process name containing `_` therefore only survives up to its first `_`,
//! so such names are refused when blocking.

use std::fmt;

pub const DEFAULT_RULE_TAG: &str = "ChadWall";
const BLOCK_MARKER: &str = "Block";

/// Traffic direction a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Out, Direction::In];

    pub fn as_suffix(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("IN") {
            Some(Direction::In)
        } else if s.eq_ignore_ascii_case("OUT") {
            Some(Direction::Out)
        } else {
            None
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_suffix())
    }
}

/// A parsed or to-be-installed block rule name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockRuleName {
    pub tag: String,
    pub process_name: String,
    pub direction: Direction,
}

impl BlockRuleName {
    pub fn new(tag: &str, process_name: &str, direction: Direction) -> Self {
        Self {
            tag: tag.to_string(),
            process_name: process_name.to_string(),
            direction,
        }
    }

    /// Parse a firewall rule name, returning `None` for rules that are not ours
    pub fn parse(rule_name: &str, tag: &str) -> Option<Self> {
        let parts: Vec<&str> = rule_name.trim().split('_').collect();
        if parts.len() < 4 {
            return None;
        }

        if !parts[0].eq_ignore_ascii_case(tag) || !parts[1].eq_ignore_ascii_case(BLOCK_MARKER) {
            return None;
        }

        let direction = Direction::from_suffix(parts[parts.len() - 1])?;
        let process_name = parts[2].to_lowercase();
        if process_name.is_empty() {
            return None;
        }

        Some(Self {
            tag: parts[0].to_string(),
            process_name,
            direction,
        })
    }
}

impl fmt::Display for BlockRuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.tag,
            BLOCK_MARKER,
            self.process_name,
            self.direction.as_suffix()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let rule = BlockRuleName::new("ChadWall", "notepad", Direction::Out);
        assert_eq!(rule.to_string(), "ChadWall_Block_notepad_OUT");

        let rule = BlockRuleName::new("ChadWall", "notepad", Direction::In);
        assert_eq!(rule.to_string(), "ChadWall_Block_notepad_IN");
    }

    #[test]
    fn test_round_trip() {
        for direction in Direction::BOTH {
            let rule = BlockRuleName::new(DEFAULT_RULE_TAG, "firefox", direction);
            let parsed = BlockRuleName::parse(&rule.to_string(), DEFAULT_RULE_TAG);
            assert_eq!(parsed, Some(rule));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive_and_lowercases_name() {
        let parsed = BlockRuleName::parse("chadwall_BLOCK_Discord_out", "ChadWall").unwrap();
        assert_eq!(parsed.process_name, "discord");
        assert_eq!(parsed.direction, Direction::Out);
    }

    #[test]
    fn test_parse_rejects_foreign_rules() {
        assert!(BlockRuleName::parse("Core Networking - DNS (UDP-Out)", "ChadWall").is_none());
        assert!(BlockRuleName::parse("Other_Block_notepad_OUT", "ChadWall").is_none());
        assert!(BlockRuleName::parse("ChadWall_Allow_notepad_OUT", "ChadWall").is_none());
        assert!(BlockRuleName::parse("ChadWall_Block_notepad", "ChadWall").is_none());
        assert!(BlockRuleName::parse("ChadWall_Block_notepad_BOTH", "ChadWall").is_none());
        assert!(BlockRuleName::parse("ChadWall_Block__IN", "ChadWall").is_none());
    }

    #[test]
    fn test_underscore_names_truncate_to_first_field() {
        let rule = BlockRuleName::new("ChadWall", "my_app", Direction::In);
        assert_eq!(rule.to_string(), "ChadWall_Block_my_app_IN");

        let parsed = BlockRuleName::parse(&rule.to_string(), "ChadWall").unwrap();
        assert_eq!(parsed.process_name, "my");
        assert_eq!(parsed.direction, Direction::In);
    }

    #[test]
    fn test_custom_tag() {
        let parsed = BlockRuleName::parse("NetGuard_Block_steam_IN", "NetGuard").unwrap();
        assert_eq!(parsed.tag, "NetGuard");
        assert!(BlockRuleName::parse("NetGuard_Block_steam_IN", "ChadWall").is_none());
    }
}
