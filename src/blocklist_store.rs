// Local fallback copy of the blocked process set
//
// Only seeds the reconciler before its first firewall refresh; the firewall
// itself stays authoritative. Failures are logged and otherwise ignored.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;

const BLOCKLIST_FILE: &str = "blocked_processes.txt";

#[derive(Debug, Clone)]
pub struct BlocklistStore {
    path: Option<PathBuf>,
}

impl BlocklistStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Store in the per-user application directory
    pub fn default_location() -> Self {
        match Config::app_dir() {
            Ok(dir) => Self::new(dir.join(BLOCKLIST_FILE)),
            Err(e) => {
                log::warn!("Blocklist cache disabled: {:#}", e);
                Self::disabled()
            }
        }
    }

    /// A store that never reads or writes anything
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> HashSet<String> {
        let Some(path) = &self.path else {
            return HashSet::new();
        };
        if !path.exists() {
            return HashSet::new();
        }

        match fs::read_to_string(path) {
            Ok(contents) => contents
                .lines()
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect(),
            Err(e) => {
                log::warn!("Failed to read blocklist cache {:?}: {}", path, e);
                HashSet::new()
            }
        }
    }

    pub fn save(&self, names: &HashSet<String>) {
        let Some(path) = &self.path else {
            return;
        };

        let mut sorted: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
        sorted.sort();
        sorted.dedup();

        let mut contents = sorted.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Failed to create {:?}: {}", parent, e);
                return;
            }
        }

        if let Err(e) = fs::write(path, contents) {
            log::warn!("Failed to write blocklist cache {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlocklistStore::new(dir.path().join("nested").join(BLOCKLIST_FILE));

        let names: HashSet<String> = ["Steam", "discord", "firefox"].map(String::from).into();
        store.save(&names);

        let written = fs::read_to_string(store.path().unwrap()).unwrap();
        assert_eq!(written, "discord\nfirefox\nsteam\n");

        let loaded = store.load();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.contains("steam"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlocklistStore::new(dir.path().join(BLOCKLIST_FILE));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_unwritable_path_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be
        let store = BlocklistStore::new(dir.path().to_path_buf());
        store.save(&HashSet::from(["x".to_string()]));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_disabled_store() {
        let store = BlocklistStore::disabled();
        store.save(&HashSet::from(["x".to_string()]));
        assert!(store.load().is_empty());
    }
}
