//! Network-likelihood scaling for process I/O
//!
//! Per-process I/O counters mix disk and network traffic. Processes known to
//! be network-heavy get a larger share of their raw I/O attributed to the
//! network than everything else.

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct NetworkHeuristic {
    /// Lower-cased name substrings
    patterns: Vec<String>,
    network_factor: f64,
    default_factor: f64,
}

impl NetworkHeuristic {
    pub fn new<I, S>(patterns: I, network_factor: f64, default_factor: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            network_factor,
            default_factor,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.network_heavy_patterns,
            config.network_factor,
            config.default_factor,
        )
    }

    pub fn is_network_heavy(&self, process_name: &str) -> bool {
        let name = process_name.to_lowercase();
        self.patterns.iter().any(|p| name.contains(p.as_str()))
    }

    /// Multiplier applied to a process's raw I/O rate
    pub fn factor_for(&self, process_name: &str) -> f64 {
        if self.is_network_heavy(process_name) {
            self.network_factor
        } else {
            self.default_factor
        }
    }
}

impl Default for NetworkHeuristic {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let heuristic = NetworkHeuristic::default();

        assert_eq!(heuristic.factor_for("firefox"), 0.3);
        assert_eq!(heuristic.factor_for("Discord.exe"), 0.3);
        assert_eq!(heuristic.factor_for("python3.12"), 0.3);
        assert_eq!(heuristic.factor_for("GoogleDriveSync"), 0.3);
        assert_eq!(heuristic.factor_for("notepad"), 0.1);
        assert_eq!(heuristic.factor_for("kworker/0:1"), 0.1);
    }

    #[test]
    fn test_injected_table() {
        let heuristic = NetworkHeuristic::new(["Syncthing"], 0.5, 0.0);

        assert!(heuristic.is_network_heavy("syncthing"));
        assert_eq!(heuristic.factor_for("SYNCTHING-gtk"), 0.5);
        assert_eq!(heuristic.factor_for("firefox"), 0.0);
    }

    #[test]
    fn test_empty_patterns_never_match() {
        let heuristic = NetworkHeuristic::new([""], 0.3, 0.1);
        assert_eq!(heuristic.factor_for("anything"), 0.1);
    }
}
