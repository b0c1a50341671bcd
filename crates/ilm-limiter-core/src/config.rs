use serde::{Deserialize, Serialize};

/// Cluster privileges needed to read policies and move indices between phases.
pub const CLUSTER_PRIVILEGES: [&str; 2] = ["manage", "manage_ilm"];

/// Index privileges needed on every governed index.
pub const INDEX_PRIVILEGES: [&str; 1] = ["manage"];

/// Immutable settings for a single enforcement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Decide and log, but never issue phase transitions.
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Suffix appended to decision log lines.
    pub fn log_suffix(&self) -> &'static str {
        if self.dry_run {
            " (DRY-RUN)"
        } else {
            ""
        }
    }
}

/// Owned copies of [`CLUSTER_PRIVILEGES`].
pub fn cluster_privileges() -> Vec<String> {
    CLUSTER_PRIVILEGES.iter().map(|p| p.to_string()).collect()
}

/// Owned copies of [`INDEX_PRIVILEGES`].
pub fn index_privileges() -> Vec<String> {
    INDEX_PRIVILEGES.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_live_run() {
        let config = RunConfig::default();
        assert!(!config.dry_run);
        assert_eq!(config.log_suffix(), "");
        assert_eq!(RunConfig::new(true).log_suffix(), " (DRY-RUN)");
    }

    #[test]
    fn test_privileges() {
        assert_eq!(cluster_privileges(), vec!["manage", "manage_ilm"]);
        assert_eq!(index_privileges(), vec!["manage"]);
    }
}
