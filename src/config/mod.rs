//! Per-cluster scaler configuration, loaded from a YAML file the same
//! way the composition loader reads and parses its manifests: a thin
//! I/O wrapper over a pure parse step.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scaling::ClusterId;

fn default_scaler_pull_threshold_secs() -> u64 {
    30
}

fn default_rule_set_refresh_threshold_secs() -> u64 {
    300
}

/// `{ clusterId, scalerPullThreshold, ruleSetRefreshThreshold }`, plus
/// the collaborator base URLs a live deployment needs to reach its
/// three external boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalerConfig {
    pub cluster_id: String,

    #[serde(default = "default_scaler_pull_threshold_secs")]
    pub scaler_pull_threshold_secs: u64,

    #[serde(default = "default_rule_set_refresh_threshold_secs")]
    pub rule_set_refresh_threshold_secs: u64,

    pub cluster_state_url: String,
    pub provisioner_url: String,
    pub rule_storage_url: String,
}

impl ScalerConfig {
    pub fn cluster_id(&self) -> ClusterId {
        ClusterId::from(self.cluster_id.clone())
    }
}

/// Errors for file I/O operations (separate from pure parsing errors).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Load and parse a scaler config file from disk.
pub fn load_scaler_config(path: &Path) -> Result<ScalerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_minimal_config_applies_defaults() {
        let content = r#"
clusterId: cluster-1
clusterStateUrl: http://cluster-state.internal
provisionerUrl: http://provisioner.internal
ruleStorageUrl: http://rule-storage.internal
"#;
        let file = create_temp_file(content);
        let config = load_scaler_config(file.path()).unwrap();
        assert_eq!(config.cluster_id, "cluster-1");
        assert_eq!(config.scaler_pull_threshold_secs, 30);
        assert_eq!(config.rule_set_refresh_threshold_secs, 300);
    }

    #[test]
    fn load_config_honors_explicit_thresholds() {
        let content = r#"
clusterId: cluster-1
scalerPullThresholdSecs: 10
ruleSetRefreshThresholdSecs: 60
clusterStateUrl: http://cluster-state.internal
provisionerUrl: http://provisioner.internal
ruleStorageUrl: http://rule-storage.internal
"#;
        let file = create_temp_file(content);
        let config = load_scaler_config(file.path()).unwrap();
        assert_eq!(config.scaler_pull_threshold_secs, 10);
        assert_eq!(config.rule_set_refresh_threshold_secs, 60);
    }

    #[test]
    fn load_nonexistent_file_is_io_error() {
        let result = load_scaler_config(Path::new("/nonexistent/scaler.yaml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
