//! Agent configuration

use anyhow::{Context, Result};
use occupancy_lib::vision::{AggregatorConfig, ClassifierConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for every setting
pub const ENV_PREFIX: &str = "OCCUPANCY";

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_VAR: &str = "OCCUPANCY_CONFIG";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name used in structured logs
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Camera topology file (toml, yaml or json)
    pub topology_path: PathBuf,

    /// ONNX vacancy model
    pub model_path: PathBuf,

    /// Expected hex SHA-256 of the model file
    #[serde(default)]
    pub model_sha256: Option<String>,

    /// Square model input size in pixels
    #[serde(default = "default_model_input_size")]
    pub model_input_size: u32,

    #[serde(default = "default_metadata_interval")]
    pub metadata_interval_secs: u64,

    #[serde(default = "default_state_interval")]
    pub state_interval_secs: u64,

    /// Budget of one state call, which is also the aggregation round deadline
    #[serde(default = "default_state_timeout")]
    pub state_timeout_secs: u64,

    #[serde(default = "default_camera_timeout")]
    pub camera_timeout_secs: u64,

    /// ffmpeg binary used to grab frames from stream cameras
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Snapshot age after which a location is reported stale
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_agent_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "occupancy-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_input_size() -> u32 {
    128
}

fn default_metadata_interval() -> u64 {
    3600
}

fn default_state_interval() -> u64 {
    60
}

fn default_state_timeout() -> u64 {
    30
}

fn default_camera_timeout() -> u64 {
    10
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_stale_after() -> u64 {
    300
}

impl AgentConfig {
    /// Load configuration from the file named by `OCCUPANCY_CONFIG` (if any),
    /// overridden by `OCCUPANCY_*` environment variables
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from);
        Self::load_from(file.as_deref(), config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load configuration from an optional file layered under `env`
    pub fn load_from(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let config: AgentConfig = builder
            .add_source(env)
            .build()
            .context("Failed to read agent configuration")?
            .try_deserialize()
            .context("Invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.model_input_size == 0 {
            anyhow::bail!("model_input_size must be positive");
        }
        if self.metadata_interval_secs == 0 || self.state_interval_secs == 0 {
            anyhow::bail!("polling intervals must be positive");
        }
        if self.camera_timeout_secs == 0 || self.state_timeout_secs == 0 {
            anyhow::bail!("timeouts must be positive");
        }
        Ok(())
    }

    pub fn metadata_interval(&self) -> Duration {
        Duration::from_secs(self.metadata_interval_secs)
    }

    pub fn state_interval(&self) -> Duration {
        Duration::from_secs(self.state_interval_secs)
    }

    pub fn state_timeout(&self) -> Duration {
        Duration::from_secs(self.state_timeout_secs)
    }

    pub fn camera_timeout(&self) -> Duration {
        Duration::from_secs(self.camera_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            camera_timeout: self.camera_timeout(),
            round_timeout: self.state_timeout(),
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            input_width: self.model_input_size,
            input_height: self.model_input_size,
            expected_sha256: self.model_sha256.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_defaults_from_env() {
        let config = AgentConfig::load_from(
            None,
            env(&[
                ("OCCUPANCY_TOPOLOGY_PATH", "/etc/occupancy/topology.toml"),
                ("OCCUPANCY_MODEL_PATH", "/models/vacancy.onnx"),
            ]),
        )
        .unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.model_input_size, 128);
        assert_eq!(config.metadata_interval(), Duration::from_secs(3600));
        assert_eq!(config.state_interval(), Duration::from_secs(60));
        assert_eq!(config.aggregator_config().round_timeout, Duration::from_secs(30));
        assert_eq!(config.aggregator_config().camera_timeout, Duration::from_secs(10));
        assert_eq!(config.stale_after(), Duration::from_secs(300));
        assert!(config.model_sha256.is_none());
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
agent_name = "gdansk-1"
api_port = 9000
topology_path = "/etc/occupancy/topology.toml"
model_path = "/models/vacancy.onnx"
state_interval_secs = 120
"#,
        )
        .unwrap();

        let config = AgentConfig::load_from(
            Some(&path),
            env(&[
                ("OCCUPANCY_API_PORT", "9100"),
                ("OCCUPANCY_MODEL_INPUT_SIZE", "64"),
                ("OCCUPANCY_FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ]),
        )
        .unwrap();

        assert_eq!(config.agent_name, "gdansk-1");
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.state_interval_secs, 120);
        assert_eq!(config.classifier_config().input_width, 64);
        assert_eq!(config.classifier_config().input_height, 64);
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_missing_required_paths() {
        assert!(AgentConfig::load_from(None, env(&[])).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = AgentConfig::load_from(
            None,
            env(&[
                ("OCCUPANCY_TOPOLOGY_PATH", "/t.toml"),
                ("OCCUPANCY_MODEL_PATH", "/m.onnx"),
                ("OCCUPANCY_STATE_INTERVAL_SECS", "0"),
            ]),
        );
        assert!(result.is_err());
    }
}
