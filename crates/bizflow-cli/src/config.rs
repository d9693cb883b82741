use bizflow_agent::ModelConfig;
use bizflow_orchestrator::WorkflowConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of `bizflow.toml`.
#[derive(Debug, Deserialize)]
pub struct BizflowConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Without a model the planner always falls back and agents run offline.
    #[serde(default)]
    pub model: Option<ModelConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BizflowConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            workflow: WorkflowConfig::default(),
            model: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl BizflowConfig {
    /// Parse a config file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config_str = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> anyhow::Result<Self> {
        let config: BizflowConfig = toml::from_str(config_str)?;
        config.workflow.validate()?;
        Ok(config)
    }

    /// Fill an empty model API key from the environment value.
    pub fn apply_api_key(&mut self, key: Option<String>) {
        if let (Some(model), Some(key)) = (self.model.as_mut(), key) {
            if model.api_key.is_empty() {
                model.api_key = key;
            }
        }
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.data_dir.join("journal")
    }
}
