use serde::{Deserialize, Serialize};

/// Connection settings for the Claude Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    /// May be left empty in the config file and supplied through the environment.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2048
}

impl ModelConfig {
    pub fn new(model_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key: api_key.into(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_toml() {
        let config: ModelConfig = toml::from_str(r#"model_id = "claude-sonnet-4-20250514""#).unwrap();
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.max_tokens, 2048);
        assert!(config.api_key.is_empty());
        assert_eq!(config.base_url(), "https://api.anthropic.com");
    }

    #[test]
    fn test_base_url_override() {
        let mut config = ModelConfig::new("m", "k");
        config.api_base_url = Some("http://localhost:9999".into());
        assert_eq!(config.base_url(), "http://localhost:9999");
    }
}
