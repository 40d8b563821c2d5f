use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const EMBER_DIR: &str = ".ember";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    pub enabled: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub temperature: f64,
    pub context_window: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "mistralai/devstral-2512".to_string(),
            temperature: 1.0,
            context_window: 256_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub api_key: String,
    pub base_url: Option<String>,
    pub max_turns: usize,
    pub max_tool_output_tokens: usize,
    pub developer_instructions: Option<String>,
    pub user_instructions: Option<String>,
    pub debug: bool,
    pub model: ModelConfig,
    pub stream: StreamConfig,
    #[serde(skip)]
    pub cwd: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: None,
            api_key: String::new(),
            base_url: None,
            max_turns: 100,
            max_tool_output_tokens: 50_000,
            developer_instructions: None,
            user_instructions: None,
            debug: false,
            model: ModelConfig::default(),
            stream: StreamConfig::default(),
            cwd: default_cwd(),
        }
    }
}

fn default_cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub fn get_ember_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(EMBER_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_ember_dir().join("config.toml")
}

pub fn ensure_ember_dir() -> Result<PathBuf> {
    let ember_dir = get_ember_dir();

    if !ember_dir.exists() {
        std::fs::create_dir_all(&ember_dir).with_context(|| {
            format!("Failed to create ember directory at {}", ember_dir.display())
        })?;
    }

    Ok(ember_dir)
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Config::default())
        }
    }

    /// `API_KEY` from the environment wins over the file value.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| Some(self.api_key.clone()).filter(|k| !k.is_empty()))
    }

    pub fn base_url(&self) -> Option<String> {
        std::env::var("BASE_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .or_else(|| self.base_url.clone())
    }

    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    pub fn temperature(&self) -> f64 {
        self.model.temperature
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let keyless = self
            .provider
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case("ollama"));
        if self.api_key().is_none() && !keyless {
            errors.push("API_KEY environment variable is not set".to_string());
        }

        if !self.cwd.exists() {
            errors.push(format!(
                "Current working directory does not exist: {}",
                self.cwd.display()
            ));
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            errors.push(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.model.temperature
            ));
        }

        if self.max_turns == 0 {
            errors.push("max_turns must be at least 1".to_string());
        }

        errors
    }
}

pub fn load_config() -> Result<Config> {
    let config_path = get_config_path();

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!("Config file not found. Run 'ember init' to create one.")
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
        }
    })?;

    parse_config(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))
}

fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content)?;
    config.cwd = default_cwd();
    Ok(config)
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_ember_dir()?;

    let config_path = get_config_path();
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.model.name, "mistralai/devstral-2512");
        assert_eq!(config.model.context_window, 256_000);
        assert_eq!(config.max_turns, 100);
        assert_eq!(config.max_tool_output_tokens, 50_000);
        assert!(config.stream.enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = parse_config(
            r#"
            max_turns = 5
            developer_instructions = "Be brief."

            [model]
            name = "gpt-4o-mini"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_turns, 5);
        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(config.model.temperature, 1.0);
        assert_eq!(config.developer_instructions.as_deref(), Some("Be brief."));
        assert!(config.cwd.is_absolute() || config.cwd == PathBuf::from("."));
    }

    #[test]
    fn validate_flags_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            api_key: "sk-test".into(),
            cwd: dir.path().join("missing"),
            model: ModelConfig {
                temperature: 3.5,
                ..ModelConfig::default()
            },
            max_turns: 0,
            ..Config::default()
        };

        let errors = config.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors[0].contains("does not exist"));
        assert!(errors[1].contains("Temperature"));
        assert!(errors[2].contains("max_turns"));
    }

    #[test]
    fn toml_round_trip_skips_cwd() {
        let config = Config {
            api_key: "sk-test".into(),
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("cwd"));
        let back = parse_config(&text).unwrap();
        assert_eq!(back.api_key, "sk-test");
        assert_eq!(back.model, config.model);
    }
}
