use crate::config::Config;
use crate::providers::OpenAIProvider;
use crate::providers::openai::OPENAI_BASE_URL;
use crate::traits::Provider;
use anyhow::{Result, anyhow};

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

pub fn create_provider(config: &Config) -> Result<Box<dyn Provider>> {
    let provider_name = config.provider.as_deref().unwrap_or("openai").to_lowercase();

    let (default_base_url, needs_key) = match provider_name.as_str() {
        "openai" => (OPENAI_BASE_URL, true),
        "openrouter" => (OPENROUTER_BASE_URL, true),
        "ollama" => (OLLAMA_BASE_URL, false),
        _ => {
            return Err(anyhow!(
                "Unknown provider: {}. Available: openai, openrouter, ollama",
                provider_name
            ));
        }
    };

    let api_key = match config.api_key() {
        Some(key) => key,
        None if needs_key => {
            return Err(anyhow!(
                "No API key found for {}. Set API_KEY or api_key in {}",
                provider_name,
                crate::config::get_config_path().display()
            ));
        }
        None => String::new(),
    };

    let provider = OpenAIProvider::new(api_key)
        .with_name(provider_name.as_str())
        .with_model(config.model_name())
        .with_temperature(config.temperature())
        .with_streaming(config.stream.enabled)
        .with_base_url(config.base_url().as_deref().unwrap_or(default_base_url));

    Ok(Box::new(provider))
}
