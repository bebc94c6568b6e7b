// File: coordinator/src/config/manager.rs
use super::Config;
use crate::errors::ConfigError;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    /// Load `{config_dir}/main.toml` and overlay the process environment
    pub async fn new(config_dir: &str) -> Result<Self, ConfigError> {
        let config = Self::load_configuration(config_dir, |key| std::env::var(key).ok()).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration<F>(config_dir: &str, lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let main_config_path = format!("{}/main.toml", config_dir);
        debug!("Loading config: {}", main_config_path);

        let main_config_content =
            fs::read_to_string(&main_config_path)
                .await
                .map_err(|e| ConfigError::LoadFailed {
                    path: main_config_path.clone(),
                    reason: e.to_string(),
                })?;

        let config = Self::parse_with_env(&main_config_content, lookup)?;

        info!(
            "Loaded configuration: zone {}, queues {}/{}, triggers {}/{}",
            config.window.time_zone,
            config.queues.stop,
            config.queues.start,
            config.triggers.stop,
            config.triggers.start
        );

        Ok(config)
    }

    /// Parse file contents, apply environment overrides and validate
    pub fn parse_with_env<F>(content: &str, lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;

        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }
}
