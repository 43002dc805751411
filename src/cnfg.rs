use std::{path::PathBuf, time::Duration};

use dotenv::dotenv;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("Invalid {name} value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AppConfig {
    pub env: AppEnv,

    pub port: u16,
    pub supabase_url: String,
    pub supabase_service_key: String,
    /// Shared secret expected in `x-api-key`; `None` rejects every render call
    pub api_key: Option<String>,

    pub template_bucket: String,
    pub output_bucket: String,

    pub scratch_dir: PathBuf,
    pub converter_bin: String,
    pub converter_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: AppEnv::default(),
            port: 3000,
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            api_key: None,
            template_bucket: "templates".to_string(),
            output_bucket: "outputs".to_string(),
            scratch_dir: PathBuf::from("temp"),
            converter_bin: "libreoffice".to_string(),
            converter_timeout: None,
        }
    }
}

/// Read `.env` (if any) and build the config from the process environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    dotenv().ok();
    AppConfig::from_lookup(|name| std::env::var(name).ok())
}

impl AppConfig {
    /// Build the config from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = AppConfig::default();

        if let Some(env) = var("APP_ENV") {
            config.env = serde_json::from_value(Value::String(env.to_ascii_lowercase()))
                .map_err(|e| ConfigError::Invalid {
                    name: "APP_ENV",
                    value: env.clone(),
                    reason: e.to_string(),
                })?;
        }

        if let Some(port) = var("PORT") {
            config.port = port.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    name: "PORT",
                    value: port.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        config.supabase_url = var("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        Url::parse(&config.supabase_url).map_err(|e| ConfigError::Invalid {
            name: "SUPABASE_URL",
            value: config.supabase_url.clone(),
            reason: e.to_string(),
        })?;

        config.supabase_service_key = var("SUPABASE_SERVICE_ROLE_KEY")
            .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?;

        config.api_key = var("RENDER_API_KEY");

        if let Some(bucket) = var("TEMPLATE_BUCKET") {
            config.template_bucket = bucket;
        }
        if let Some(bucket) = var("OUTPUT_BUCKET") {
            config.output_bucket = bucket;
        }
        if let Some(dir) = var("SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(bin) = var("CONVERTER_BIN") {
            config.converter_bin = bin;
        }

        if let Some(secs) = var("CONVERTER_TIMEOUT_SECS") {
            let parsed: u64 = secs.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    name: "CONVERTER_TIMEOUT_SECS",
                    value: secs.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.converter_timeout = (parsed > 0).then(|| Duration::from_secs(parsed));
        }

        Ok(config)
    }
}
