use crate::error::{ConfigError, Result as TcoResult, TcoError};
use crate::types::TcoParameters;
use crate::validation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tco: TcoParameters,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Local price cache file; `~` is expanded. Defaults to the user cache dir.
    pub cache_path: Option<String>,
    /// Query the AWS Price List API on cache misses
    pub remote_enabled: bool,
    /// Region hosting the Price List API endpoint (us-east-1, eu-central-1 or ap-south-1)
    pub pricing_api_region: String,
    pub retry_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_concurrent_remote_calls: usize,
    pub max_concurrent_vms: usize,
}

/// Extra out-of-scope name markers, appended to the built-in sets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default)]
    pub extra_vmware_markers: Vec<String>,
    #[serde(default)]
    pub extra_backup_markers: Vec<String>,
    #[serde(default)]
    pub extra_network_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub include_powered_off: bool,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            include_powered_off: true,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            remote_enabled: true,
            pricing_api_region: "us-east-1".to_string(),
            retry_attempts: 3,
            initial_backoff_ms: 200,
            max_concurrent_remote_calls: 4,
            max_concurrent_vms: 16,
        }
    }
}

impl PricingConfig {
    /// Resolved cache file location
    pub fn resolved_cache_path(&self) -> PathBuf {
        match &self.cache_path {
            Some(p) => PathBuf::from(shellexpand::tilde(p).into_owned()),
            None => dirs::cache_dir()
                .map(|d| d.join("tcoctl").join("price-cache.json"))
                .unwrap_or_else(|| PathBuf::from(".tcoctl-price-cache.json")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tco: TcoParameters::default(),
            pricing: PricingConfig::default(),
            scope: ScopeConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p.to_path_buf()
        } else {
            // Try .tcoctl.toml in current dir, then ~/.config/tcoctl/config.toml
            let local = PathBuf::from(".tcoctl.toml");
            if local.exists() {
                local
            } else {
                dirs::config_dir()
                    .map(|d| d.join("tcoctl").join("config.toml"))
                    .unwrap_or_else(|| PathBuf::from(".tcoctl.toml"))
            }
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config: {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| TcoError::from(ConfigError::ParseError(e.to_string())))
                .with_context(|| {
                    let mut err = format!("Failed to parse config: {}", config_path.display());
                    err.push_str("\n  Common issues:");
                    err.push_str("\n    - Invalid TOML syntax");
                    err.push_str("\n    - Unknown pricing model (on_demand, reserved, compute_savings_plan, ec2_savings_plan)");
                    err.push_str("\n    - Term must be \"1yr\" or \"3yr\"");
                    err.push_str("\n  Tip: Run 'tcoctl init' to create a new config file");
                    err
                })?;
            config.validate()?;
            Ok(config)
        } else {
            if path.is_some() {
                tracing::warn!(
                    "Config file not found: {}, using default configuration",
                    config_path.display()
                );
            }
            Ok(Config::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Check values that serde cannot: ranges, region format, concurrency
    pub fn validate(&self) -> TcoResult<()> {
        validation::validate_parameters(&self.tco)?;
        if self.pricing.max_concurrent_remote_calls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pricing.max_concurrent_remote_calls".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.pricing.max_concurrent_vms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pricing.max_concurrent_vms".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.pricing.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pricing.retry_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

pub fn init_config(output: &Path) -> Result<()> {
    let config = Config::default();
    config.save(output)?;
    println!("Created config file: {}", output.display());
    Ok(())
}
