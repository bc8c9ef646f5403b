//! Configuration loading.

use anyhow::{Result, anyhow};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use packrat_core::config::AppConfig;
use std::path::Path;
use tracing::debug;

/// Command-line settings that take precedence over file and environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub auto_maintenance: Option<bool>,
    pub metrics_listen_addr: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(enabled) = self.auto_maintenance {
            config.maintenance.auto_enabled = enabled;
        }
        if let Some(addr) = &self.metrics_listen_addr {
            config.observability.metrics_listen_addr = Some(addr.clone());
        }
    }
}

/// Load configuration from an optional TOML file overlaid with `PACKRAT_`
/// environment variables (`PACKRAT_REPOSITORY__READ_ONLY=true`), then
/// command-line overrides. Validation runs on the merged result.
pub fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        debug!("No config file found at {}", path.display());
    }

    let mut config: AppConfig = figment
        .merge(Env::prefixed("PACKRAT_").split("__").ignore(&["CONFIG"]))
        .extract()
        .map_err(|err| anyhow!(err).context("failed to load configuration"))?;

    overrides.apply(&mut config);
    config
        .validate()
        .map_err(|reason| anyhow!("invalid configuration: {reason}"))?;
    Ok(config)
}
