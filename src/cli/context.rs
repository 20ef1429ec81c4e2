use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sword_cli::Config;
use sword_site_config::SiteRegistry;

pub struct CliContext {
    config: Arc<Config>,
    config_path: PathBuf,
    sites: SiteRegistry,
}

impl CliContext {
    pub fn new(config: Config, config_path: PathBuf) -> Result<Self> {
        let sites = config
            .site_registry()
            .context("Failed to load site tables")?;
        Ok(Self {
            config: Arc::new(config),
            config_path,
            sites,
        })
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn sites(&self) -> &SiteRegistry {
        &self.sites
    }
}
