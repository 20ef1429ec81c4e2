//! Configuration file for the `sword` binary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sword_cdp_adapter::BrowserOptions;
use sword_site_config::{SiteConfigError, SiteRegistry};

/// Everything the YAML config file may set. Missing keys keep their defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Used when `--log-level` is not given.
    pub log_level: Option<String>,
    /// Emit log lines as JSON objects.
    pub log_json: bool,
    /// Where the persisted run state lives between invocations.
    pub state_file: PathBuf,
    /// Site used by `run` when the URL matches no table and `--site` is absent.
    pub default_site: Option<String>,
    /// Extra YAML files of site tables, merged in order.
    pub site_files: Vec<PathBuf>,
    /// Inline site tables, `{ <name>: <partial table> }`, merged last.
    pub sites: Value,
    pub browser: BrowserOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            log_json: false,
            state_file: default_state_file(),
            default_site: None,
            site_files: Vec::new(),
            sites: Value::Null,
            browser: BrowserOptions::default(),
        }
    }
}

fn default_state_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("sword"))
        .unwrap_or_else(|| PathBuf::from(".sword"))
        .join("run-state.json")
}

impl Config {
    /// Built-in tables with the configured overrides applied.
    pub fn site_registry(&self) -> Result<SiteRegistry, SiteConfigError> {
        let mut registry = SiteRegistry::builtin();
        for path in &self.site_files {
            registry.merge_file(path)?;
        }
        if !self.sites.is_null() {
            registry.merge_value(self.sites.clone())?;
        }
        Ok(registry)
    }
}
