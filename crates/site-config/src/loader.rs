use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::defaults::builtin_sites;
use crate::errors::SiteConfigError;
use crate::model::SiteConfig;

/// All known site tables, keyed by name.
#[derive(Clone, Debug)]
pub struct SiteRegistry {
    sites: BTreeMap<String, SiteConfig>,
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SiteRegistry {
    pub fn builtin() -> Self {
        let sites = builtin_sites()
            .into_iter()
            .map(|site| (site.name.clone(), site))
            .collect();
        Self { sites }
    }

    pub fn empty() -> Self {
        Self {
            sites: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, site: SiteConfig) {
        self.sites.insert(site.name.clone(), site);
    }

    pub fn get(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&SiteConfig, SiteConfigError> {
        self.get(name)
            .ok_or_else(|| SiteConfigError::UnknownSite(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn sites(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.values()
    }

    /// Site for a page URL. Full-URL markers beat host rules.
    pub fn resolve_url(&self, raw: &str) -> Option<&SiteConfig> {
        if let Some(site) = self.sites.values().find(|site| {
            site.matching
                .url_contains
                .iter()
                .any(|marker| raw.contains(marker.as_str()))
        }) {
            return Some(site);
        }

        let host = Url::parse(raw)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| raw.to_string());
        self.sites.values().find(|site| {
            site.matching
                .hosts
                .iter()
                .any(|pattern| host.contains(pattern.as_str()))
        })
    }

    /// Merge site tables from a value shaped `{ <name>: <partial table>, ... }`.
    ///
    /// A table named like an existing site is merged over it; a new one is
    /// merged over its `extends` base, or over the defaults.
    pub fn merge_value(&mut self, value: Value) -> Result<Vec<String>, SiteConfigError> {
        let Value::Object(entries) = value else {
            return Err(SiteConfigError::Invalid(
                "expected a map of site name to table".into(),
            ));
        };

        let mut merged = Vec::new();
        for (name, overlay) in entries {
            let base = self.base_for(&name, &overlay)?;
            let mut base_value = serde_json::to_value(&base)
                .map_err(|err| SiteConfigError::Invalid(err.to_string()))?;
            merge_json(&mut base_value, overlay);
            let mut site: SiteConfig = serde_json::from_value(base_value)
                .map_err(|err| SiteConfigError::Invalid(format!("site '{name}': {err}")))?;
            site.name = name.clone();
            debug!(site = %name, "merged site table");
            self.insert(site);
            merged.push(name);
        }
        Ok(merged)
    }

    pub fn merge_yaml_str(&mut self, content: &str) -> Result<Vec<String>, SiteConfigError> {
        let yaml_value: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|err| SiteConfigError::Invalid(err.to_string()))?;
        if yaml_value.is_null() {
            return Ok(Vec::new());
        }
        let json_value = serde_json::to_value(yaml_value)
            .map_err(|err| SiteConfigError::Invalid(err.to_string()))?;
        self.merge_value(json_value)
    }

    pub fn merge_file(&mut self, path: &Path) -> Result<Vec<String>, SiteConfigError> {
        let content = fs::read_to_string(path).map_err(|err| SiteConfigError::Io(err.to_string()))?;
        let merged = self.merge_yaml_str(&content)?;
        info!(path = %path.display(), sites = ?merged, "loaded site tables");
        Ok(merged)
    }

    fn base_for(&self, name: &str, overlay: &Value) -> Result<SiteConfig, SiteConfigError> {
        if let Some(existing) = self.sites.get(name) {
            return Ok(existing.clone());
        }
        match overlay.get("extends").and_then(Value::as_str) {
            Some(base) => self
                .sites
                .get(base)
                .cloned()
                .ok_or_else(|| SiteConfigError::UnknownBase {
                    name: name.to_string(),
                    base: base.to_string(),
                }),
            None => Ok(SiteConfig::default()),
        }
    }
}

/// Objects merge key by key; any other value replaces the base.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
