use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::detect_chrome_executable;

/// How to reach a browser: launch one, or connect to `websocket_url`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub command_timeout_ms: u64,
    pub websocket_url: Option<String>,
    /// Zero disables the keep-alive ping.
    pub heartbeat_interval_ms: u64,
    pub no_sandbox: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: default_profile_dir(),
            headless: resolve_headless_default(),
            command_timeout_ms: 30_000,
            websocket_url: None,
            heartbeat_interval_ms: 15_000,
            no_sandbox: flag("SWORD_DISABLE_SANDBOX").unwrap_or(false),
        }
    }
}

/// Booking needs a visible window unless asked otherwise.
fn resolve_headless_default() -> bool {
    flag("SWORD_HEADLESS").unwrap_or(false)
}

fn flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_profile_dir() -> PathBuf {
    if let Ok(path) = env::var("SWORD_CHROME_PROFILE") {
        return PathBuf::from(path);
    }
    PathBuf::from("./.sword-profile")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let options: BrowserOptions =
            serde_json::from_str(r#"{ "headless": true, "websocket_url": null }"#).unwrap();
        assert!(options.headless);
        assert_eq!(options.command_timeout_ms, 30_000);
        assert_eq!(options.heartbeat_interval_ms, 15_000);
    }
}
