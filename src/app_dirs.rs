//! Filesystem locations used by the service.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/web-research/` | `~/.config/web-research/` |
//!
//! Set `WEB_RESEARCH_CONFIG_DIR` to relocate the config directory (tests and
//! custom deployments).

use std::path::PathBuf;

const APP_DIR: &str = "web-research";

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("WEB_RESEARCH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/web-research-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Directory holding user overrides for prompt templates.
#[must_use]
pub fn prompts_dir() -> PathBuf {
    config_dir().join("prompts")
}
