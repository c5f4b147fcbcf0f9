use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CHROME_ENV: &str = "BOOKMARK_SYNC_CHROME";
pub const SAFARI_ENV: &str = "BOOKMARK_SYNC_SAFARI";
pub const WRITE_LIVE_CHROME_ENV: &str = "BOOKMARK_SYNC_WRITE_LIVE_CHROME";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default)]
    pub sources: SourcesSection,
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SourcesSection {
    /// Chromium `Bookmarks` JSON file.
    pub chrome: Option<PathBuf>,
    /// Safari `Bookmarks.plist`.
    pub safari: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncSection {
    /// Replace the live Chrome file during `sync chrome`. Defaults to true.
    pub write_live_chrome: Option<bool>,
}

impl SyncConfig {
    /// Resolve the Chrome bookmarks file: env BOOKMARK_SYNC_CHROME > config > None.
    pub fn chrome_bookmarks(&self) -> Option<PathBuf> {
        self.chrome_bookmarks_with(|key| env::var(key).ok())
    }

    /// Resolve the Safari plist: env BOOKMARK_SYNC_SAFARI > config > None.
    pub fn safari_bookmarks(&self) -> Option<PathBuf> {
        self.safari_bookmarks_with(|key| env::var(key).ok())
    }

    /// Resolve the live-write switch: env > config > true.
    pub fn write_live_chrome(&self) -> bool {
        self.write_live_chrome_with(|key| env::var(key).ok())
    }

    pub(crate) fn chrome_bookmarks_with<F>(&self, lookup_env: F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        env_path(CHROME_ENV, &lookup_env)
            .or_else(|| self.sources.chrome.clone())
            .map(|path| expand_home(path, &lookup_env))
    }

    pub(crate) fn safari_bookmarks_with<F>(&self, lookup_env: F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        env_path(SAFARI_ENV, &lookup_env)
            .or_else(|| self.sources.safari.clone())
            .map(|path| expand_home(path, &lookup_env))
    }

    pub(crate) fn write_live_chrome_with<F>(&self, lookup_env: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup_env(WRITE_LIVE_CHROME_ENV) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => return true,
                "0" | "false" | "no" | "off" => return false,
                _ => {}
            }
        }
        self.sync.write_live_chrome.unwrap_or(true)
    }
}

fn env_path<F>(key: &str, lookup_env: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Replace a leading `~` component with the home directory. Left as is when
/// no home directory is known.
fn expand_home<F>(path: PathBuf, lookup_env: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let Ok(rest) = path.strip_prefix("~") else {
        return path;
    };
    let home = lookup_env("HOME")
        .or_else(|| lookup_env("USERPROFILE"))
        .filter(|value| !value.trim().is_empty());
    match home {
        Some(home) => PathBuf::from(home).join(rest),
        None => path,
    }
}

/// Load and parse a SyncConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SyncConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
