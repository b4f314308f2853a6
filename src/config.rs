//! Internal API for managing vboxga configuration.
//!
//! Handles loading and resolving the configuration file
//! (default: `~/.config/vboxga/config`, TOML format). Every key is
//! optional; the defaults reproduce the conventional fixed paths
//! (`/mnt/iso`, `/tmp/VBox_GA`, ISO under `/tmp`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL the versioned ISO path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Where the ISO is loop-mounted.
    #[serde(default = "default_mount_dir")]
    pub mount_dir: PathBuf,

    /// Where the ISO contents are copied before running the installer.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory the downloaded ISO is stored in.
    #[serde(default = "default_iso_dir")]
    pub iso_dir: PathBuf,

    /// Whether to ask about rebooting once the install finishes.
    #[serde(default = "default_interactive")]
    pub interactive: bool,
}

fn default_base_url() -> String {
    String::from("https://download.virtualbox.org/virtualbox")
}

fn default_mount_dir() -> PathBuf {
    PathBuf::from("/mnt/iso")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/VBox_GA")
}

fn default_iso_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_interactive() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mount_dir: default_mount_dir(),
            work_dir: default_work_dir(),
            iso_dir: default_iso_dir(),
            interactive: default_interactive(),
        }
    }
}

fn sudo_user_config_path() -> Option<PathBuf> {
    let su = crate::sudo_user()?;
    Some(su.home.join(".config").join("vboxga").join("config"))
}

pub fn config_path() -> Result<PathBuf> {
    // When running under sudo, prefer the invoking user's config if it exists.
    if let Some(path) = sudo_user_config_path() {
        if path.exists() {
            return Ok(path);
        }
    }
    let base = if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg)
    } else {
        let home = std::env::var("HOME").context("HOME not set")?;
        PathBuf::from(home).join(".config")
    };
    Ok(base.join("vboxga").join("config"))
}

pub fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => config_path(),
    }
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = resolve_path(path)?;
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(config)
}
