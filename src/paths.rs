//! Common paths for feedline data storage
//!
//! Everything lives under ~/.config/feedline/ on all platforms:
//! - config.toml - User configuration
//! - credentials.enc - Encrypted session identity
//! - cache.sqlite - Last-known feed windows

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Get the data directory (~/.config/feedline/), creating it if needed
pub fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let dir = home.join(".config").join("feedline");
    fs::create_dir_all(&dir).context("Failed to create feedline directory")?;
    Ok(dir)
}

/// Get the config file path (~/.config/feedline/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("config.toml"))
}

/// Get the feed cache path (~/.config/feedline/cache.sqlite)
pub fn cache_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("cache.sqlite"))
}

/// Get the credentials file path (~/.config/feedline/credentials.enc)
pub fn credentials_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("credentials.enc"))
}
