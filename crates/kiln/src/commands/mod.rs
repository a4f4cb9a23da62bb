//! Command implementations and the settings they share.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kiln_static::SiteConfig;

pub mod build;
pub mod dev;
pub mod serve;

/// Environment variable overriding the configured port.
const PORT_VAR: &str = "PORT";

/// Directory the config file lives in; relative config paths resolve against it.
fn project_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Load configuration for a command. A malformed file is fatal here.
fn load_config(config_path: &Path) -> Result<SiteConfig> {
    let config = SiteConfig::load(config_path)?;
    if config_path.exists() {
        tracing::info!("Loaded config from {}", config_path.display());
    }
    Ok(config)
}

/// Pick the port: flag, then `PORT`, then the config file.
fn resolve_port(flag: Option<u16>, env: Option<&str>, configured: u16) -> Result<u16> {
    if let Some(port) = flag {
        return Ok(port);
    }
    match env {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {:?}", PORT_VAR, value)),
        None => Ok(configured),
    }
}

/// [`resolve_port`] reading `PORT` from the process environment.
fn port_from_env(flag: Option<u16>, configured: u16) -> Result<u16> {
    let env = std::env::var(PORT_VAR).ok();
    resolve_port(flag, env.as_deref(), configured)
}
