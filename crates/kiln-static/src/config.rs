//! Site configuration (`kiln.toml`).

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    ParseError { path: String, message: String },
}

/// Parsed contents of `kiln.toml`.
///
/// Every section is optional; a missing file yields [`SiteConfig::default`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub serve: ServeSection,
}

/// Source and output locations plus values exposed to layouts.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SiteSection {
    /// Source tree, relative to the project root
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Destination tree, relative to the project root
    #[serde(default = "default_destination")]
    pub destination: PathBuf,

    /// Layout templates directory
    #[serde(default = "default_layouts")]
    pub layouts: PathBuf,

    /// Site title
    #[serde(default = "default_title")]
    pub title: String,

    /// Base URL prefix used in generated links
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Build behaviour.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Build into a staging directory and swap it in on success
    #[serde(default = "default_staged")]
    pub staged: bool,
}

/// Paths observed by the dev server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// Glob patterns relative to the project root
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
}

/// Dev server settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServeSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// When to start accepting connections relative to the first build
    #[serde(default)]
    pub startup: StartupPolicy,
}

/// Ordering of the initial build and the first accepted connection.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartupPolicy {
    /// Finish the initial build before accepting connections
    #[default]
    Wait,

    /// Accept connections immediately; requests 404 until the first build lands
    Immediate,
}

fn default_source() -> PathBuf {
    PathBuf::from("src")
}
fn default_destination() -> PathBuf {
    PathBuf::from("target")
}
fn default_layouts() -> PathBuf {
    PathBuf::from("layouts")
}
fn default_title() -> String {
    "Site".to_string()
}
fn default_base_url() -> String {
    "/".to_string()
}
fn default_staged() -> bool {
    true
}
fn default_patterns() -> Vec<String> {
    vec![
        CONFIG_FILE.to_string(),
        "layouts/**/*".to_string(),
        "src/**/*".to_string(),
    ]
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            source: default_source(),
            destination: default_destination(),
            layouts: default_layouts(),
            title: default_title(),
            base_url: default_base_url(),
        }
    }
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            staged: default_staged(),
        }
    }
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            startup: StartupPolicy::default(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from `path` if it exists.
    ///
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::parse(&content).map_err(|message| ConfigError::ParseError {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        check_destination(&config.site.destination)?;
        Ok(config)
    }

    /// Resolve `site.source` against a project root.
    pub fn source_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.site.source)
    }

    /// Resolve `site.destination` against a project root.
    pub fn destination_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.site.destination)
    }

    /// Resolve `site.layouts` against a project root.
    pub fn layouts_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.site.layouts)
    }
}

/// Reject destinations that do not name a directory of their own.
///
/// Staged builds rename the destination and park siblings next to it; a path
/// ending in `.` or `..` would swap out the project itself.
pub fn check_destination(path: &Path) -> Result<(), String> {
    match path.components().next_back() {
        Some(Component::Normal(_)) => Ok(()),
        _ => Err(format!(
            "destination {:?} must name a directory below the project root",
            path.display().to_string()
        )),
    }
}
