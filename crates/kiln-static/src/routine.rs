//! The contract between the rebuild loop and whatever renders the site.

use std::path::Path;

use crate::config::{ConfigError, SiteConfig};

/// Inputs handed to a build routine for one build cycle.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Project root that relative config paths resolve against
    pub root: &'a Path,

    /// Configuration read at the start of this cycle
    pub config: &'a SiteConfig,

    /// Empty directory the routine must populate
    pub output_dir: &'a Path,
}

/// Summary of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Number of rendered pages
    pub pages: usize,

    /// Number of files copied through unchanged
    pub assets: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,
}

/// Errors that can occur during a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read source: {0}")]
    ReadError(String),

    #[error("Failed to render {path}: {message}")]
    RenderError { path: String, message: String },

    #[error("Failed to load layout: {0}")]
    TemplateError(String),

    #[error("Failed to write output: {0}")]
    WriteError(String),

    #[error("{0}")]
    Failed(String),
}

/// A full source-to-destination transformation.
///
/// Implementations run on a blocking thread and must write the complete site
/// into `ctx.output_dir`. They are never invoked concurrently with themselves.
pub trait BuildRoutine: Send + Sync + 'static {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuildStats, BuildError>;
}

impl<F> BuildRoutine for F
where
    F: Fn(&BuildContext<'_>) -> Result<BuildStats, BuildError> + Send + Sync + 'static,
{
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuildStats, BuildError> {
        self(ctx)
    }
}
