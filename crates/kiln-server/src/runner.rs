//! Runs one build cycle and reports its outcome.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kiln_static::{BuildContext, BuildError, BuildRoutine, BuildStats, SiteConfig};

use crate::destination::Destination;

/// Result of a single build cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The destination now holds the complete new output
    Success(BuildStats),

    /// The build failed; the diagnostic is kept for logging
    Failure(String),
}

impl BuildOutcome {
    /// Whether the build succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Invokes the build routine against the destination tree.
pub struct BuildRunner {
    routine: Arc<dyn BuildRoutine>,
    root: PathBuf,
    config_path: PathBuf,
    destination: Destination,
    configured_destination: PathBuf,
    running: AtomicBool,
}

impl BuildRunner {
    /// Create a runner for the project at `root`.
    ///
    /// `config_path` is re-read at the start of every build.
    pub fn new(
        routine: Arc<dyn BuildRoutine>,
        root: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        destination: Destination,
    ) -> Self {
        Self {
            routine,
            root: root.into(),
            config_path: config_path.into(),
            configured_destination: destination.root().to_path_buf(),
            destination,
            running: AtomicBool::new(false),
        }
    }

    /// Destination the config named at startup, when it differs from the one
    /// written to (an output override).
    pub fn with_configured_destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.configured_destination = path.into();
        self
    }

    /// Whether a build is currently in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The tree this runner writes to.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Run one build to completion.
    ///
    /// Never fails: routine errors and panics become [`BuildOutcome::Failure`].
    pub async fn run(&self) -> BuildOutcome {
        let _guard = RunningGuard::set(&self.running);
        tracing::info!("Building...");

        let routine = Arc::clone(&self.routine);
        let root = self.root.clone();
        let config_path = self.config_path.clone();
        let destination = self.destination.clone();
        let configured = self.configured_destination.clone();

        let result = tokio::task::spawn_blocking(move || {
            run_cycle(routine.as_ref(), &root, &config_path, &destination, &configured)
        })
        .await;

        let outcome = match result {
            Ok(Ok(stats)) => BuildOutcome::Success(stats),
            Ok(Err(e)) => BuildOutcome::Failure(e.to_string()),
            Err(e) => BuildOutcome::Failure(format!("Build routine panicked: {}", e)),
        };

        match &outcome {
            BuildOutcome::Success(stats) => tracing::info!(
                "Done: {} pages, {} assets in {}ms",
                stats.pages,
                stats.assets,
                stats.duration_ms
            ),
            BuildOutcome::Failure(reason) => tracing::error!("Error during build: {}", reason),
        }

        outcome
    }
}

/// Clears the running flag even if the build future is dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn run_cycle(
    routine: &dyn BuildRoutine,
    root: &Path,
    config_path: &Path,
    destination: &Destination,
    configured: &Path,
) -> Result<BuildStats, BuildError> {
    let config = SiteConfig::load(config_path)?;

    if config.destination_dir(root) != configured {
        tracing::warn!(
            "Destination changed to {}; keeping {} until restart",
            config.destination_dir(root).display(),
            destination.root().display()
        );
    }

    if config.build.staged {
        let staging = destination
            .prepare_staging()
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        let ctx = BuildContext {
            root,
            config: &config,
            output_dir: &staging,
        };

        let stats = match routine.build(&ctx) {
            Ok(stats) => stats,
            Err(e) => {
                destination.discard(&staging);
                return Err(e);
            }
        };

        if let Err(e) = destination.promote(&staging) {
            destination.discard(&staging);
            return Err(BuildError::WriteError(format!(
                "Failed to promote {}: {}",
                staging.display(),
                e
            )));
        }

        Ok(stats)
    } else {
        destination
            .clear()
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        let ctx = BuildContext {
            root,
            config: &config,
            output_dir: destination.root(),
        };

        routine.build(&ctx).inspect_err(|_| {
            tracing::warn!(
                "In-place build failed; {} may be incomplete",
                destination.root().display()
            );
        })
    }
}
