//! One-shot site build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use kiln_server::{BuildOutcome, BuildRunner, Destination};
use kiln_static::{check_destination, SiteBuilder};

use super::{load_config, project_root};

/// Run the build command.
pub async fn run(config_path: &Path, output: Option<PathBuf>) -> Result<()> {
    tracing::info!("Building site...");

    let site = load_config(config_path)?;
    let root = project_root(config_path);
    let configured = site.destination_dir(&root);
    if let Some(output) = &output {
        check_destination(output).map_err(anyhow::Error::msg)?;
    }
    let destination = Destination::new(output.unwrap_or_else(|| configured.clone()));

    let runner = BuildRunner::new(Arc::new(SiteBuilder::new()), &root, config_path, destination)
        .with_configured_destination(configured);

    match runner.run().await {
        BuildOutcome::Success(_) => {
            tracing::info!("Output: {}", runner.destination().root().display());
            Ok(())
        }
        BuildOutcome::Failure(_) => anyhow::bail!("Build failed"),
    }
}
