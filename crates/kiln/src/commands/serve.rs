//! Preview server command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use kiln_server::{shutdown_signal, StaticServer};

use super::{load_config, port_from_env, project_root};

/// Run the serve command.
pub async fn run(config_path: &Path, port: Option<u16>, dir: Option<PathBuf>) -> Result<()> {
    let site = load_config(config_path)?;
    let dir = dir.unwrap_or_else(|| site.destination_dir(&project_root(config_path)));

    if !dir.exists() {
        anyhow::bail!(
            "Directory not found: {}. Run 'kiln build' first.",
            dir.display()
        );
    }

    let port = port_from_env(port, site.serve.port)?;
    let listener = StaticServer::bind(&site.serve.host, port).await?;

    StaticServer::new(dir)
        .serve(listener, shutdown_signal())
        .await?;

    Ok(())
}
