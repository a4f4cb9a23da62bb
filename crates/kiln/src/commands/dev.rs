//! Development server command.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use kiln_server::{DevServer, DevServerConfig};
use kiln_static::{SiteBuilder, StartupPolicy};

use super::{load_config, port_from_env, project_root};

/// Command-line overrides for the dev server.
#[derive(Debug, Default)]
pub struct DevOptions {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub serve_immediately: bool,
    pub open: bool,
}

/// Run the dev server.
pub async fn run(config_path: &Path, options: DevOptions) -> Result<()> {
    let site = load_config(config_path)?;
    let root = project_root(config_path);

    let mut config = DevServerConfig::from_site(&root, config_path.to_path_buf(), &site);
    config.port = port_from_env(options.port, site.serve.port)?;
    if let Some(host) = options.host {
        config.host = host;
    }
    if options.serve_immediately {
        config.startup = StartupPolicy::Immediate;
    }
    config.open = options.open;

    tracing::info!("Starting development server on port {}", config.port);

    DevServer::new(config, Arc::new(SiteBuilder::new()))
        .start()
        .await?;

    Ok(())
}
