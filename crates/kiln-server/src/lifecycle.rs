//! Development server: wires the watcher, coordinator, runner and server together.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_static::{BuildRoutine, SiteConfig, StartupPolicy, CONFIG_FILE};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::coordinator::{trigger_channel, RebuildCoordinator, Trigger};
use crate::destination::Destination;
use crate::events::{next_finished, BuildEvents};
use crate::runner::{BuildOutcome, BuildRunner};
use crate::server::{ServerError, StaticServer};
use crate::watcher::{ChangeWatcher, WatchSet};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Project root that config paths and watch patterns resolve against
    pub root: PathBuf,

    /// Config file re-read at the start of every build
    pub config_path: PathBuf,

    /// Directory built into and served
    pub destination: PathBuf,

    /// Glob patterns that trigger rebuilds
    pub watch_patterns: Vec<String>,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Ordering of the initial build and the first accepted connection
    pub startup: StartupPolicy,

    /// Open browser once serving
    pub open: bool,
}

impl DevServerConfig {
    /// Derive the process-lifetime settings from a loaded site config.
    ///
    /// The config file is always watched, whatever it is called, since every
    /// build re-reads it.
    pub fn from_site(root: impl Into<PathBuf>, config_path: PathBuf, site: &SiteConfig) -> Self {
        let root = root.into();
        Self {
            destination: site.destination_dir(&root),
            watch_patterns: with_config_pattern(&site.watch.patterns, &root, &config_path),
            host: site.serve.host.clone(),
            port: site.serve.port,
            startup: site.serve.startup,
            open: false,
            config_path,
            root,
        }
    }
}

/// `patterns` plus the config file's path relative to `root`, unless listed.
fn with_config_pattern(patterns: &[String], root: &Path, config_path: &Path) -> Vec<String> {
    let mut patterns = patterns.to_vec();
    let relative = config_path.strip_prefix(root).unwrap_or(config_path);
    if relative.is_absolute() {
        tracing::warn!(
            "{} is outside {}; config edits will not trigger rebuilds",
            config_path.display(),
            root.display()
        );
        return patterns;
    }

    let relative = relative.to_string_lossy().replace('\\', "/");
    let relative = relative.trim_start_matches("./").to_string();
    if !patterns.iter().any(|p| p.trim_start_matches("./") == relative) {
        patterns.push(relative);
    }
    patterns
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self::from_site(".", PathBuf::from(CONFIG_FILE), &SiteConfig::default())
    }
}

/// Watch-build-serve loop.
pub struct DevServer {
    config: DevServerConfig,
    routine: Arc<dyn BuildRoutine>,
}

impl DevServer {
    /// Create a development server that rebuilds with `routine`.
    pub fn new(config: DevServerConfig, routine: Arc<dyn BuildRoutine>) -> Self {
        Self { config, routine }
    }

    /// Run until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        self.launch().await?.run_until(shutdown_signal()).await
    }

    /// Start watching, building and serving.
    ///
    /// Returns once connections are being accepted. With
    /// [`StartupPolicy::Wait`] that is after the initial build finished.
    /// Watcher setup and port binding errors are returned; build failures
    /// are only logged.
    pub async fn launch(self) -> Result<DevHandle, ServerError> {
        let config = self.config;
        let destination = Destination::new(&config.destination);

        let (trigger, triggers) = trigger_channel();
        let watch_set = WatchSet::new(&config.root, &config.watch_patterns)?
            .ignore(&destination.owned_paths());
        let watcher = ChangeWatcher::new(watch_set, trigger.clone())?;

        let listener = StaticServer::bind(&config.host, config.port).await?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        let runner = Arc::new(BuildRunner::new(
            self.routine,
            &config.root,
            &config.config_path,
            destination.clone(),
        ));
        let coordinator = RebuildCoordinator::new(runner);
        let events = coordinator.events();
        let mut first_build = events.subscribe();
        let coordinator = tokio::spawn(coordinator.run(triggers));

        let server = StaticServer::new(destination.root());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let serve = move || {
            tokio::spawn(server.serve(listener, async move {
                let _ = shutdown_rx.await;
            }))
        };

        let server = match config.startup {
            StartupPolicy::Wait => {
                trigger.fire();
                match next_finished(&mut first_build).await {
                    Some((_, BuildOutcome::Failure(_))) => {
                        tracing::warn!("Initial build failed; serving whatever is on disk")
                    }
                    Some(_) => {}
                    None => {
                        return Err(ServerError::ServeError(
                            "Rebuild loop stopped before the initial build".to_string(),
                        ))
                    }
                }
                serve()
            }
            StartupPolicy::Immediate => {
                let server = serve();
                trigger.fire();
                server
            }
        };

        tracing::info!("Listening on http://{}", addr);

        if config.open {
            if let Err(e) = open::that(format!("http://{}", addr)) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        Ok(DevHandle {
            addr,
            events,
            trigger,
            watcher,
            coordinator,
            server,
            shutdown: shutdown_tx,
        })
    }
}

/// A running development server.
pub struct DevHandle {
    addr: SocketAddr,
    events: BuildEvents,
    trigger: Trigger,
    watcher: ChangeWatcher,
    coordinator: JoinHandle<()>,
    server: JoinHandle<Result<(), ServerError>>,
    shutdown: oneshot::Sender<()>,
}

impl DevHandle {
    /// Address connections are accepted on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build start and finish notifications.
    pub fn events(&self) -> &BuildEvents {
        &self.events
    }

    /// Request a rebuild as if a watched file changed.
    pub fn rebuild(&self) {
        self.trigger.fire();
    }

    /// Serve until `shutdown` resolves or the server stops on its own.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {}
            result = &mut self.server => {
                return result.map_err(|e| ServerError::ServeError(e.to_string()))?;
            }
        }
        self.shutdown().await
    }

    /// Stop accepting connections, stop watching and wait for any in-flight build.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        let Self {
            trigger,
            watcher,
            coordinator,
            server,
            shutdown,
            ..
        } = self;

        tracing::info!("Shutting down...");
        let _ = shutdown.send(());
        let served = server
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        drop(watcher);
        drop(trigger);
        if let Err(e) = coordinator.await {
            tracing::warn!("Rebuild loop ended abnormally: {}", e);
        }

        served
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
