//! Site configuration and the default build routine for kiln.
//!
//! The rebuild loop in `kiln-server` only knows about [`BuildRoutine`]; the
//! [`SiteBuilder`] here is the routine the `kiln` binary plugs into it.

pub mod builder;
pub mod config;
pub mod routine;
pub mod templates;

pub use builder::SiteBuilder;
pub use config::{check_destination, ConfigError, SiteConfig, StartupPolicy, CONFIG_FILE};
pub use routine::{BuildContext, BuildError, BuildRoutine, BuildStats};
pub use templates::{LayoutEngine, PageContext};
