//! Logging setup
//!
//! Library code only emits `tracing` events. Hosts call [`init`] once to get
//! them printed; later calls are no-ops.

use tracing_subscriber::EnvFilter;

use crate::errors::{Result, SidebarError};

/// Install a formatted subscriber filtered by `filter` (`EnvFilter` syntax)
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn init(filter: &str) -> Result<bool> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| SidebarError::ConfigError(format!("Invalid log filter {:?}: {}", filter, e)))?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Logging initialised");
    }
    Ok(installed)
}
