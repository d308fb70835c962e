//! Subcommand handlers.
//!
//! Each module owns one command group. `main.rs` parses arguments, opens the
//! coordinator once and hands it to the matching handler.

pub mod dispatch;
pub mod incident;
pub mod poi;
pub mod route;
pub mod seed;
pub mod vehicle;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use dispatch_lib::{DispatchConfig, DispatchCoordinator, SqliteStore};

use crate::output::Output;

/// File name used when `--db` and `DISPATCH_DB` are both absent.
pub const DEFAULT_DB_FILE: &str = "dispatch.db";

/// Everything a handler needs: the loaded engine and the output writer.
pub struct AppContext {
    pub coordinator: DispatchCoordinator,
    pub output: Output,
}

/// Default database location under the platform data directory.
pub fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "dispatch")
        .map(|dirs| dirs.data_dir().join(DEFAULT_DB_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}

/// Open the store at `db_path` and load it into a new coordinator.
///
/// `offline` forces straight-line routing regardless of `DISPATCH_ROUTING_OFFLINE`.
pub fn open_coordinator(db_path: &Path, offline: bool) -> Result<DispatchCoordinator> {
    let mut config = DispatchConfig::from_env().context("invalid dispatch configuration")?;
    config.routing.offline |= offline;

    let store = SqliteStore::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let coordinator = DispatchCoordinator::builder(config)
        .store(Arc::new(store))
        .build()
        .context("failed to start dispatch engine")?;
    let summary = coordinator
        .load_from_store()
        .with_context(|| format!("failed to load {}", db_path.display()))?;
    debug!(
        vehicles = summary.vehicles,
        incidents = summary.incidents,
        points_of_interest = summary.points_of_interest,
        "loaded dispatch state"
    );
    Ok(coordinator)
}
