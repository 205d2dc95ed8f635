//! Construction of [`LocalOperator`].
//!
//! The operator keeps no connection open between calls, so building one
//! means settling where the operation database lives and preparing that
//! file once: the schema is created and the journal switched to WAL before
//! any phase opens its own connection to append plan changes.

use std::path::{Path, PathBuf};

use log::debug;
use tokio::task;

use super::LocalOperator;
use crate::{
    db::Database,
    error::{OpsError, Result},
};

const DATA_DIR_PREFIX: &str = "shipwright";
const DATABASE_FILE: &str = "shipwright.db";

/// Configures where a [`LocalOperator`] stores operations.
#[derive(Debug, Clone, Default)]
pub struct OperatorBuilder {
    database_path: Option<PathBuf>,
}

impl OperatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores operations in `path` instead of the per-user data directory
    /// (`$XDG_DATA_HOME/shipwright/shipwright.db`). `None` keeps the
    /// default, which lets the CLI pass its optional flag straight through.
    pub fn with_database_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.database_path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// Creates the database directory and schema and returns the operator.
    ///
    /// # Errors
    ///
    /// `FileSystem` when the directory cannot be created, `XdgDirectory`
    /// when no data directory can be resolved, `Database` when the schema
    /// cannot be applied.
    pub async fn build(self) -> Result<LocalOperator> {
        let db_path = match self.database_path {
            Some(path) => path,
            None => default_database_path()?,
        };

        let parent = db_path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            std::fs::create_dir_all(dir).map_err(|e| OpsError::FileSystem {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let path = db_path.clone();
        task::spawn_blocking(move || Database::new(&path).map(drop))
            .await
            .map_err(|e| OpsError::internal(format!("database setup task failed: {e}")))??;
        debug!("operation database ready at {}", db_path.display());

        Ok(LocalOperator::new(db_path))
    }
}

fn default_database_path() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix(DATA_DIR_PREFIX)
        .place_data_file(DATABASE_FILE)
        .map_err(|e| OpsError::XdgDirectory(e.to_string()))
}
