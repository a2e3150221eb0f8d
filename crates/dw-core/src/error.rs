//! Error types shared by the workspace crates

use thiserror::Error;

/// Errors surfaced by workspace operations
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// Dangling widget reference, duplicate name or malformed layout
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no table registered under `{0}`")]
    UnknownTable(String),

    #[error("table `{table}` failed to load: {source}")]
    TableLoad {
        table: String,
        #[source]
        source: TableLoadError,
    },

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("workspace is closed")]
    Closed,
}

/// Failure of a future table handle, shared by every waiter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TableLoadError {
    pub message: String,
}

impl From<anyhow::Error> for TableLoadError {
    fn from(error: anyhow::Error) -> Self {
        Self {
            message: format!("{:#}", error),
        }
    }
}

pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
