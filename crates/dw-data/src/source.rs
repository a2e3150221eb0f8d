//! A table handle that may still be loading

use std::future::Future;

use dw_core::{TableLoadError, TableRef};
use futures::future::{BoxFuture, FutureExt, Shared};

/// Future table handle shared by every widget waiting on it
pub type TableFuture = Shared<BoxFuture<'static, Result<TableRef, TableLoadError>>>;

/// A registered table: either ready or still loading
#[derive(Clone)]
pub enum TableSource {
    Ready(TableRef),
    Loading(TableFuture),
}

impl TableSource {
    /// Wrap a future that resolves to a table
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<TableRef>> + Send + 'static,
    {
        let future = future.map(|result| result.map_err(TableLoadError::from));
        TableSource::Loading(future.boxed().shared())
    }

    /// The handle, if already available
    pub fn peek(&self) -> Option<TableRef> {
        match self {
            TableSource::Ready(table) => Some(table.clone()),
            TableSource::Loading(future) => future.peek().and_then(|result| result.clone().ok()),
        }
    }

    /// Wait for the handle
    pub async fn resolve(self) -> Result<TableRef, TableLoadError> {
        match self {
            TableSource::Ready(table) => Ok(table),
            TableSource::Loading(future) => future.await,
        }
    }
}

impl From<TableRef> for TableSource {
    fn from(table: TableRef) -> Self {
        TableSource::Ready(table)
    }
}

impl std::fmt::Debug for TableSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableSource::Ready(_) => f.write_str("TableSource::Ready"),
            TableSource::Loading(_) => f.write_str("TableSource::Loading"),
        }
    }
}
