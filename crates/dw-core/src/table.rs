//! Interfaces of the analytical engine the workspace binds widgets to

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::config::WidgetConfig;

/// Identifies an update subscription on a table
pub type SubscriptionId = u64;

/// Callback invoked after a table's data changes
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Shared handle to an engine table
pub type TableRef = Arc<dyn Table>;

/// A named data source owned by the engine
#[async_trait::async_trait]
pub trait Table: Send + Sync {
    /// Get the schema of this table
    async fn schema(&self) -> anyhow::Result<SchemaRef>;

    /// Get total row count
    async fn size(&self) -> anyhow::Result<usize>;

    /// Create a view over this table for a widget configuration
    async fn view(&self, config: &WidgetConfig) -> anyhow::Result<Arc<dyn DataView>>;

    /// Append or update rows
    async fn update(&self, batch: RecordBatch) -> anyhow::Result<()>;

    /// Destroy the table; fails while it is still in use
    async fn delete(&self) -> anyhow::Result<()>;

    /// Register a callback fired after each update
    fn on_update(&self, callback: UpdateCallback) -> SubscriptionId;

    /// Remove a callback registered with `on_update`
    fn remove_update(&self, id: SubscriptionId);
}

/// A query over a table, as displayed by one widget
#[async_trait::async_trait]
pub trait DataView: Send + Sync {
    async fn num_rows(&self) -> anyhow::Result<usize>;

    async fn to_batch(&self) -> anyhow::Result<RecordBatch>;

    async fn delete(&self) -> anyhow::Result<()>;
}
