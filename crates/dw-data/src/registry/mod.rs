//! Name to table handle registry

mod subscriber;

pub use subscriber::TableSubscriber;

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use dw_core::{TableRef, WorkspaceError};
use parking_lot::RwLock;
use tracing::debug;

use crate::source::TableSource;

/// Registry of the tables available to a workspace.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct TableRegistry {
    tables: Arc<RwLock<AHashMap<String, TableSource>>>,
    subscribers: Arc<RwLock<Vec<Weak<dyn TableSubscriber>>>>,
}

impl TableRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table or future table under `name`, replacing any previous entry
    pub fn set(&self, name: impl Into<String>, source: impl Into<TableSource>) {
        let name = name.into();
        let source = source.into();
        debug!(table = %name, ?source, "table set");
        self.tables.write().insert(name.clone(), source);
        self.notify(|subscriber| subscriber.on_table_set(&name));
    }

    /// Register a future table under `name`
    pub fn set_future<F>(&self, name: impl Into<String>, future: F)
    where
        F: std::future::Future<Output = anyhow::Result<TableRef>> + Send + 'static,
    {
        self.set(name, TableSource::from_future(future));
    }

    /// Remove `name`; widgets already bound to it keep their handle
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.tables.write().remove(name).is_some();
        if removed {
            debug!(table = %name, "table deleted");
            self.notify(|subscriber| subscriber.on_table_deleted(name));
        }
        removed
    }

    /// Get the entry for `name`
    pub fn get(&self, name: &str) -> Option<TableSource> {
        self.tables.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    /// Wait for the handle registered under `name`
    pub async fn resolve(&self, name: &str) -> Result<TableRef, WorkspaceError> {
        let source = self
            .get(name)
            .ok_or_else(|| WorkspaceError::UnknownTable(name.to_string()))?;

        source.resolve().await.map_err(|source| WorkspaceError::TableLoad {
            table: name.to_string(),
            source,
        })
    }

    /// Add a subscriber; it is dropped from the list once its last strong reference goes away
    pub fn add_subscriber(&self, subscriber: Arc<dyn TableSubscriber>) {
        self.subscribers.write().push(Arc::downgrade(&subscriber));
    }

    fn notify(&self, f: impl Fn(&dyn TableSubscriber)) {
        let live: Vec<Arc<dyn TableSubscriber>> = {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        for subscriber in live {
            f(subscriber.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
    use arrow::record_batch::RecordBatch;
    use dw_core::{DataView, SubscriptionId, Table, UpdateCallback, WidgetConfig};
    use parking_lot::Mutex;

    struct StaticTable;

    #[async_trait::async_trait]
    impl Table for StaticTable {
        async fn schema(&self) -> anyhow::Result<SchemaRef> {
            Ok(Arc::new(Schema::new(vec![Field::new("State", DataType::Utf8, true)])))
        }

        async fn size(&self) -> anyhow::Result<usize> {
            Ok(0)
        }

        async fn view(&self, _config: &WidgetConfig) -> anyhow::Result<Arc<dyn DataView>> {
            anyhow::bail!("views are not supported")
        }

        async fn update(&self, _batch: RecordBatch) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn on_update(&self, _callback: UpdateCallback) -> SubscriptionId {
            0
        }

        fn remove_update(&self, _id: SubscriptionId) {}
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl TableSubscriber for Recorder {
        fn on_table_set(&self, name: &str) {
            self.seen.lock().push(format!("set:{}", name));
        }

        fn on_table_deleted(&self, name: &str) {
            self.seen.lock().push(format!("deleted:{}", name));
        }
    }

    #[tokio::test]
    async fn test_set_and_resolve() {
        let registry = TableRegistry::new();
        let table: TableRef = Arc::new(StaticTable);
        registry.set("superstore", table.clone());

        let resolved = registry.resolve("superstore").await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &table));
        assert_eq!(resolved.schema().await.unwrap().fields().len(), 1);
        assert_eq!(registry.names(), vec!["superstore".to_string()]);
    }

    #[tokio::test]
    async fn test_future_table() {
        let registry = TableRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<TableRef>();
        registry.set_future("superstore", async move { rx.await.map_err(anyhow::Error::from) });

        assert!(registry.get("superstore").unwrap().peek().is_none());
        tx.send(Arc::new(StaticTable)).ok();
        assert!(registry.resolve("superstore").await.is_ok());
        assert!(registry.get("superstore").unwrap().peek().is_some());
    }

    #[tokio::test]
    async fn test_failed_future_is_shared() {
        let registry = TableRegistry::new();
        registry.set_future("broken", async { Err::<TableRef, _>(anyhow::anyhow!("engine crashed")) });

        let Err(first) = registry.resolve("broken").await else {
            panic!("failed future resolved");
        };
        let Err(second) = registry.resolve("broken").await else {
            panic!("failed future resolved");
        };
        assert!(first.to_string().contains("engine crashed"));
        assert_eq!(first.to_string(), second.to_string());
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let registry = TableRegistry::new();
        assert!(matches!(
            registry.resolve("missing").await,
            Err(WorkspaceError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_subscribers_notified() {
        let registry = TableRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.add_subscriber(recorder.clone());

        registry.set("superstore", Arc::new(StaticTable) as TableRef);
        assert!(registry.delete("superstore"));
        assert!(!registry.delete("superstore"));

        assert_eq!(*recorder.seen.lock(), vec!["set:superstore", "deleted:superstore"]);

        drop(recorder);
        registry.set("orders", Arc::new(StaticTable) as TableRef);
        assert!(registry.subscribers.read().is_empty());
    }
}
