//! Registry subscriber trait

/// Trait for components that bind widgets to registry entries
pub trait TableSubscriber: Send + Sync {
    /// Called after a name is set or replaced
    fn on_table_set(&self, name: &str);

    /// Called after a name is removed
    fn on_table_deleted(&self, _name: &str) {}
}
