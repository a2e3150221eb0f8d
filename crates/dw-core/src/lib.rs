//! Core types for the dashboard workspace
//!
//! This crate provides the serializable workspace model, the shared error
//! and event types, and the interfaces of the analytical engine that the
//! workspace binds its widgets to.

pub mod config;
pub mod error;
pub mod events;
pub mod settings;
pub mod sync;
pub mod table;

// Re-export commonly used types
pub use config::{
    AreaNode, DetailArea, Expression, FilterClause, LinkMode, MasterArea, Orientation, SortClause,
    SplitArea, TabArea, WidgetConfig, WorkspaceConfig,
};
pub use error::{Result, TableLoadError, WorkspaceError};
pub use events::{Event, EventBus, EventHandler};
pub use settings::WorkspaceSettings;
pub use sync::{FilterUpdate, LinkPolicy, Selection, SelectionGesture};
pub use table::{DataView, SubscriptionId, Table, TableRef, UpdateCallback};
