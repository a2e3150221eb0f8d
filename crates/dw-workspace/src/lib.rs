//! Dashboard workspace
//!
//! A [`Workspace`] arranges viewer widgets in a resizable, tabbed layout,
//! keeps each widget bound to a named table, propagates selections between
//! linked widgets as filters, and guarantees that widgets stop drawing once
//! they leave the screen.

mod linked;
mod reconciler;
mod workspace;

#[cfg(test)]
mod test_support;

pub use reconciler::WidgetState;
pub use workspace::Workspace;

// Re-export what callers need to drive a workspace
pub use dw_core::{LinkMode, WidgetConfig, WorkspaceConfig, WorkspaceError, WorkspaceSettings};
pub use dw_data::TableRegistry;
pub use dw_migrate::{convert, ConvertOptions};
pub use dw_views::{LayoutHost, LayoutOp, PluginDescriptor, PluginRegistry, Viewer, ViewerContext, ViewerEvent, Visibility};
