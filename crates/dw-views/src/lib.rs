//! Viewer plugins, draw scheduling and the live layout tree

pub mod host;
pub mod layout;
pub mod plugins;
pub mod scheduler;
pub mod viewer;

pub use host::{LayoutHost, NullHost};
pub use layout::{ContainerKind, LayoutNode, LayoutOp, LayoutPatch, LayoutTree, MasterNode, NodeId};
pub use plugins::{PluginDescriptor, PluginRegistry, ViewerFactory};
pub use scheduler::{DrawKind, Generation, Redraw, Teardown, Visibility, VisibilityScheduler};
pub use viewer::{EventSink, Viewer, ViewerContext, ViewerEvent, ViewerMessage};
