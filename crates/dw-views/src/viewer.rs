//! Viewer plugin interface - the contract every widget implementation meets

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use dw_core::{DataView, Selection, TableRef, WidgetConfig};

use crate::scheduler::{Generation, Redraw};

/// A stateful visual panel bound to one table and one display config.
///
/// Viewers are shared between the reconciler and the draw executor, so
/// every method takes `&self` and implementations keep their state behind
/// interior mutability.
#[async_trait]
pub trait Viewer: Send + Sync {
    /// Bind to a table, replacing any previous binding
    async fn load(&self, table: TableRef) -> anyhow::Result<()>;

    /// Apply a display configuration
    async fn restore(&self, config: &WidgetConfig) -> anyhow::Result<()>;

    /// Current display configuration
    async fn save(&self) -> anyhow::Result<WidgetConfig>;

    /// The view backing the current render, if bound
    async fn get_view(&self) -> Option<Arc<dyn DataView>> {
        None
    }

    /// Render. Only ever called by the draw executor while visible.
    async fn draw(&self) -> anyhow::Result<()>;

    /// Re-layout after the host changed size
    async fn resize(&self) -> anyhow::Result<()> {
        self.draw().await
    }

    /// Wait for pending internal work
    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release the view and any resources held against the table
    async fn delete(&self) -> anyhow::Result<()>;
}

/// Events a viewer dispatches to its workspace
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    /// Click on a cell or mark
    Click(Selection),
    /// Row selection toggled
    Select { selection: Selection, selected: bool },
    /// The viewer changed its own configuration
    ConfigUpdate(WidgetConfig),
}

/// A viewer event tagged with the identity of the widget that sent it
#[derive(Debug, Clone)]
pub struct ViewerMessage {
    pub widget: String,
    pub generation: Generation,
    pub event: ViewerEvent,
}

/// Sending half of a widget's event channel
#[derive(Clone)]
pub struct EventSink {
    widget: String,
    generation: Generation,
    sender: Option<mpsc::UnboundedSender<ViewerMessage>>,
}

impl EventSink {
    pub fn new(widget: impl Into<String>, generation: Generation, sender: mpsc::UnboundedSender<ViewerMessage>) -> Self {
        Self {
            widget: widget.into(),
            generation,
            sender: Some(sender),
        }
    }

    /// A sink whose events go nowhere
    pub fn detached(widget: impl Into<String>) -> Self {
        Self {
            widget: widget.into(),
            generation: 0,
            sender: None,
        }
    }

    /// Dispatch an event; a closed workspace silently drops it
    pub fn emit(&self, event: ViewerEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        let message = ViewerMessage {
            widget: self.widget.clone(),
            generation: self.generation,
            event,
        };
        if sender.send(message).is_err() {
            tracing::trace!(widget = %self.widget, "event dropped, workspace closed");
        }
    }
}

/// Everything a plugin factory gets to build a viewer
#[derive(Clone)]
pub struct ViewerContext {
    /// Widget name in the workspace
    pub name: String,
    pub events: EventSink,
    pub redraw: Redraw,
}

impl ViewerContext {
    pub fn generation(&self) -> Generation {
        self.redraw.generation()
    }
}
