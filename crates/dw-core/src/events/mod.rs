use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

/// Workspace-wide event bus
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<std::any::TypeId, Vec<Box<dyn EventHandler>>>>>,
}

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    /// Wire name of the event as seen by hosts
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// Events emitted by a workspace
pub mod events {
    use super::Event;
    use crate::config::WidgetConfig;
    use crate::sync::Selection;

    /// Why the layout changed
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LayoutUpdateReason {
        /// A `restore()` changed the widget set or container shape
        Restore,
        /// A linked selection filtered one or more widgets
        LinkedFilter,
    }

    /// The layout or a widget's filters changed
    #[derive(Debug, Clone)]
    pub struct LayoutUpdated {
        pub reason: LayoutUpdateReason,
    }

    /// A widget was clicked
    #[derive(Debug, Clone)]
    pub struct ViewerClicked {
        pub widget: String,
        pub selection: Selection,
    }

    /// A widget row was selected or deselected
    #[derive(Debug, Clone)]
    pub struct ViewerSelected {
        pub widget: String,
        pub selection: Selection,
        pub selected: bool,
    }

    /// A widget changed its own configuration
    #[derive(Debug, Clone)]
    pub struct ViewerConfigUpdated {
        pub widget: String,
        pub config: WidgetConfig,
    }

    macro_rules! impl_event {
        ($($t:ty => $name:literal),*) => {
            $(
                impl Event for $t {
                    fn name(&self) -> &'static str {
                        $name
                    }

                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(
        LayoutUpdated => "workspace-layout-update",
        ViewerClicked => "perspective-click",
        ViewerSelected => "perspective-select",
        ViewerConfigUpdated => "perspective-config-update"
    );
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();
        handlers.entry(type_id).or_insert_with(Vec::new).push(handler);
    }

    /// Subscribe a closure that receives the concrete event type
    pub fn subscribe_fn<E, F>(&self, mut f: F)
    where
        E: Event,
        F: FnMut(&E) + Send + Sync + 'static,
    {
        self.subscribe::<E>(handler_from_fn(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                f(event);
            }
        }));
    }

    /// Publish an event
    ///
    /// Handlers run while the bus is locked and must not publish themselves.
    pub fn publish<E: Event>(&self, event: E) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();

        tracing::trace!(event = event.name(), "publishing");
        if let Some(event_handlers) = handlers.get_mut(&type_id) {
            for handler in event_handlers.iter_mut() {
                handler.handle(&event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}
