//! Plugin registry - viewer factories selected by name and priority

use std::sync::Arc;

use dw_core::{Result, WorkspaceError};

use crate::viewer::{Viewer, ViewerContext};

/// Builds a viewer for a freshly mounted widget
pub type ViewerFactory = Arc<dyn Fn(ViewerContext) -> Arc<dyn Viewer> + Send + Sync>;

/// A registered viewer implementation
#[derive(Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub priority: i32,
    pub factory: ViewerFactory,
}

impl PluginDescriptor {
    pub fn new<F>(name: impl Into<String>, priority: i32, factory: F) -> Self
    where
        F: Fn(ViewerContext) -> Arc<dyn Viewer> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            factory: Arc::new(factory),
        }
    }

    pub fn build(&self, context: ViewerContext) -> Arc<dyn Viewer> {
        (self.factory)(context)
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Registered plugins in registration order
#[derive(Clone, Default, Debug)]
pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: PluginDescriptor) {
        tracing::debug!(plugin = %descriptor.name, priority = descriptor.priority, "registered plugin");
        self.plugins.push(descriptor);
    }

    /// Builder-style `register`
    pub fn with(mut self, descriptor: PluginDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Pick the plugin for `name`.
    ///
    /// Among descriptors registered under the same name the highest priority
    /// wins, ties going to the earliest registration. `None` or an unknown
    /// name selects the highest-priority plugin overall.
    pub fn resolve(&self, name: Option<&str>) -> Result<&PluginDescriptor> {
        if let Some(name) = name {
            if let Some(found) = highest(self.plugins.iter().filter(|p| p.name == name)) {
                return Ok(found);
            }
            tracing::warn!(plugin = name, "unknown plugin, using default");
        }

        highest(self.plugins.iter()).ok_or_else(|| WorkspaceError::Plugin("no plugins registered".into()))
    }

    /// Distinct plugin names in registration order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for plugin in &self.plugins {
            if !names.contains(&plugin.name.as_str()) {
                names.push(&plugin.name);
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// First descriptor with the maximum priority
fn highest<'a>(plugins: impl Iterator<Item = &'a PluginDescriptor>) -> Option<&'a PluginDescriptor> {
    plugins.fold(None::<&'a PluginDescriptor>, |best, candidate| match best {
        Some(best) if best.priority >= candidate.priority => Some(best),
        _ => Some(candidate),
    })
}
