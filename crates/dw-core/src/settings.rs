//! Workspace instance settings

use std::time::Duration;

use crate::config::LinkMode;

/// Settings for a single workspace instance
#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    /// Plugin used for widgets whose config names none
    pub default_plugin: Option<String>,

    /// Linking policy for configs that carry no `mode`
    pub default_mode: LinkMode,

    /// How long `flush()` waits for one viewer's `delete()`
    pub disposal_timeout: Duration,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            default_plugin: None,
            default_mode: LinkMode::Linked,
            disposal_timeout: Duration::from_secs(5),
        }
    }
}

impl WorkspaceSettings {
    pub fn with_default_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.default_plugin = Some(plugin.into());
        self
    }

    pub fn with_default_mode(mut self, mode: LinkMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_disposal_timeout(mut self, timeout: Duration) -> Self {
        self.disposal_timeout = timeout;
        self
    }
}
