//! GUI host seam

use async_trait::async_trait;

use crate::layout::LayoutOp;

/// Render target driven by layout patches.
///
/// Structural operations always precede size and tab-index operations
/// within one `apply` call.
#[async_trait]
pub trait LayoutHost: Send + Sync {
    async fn apply(&self, ops: &[LayoutOp]) -> anyhow::Result<()>;

    /// The host element changed size
    async fn resize(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Host that renders nothing, for headless workspaces
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

#[async_trait]
impl LayoutHost for NullHost {
    async fn apply(&self, ops: &[LayoutOp]) -> anyhow::Result<()> {
        tracing::trace!(ops = ops.len(), "layout patch discarded");
        Ok(())
    }
}
