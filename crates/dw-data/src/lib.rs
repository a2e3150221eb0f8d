//! Data registry for the dashboard workspace
//!
//! Maps logical source names to engine table handles, or to futures that
//! resolve to one, and notifies subscribers when a name becomes available.

pub mod registry;
pub mod source;

// Re-exports
pub use registry::{TableRegistry, TableSubscriber};
pub use source::{TableFuture, TableSource};
