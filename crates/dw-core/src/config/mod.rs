//! Workspace configuration model

pub mod layout;
pub mod widget;
pub mod workspace;

pub use layout::*;
pub use widget::*;
pub use workspace::*;
