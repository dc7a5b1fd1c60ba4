//! REST API handlers

mod anchors;
mod documents;
mod health;
mod workflow;

pub use anchors::*;
pub use documents::*;
pub use health::*;
pub use workflow::*;
