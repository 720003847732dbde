//! Request handlers.

pub mod health;
pub mod progress;
pub mod transform;

pub use health::*;
pub use progress::*;
pub use transform::*;
