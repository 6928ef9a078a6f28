//! Request handlers for object operations.

mod classes;

pub use classes::*;
