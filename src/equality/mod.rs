//! Structural equality used to suppress redundant commits and notifications.

mod deep_equal;

pub use deep_equal::{is_deep_equal, DeepEq};
