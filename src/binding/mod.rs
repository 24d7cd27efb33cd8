//! Selector bindings: narrowed, change-filtered views of a store.
//!
//! A binding subscribes to a [`Store`](crate::Store), recomputes its selector
//! on every notification and only reports a new value when the selection
//! actually changed. Bindings on the same store filter independently.
//!
//! Two consumer shapes are provided:
//! - [`Binding`]: pull style (`snapshot()` plus an optional change callback),
//!   the shape of a synchronous external-store hook.
//! - [`WatchBinding`]: push style, backed by a `tokio::sync::watch` channel
//!   that only ever carries distinct selections.

mod binding;
mod watch;

pub use binding::{Binding, BindingBuilder};
pub use watch::{select_key, WatchBinding};
