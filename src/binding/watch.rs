use std::fmt;

use serde_json::Value;
use tokio::sync::watch;

use super::binding::{Binding, BindingBuilder};
use crate::store::{Store, StoreState};

/// A binding that publishes distinct selections on a watch channel.
///
/// Receivers see the latest selection and wake only when it changes, which
/// makes this the natural shape for observable/ref style consumers.
pub struct WatchBinding<T, R> {
    binding: Binding<T, R>,
    rx: watch::Receiver<R>,
}

impl<T, R> WatchBinding<T, R>
where
    T: StoreState,
    R: Clone + Send + Sync + 'static,
{
    /// Latest published selection.
    pub fn get(&self) -> R {
        self.rx.borrow().clone()
    }

    /// A new receiver positioned at the latest selection.
    pub fn subscribe(&self) -> watch::Receiver<R> {
        let mut rx = self.rx.clone();
        rx.mark_unchanged();
        rx
    }

    pub fn binding(&self) -> &Binding<T, R> {
        &self.binding
    }

    pub fn unsubscribe(&self) {
        self.binding.unsubscribe();
    }
}

impl<T, R> BindingBuilder<T, R>
where
    T: StoreState,
    R: Clone + Send + Sync + 'static,
{
    /// Build a binding whose changes are published on a watch channel.
    pub fn watch(mut self) -> WatchBinding<T, R> {
        let initial = self.store.read(|state| (self.selector)(state));
        let (tx, rx) = watch::channel(initial);
        let user_callback = self.on_change.take();

        let publisher = tx.clone();
        let binding = self
            .on_change(move |value: &R| {
                publisher.send_replace(value.clone());
                if let Some(callback) = &user_callback {
                    callback(value);
                }
            })
            .build();

        // Align the channel with the binding's own initial selection without
        // waking receivers.
        if let Some(current) = binding.current() {
            tx.send_if_modified(|slot| {
                *slot = current;
                false
            });
        }

        WatchBinding { binding, rx }
    }
}

impl<T, R> fmt::Debug for WatchBinding<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchBinding")
            .field("binding", &self.binding)
            .finish()
    }
}

/// Watch a single top-level field of a JSON object store.
///
/// Missing fields read as `null`.
pub fn select_key(store: &Store<Value>, key: impl Into<String>) -> WatchBinding<Value, Value> {
    let key = key.into();
    let label = format!("select:{key}");
    Binding::builder(store, move |state: &Value| {
        state.get(&key).cloned().unwrap_or(Value::Null)
    })
    .label(label)
    .watch()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publishes_only_distinct_values() {
        let store = Store::new(json!({"count": 0, "name": "test"}));
        let count = select_key(&store, "count");
        let mut rx = count.subscribe();
        assert_eq!(*rx.borrow(), json!(0));

        store.set_state(json!({"name": "other"}));
        assert!(!rx.has_changed().unwrap());

        store.set_state(json!({"count": 1}));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), json!(1));
        assert_eq!(count.get(), json!(1));
    }

    #[test]
    fn missing_key_reads_null() {
        let store = Store::new(json!({"a": 1}));
        let b = select_key(&store, "b");
        assert_eq!(b.get(), Value::Null);

        store.set_state(json!({"b": [1, 2]}));
        assert_eq!(b.get(), json!([1, 2]));
    }

    #[test]
    fn user_callback_still_runs() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let store = Store::new(json!({"n": 0}));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let n = Binding::builder(&store, |state: &Value| state["n"].as_i64())
            .on_change(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .watch();

        store.set_state(json!({"n": 3}));
        assert_eq!(n.get(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn receivers_wake_on_change() {
        let store = Store::new(json!({"count": 0}));
        let count = select_key(&store, "count");
        let mut rx = count.subscribe();

        let writer = store.clone();
        let handle = tokio::spawn(async move {
            writer.set_state(json!({"count": 5}));
        });

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), json!(5));
        handle.await.unwrap();
    }

    #[test]
    fn unsubscribe_freezes_channel() {
        let store = Store::new(json!({"count": 0}));
        let count = select_key(&store, "count");
        count.unsubscribe();
        store.set_state(json!({"count": 9}));
        assert_eq!(count.get(), json!(0));
    }
}
