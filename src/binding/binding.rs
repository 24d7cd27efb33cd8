use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::equality::DeepEq;
use crate::logging::LogOptions;
use crate::store::{Store, StoreState, Subscription};

pub(super) type Selector<T, R> = Arc<dyn Fn(&T) -> R + Send + Sync>;
type Comparator<R> = Box<dyn Fn(&R, &R) -> bool + Send + Sync>;
type Renderer<R> = Box<dyn Fn(&R) -> String + Send + Sync>;
pub(super) type ChangeCallback<R> = Box<dyn Fn(&R) + Send + Sync>;

const DEFAULT_LABEL: &str = "binding";

/// State shared between a binding handle and its store listener.
struct Shared<T, R> {
    store: Store<T>,
    selector: Selector<T, R>,
    same: Comparator<R>,
    render: Renderer<R>,
    log: LogOptions,
    label: Cow<'static, str>,
    on_change: Option<ChangeCallback<R>>,
    previous: Mutex<Option<R>>,
    version: AtomicU64,
}

enum Refresh<R> {
    Initialized(R),
    Unchanged(R),
    Changed(R),
}

impl<T: StoreState, R: Clone + Send + Sync + 'static> Shared<T, R> {
    /// Recompute the selection and compare it to the last emitted value.
    fn refresh(&self) -> Refresh<R> {
        let next = self.store.read(|state| (self.selector)(state));
        let mut previous = self.previous.lock();

        let Some(prev) = previous.as_ref() else {
            self.log_change("initialized", None, &next);
            *previous = Some(next.clone());
            return Refresh::Initialized(next);
        };
        if (self.same)(prev, &next) {
            return Refresh::Unchanged(prev.clone());
        }

        self.log_change("changed", Some(prev), &next);
        *previous = Some(next.clone());
        self.version.fetch_add(1, Ordering::AcqRel);
        Refresh::Changed(next)
    }

    fn sync(&self) -> R {
        match self.refresh() {
            Refresh::Changed(value) => {
                if let Some(on_change) = &self.on_change {
                    on_change(&value);
                }
                value
            }
            Refresh::Initialized(value) | Refresh::Unchanged(value) => value,
        }
    }

    fn log_change(&self, what: &str, prev: Option<&R>, next: &R) {
        if !self.log.any() {
            return;
        }
        let prev = prev.map(|prev| (self.render)(prev));
        self.log
            .state_change(&self.label, what, prev.as_deref(), &(self.render)(next));
    }
}

/// Subscribes to a store and tracks a derived value.
///
/// The selection is computed once at construction. After that every store
/// notification recomputes it; the change callback and the version counter
/// only move when the new selection differs from the last emitted one.
/// Dropping the binding (or calling [`unsubscribe`](Self::unsubscribe))
/// removes its store listener.
///
/// # Examples
///
/// ```
/// use serde_json::{json, Value};
/// use stowage::{Binding, Store};
///
/// let store = Store::new(json!({"count": 0, "name": "test"}));
/// let count = Binding::new(&store, |state: &Value| state["count"].clone());
///
/// store.set_state(json!({"name": "renamed"}));
/// assert_eq!(count.version(), 0);
///
/// store.set_state(json!({"count": 1}));
/// assert_eq!(count.snapshot(), json!(1));
/// assert_eq!(count.version(), 1);
/// ```
pub struct Binding<T, R> {
    shared: Arc<Shared<T, R>>,
    subscription: Subscription,
}

impl<T, R> Binding<T, R>
where
    T: StoreState,
    R: Clone + Send + Sync + 'static,
{
    /// Bind `selector` with structural change detection and no diagnostics.
    pub fn new<S>(store: &Store<T>, selector: S) -> Self
    where
        R: Serialize,
        S: Fn(&T) -> R + Send + Sync + 'static,
    {
        Self::builder(store, selector).build()
    }

    pub fn builder<S>(store: &Store<T>, selector: S) -> BindingBuilder<T, R>
    where
        R: Serialize,
        S: Fn(&T) -> R + Send + Sync + 'static,
    {
        BindingBuilder {
            store: store.clone(),
            selector: Arc::new(selector),
            same: Box::new(|a: &R, b: &R| a.deep_eq(b)),
            render: Box::new(|value: &R| {
                serde_json::to_string(value).unwrap_or_else(|_| "<unserializable>".to_owned())
            }),
            log: LogOptions::default(),
            label: Cow::Borrowed(DEFAULT_LABEL),
            on_change: None,
        }
    }

    /// Current selection, recomputed and compared against the last one.
    pub fn snapshot(&self) -> R {
        self.shared.sync()
    }

    /// The last emitted selection, without recomputing.
    pub fn current(&self) -> Option<R> {
        self.shared.previous.lock().clone()
    }

    /// Number of distinct changes emitted since construction.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }

    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<T, R> fmt::Debug for Binding<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("label", &self.shared.label)
            .field("version", &self.shared.version.load(Ordering::Acquire))
            .field("subscribed", &self.subscription.is_active())
            .finish()
    }
}

/// Configures a [`Binding`] before it subscribes.
pub struct BindingBuilder<T, R> {
    pub(super) store: Store<T>,
    pub(super) selector: Selector<T, R>,
    same: Comparator<R>,
    render: Renderer<R>,
    log: LogOptions,
    label: Cow<'static, str>,
    pub(super) on_change: Option<ChangeCallback<R>>,
}

impl<T, R> BindingBuilder<T, R>
where
    T: StoreState,
    R: Clone + Send + Sync + 'static,
{
    /// Builder for selections that are not serializable; `same` decides
    /// whether two selections are equal.
    pub fn with_comparator<S, E>(store: &Store<T>, selector: S, same: E) -> Self
    where
        R: fmt::Debug,
        S: Fn(&T) -> R + Send + Sync + 'static,
        E: Fn(&R, &R) -> bool + Send + Sync + 'static,
    {
        Self {
            store: store.clone(),
            selector: Arc::new(selector),
            same: Box::new(same),
            render: Box::new(|value: &R| format!("{value:?}")),
            log: LogOptions::default(),
            label: Cow::Borrowed(DEFAULT_LABEL),
            on_change: None,
        }
    }

    pub fn log(mut self, log: LogOptions) -> Self {
        self.log = log;
        self
    }

    /// Prefix used in diagnostic lines.
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }

    /// Called with every newly emitted selection.
    pub fn on_change<F>(mut self, on_change: F) -> Self
    where
        F: Fn(&R) + Send + Sync + 'static,
    {
        self.on_change = Some(Box::new(on_change));
        self
    }

    /// Compute the initial selection and subscribe to the store.
    pub fn build(self) -> Binding<T, R> {
        let shared = Arc::new(Shared {
            store: self.store,
            selector: self.selector,
            same: self.same,
            render: self.render,
            log: self.log,
            label: self.label,
            on_change: self.on_change,
            previous: Mutex::new(None),
            version: AtomicU64::new(0),
        });
        shared.refresh();

        let weak: Weak<Shared<T, R>> = Arc::downgrade(&shared);
        let subscription = shared.store.subscribe(move || {
            if let Some(shared) = weak.upgrade() {
                shared.sync();
            }
        });

        Binding {
            shared,
            subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    fn field(name: &'static str) -> impl Fn(&Value) -> Value + Send + Sync + 'static {
        move |state: &Value| state[name].clone()
    }

    fn counted<T: StoreState>(
        store: &Store<T>,
        selector: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> (Binding<T, Value>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let binding = Binding::builder(store, selector)
            .on_change(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        (binding, calls)
    }

    #[test]
    fn returns_initial_selection() {
        let store = Store::new(json!({"count": 0, "name": "test"}));
        let binding = Binding::new(&store, field("count"));
        assert_eq!(binding.current(), Some(json!(0)));
        assert_eq!(binding.snapshot(), json!(0));
    }

    #[test]
    fn ignores_unrelated_fields() {
        let store = Store::new(json!({"count": 0, "name": "test"}));
        let (count, count_calls) = counted(&store, field("count"));
        let (name, name_calls) = counted(&store, field("name"));

        store.set_state(json!({"name": "a"}));
        store.set_state(json!({"name": "b"}));
        assert_eq!(count_calls.load(Ordering::SeqCst), 0);
        assert_eq!(name_calls.load(Ordering::SeqCst), 2);

        store.set_state(json!({"count": 1}));
        assert_eq!(count_calls.load(Ordering::SeqCst), 1);
        assert_eq!(name_calls.load(Ordering::SeqCst), 2);
        assert_eq!(count.snapshot(), json!(1));
        assert_eq!(name.snapshot(), json!("b"));
    }

    #[test]
    fn fires_once_per_distinct_value() {
        let store = Store::new(json!({"x": 0, "y": 0}));
        let (_binding, calls) = counted(&store, field("x"));

        for (i, x) in [1, 1, 2, 2, 2, 3].into_iter().enumerate() {
            store.set_state(json!({ "x": x, "y": i }));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn structurally_equal_objects_do_not_fire() {
        let store = Store::new(json!({"user": {"id": 1, "tags": ["a"]}, "n": 0}));
        let (binding, calls) = counted(&store, field("user"));

        store.replace_all_state(json!({"n": 1, "user": {"tags": ["a"], "id": 1}}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(binding.version(), 0);

        store.set_state(json!({"user": {"id": 1, "tags": ["a", "b"]}}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn derived_selections() {
        let store = Store::new(json!({"items": [1, 2, 3]}));
        let total = Binding::new(&store, |state: &Value| {
            state["items"]
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_i64).sum::<i64>())
                .unwrap_or(0)
        });
        assert_eq!(total.snapshot(), 6);

        store.set_state(json!({"items": [3, 2, 1]}));
        assert_eq!(total.version(), 0);
        store.set_state(json!({"items": [10]}));
        assert_eq!(total.snapshot(), 10);
    }

    #[test]
    fn custom_comparator() {
        #[derive(Clone, Debug)]
        struct Bucket(i64);

        let store = Store::new(json!({"n": 0}));
        let binding = BindingBuilder::with_comparator(
            &store,
            |state: &Value| Bucket(state["n"].as_i64().unwrap_or(0) / 10),
            |a: &Bucket, b: &Bucket| a.0 == b.0,
        )
        .build();

        store.set_state(json!({"n": 5}));
        assert_eq!(binding.version(), 0);
        store.set_state(json!({"n": 15}));
        assert_eq!(binding.version(), 1);
        assert_eq!(binding.snapshot().0, 1);
    }

    #[test]
    fn teardown_unsubscribes() {
        let store = Store::new(json!({"count": 0}));
        let (binding, calls) = counted(&store, field("count"));
        assert_eq!(store.listener_count(), 1);

        binding.unsubscribe();
        binding.unsubscribe();
        assert!(!binding.is_subscribed());
        store.set_state(json!({"count": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(binding);
        let _other = Binding::new(&store, field("count"));
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn drop_releases_listener() {
        let store = Store::new(json!({"count": 0}));
        {
            let _a = Binding::new(&store, field("count"));
            let _b = Binding::new(&store, field("count"));
            assert_eq!(store.listener_count(), 2);
        }
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn follows_undo_and_reset() {
        let store = Store::new(json!({"count": 0}));
        let (binding, calls) = counted(&store, field("count"));

        store.set_state(json!({"count": 1}));
        store.undo();
        assert_eq!(binding.snapshot(), json!(0));
        store.reset_state();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn logging_does_not_change_behaviour() {
        let store = Store::new(json!({"count": 0}));
        let binding = Binding::builder(&store, field("count"))
            .log(LogOptions::verbose())
            .label("counter")
            .build();
        store.set_state(json!({"count": 2}));
        assert_eq!(binding.snapshot(), json!(2));
        assert_eq!(binding.version(), 1);
    }
}
