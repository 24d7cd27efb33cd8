use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use serde_json::Value;

/// Shallow, field-by-field merge of a partial update onto a full state.
///
/// Plain structs usually pair with a companion "patch" struct of `Option`
/// fields:
///
/// ```
/// use stowage::store::Merge;
///
/// #[derive(Clone)]
/// struct Counter {
///     count: i64,
///     name: String,
/// }
///
/// #[derive(Default)]
/// struct CounterPatch {
///     count: Option<i64>,
///     name: Option<String>,
/// }
///
/// impl Merge for Counter {
///     type Partial = CounterPatch;
///
///     fn merge(&self, patch: CounterPatch) -> Self {
///         Self {
///             count: patch.count.unwrap_or(self.count),
///             name: patch.name.unwrap_or_else(|| self.name.clone()),
///         }
///     }
/// }
///
/// let state = Counter { count: 0, name: "test".into() };
/// let next = state.merge(CounterPatch { count: Some(1), ..Default::default() });
/// assert_eq!(next.count, 1);
/// assert_eq!(next.name, "test");
/// ```
pub trait Merge: Sized {
    type Partial;

    fn merge(&self, partial: Self::Partial) -> Self;
}

/// Objects merge key by key; any other partial replaces the state.
impl Merge for Value {
    type Partial = Value;

    fn merge(&self, partial: Value) -> Self {
        match (self, partial) {
            (Value::Object(current), Value::Object(patch)) => {
                let mut merged = current.clone();
                merged.extend(patch);
                Value::Object(merged)
            }
            (_, partial) => partial,
        }
    }
}

impl<V: Clone> Merge for BTreeMap<String, V> {
    type Partial = BTreeMap<String, V>;

    fn merge(&self, partial: Self::Partial) -> Self {
        let mut merged = self.clone();
        merged.extend(partial);
        merged
    }
}

impl<V: Clone, S: BuildHasher + Clone> Merge for HashMap<String, V, S> {
    type Partial = HashMap<String, V, S>;

    fn merge(&self, partial: Self::Partial) -> Self {
        let mut merged = self.clone();
        merged.extend(partial);
        merged
    }
}
