use serde::Serialize;
use serde_json::{Number, Value};

/// Compare two JSON trees structurally.
///
/// Objects are equal when they share a key set and every value is equal,
/// regardless of insertion order. Arrays compare element-wise in order.
/// Numbers compare by numeric value, so `1` and `1.0` are equal.
pub fn is_deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| is_deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| is_deep_equal(x, y)))
        }
        _ => false,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x == y;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Structural equality for any serializable value.
///
/// Both sides are lowered to JSON trees and walked with [`is_deep_equal`].
/// Values that refuse to serialize (maps with non-string keys, failing
/// `Serialize` impls) are never equal.
pub trait DeepEq {
    fn deep_eq(&self, other: &Self) -> bool;
}

impl<T: Serialize + ?Sized> DeepEq for T {
    fn deep_eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        match (serde_json::to_value(self), serde_json::to_value(other)) {
            (Ok(a), Ok(b)) => is_deep_equal(&a, &b),
            _ => false,
        }
    }
}
