//! Small stateless helpers shared across the plugin: value-tree merging,
//! order-preserving de-duplication, and ancestor-path containment.

use serde_json::Value;
use std::path::Path;

/// Deep-merge `overlay` onto `base`.
///
/// Merge policy, applied recursively:
/// - mappings merge key by key;
/// - sequences concatenate, base elements first, skipping overlay elements
///   already present so merging is idempotent;
/// - scalars are overridden by the overlay;
/// - a `null` overlay leaves the base value in place, so partial input
///   cannot accidentally erase defaults.
pub fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(overlay)) => {
            for value in overlay {
                if !base.contains(&value) {
                    base.push(value);
                }
            }
            Value::Array(base)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Remove repeated elements, preserving first-seen order.
pub fn uniq<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Whether `ancestor` is a component-wise prefix of `path`.
///
/// Equal paths count as self-ancestors.
pub fn path_has_ancestor(path: impl AsRef<Path>, ancestor: impl AsRef<Path>) -> bool {
    path.as_ref().starts_with(ancestor.as_ref())
}
