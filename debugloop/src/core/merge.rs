//! Structural merge of streamed decision fragments.
//!
//! A streamed decision arrives as a sequence of partial JSON objects. Merging
//! them in order reconstructs the complete message:
//!
//! - strings concatenate,
//! - objects merge key by key (recursively),
//! - arrays of objects carrying an `index` key merge element-wise by index,
//!   new indices are appended,
//! - other arrays take the union of their elements (duplicates skipped),
//! - `null` in a fragment leaves the accumulated value untouched,
//! - any other combination is last-write-wins.

use serde_json::{Map, Value};

/// Merge `delta` into `base`, returning a new value. Neither input is mutated.
pub fn merge(base: &Value, delta: &Value) -> Value {
    let mut merged = base.clone();
    merge_into(&mut merged, delta);
    merged
}

/// Merge a whole fragment sequence, starting from an empty object.
pub fn merge_all<'a, I>(fragments: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    fragments
        .into_iter()
        .fold(Value::Object(Map::new()), |acc, fragment| merge(&acc, fragment))
}

fn merge_into(base: &mut Value, delta: &Value) {
    match (base, delta) {
        (_, Value::Null) => {}
        (Value::String(acc), Value::String(more)) => acc.push_str(more),
        (Value::Object(acc), Value::Object(more)) => {
            for (key, value) in more {
                match acc.get_mut(key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        if !value.is_null() {
                            acc.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }
        (Value::Array(acc), Value::Array(more)) => merge_arrays(acc, more),
        (slot, value) => *slot = value.clone(),
    }
}

fn merge_arrays(acc: &mut Vec<Value>, more: &[Value]) {
    for item in more {
        match index_of(item) {
            Some(idx) => match acc.iter_mut().find(|e| index_of(e) == Some(idx)) {
                Some(existing) => merge_into(existing, item),
                None => acc.push(item.clone()),
            },
            None => {
                if !acc.contains(item) {
                    acc.push(item.clone());
                }
            }
        }
    }
}

/// The `index` key of an indexed list element, if any.
pub fn index_of(value: &Value) -> Option<u64> {
    value.as_object()?.get("index")?.as_u64()
}
