//! Path operations over an in-memory JSON tree.
//!
//! Empty objects and `null` are treated as absent, so removing the last
//! child of a node removes the node too.

use serde_json::{Map, Value};

use super::StoreError;

/// Split a store path into segments. The empty path addresses the root.
pub fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let segs: Vec<&str> = trimmed.split('/').collect();
    if segs.iter().any(|s| s.is_empty() || *s == "." || *s == "..") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segs)
}

/// Navigate to `segs`. Arrays are addressable by index.
pub fn get_at<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segs {
        node = match node {
            Value::Object(map) => map.get(*seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if is_absent(node) {
        None
    } else {
        Some(node)
    }
}

/// Write `value` at `segs`, creating intermediate objects. `null` removes.
pub fn set_at(root: &mut Value, segs: &[&str], value: Value) {
    if value.is_null() {
        remove_at(root, segs);
        return;
    }
    let Some((head, rest)) = segs.split_first() else {
        *root = value;
        return;
    };
    if !root.is_object() {
        // Scalars and arrays are replaced when a child path is written under them.
        *root = Value::Object(Map::new());
    }
    if let Value::Object(map) = root {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        set_at(child, rest, value);
    }
}

/// Apply every key of `partial` as a child write under `segs`.
pub fn merge_at(root: &mut Value, segs: &[&str], partial: Map<String, Value>) {
    for (key, value) in partial {
        let mut path: Vec<&str> = segs.to_vec();
        path.push(&key);
        set_at(root, &path, value);
    }
}

fn remove_at(root: &mut Value, segs: &[&str]) {
    let Some((head, rest)) = segs.split_first() else {
        *root = Value::Null;
        return;
    };
    if let Value::Object(map) = root {
        if rest.is_empty() {
            map.remove(*head);
        } else if let Some(child) = map.get_mut(*head) {
            remove_at(child, rest);
            if is_absent(child) {
                map.remove(*head);
            }
        }
    }
}

pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
