//! Partial-update semantics for the in-memory tree.

use serde_json::{Map, Value};

/// Apply a patch rooted at `base` to the tree.
///
/// Each patch key is a slash-separated path relative to `base`. The value
/// replaces the subtree at that location wholesale; `null` removes it.
/// Intermediate objects are created on demand, and a scalar in the way of a
/// deeper write is replaced by an object (last write wins).
pub fn apply_patch(tree: &mut Value, base: &[String], patch: &Map<String, Value>) {
    for (key, value) in patch {
        let mut segments: Vec<&str> = base.iter().map(String::as_str).collect();
        segments.extend(key.split('/').filter(|segment| !segment.is_empty()));

        if segments.is_empty() {
            // Patch addressed the root itself.
            if value.is_null() {
                *tree = Value::Object(Map::new());
            } else {
                *tree = value.clone();
            }
            continue;
        }

        if value.is_null() {
            remove_at(tree, &segments);
        } else {
            set_at(tree, &segments, value.clone());
        }
    }
}

/// Borrow the value at `segments`, if the path exists.
pub fn value_at<'tree>(tree: &'tree Value, segments: &[String]) -> Option<&'tree Value> {
    let mut node = tree;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn set_at(tree: &mut Value, segments: &[&str], value: Value) {
    let (last, parents) = segments.split_last().expect("segments checked non-empty");

    let mut node = tree;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = node
            .as_object_mut()
            .expect("node coerced to object above")
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
        .expect("node coerced to object above")
        .insert((*last).to_string(), value);
}

fn remove_at(tree: &mut Value, segments: &[&str]) {
    let (last, parents) = segments.split_last().expect("segments checked non-empty");

    let mut node = tree;
    for segment in parents {
        match node.as_object_mut().and_then(|map| map.get_mut(*segment)) {
            Some(child) => node = child,
            // Removing under a missing parent is a no-op.
            None => return,
        }
    }

    if let Some(map) = node.as_object_mut() {
        map.remove(*last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    fn patch(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn sets_nested_values_creating_parents() {
        let mut tree = json!({});
        apply_patch(
            &mut tree,
            &base(&["rooms", "x"]),
            &patch(&[("reveal", json!(false)), ("timer/enabled", json!(true))]),
        );
        assert_eq!(
            tree,
            json!({"rooms": {"x": {"reveal": false, "timer": {"enabled": true}}}})
        );
    }

    #[test]
    fn replaces_subtrees_wholesale() {
        let mut tree = json!({"rooms": {"x": {"timer": {"enabled": true, "durationSeconds": 30}}}});
        apply_patch(
            &mut tree,
            &base(&["rooms", "x"]),
            &patch(&[("timer", json!({"enabled": false}))]),
        );
        assert_eq!(tree, json!({"rooms": {"x": {"timer": {"enabled": false}}}}));
    }

    #[test]
    fn null_removes_the_addressed_field_only() {
        let mut tree = json!({"rooms": {"x": {"participants": {"p1": {
            "name": "Alice", "estimation": "5"
        }}}}});
        apply_patch(
            &mut tree,
            &base(&["rooms", "x"]),
            &patch(&[("participants/p1/estimation", Value::Null)]),
        );
        assert_eq!(
            tree,
            json!({"rooms": {"x": {"participants": {"p1": {"name": "Alice"}}}}})
        );
    }

    #[test]
    fn null_under_missing_parent_is_noop() {
        let mut tree = json!({"rooms": {}});
        apply_patch(
            &mut tree,
            &base(&["rooms", "x"]),
            &patch(&[("participants/p1/estimation", Value::Null)]),
        );
        assert_eq!(tree, json!({"rooms": {}}));
    }

    #[test]
    fn one_call_covers_several_locations() {
        let mut tree = json!({"rooms": {"x": {
            "reveal": true,
            "participants": {
                "p1": {"name": "Alice", "estimation": "5"},
                "p2": {"name": "Bob", "estimation": "8"}
            }
        }}});
        apply_patch(
            &mut tree,
            &base(&["rooms", "x"]),
            &patch(&[
                ("reveal", json!(false)),
                ("participants/p1/estimation", Value::Null),
                ("participants/p2/estimation", Value::Null),
            ]),
        );
        assert_eq!(
            tree,
            json!({"rooms": {"x": {
                "reveal": false,
                "participants": {"p1": {"name": "Alice"}, "p2": {"name": "Bob"}}
            }}})
        );
    }

    #[test]
    fn value_at_walks_objects() {
        let tree = json!({"rooms": {"x": {"reveal": true}}});
        assert_eq!(
            value_at(&tree, &base(&["rooms", "x", "reveal"])),
            Some(&json!(true))
        );
        assert_eq!(value_at(&tree, &base(&["rooms", "y"])), None);
    }
}
