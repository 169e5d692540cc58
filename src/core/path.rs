//! Dotted-path access over nested JSON documents and `{{ path }}` templating.
//!
//! Paths are segments joined by `.`; object members are addressed by key and
//! array elements by their numeric index. The empty path addresses the whole
//! document.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
}

/// Return the value reachable at `path`, or `None` when any segment is missing
/// or a non-container is met on the way.
pub fn get<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(document);
    }
    let mut current = document;
    for segment in segments(path) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating empty objects for missing intermediate
/// segments. The empty path replaces the whole document.
pub fn set(document: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        *document = value;
        return;
    }
    let parts: Vec<&str> = segments(path).collect();
    let (last, parents) = match parts.split_last() {
        Some(split) => split,
        None => return,
    };
    let mut current = document;
    for segment in parents {
        current = child_mut(current, segment);
    }
    write_slot(current, last, value);
}

/// Remove and return the value at `path`.
pub fn remove(document: &mut Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(std::mem::take(document));
    }
    let (parent_path, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (parent, last),
        None => ("", path),
    };
    let parent = get_mut(document, parent_path)?;
    match parent {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            if index < items.len() {
                Some(items.remove(index))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Mutable counterpart of [`get`].
pub fn get_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    if path.is_empty() {
        return Some(document);
    }
    let mut current = document;
    for segment in segments(path) {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn child_mut<'a>(current: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = segment.parse::<usize>().ok();
    let is_array_slot = matches!(current, Value::Array(_)) && index.is_some();
    if !is_array_slot && !current.is_object() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Array(items) => {
            let index = index.unwrap_or_default();
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            let slot = &mut items[index];
            if !slot.is_object() && !slot.is_array() {
                *slot = Value::Object(Map::new());
            }
            slot
        }
        Value::Object(map) => {
            let slot = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() && !slot.is_array() {
                *slot = Value::Object(Map::new());
            }
            slot
        }
        _ => unreachable!("intermediate segment was normalized to a container"),
    }
}

fn write_slot(current: &mut Value, segment: &str, value: Value) {
    if let (Value::Array(items), Ok(index)) = (&mut *current, segment.parse::<usize>()) {
        if items.len() <= index {
            items.resize(index + 1, Value::Null);
        }
        items[index] = value;
        return;
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(segment.to_string(), value);
    }
}

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("template pattern is valid"))
}

/// Render a value as template text: strings raw, `null` empty, others as JSON.
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Replace every `{{ path }}` in string leaves of `value` with the stringified
/// value at that path in `context`. Containers are rebuilt structurally;
/// other scalars pass through unchanged.
pub fn substitute(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(substitute_str(text, context)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute(item, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// String form of [`substitute`].
pub fn substitute_str(text: &str, context: &Value) -> String {
    template_pattern()
        .replace_all(text, |caps: &Captures| {
            stringify(get(context, caps[1].trim()))
        })
        .into_owned()
}

/// Paths referenced by `{{ … }}` placeholders in string leaves of `value`.
pub fn template_bindings(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_bindings(value, &mut out);
    out
}

fn collect_bindings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            for caps in template_pattern().captures_iter(text) {
                out.push(caps[1].trim().to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_bindings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_bindings(item, out)),
        _ => {}
    }
}

/// Returns `true` when `text` is a bare dotted identifier path such as `a.b_c.0`.
pub fn is_plain_path(text: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z0-9_$]+)*$")
            .expect("path pattern is valid")
    });
    let trimmed = text.trim();
    pattern.is_match(trimmed) && !matches!(trimmed, "true" | "false" | "null")
}
