//! Response normalization: any [`Value`] or event stream to display text.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::agent::{EventStream, Value};

/// Attributes consulted on a single result object, in priority order.
const RESULT_ATTRS: [&str; 5] = ["text", "content", "message", "output", "value"];

/// Attributes consulted on each streamed event, in priority order.
const EVENT_ATTRS: [&str; 5] = ["text", "content", "message", "value", "payload"];

/// Convert a single result into display text.
///
/// Total over [`Value`]: there is no failure path.
pub fn normalize(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        v if v.is_scalar() => v.to_string(),
        Value::List(items) if !items.is_empty() => normalize_list(value, items),
        Value::Map(entries) => map_text(entries).unwrap_or_else(|| value.to_string()),
        Value::Object(obj) => {
            for name in RESULT_ATTRS {
                if let Some(attr) = obj.attr(name) {
                    return if attr.is_null() { String::new() } else { attr.to_string() };
                }
            }
            value.to_string()
        }
        other => other.to_string(),
    }
}

/// Lists are judged by their first element.
fn normalize_list(whole: &Value, items: &[Value]) -> String {
    let first = &items[0];
    if let Some(text) = first.attr("text") {
        return if text.is_null() { String::new() } else { text.to_string() };
    }
    if first.is_scalar() {
        return join_spaced(items);
    }
    if let Value::Map(entries) = first {
        return map_text(entries).unwrap_or_else(|| first.to_string());
    }
    whole.to_string()
}

/// The truthy `text` entry of a map, else its truthy `content` entry.
fn map_text(entries: &BTreeMap<String, Value>) -> Option<String> {
    ["text", "content"]
        .into_iter()
        .filter_map(|key| entries.get(key))
        .find(|v| v.is_truthy())
        .map(Value::to_string)
}

fn join_spaced(items: &[Value]) -> String {
    items.iter().map(Value::to_string).collect::<Vec<_>>().join(" ")
}

/// Text for one streamed event.
fn event_text(event: &Value) -> String {
    for name in EVENT_ATTRS {
        if let Some(attr) = event.attr(name) {
            if attr.is_truthy() {
                return attr.to_string();
            }
        }
    }
    match event {
        v if v.is_scalar() => v.to_string(),
        Value::List(items) if !items.is_empty() => join_spaced(items),
        Value::Map(entries) => map_text(entries).unwrap_or_else(|| event.to_string()),
        other => other.to_string(),
    }
}

/// Consume an event stream and join the text of every event.
///
/// Null events are skipped and blank fragments dropped. An error item is
/// kept as an inline fragment and ends the drain.
pub async fn drain(mut events: EventStream) -> String {
    let mut parts: Vec<String> = Vec::new();

    while let Some(item) = events.recv().await {
        match item {
            Ok(Value::Null) => continue,
            Ok(event) => parts.push(event_text(&event)),
            Err(e) => {
                warn!(error = %e, "event stream failed mid-drain");
                parts.push(format!("[error while reading events: {e}]"));
                break;
            }
        }
    }

    debug!(fragments = parts.len(), "event stream drained");

    parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{CallError, Object};
    use tokio::sync::mpsc;

    fn stream(items: Vec<Result<Value, CallError>>) -> EventStream {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.try_send(item).unwrap();
        }
        rx
    }

    #[test]
    fn null_is_empty() {
        assert_eq!(normalize(&Value::Null), "");
    }

    #[test]
    fn scalars_use_string_form() {
        assert_eq!(normalize(&Value::from("hi")), "hi");
        assert_eq!(normalize(&Value::Int(42)), "42");
        assert_eq!(normalize(&Value::Bool(true)), "true");
    }

    #[test]
    fn map_prefers_text_then_content() {
        assert_eq!(normalize(&Value::map([("content", "hello")])), "hello");
        assert_eq!(normalize(&Value::map([("text", "a"), ("content", "b")])), "a");
        assert_eq!(normalize(&Value::map([("text", ""), ("content", "b")])), "b");
    }

    #[test]
    fn map_without_known_keys_uses_full_repr() {
        assert_eq!(normalize(&Value::Map(BTreeMap::new())), "{}");
        assert_eq!(normalize(&Value::map([("answer", "x")])), r#"{"answer": "x"}"#);
    }

    #[test]
    fn list_of_scalars_is_space_joined() {
        assert_eq!(normalize(&Value::from(vec!["a", "b", "c"])), "a b c");
    }

    #[test]
    fn list_uses_first_element_text_attr() {
        let list = Value::List(vec![
            Object::new("Part").with("text", "first").into(),
            Object::new("Part").with("text", "second").into(),
        ]);
        assert_eq!(normalize(&list), "first");
    }

    #[test]
    fn list_of_maps_uses_first_map() {
        let list = Value::List(vec![Value::map([("content", "one")]), Value::map([("content", "two")])]);
        assert_eq!(normalize(&list), "one");
        let list = Value::List(vec![Value::map([("n", 1i64)])]);
        assert_eq!(normalize(&list), r#"{"n": 1}"#);
    }

    #[test]
    fn empty_list_uses_repr() {
        assert_eq!(normalize(&Value::List(vec![])), "[]");
    }

    #[test]
    fn object_attr_priority() {
        let obj = Object::new("Reply").with("output", "out").with("message", "msg");
        assert_eq!(normalize(&obj.into()), "msg");
        let obj = Object::new("Reply").with("value", 7i64);
        assert_eq!(normalize(&obj.into()), "7");
    }

    #[test]
    fn object_null_attr_is_empty() {
        let obj = Object::new("Reply").with("text", Value::Null).with("content", "ignored");
        assert_eq!(normalize(&obj.into()), "");
    }

    #[test]
    fn object_without_attrs_uses_repr() {
        assert_eq!(normalize(&Object::new("Opaque").into()), "Opaque()");
    }

    #[tokio::test]
    async fn drain_skips_nulls_and_joins() {
        let events = stream(vec![
            Ok(Value::map([("text", "a")])),
            Ok(Value::Null),
            Ok(Value::from("b")),
        ]);
        assert_eq!(drain(events).await, "a b");
    }

    #[tokio::test]
    async fn drain_reads_event_attributes() {
        let events = stream(vec![
            Ok(Object::new("Event").with("text", "").with("payload", "p").into()),
            Ok(Object::new("Event").with("content", "c").into()),
        ]);
        assert_eq!(drain(events).await, "p c");
    }

    #[tokio::test]
    async fn drain_drops_blank_fragments() {
        let events = stream(vec![Ok(Value::from("  ")), Ok(Value::from("x")), Ok(Value::from(""))]);
        assert_eq!(drain(events).await, "x");
    }

    #[tokio::test]
    async fn drain_captures_error_inline() {
        let events = stream(vec![
            Ok(Value::from("partial")),
            Err(CallError::Failed("connection reset".into())),
            Ok(Value::from("never read")),
        ]);
        assert_eq!(
            drain(events).await,
            "partial [error while reading events: call failed: connection reset]"
        );
    }

    #[tokio::test]
    async fn drain_event_lists_are_space_joined() {
        let events = stream(vec![Ok(Value::from(vec![1i64, 2])), Ok(Value::from(vec!["x"]))]);
        assert_eq!(drain(events).await, "1 2 x");
    }

    #[tokio::test]
    async fn drain_empty_stream() {
        let events = stream(vec![]);
        assert_eq!(drain(events).await, "");
    }
}
