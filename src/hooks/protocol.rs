//! Wire protocol translation between host data and hook stdio JSON.
//!
//! Input, written once to the child's stdin then closed:
//! ```json
//! { "event": "before_tool", "data": { "tool_name": "read-file", "args": {"path": "x"} } }
//! ```
//! Output, the full and only write to the child's stdout before exit:
//! ```json
//! { "continue": true, "systemMessage": "optional", "data": {"k": "v"} }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::hook::HookEvent;
use crate::error::{HookError, Result};

/// Data fields that default to an empty list when absent from input.
const LIST_FIELDS: &[&str] = &["messages", "tool_calls", "available_tools"];

/// Payload written to a hook's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookInput {
    pub event: String,
    pub data: Map<String, Value>,
}

/// Payload a hook writes to stdout. `continue` is the only required field;
/// everything else is optional and null-tolerant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookOutput {
    #[serde(rename = "continue")]
    pub continue_: bool,

    #[serde(
        rename = "systemMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub system_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HookOutput {
    /// A normalized failure result: the batch keeps going, the error text is
    /// carried in the `error` field.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            continue_: true,
            system_message: None,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Coerce arbitrary host data into a JSON object.
///
/// `null` becomes `{}`; objects pass through; arrays and primitives are
/// wrapped as `{"value": <original>}` so the wire `data` field is always an
/// object.
pub fn normalize_data(data: Value) -> Map<String, Value> {
    match data {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Build a raw hook input without per-event field shaping.
pub fn to_hook_input(event: HookEvent, data: Value) -> HookInput {
    HookInput {
        event: event.as_str().to_string(),
        data: normalize_data(data),
    }
}

/// Build the input for a specific event, guaranteeing its required fields.
///
/// Accepts either the canonical snake_case key or the camelCase alias
/// (`sessionId` for `session_id`, ...); aliases are renamed onto the wire
/// key. Missing list-valued fields default to `[]`, other missing fields to
/// `null`. Extra fields supplied by the host pass through untouched.
pub fn create_event_input(event: HookEvent, data: Value) -> HookInput {
    let mut map = normalize_data(data);

    for field in event.required_fields() {
        if map.contains_key(*field) {
            continue;
        }
        let alias = snake_to_camel(field);
        if let Some(value) = map.remove(&alias) {
            map.insert(field.to_string(), value);
        } else if LIST_FIELDS.contains(field) {
            map.insert(field.to_string(), json!([]));
        } else {
            map.insert(field.to_string(), Value::Null);
        }
    }

    HookInput {
        event: event.as_str().to_string(),
        data: map,
    }
}

fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for c in s.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Structurally validate a parsed hook output payload.
///
/// Rules: `continue` is required and must be a boolean; `systemMessage` and
/// `error`, when present and non-null, must be strings; `data`, when present
/// and non-null, must be an object (arrays are rejected).
pub fn validate_output(value: &Value) -> Result<()> {
    let invalid = |msg: &str| HookError::InvalidOutputStructure(msg.to_string());

    let Value::Object(map) = value else {
        return Err(invalid("output must be a JSON object"));
    };

    match map.get("continue") {
        Some(Value::Bool(_)) => {}
        Some(_) => return Err(invalid("'continue' must be a boolean")),
        None => return Err(invalid("missing required field 'continue'")),
    }

    if let Some(v) = map.get("systemMessage")
        && !v.is_null()
        && !v.is_string()
    {
        return Err(invalid("'systemMessage' must be a string"));
    }

    if let Some(v) = map.get("data")
        && !v.is_null()
    {
        if v.is_array() {
            return Err(invalid("'data' must be an object, not an array"));
        }
        if !v.is_object() {
            return Err(invalid("'data' must be an object"));
        }
    }

    if let Some(v) = map.get("error")
        && !v.is_null()
        && !v.is_string()
    {
        return Err(invalid("'error' must be a string"));
    }

    Ok(())
}

/// Parse raw hook stdout into a validated [`HookOutput`].
///
/// Returns [`HookError::MalformedOutput`] when the text is not JSON at all,
/// and [`HookError::InvalidOutputStructure`] when it parses but violates the
/// schema. Callers rely on the two being distinguishable.
pub fn parse_hook_output(raw: &str) -> Result<HookOutput> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(HookError::MalformedOutput)?;
    validate_output(&value)?;
    serde_json::from_value(value)
        .map_err(|e| HookError::InvalidOutputStructure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_null_and_object() {
        assert!(normalize_data(Value::Null).is_empty());
        let map = normalize_data(json!({"a": 1}));
        assert_eq!(map.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_normalize_wraps_primitives_and_arrays() {
        assert_eq!(normalize_data(json!(42)).get("value"), Some(&json!(42)));
        assert_eq!(normalize_data(json!("x")).get("value"), Some(&json!("x")));
        assert_eq!(normalize_data(json!([1, 2])).get("value"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_to_hook_input_round_trip() {
        // event name survives serialization and data is always an object
        for event in HookEvent::ALL {
            let input = to_hook_input(event, json!([1, 2, 3]));
            let raw = serde_json::to_string(&input).unwrap();
            let back: Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(back["event"], json!(event.as_str()));
            assert!(back["data"].is_object());
        }
    }

    #[test]
    fn test_create_event_input_fills_required_fields() {
        for event in HookEvent::ALL {
            let input = create_event_input(event, json!({}));
            for field in event.required_fields() {
                assert!(
                    input.data.contains_key(*field),
                    "{} missing {}",
                    event,
                    field
                );
            }
        }
    }

    #[test]
    fn test_create_event_input_list_defaults() {
        let input = create_event_input(HookEvent::SessionEnd, json!({}));
        assert_eq!(input.data.get("messages"), Some(&json!([])));
        assert_eq!(input.data.get("session_id"), Some(&Value::Null));

        let input = create_event_input(HookEvent::BeforeToolSelection, json!(null));
        assert_eq!(input.data.get("available_tools"), Some(&json!([])));
    }

    #[test]
    fn test_create_event_input_accepts_camel_case_aliases() {
        let input = create_event_input(
            HookEvent::BeforeTool,
            json!({"toolName": "bash", "args": {"command": "ls"}}),
        );
        assert_eq!(input.data.get("tool_name"), Some(&json!("bash")));
        assert!(!input.data.contains_key("toolName"));

        let input = create_event_input(HookEvent::SessionStart, json!({"sessionId": "s-1"}));
        assert_eq!(input.data.get("session_id"), Some(&json!("s-1")));
    }

    #[test]
    fn test_create_event_input_snake_case_wins_over_alias() {
        let input = create_event_input(
            HookEvent::SessionStart,
            json!({"session_id": "canonical", "sessionId": "alias"}),
        );
        assert_eq!(input.data.get("session_id"), Some(&json!("canonical")));
    }

    #[test]
    fn test_create_event_input_passes_extra_fields_through() {
        let input = create_event_input(
            HookEvent::SessionStart,
            json!({"session_id": "s", "cwd": "/tmp"}),
        );
        assert_eq!(input.data.get("cwd"), Some(&json!("/tmp")));
    }

    #[test]
    fn test_validate_output_accepts_minimal() {
        assert!(validate_output(&json!({"continue": true})).is_ok());
        assert!(validate_output(&json!({"continue": false})).is_ok());
    }

    #[test]
    fn test_validate_output_accepts_nulls_for_optional_fields() {
        assert!(
            validate_output(&json!({
                "continue": true,
                "systemMessage": null,
                "data": null,
                "error": null
            }))
            .is_ok()
        );
    }

    #[test]
    fn test_validate_output_rejections() {
        assert!(validate_output(&json!({})).is_err());
        assert!(validate_output(&json!({"continue": "yes"})).is_err());
        assert!(validate_output(&json!({"continue": 1})).is_err());
        assert!(validate_output(&json!({"continue": true, "systemMessage": 5})).is_err());
        assert!(validate_output(&json!({"continue": true, "data": [1, 2]})).is_err());
        assert!(validate_output(&json!({"continue": true, "data": "str"})).is_err());
        assert!(validate_output(&json!({"continue": true, "error": {}})).is_err());
        assert!(validate_output(&json!([true])).is_err());
    }

    #[test]
    fn test_parse_hook_output_full() {
        let out = parse_hook_output(
            r#"{"continue": false, "systemMessage": "blocked", "data": {"k": "v"}}"#,
        )
        .unwrap();
        assert!(!out.continue_);
        assert_eq!(out.system_message.as_deref(), Some("blocked"));
        assert_eq!(out.data.unwrap().get("k"), Some(&json!("v")));
    }

    #[test]
    fn test_malformed_and_invalid_are_distinct_errors() {
        assert!(matches!(
            parse_hook_output("not json at all"),
            Err(HookError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_hook_output(r#"{"ok": true}"#),
            Err(HookError::InvalidOutputStructure(_))
        ));
    }

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("session_id"), "sessionId");
        assert_eq!(snake_to_camel("available_tools"), "availableTools");
        assert_eq!(snake_to_camel("prompt"), "prompt");
    }
}
