//! Provider-specific body adjustments applied after dialect conversion
//! (spec §4.8).

use serde_json::{Map, Value};

/// Recursively strip every `cache_control` field, drop `reasoning_effort`,
/// disable thinking for `glm-*`/`kimi-*` models when the caller didn't ask
/// for it, and rewrite Anthropic-shaped tool defs into OpenAI function defs.
/// Mutates `body` in place.
pub fn opencode_zen_fixup(body: &mut Value, model: &str, thinking_enabled: bool) {
    strip_cache_control(body);

    if let Some(obj) = body.as_object_mut() {
        obj.remove("reasoning_effort");

        let lower = model.to_lowercase();
        if !thinking_enabled && (lower.starts_with("glm-") || lower.starts_with("kimi-")) {
            obj.insert("thinking".to_string(), serde_json::json!({ "type": "disabled" }));
        }

        if let Some(Value::Array(tools)) = obj.get("tools").cloned() {
            let rewritten: Vec<Value> = tools
                .into_iter()
                .map(|tool| {
                    if let Some(schema) = tool.get("input_schema").cloned() {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": tool.get("name").cloned().unwrap_or(Value::Null),
                                "description": tool.get("description").cloned().unwrap_or(Value::Null),
                                "parameters": schema,
                            }
                        })
                    } else {
                        tool
                    }
                })
                .collect();
            obj.insert("tools".to_string(), Value::Array(rewritten));
        }
    }
}

fn strip_cache_control(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("cache_control");
            for v in map.values_mut() {
                strip_cache_control(v);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                strip_cache_control(v);
            }
        }
        _ => {}
    }
}

/// Wrap a Gemini-dialect body in the antigravity project envelope.
#[must_use]
pub fn antigravity_wrap(project: &str, model: &str, request: Value, request_id: &str) -> Value {
    serde_json::json!({
        "project": project,
        "model": model,
        "request": request,
        "requestId": request_id,
    })
}

/// Build an OpenAI Responses-shaped body for the Codex (openai-web)
/// backend.
#[must_use]
pub fn build_codex_body(
    model: &str,
    messages: Value,
    tools: Option<Value>,
    reasoning: Option<Value>,
) -> Value {
    let mut obj = Map::new();
    obj.insert("model".to_string(), Value::String(model.to_string()));
    obj.insert("input".to_string(), messages);
    if let Some(tools) = tools {
        obj.insert("tools".to_string(), tools);
    }
    if let Some(reasoning) = reasoning {
        obj.insert("reasoning".to_string(), reasoning);
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_control_is_stripped_recursively() {
        let mut body = json!({
            "messages": [{ "content": [{ "type": "text", "text": "hi", "cache_control": {"type": "ephemeral"} }] }],
        });
        opencode_zen_fixup(&mut body, "gpt-4o", true);
        assert!(body["messages"][0]["content"][0].get("cache_control").is_none());
    }

    #[test]
    fn thinking_disabled_for_glm_when_not_requested() {
        let mut body = json!({});
        opencode_zen_fixup(&mut body, "glm-4-plus", false);
        assert_eq!(body["thinking"]["type"], "disabled");
    }

    #[test]
    fn thinking_left_alone_when_requested() {
        let mut body = json!({});
        opencode_zen_fixup(&mut body, "glm-4-plus", true);
        assert!(body.get("thinking").is_none());
    }

    #[test]
    fn anthropic_tool_shape_rewritten_to_function_shape() {
        let mut body = json!({
            "tools": [{ "name": "search", "description": "d", "input_schema": {"type": "object"} }]
        });
        opencode_zen_fixup(&mut body, "gpt-4o", true);
        let tool = &body["tools"][0];
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["function"]["name"], "search");
    }

    #[test]
    fn antigravity_wrap_produces_envelope() {
        let wrapped = antigravity_wrap("proj-1", "gemini-pro", json!({ "contents": [] }), "req-1");
        assert_eq!(wrapped["project"], "proj-1");
        assert_eq!(wrapped["requestId"], "req-1");
    }

    #[test]
    fn codex_body_includes_optional_fields_only_when_present() {
        let body = build_codex_body("gpt-5-codex", json!([]), None, None);
        assert!(body.get("tools").is_none());
        assert!(body.get("reasoning").is_none());
    }
}
