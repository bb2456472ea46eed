//! Pre-dispatch conversation transform: signature validation (C6), thinking
//! strip/inject and turn-separation recovery (C7), run once per inbound
//! request before it enters the retry loop.
//!
//! The retry loop's own `StripThinkingAndRetry` path (see `llmux-dispatch`)
//! handles thinking corruption discovered mid-retry; this module handles the
//! steady-state case of a client replaying a conversation that carries
//! signatures from an earlier turn.

use llmux_core::part::Message;
use llmux_core::{Dialect, Provider};
use llmux_router::Resolution;
use llmux_signatures::{NewSignatureRecord, validate_and_strip_signatures};
use llmux_thinking::{InjectContext, apply_turn_separation_recovery, build_signature_session_key, extract_conversation_key, inject_thinking, should_cache_signatures, strip_thinking};
use serde_json::Value;

use crate::state::AppState;

/// Run the C6/C7 transform on an inbound request body, returning the body
/// with inadmissible signatures stripped, thinking re-injected where the
/// engine can resolve one, and turn-separation recovery messages appended
/// if the conversation ends mid tool-loop with no thinking in its turn.
/// All three steps are gated on `should_cache_signatures` — a family with
/// no signature/thinking concept (e.g. plain OpenAI) gets none of them.
pub fn prepare_body(state: &AppState, dialect: Dialect, resolution: &Resolution, body: Value) -> Value {
    let (system, wire_messages) = extract_system_and_messages(dialect, &body);
    let mut messages = to_canonical(dialect, system.as_ref(), wire_messages);

    let family = resolution.provider.family();
    if should_cache_signatures(family, resolution.thinking) {
        let project_id = resolution.provider.as_str();
        if let Ok(outcome) = validate_and_strip_signatures(messages, project_id, &state.signatures) {
            messages = outcome.messages;
        }

        let (cleaned, removed_texts) = strip_thinking(messages);
        messages = cleaned;

        let system_text = first_system_text(&messages);
        let first_user_text = first_user_text(&messages);
        let conv_key = extract_conversation_key(&body, &system_text, &first_user_text);
        let session_key =
            build_signature_session_key("llmux", &resolution.model, Some(project_id), conv_key.as_deref());
        let ctx = InjectContext {
            session_key: &session_key,
            family,
        };
        inject_thinking(&mut messages, &removed_texts, &ctx, &state.thinking);
        apply_turn_separation_recovery(&mut messages);
    }

    reassemble_body(dialect, body, messages)
}

fn extract_system_and_messages(dialect: Dialect, body: &Value) -> (Option<Value>, Vec<Value>) {
    match dialect {
        Dialect::OpenaiChat => (None, body.get("messages").and_then(Value::as_array).cloned().unwrap_or_default()),
        Dialect::AnthropicMessages => (
            body.get("system").cloned(),
            body.get("messages").and_then(Value::as_array).cloned().unwrap_or_default(),
        ),
        Dialect::GeminiGenerateContent => (
            body.get("systemInstruction")
                .or_else(|| body.get("system_instruction"))
                .cloned(),
            body.get("contents").and_then(Value::as_array).cloned().unwrap_or_default(),
        ),
    }
}

fn to_canonical(dialect: Dialect, system: Option<&Value>, wire_messages: Vec<Value>) -> Vec<Message> {
    match dialect {
        Dialect::OpenaiChat => llmux_dialects::openai::to_canonical(&wire_messages),
        Dialect::AnthropicMessages => llmux_dialects::anthropic::to_canonical(system, &wire_messages),
        Dialect::GeminiGenerateContent => llmux_dialects::gemini::to_canonical(system, &wire_messages),
    }
}

fn reassemble_body(dialect: Dialect, mut body: Value, messages: Vec<Message>) -> Value {
    match dialect {
        Dialect::OpenaiChat => {
            body["messages"] = llmux_dialects::openai::from_canonical(&messages);
        }
        Dialect::AnthropicMessages => {
            let (system, wire) = llmux_dialects::anthropic::from_canonical(&messages);
            match system {
                Some(system) => body["system"] = system,
                None => {
                    if let Value::Object(map) = &mut body {
                        map.remove("system");
                    }
                }
            }
            body["messages"] = wire;
        }
        Dialect::GeminiGenerateContent => {
            let (system, contents) = llmux_dialects::gemini::from_canonical(&messages);
            if let Value::Object(map) = &mut body {
                map.remove("system_instruction");
            }
            match system {
                Some(system) => body["systemInstruction"] = system,
                None => {
                    if let Value::Object(map) = &mut body {
                        map.remove("systemInstruction");
                    }
                }
            }
            body["contents"] = contents;
        }
    }
    body
}

/// Walk a response body for every `signature`/`thoughtSignature`/
/// `thought_signature` field and persist it as admissible for `provider`,
/// so a later turn replaying that signature validates against this project.
/// Best-effort: a store failure is logged and otherwise ignored, since a
/// response has already been produced to the client by this point.
pub fn persist_signatures(state: &AppState, provider: Provider, value: &Value) {
    let mut signatures = Vec::new();
    collect_signatures(value, &mut signatures);
    for signature in signatures {
        let record = NewSignatureRecord {
            signature,
            project_id: provider.as_str().to_string(),
            provider: provider.as_str().to_string(),
            endpoint: None,
            account: None,
        };
        if let Err(err) = state.signatures.save_signature(&record) {
            tracing::warn!(%err, "failed to persist signature");
        }
    }
}

fn collect_signatures(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for key in ["signature", "thoughtSignature", "thought_signature"] {
                if let Some(Value::String(s)) = map.get(key) {
                    out.push(s.clone());
                }
            }
            for v in map.values() {
                collect_signatures(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_signatures(v, out);
            }
        }
        _ => {}
    }
}

fn first_system_text(messages: &[Message]) -> String {
    text_of_first(messages, llmux_core::part::Role::System)
}

fn first_user_text(messages: &[Message]) -> String {
    text_of_first(messages, llmux_core::part::Role::User)
}

fn text_of_first(messages: &[Message], role: llmux_core::part::Role) -> String {
    messages
        .iter()
        .find(|m| m.role == role)
        .map(|m| {
            m.parts
                .iter()
                .filter_map(|p| match p {
                    llmux_core::part::Part::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmux_core::Provider;
    use llmux_signatures::sqlite::{ConnectionConfig, new_in_memory, run_migrations};
    use llmux_signatures::SignatureStore;
    use llmux_config::GatewayConfig;
    use serde_json::json;

    fn test_state() -> AppState {
        AppState::new(GatewayConfig::default())
    }

    #[test]
    fn openai_body_round_trips_messages_untouched_when_no_thinking() {
        let state = test_state();
        let body = json!({ "model": "gpt-4o", "messages": [{ "role": "user", "content": "hi" }] });
        let resolution = Resolution {
            provider: Provider::Openai,
            model: "gpt-4o".to_string(),
            thinking: false,
        };
        let out = prepare_body(&state, Dialect::OpenaiChat, &resolution, body);
        assert_eq!(out["messages"][0]["content"], "hi");
    }

    #[test]
    fn openai_tool_ending_conversation_gets_no_turn_separation_recovery() {
        let state = test_state();
        let body = json!({
            "model": "gpt-4o",
            "messages": [
                { "role": "user", "content": "use a tool" },
                {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{ "id": "t1", "type": "function", "function": { "name": "search", "arguments": "{}" } }],
                },
                { "role": "tool", "tool_call_id": "t1", "content": "ok" },
            ],
        });
        let resolution = Resolution {
            provider: Provider::Openai,
            model: "gpt-4o".to_string(),
            thinking: false,
        };
        let out = prepare_body(&state, Dialect::OpenaiChat, &resolution, body);
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3, "OpenAI never caches signatures, so turn-separation recovery must not run");
    }

    #[test]
    fn anthropic_turn_separation_recovery_is_applied() {
        let state = test_state();
        let body = json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                { "role": "user", "content": [{ "type": "text", "text": "use a tool" }] },
                { "role": "assistant", "content": [{ "type": "tool_use", "id": "t1", "name": "search", "input": {} }] },
                { "role": "user", "content": [{ "type": "tool_result", "tool_use_id": "t1", "content": "ok" }] },
            ],
        });
        let resolution = Resolution {
            provider: Provider::Anthropic,
            model: "claude-3-5-sonnet".to_string(),
            thinking: true,
        };
        let out = prepare_body(&state, Dialect::AnthropicMessages, &resolution, body);
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[3]["role"], "assistant");
        assert_eq!(messages[4]["role"], "user");
    }

    #[test]
    fn inadmissible_signature_is_stripped_before_dispatch() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        let mut state = test_state();
        state.signatures = SignatureStore::new(pool);
        state
            .signatures
            .save_signature(&llmux_signatures::NewSignatureRecord {
                signature: "sig-a".into(),
                project_id: "anthropic".into(),
                provider: "anthropic".into(),
                endpoint: None,
                account: None,
            })
            .unwrap();

        let body = json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": [{ "type": "thinking", "thinking": "reasoning", "signature": "sig-b" }] },
            ],
        });
        let resolution = Resolution {
            provider: Provider::Anthropic,
            model: "claude-3-5-sonnet".to_string(),
            thinking: true,
        };
        let out = prepare_body(&state, Dialect::AnthropicMessages, &resolution, body);
        let messages = out["messages"].as_array().unwrap();
        let assistant_content = messages[1]["content"].as_array().unwrap();
        assert!(assistant_content.is_empty(), "unsigned thinking is dropped from the wire");
    }
}
