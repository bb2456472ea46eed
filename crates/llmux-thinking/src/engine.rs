//! Strip / inject / turn-separation recovery (spec component C7).

use dashmap::DashMap;
use llmux_core::hash::text_hash;
use llmux_core::part::{Message, Part, Role};
use llmux_core::ModelFamily;
use llmux_signatures::SignatureCache;

use crate::global_slot::GlobalSignatureSlot;

/// Gate for the whole engine: thinking is only stripped/injected/recovered
/// for models where it matters. OpenAI never carries Claude/Gemini-style
/// thinking signatures; Gemini models only do when they're a managed
/// "thinking" variant (a fact the model registry, not this crate, knows).
#[must_use]
pub fn should_cache_signatures(family: ModelFamily, is_managed_gemini_thinking_variant: bool) -> bool {
    match family {
        ModelFamily::Openai => false,
        ModelFamily::Claude => true,
        ModelFamily::Gemini => is_managed_gemini_thinking_variant,
    }
}

/// Remove every [`Part::Thinking`] from every message. Returns the cleaned
/// messages alongside, per message, the text of the last thinking part that
/// was removed (used by [`inject_thinking`]'s Layer 3 lookup).
#[must_use]
pub fn strip_thinking(messages: Vec<Message>) -> (Vec<Message>, Vec<Option<String>>) {
    let mut removed = Vec::with_capacity(messages.len());
    let cleaned = messages
        .into_iter()
        .map(|mut m| {
            let mut last_removed = None;
            m.parts.retain(|p| {
                if let Part::Thinking { text, .. } = p {
                    last_removed = Some(text.clone());
                    false
                } else {
                    true
                }
            });
            removed.push(last_removed);
            m
        })
        .collect();
    (cleaned, removed)
}

/// Context needed to resolve a thinking signature for injection.
pub struct InjectContext<'a> {
    /// The signature session key (see [`crate::session_key`]).
    pub session_key: &'a str,
    /// The target model's family, used to gate the global-slot layer.
    pub family: ModelFamily,
}

/// The 3-layer signature resolution chain backing [`inject_thinking`] and
/// fed by [`cache_signature_from_chunk`] during streaming.
pub struct ThinkingRecoveryEngine {
    last_signed_by_session: DashMap<String, (String, String)>,
    global: GlobalSignatureSlot,
    cache: SignatureCache,
}

impl ThinkingRecoveryEngine {
    /// Construct an engine around a shared [`SignatureCache`].
    #[must_use]
    pub fn new(cache: SignatureCache) -> Self {
        Self {
            last_signed_by_session: DashMap::new(),
            global: GlobalSignatureSlot::new(),
            cache,
        }
    }

    /// Layer 1 — the session-scoped last-seen signed thinking block.
    #[must_use]
    pub fn session_layer(&self, session_key: &str) -> Option<(String, String)> {
        self.last_signed_by_session
            .get(session_key)
            .map(|e| e.value().clone())
    }

    /// Resolve a signature for injection at a given assistant message,
    /// trying, in order: the session layer, the process-global slot, and
    /// (if `removed_text` is `Some`, i.e. this message had thinking before
    /// stripping) the persistent signature cache keyed by that text's hash.
    #[must_use]
    pub fn resolve_for_injection(
        &self,
        ctx: &InjectContext<'_>,
        removed_text: Option<&str>,
    ) -> Option<(String, String)> {
        if let Some(hit) = self.session_layer(ctx.session_key) {
            return Some(hit);
        }
        if let Some(hit) = self.global.get(ctx.family) {
            return Some(hit);
        }
        let text = removed_text?;
        let signature = self.cache.restore(ctx.session_key, &text_hash(text))?;
        Some((text.to_string(), signature))
    }

    /// Record a signature observed on a streaming chunk: accumulate `delta`
    /// into the running thinking-text buffer for this (session, candidate
    /// index), and when `signature` is present and long enough, persist the
    /// `(text_hash, signature)` pair into both the session layer and the
    /// signature cache, and refresh the global slot.
    pub fn cache_signature_from_chunk(
        &self,
        session_key: &str,
        family: ModelFamily,
        text_buffer: &mut String,
        delta: &str,
        signature: Option<&str>,
    ) {
        text_buffer.push_str(delta);
        let Some(signature) = signature else {
            return;
        };
        if signature.len() < 50 {
            return;
        }
        let full_text = text_buffer.clone();
        self.last_signed_by_session
            .insert(session_key.to_string(), (full_text.clone(), signature.to_string()));
        self.global.set(full_text.clone(), signature, family);
        self.cache
            .store(session_key, &text_hash(&full_text), signature, &family.to_string());
    }
}

/// Inject a resolved thinking part at position 0 of every assistant message
/// that either contains a tool use or is the last assistant message in the
/// conversation, provided that message doesn't already carry thinking.
/// Returns the number of messages thinking was injected into.
pub fn inject_thinking(
    messages: &mut [Message],
    removed_texts: &[Option<String>],
    ctx: &InjectContext<'_>,
    engine: &ThinkingRecoveryEngine,
) -> usize {
    let last_assistant_idx = messages
        .iter()
        .rposition(|m| matches!(m.role, Role::Assistant));

    let mut injected = 0;
    for (i, message) in messages.iter_mut().enumerate() {
        if !matches!(message.role, Role::Assistant) {
            continue;
        }
        let is_target = message.has_tool_use() || Some(i) == last_assistant_idx;
        if !is_target || message.has_thinking() {
            continue;
        }

        let removed = removed_texts.get(i).and_then(|o| o.as_deref());
        if let Some((text, signature)) = engine.resolve_for_injection(ctx, removed) {
            message.parts.insert(
                0,
                Part::Thinking {
                    text,
                    signature: Some(signature),
                },
            );
            injected += 1;
        }
    }
    injected
}

/// True iff the conversation ends mid tool-loop and no assistant message
/// since the last non-tool-result user turn carries thinking.
#[must_use]
pub fn needs_turn_separation_recovery(messages: &[Message]) -> bool {
    let in_tool_loop = messages.last().is_some_and(Message::has_tool_result);
    if !in_tool_loop {
        return false;
    }

    let last_turn_start = messages
        .iter()
        .rposition(|m| matches!(m.role, Role::User) && !m.has_tool_result());

    let turn_has_thinking = match last_turn_start {
        Some(idx) => messages[idx + 1..]
            .iter()
            .any(|m| matches!(m.role, Role::Assistant) && m.has_thinking()),
        None => messages
            .iter()
            .any(|m| matches!(m.role, Role::Assistant) && m.has_thinking()),
    };

    !turn_has_thinking
}

/// Append the synthetic turn-boundary messages (Layer 4 recovery) if
/// [`needs_turn_separation_recovery`] holds. No-op otherwise.
pub fn apply_turn_separation_recovery(messages: &mut Vec<Message>) {
    if !needs_turn_separation_recovery(messages) {
        return;
    }

    let trailing_tool_results = messages
        .iter()
        .rev()
        .take_while(|m| m.has_tool_result())
        .count();

    let text = match trailing_tool_results {
        0 => "[Processing previous context.]".to_string(),
        1 => "[Tool execution completed.]".to_string(),
        n => format!("[{n} tool executions completed.]"),
    };

    messages.push(Message::text(Role::Assistant, text));
    messages.push(Message::text(Role::User, "[Continue]"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_use(id: &str) -> Part {
        Part::ToolUse {
            id: id.into(),
            name: "search".into(),
            arguments: json!({}),
            thought_signature: None,
        }
    }

    fn tool_result(id: &str) -> Part {
        Part::ToolResult {
            tool_use_id: id.into(),
            content: llmux_core::part::ToolResultContent::Text("ok".into()),
            is_error: false,
        }
    }

    #[test]
    fn should_cache_signatures_gate() {
        assert!(!should_cache_signatures(ModelFamily::Openai, true));
        assert!(should_cache_signatures(ModelFamily::Claude, false));
        assert!(should_cache_signatures(ModelFamily::Gemini, true));
        assert!(!should_cache_signatures(ModelFamily::Gemini, false));
    }

    #[test]
    fn strip_removes_thinking_parts_but_keeps_others() {
        let messages = vec![Message {
            role: Role::Assistant,
            parts: vec![
                Part::Thinking {
                    text: "reasoning".into(),
                    signature: Some("sig".into()),
                },
                Part::Text { text: "hi".into() },
            ],
        }];
        let (cleaned, removed) = strip_thinking(messages);
        assert_eq!(cleaned[0].parts.len(), 1);
        assert_eq!(removed[0], Some("reasoning".to_string()));
    }

    #[test]
    fn strip_is_idempotent() {
        let messages = vec![Message::text(Role::Assistant, "hi")];
        let (once, _) = strip_thinking(messages.clone());
        let (twice, _) = strip_thinking(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn inject_targets_tool_use_and_last_assistant_message() {
        let cache = SignatureCache::new();
        let engine = ThinkingRecoveryEngine::new(cache);
        engine.cache_signature_from_chunk(
            "sess1",
            ModelFamily::Claude,
            &mut String::new(),
            "reasoning",
            Some(&"x".repeat(60)),
        );

        let mut messages = vec![
            Message::text(Role::User, "hello"),
            Message {
                role: Role::Assistant,
                parts: vec![tool_use("t1")],
            },
            Message {
                role: Role::User,
                parts: vec![tool_result("t1")],
            },
        ];
        let removed_texts = vec![None, None, None];
        let ctx = InjectContext {
            session_key: "sess1",
            family: ModelFamily::Claude,
        };
        let injected = inject_thinking(&mut messages, &removed_texts, &ctx, &engine);
        assert_eq!(injected, 1);
        assert!(messages[1].has_thinking());
        assert!(matches!(messages[1].parts[0], Part::Thinking { .. }));
    }

    #[test]
    fn inject_skips_non_target_assistant_messages() {
        let cache = SignatureCache::new();
        let engine = ThinkingRecoveryEngine::new(cache);
        engine.cache_signature_from_chunk(
            "sess1",
            ModelFamily::Claude,
            &mut String::new(),
            "reasoning",
            Some(&"x".repeat(60)),
        );

        let mut messages = vec![
            Message::text(Role::Assistant, "intermediate, no tool use"),
            Message::text(Role::User, "more"),
            Message::text(Role::Assistant, "final"),
        ];
        let removed_texts = vec![None, None, None];
        let ctx = InjectContext {
            session_key: "sess1",
            family: ModelFamily::Claude,
        };
        let injected = inject_thinking(&mut messages, &removed_texts, &ctx, &engine);
        assert_eq!(injected, 1);
        assert!(!messages[0].has_thinking());
        assert!(messages[2].has_thinking());
    }

    #[test]
    fn turn_separation_recovery_scenario_from_spec() {
        let mut messages = vec![
            Message::text(Role::User, "use tool"),
            Message {
                role: Role::Assistant,
                parts: vec![tool_use("t")],
            },
            Message {
                role: Role::User,
                parts: vec![tool_result("t")],
            },
        ];
        assert!(needs_turn_separation_recovery(&messages));
        apply_turn_separation_recovery(&mut messages);
        assert_eq!(messages.len(), 5);
        assert_eq!(
            messages[3],
            Message::text(Role::Assistant, "[Tool execution completed.]")
        );
        assert_eq!(messages[4], Message::text(Role::User, "[Continue]"));
    }

    #[test]
    fn no_recovery_needed_when_turn_has_thinking() {
        let messages = vec![
            Message::text(Role::User, "use tool"),
            Message {
                role: Role::Assistant,
                parts: vec![
                    Part::Thinking {
                        text: "t".into(),
                        signature: Some("s".into()),
                    },
                    tool_use("t"),
                ],
            },
            Message {
                role: Role::User,
                parts: vec![tool_result("t")],
            },
        ];
        assert!(!needs_turn_separation_recovery(&messages));
    }

    #[test]
    fn no_recovery_when_not_in_tool_loop() {
        let messages = vec![Message::text(Role::User, "hello")];
        assert!(!needs_turn_separation_recovery(&messages));
    }

    #[test]
    fn recovery_message_counts_multiple_trailing_tool_results() {
        let mut messages = vec![
            Message::text(Role::User, "use tools"),
            Message {
                role: Role::Assistant,
                parts: vec![tool_use("a"), tool_use("b")],
            },
            Message {
                role: Role::User,
                parts: vec![tool_result("a")],
            },
            Message {
                role: Role::User,
                parts: vec![tool_result("b")],
            },
        ];
        apply_turn_separation_recovery(&mut messages);
        assert_eq!(
            messages[4],
            Message::text(Role::Assistant, "[2 tool executions completed.]")
        );
    }
}
