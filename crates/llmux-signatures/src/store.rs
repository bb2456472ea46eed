//! Persistent project-scoped signature registry and the signature
//! admissibility check run against an inbound conversation (spec component
//! C6).

use llmux_core::part::{Message, Part};

use crate::errors::Result;
use crate::sqlite::{ConnectionPool, SignatureRecord, SignatureStoreRepo};

/// A signature record to persist, as captured from an upstream stream.
#[derive(Clone, Debug)]
pub struct NewSignatureRecord {
    /// The signature string.
    pub signature: String,
    /// The project it is admissible for.
    pub project_id: String,
    /// The provider that issued it.
    pub provider: String,
    /// The endpoint it was issued against.
    pub endpoint: Option<String>,
    /// The account it was issued under.
    pub account: Option<String>,
}

/// Persistent, project-scoped signature store. Cheaply cloneable (wraps a
/// pooled connection handle).
#[derive(Clone)]
pub struct SignatureStore {
    pool: ConnectionPool,
}

impl SignatureStore {
    /// Wrap an already-migrated connection pool.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Persist a signature record.
    pub fn save_signature(&self, record: &NewSignatureRecord) -> Result<()> {
        let conn = self.pool.get()?;
        SignatureStoreRepo::save(
            &conn,
            &record.signature,
            &record.project_id,
            &record.provider,
            record.endpoint.as_deref(),
            record.account.as_deref(),
        )
    }

    /// Fetch a record by signature string.
    pub fn get_record(&self, signature: &str) -> Result<Option<SignatureRecord>> {
        let conn = self.pool.get()?;
        SignatureStoreRepo::get(&conn, signature)
    }

    /// True iff `signature` is recorded as admissible for `project_id`.
    pub fn is_valid_for_project(&self, signature: &str, project_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        SignatureStoreRepo::is_valid_for_project(&conn, signature, project_id)
    }
}

/// Outcome of [`validate_and_strip_signatures`].
#[derive(Debug, Default)]
pub struct StripOutcome {
    /// The conversation with inadmissible signatures removed.
    pub messages: Vec<Message>,
    /// How many signature fields were stripped.
    pub stripped_count: usize,
}

/// Deep-walk `messages`, stripping the `signature` field from any
/// [`Part::Thinking`] or [`Part::ToolUse`] whose signature is not admissible
/// for `target_project_id`, per [`SignatureStore::is_valid_for_project`].
///
/// Text/name/arguments are retained; only the signature field is removed.
/// A `Part::Thinking` whose text becomes empty once its signature is
/// removed is NOT dropped — only parts that have no content fields left at
/// all would be, and `Thinking`/`ToolUse` always retain their other fields.
///
/// # Errors
///
/// Propagates any error from the underlying store lookup.
pub fn validate_and_strip_signatures(
    messages: Vec<Message>,
    target_project_id: &str,
    store: &SignatureStore,
) -> Result<StripOutcome> {
    let mut stripped_count = 0;
    let mut out = Vec::with_capacity(messages.len());

    for mut message in messages {
        for part in &mut message.parts {
            match part {
                Part::Thinking {
                    signature: Some(sig),
                    ..
                } => {
                    if !store.is_valid_for_project(sig, target_project_id)? {
                        *part = Part::Thinking {
                            text: thinking_text(part),
                            signature: None,
                        };
                        stripped_count += 1;
                    }
                }
                Part::ToolUse {
                    thought_signature: Some(sig),
                    ..
                } => {
                    if !store.is_valid_for_project(sig, target_project_id)? {
                        if let Part::ToolUse {
                            thought_signature, ..
                        } = part
                        {
                            *thought_signature = None;
                        }
                        stripped_count += 1;
                    }
                }
                _ => {}
            }
        }
        out.push(message);
    }

    Ok(StripOutcome {
        messages: out,
        stripped_count,
    })
}

fn thinking_text(part: &Part) -> String {
    match part {
        Part::Thinking { text, .. } => text.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::{ConnectionConfig, new_in_memory, run_migrations};
    use llmux_core::part::Role;

    fn store() -> SignatureStore {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        SignatureStore::new(pool)
    }

    #[test]
    fn mismatched_project_strips_signature_but_keeps_text() {
        let store = store();
        store
            .save_signature(&NewSignatureRecord {
                signature: "S1".into(),
                project_id: "A".into(),
                provider: "antigravity".into(),
                endpoint: None,
                account: None,
            })
            .unwrap();

        let messages = vec![Message {
            role: Role::Assistant,
            parts: vec![Part::Thinking {
                text: "T".into(),
                signature: Some("S1".into()),
            }],
        }];

        let outcome = validate_and_strip_signatures(messages, "B", &store).unwrap();
        assert_eq!(outcome.stripped_count, 1);
        assert_eq!(
            outcome.messages[0].parts[0],
            Part::Thinking {
                text: "T".into(),
                signature: None,
            }
        );
    }

    #[test]
    fn matching_project_keeps_signature() {
        let store = store();
        store
            .save_signature(&NewSignatureRecord {
                signature: "S1".into(),
                project_id: "A".into(),
                provider: "antigravity".into(),
                endpoint: None,
                account: None,
            })
            .unwrap();

        let messages = vec![Message {
            role: Role::Assistant,
            parts: vec![Part::Thinking {
                text: "T".into(),
                signature: Some("S1".into()),
            }],
        }];

        let outcome = validate_and_strip_signatures(messages, "A", &store).unwrap();
        assert_eq!(outcome.stripped_count, 0);
        assert_eq!(
            outcome.messages[0].parts[0],
            Part::Thinking {
                text: "T".into(),
                signature: Some("S1".into()),
            }
        );
    }

    #[test]
    fn unsigned_parts_are_left_untouched() {
        let store = store();
        let messages = vec![Message::text(Role::User, "hi")];
        let outcome = validate_and_strip_signatures(messages, "A", &store).unwrap();
        assert_eq!(outcome.stripped_count, 0);
    }
}
