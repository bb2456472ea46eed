//! # llmux-thinking
//!
//! Strip / inject / turn-separation recovery for extended-thinking blocks
//! (spec component C7), plus the session/conversation key derivation it and
//! the streaming layer share.

#![deny(unsafe_code)]

pub mod engine;
pub mod global_slot;
pub mod session_key;

pub use engine::{
    InjectContext, ThinkingRecoveryEngine, apply_turn_separation_recovery, inject_thinking,
    needs_turn_separation_recovery, should_cache_signatures, strip_thinking,
};
pub use global_slot::GlobalSignatureSlot;
pub use session_key::{build_signature_session_key, extract_conversation_key};
