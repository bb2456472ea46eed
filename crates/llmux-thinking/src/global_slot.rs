//! Process-wide "last seen" thinking signature slot (Layer 2 of the
//! recovery fallback chain).
//!
//! This is genuine ambient process state (see the design notes on cyclic /
//! ambient state), but it is held behind an explicit handle rather than a
//! module-level global so tests can construct independent instances.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use llmux_core::ModelFamily;

const EXPIRY: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
struct Slot {
    text: String,
    signature: String,
    family: ModelFamily,
    set_at: Instant,
}

/// A single-slot, process-wide cache of the most recently observed signed
/// thinking block, used when the session cache (Layer 1) misses.
#[derive(Default)]
pub struct GlobalSignatureSlot {
    inner: RwLock<Option<Slot>>,
}

impl GlobalSignatureSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Overwrite the slot.
    pub fn set(&self, text: impl Into<String>, signature: impl Into<String>, family: ModelFamily) {
        let mut guard = self.inner.write().expect("global signature slot poisoned");
        *guard = Some(Slot {
            text: text.into(),
            signature: signature.into(),
            family,
            set_at: Instant::now(),
        });
    }

    /// Read the slot if it holds an unexpired entry for `family`.
    #[must_use]
    pub fn get(&self, family: ModelFamily) -> Option<(String, String)> {
        let guard = self.inner.read().expect("global signature slot poisoned");
        let slot = guard.as_ref()?;
        if slot.family != family || slot.set_at.elapsed() > EXPIRY {
            return None;
        }
        Some((slot.text.clone(), slot.signature.clone()))
    }

    /// Explicitly clear the slot.
    pub fn clear(&self) {
        *self.inner.write().expect("global signature slot poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slot_is_empty() {
        let slot = GlobalSignatureSlot::new();
        assert!(slot.get(ModelFamily::Gemini).is_none());
    }

    #[test]
    fn set_then_get_round_trips_for_matching_family() {
        let slot = GlobalSignatureSlot::new();
        slot.set("text", "sig", ModelFamily::Gemini);
        assert_eq!(
            slot.get(ModelFamily::Gemini),
            Some(("text".to_string(), "sig".to_string()))
        );
    }

    #[test]
    fn mismatched_family_misses() {
        let slot = GlobalSignatureSlot::new();
        slot.set("text", "sig", ModelFamily::Gemini);
        assert!(slot.get(ModelFamily::Claude).is_none());
    }

    #[test]
    fn clear_empties_the_slot() {
        let slot = GlobalSignatureSlot::new();
        slot.set("text", "sig", ModelFamily::Claude);
        slot.clear();
        assert!(slot.get(ModelFamily::Claude).is_none());
    }
}
