//! Identities for the reactive system.
//!
//! Two kinds of things take part in dependency tracking: observable targets
//! (raw objects and lists, refs, computed cells) and the effects that read
//! them. Each gets a process-unique id when created. Ids are what the
//! dependency graph is keyed by, so the graph never has to own a target.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an observable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for an effect.
///
/// Subscriber sets are keyed by this id, which is how the same effect
/// instance is recognised when it re-tracks a key it already reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}
