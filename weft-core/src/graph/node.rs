//! Graph Nodes
//!
//! This module defines the per-target node that lives in the dependency
//! graph, and the keys its subscriber sets are bucketed by.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Weak;

use indexmap::IndexMap;

use crate::reactive::effect::WeakEffect;
use crate::reactive::{EffectId, Key};

/// How a target was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A value read of one key.
    Get(Key),
    /// An existence check of one key.
    Has(Key),
    /// An enumeration of keys, or a length read.
    Iterate,
}

impl DepKey {
    /// The key single-value cells (refs, computed values) track under.
    pub fn value() -> Self {
        DepKey::Get(Key::Prop("value".to_string()))
    }
}

/// The subscriptions recorded against one target.
pub(crate) struct TargetNode {
    /// Weak handle to the target; never keeps it alive.
    owner: Weak<dyn Any>,

    /// Subscribers per dependency key, in subscription order.
    deps: HashMap<DepKey, IndexMap<EffectId, WeakEffect>>,
}

impl TargetNode {
    pub fn new(owner: Weak<dyn Any>) -> Self {
        Self {
            owner,
            deps: HashMap::new(),
        }
    }

    /// Whether the target this node describes still exists.
    pub fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    /// Add a subscriber. Returns false if it was already subscribed.
    pub fn subscribe(&mut self, key: DepKey, effect_id: EffectId, effect: WeakEffect) -> bool {
        let subscribers = self.deps.entry(key).or_default();
        if subscribers.contains_key(&effect_id) {
            return false;
        }
        subscribers.insert(effect_id, effect);
        true
    }

    /// Remove a subscriber from one key.
    pub fn unsubscribe(&mut self, key: &DepKey, effect_id: EffectId) {
        if let Some(subscribers) = self.deps.get_mut(key) {
            subscribers.shift_remove(&effect_id);
            if subscribers.is_empty() {
                self.deps.remove(key);
            }
        }
    }

    /// Subscribers of one key, in subscription order.
    pub fn subscribers(&self, key: &DepKey) -> impl Iterator<Item = (&EffectId, &WeakEffect)> {
        self.deps.get(key).into_iter().flat_map(|subscribers| subscribers.iter())
    }

    pub fn subscriber_count(&self, key: &DepKey) -> usize {
        self.deps.get(key).map_or(0, IndexMap::len)
    }

    /// Drop subscribers whose effect no longer exists. Returns how many
    /// were removed.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        self.deps.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|_, effect| effect.strong_count() > 0);
            removed += before - subscribers.len();
            !subscribers.is_empty()
        });
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}
