//! Dependency Graph Storage
//!
//! [`DepGraph`] owns one [`TargetNode`] per observed target. Tracking adds
//! an edge from a (target, key) pair to an effect; triggering collects the
//! effects behind a set of keys on one target.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::node::{DepKey, TargetNode};
use crate::reactive::effect::WeakEffect;
use crate::reactive::{EffectId, Observable, TargetId};

/// Registry of every subscription in a runtime.
#[derive(Default)]
pub struct DepGraph {
    targets: HashMap<TargetId, TargetNode>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `effect` read `target` under `key`.
    ///
    /// Returns false if the edge already existed.
    pub(crate) fn subscribe<T: Observable + ?Sized>(
        &mut self,
        target: &T,
        key: DepKey,
        effect_id: EffectId,
        effect: WeakEffect,
    ) -> bool {
        self.targets
            .entry(target.target_id())
            .or_insert_with(|| TargetNode::new(target.owner()))
            .subscribe(key, effect_id, effect)
    }

    /// Remove one edge. Empty nodes are dropped.
    pub(crate) fn unsubscribe(&mut self, target_id: TargetId, key: &DepKey, effect_id: EffectId) {
        if let Some(node) = self.targets.get_mut(&target_id) {
            node.unsubscribe(key, effect_id);
            if node.is_empty() {
                self.targets.remove(&target_id);
            }
        }
    }

    /// Effects subscribed to any of `keys` on `target_id`.
    ///
    /// Each effect appears once, in the order it was first found: keys are
    /// visited in the order given, subscribers in subscription order.
    pub(crate) fn subscribers(&self, target_id: TargetId, keys: &[DepKey]) -> Vec<WeakEffect> {
        let Some(node) = self.targets.get(&target_id) else {
            return Vec::new();
        };

        let mut found: IndexMap<EffectId, WeakEffect> = IndexMap::new();
        for key in keys {
            for (id, effect) in node.subscribers(key) {
                found.entry(*id).or_insert_with(|| effect.clone());
            }
        }
        found.into_values().collect()
    }

    /// Drop nodes whose target is gone and subscribers whose effect is gone.
    ///
    /// Returns the number of target nodes removed.
    pub fn collect_garbage(&mut self) -> usize {
        let before = self.targets.len();
        self.targets.retain(|_, node| {
            if !node.is_alive() {
                return false;
            }
            node.prune();
            !node.is_empty()
        });
        before - self.targets.len()
    }

    /// Number of targets with at least one subscriber.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of subscribers recorded against `target_id` under `key`.
    pub fn subscriber_count(&self, target_id: TargetId, key: &DepKey) -> usize {
        self.targets
            .get(&target_id)
            .map_or(0, |node| node.subscriber_count(key))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Key, RawObject};
    use std::rc::Weak;

    #[test]
    fn subscribers_are_deduplicated_across_keys() {
        let mut graph = DepGraph::new();
        let object = RawObject::new();
        let first = EffectId::new();
        let second = EffectId::new();
        let key = Key::from("a");

        graph.subscribe(&object, DepKey::Get(key.clone()), first, Weak::new());
        graph.subscribe(&object, DepKey::Iterate, second, Weak::new());
        graph.subscribe(&object, DepKey::Iterate, first, Weak::new());

        let found = graph.subscribers(object.id(), &[DepKey::Get(key), DepKey::Iterate]);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn unsubscribe_removes_empty_nodes() {
        let mut graph = DepGraph::new();
        let object = RawObject::new();
        let id = EffectId::new();

        graph.subscribe(&object, DepKey::Iterate, id, Weak::new());
        assert_eq!(graph.target_count(), 1);

        graph.unsubscribe(object.id(), &DepKey::Iterate, id);
        assert_eq!(graph.target_count(), 0);
    }

    #[test]
    fn garbage_collection_drops_dead_targets() {
        let mut graph = DepGraph::new();
        let object = RawObject::new();
        graph.subscribe(&object, DepKey::Iterate, EffectId::new(), Weak::new());

        drop(object);
        assert_eq!(graph.collect_garbage(), 1);
        assert_eq!(graph.target_count(), 0);
    }

    #[test]
    fn unknown_target_has_no_subscribers() {
        let graph = DepGraph::new();
        assert!(graph.subscribers(TargetId::new(), &[DepKey::Iterate]).is_empty());
    }
}
