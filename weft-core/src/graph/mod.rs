//! Dependency Graph
//!
//! This module records which effects read which parts of which observable
//! targets.
//!
//! # Overview
//!
//! The graph is a two-level mapping:
//!
//! - target id → per-target node
//! - per-target node: dependency key → ordered set of subscribed effects
//!
//! A dependency key names *how* a target was read: a value read of one key,
//! an existence check of one key, or an enumeration of all keys. Writes
//! trigger the buckets they can affect, so an existence check is not
//! re-run when only a value changes.
//!
//! # Ownership
//!
//! The graph never owns what it tracks:
//!
//! 1. Each target node keeps only a weak handle to its target. Once the
//!    target is dropped the node is dead and is removed by
//!    [`DepGraph::collect_garbage`].
//!
//! 2. Subscriber sets hold effects weakly. An effect stays subscribed for
//!    as long as something holds a handle to it.
//!
//! 3. Each effect remembers the (target, key) pairs it subscribed to and
//!    removes itself from all of them before it re-runs, so conditional
//!    reads do not leave stale subscriptions behind.

mod deps;
mod node;

pub use deps::DepGraph;
pub use node::DepKey;
