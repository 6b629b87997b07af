//! Context Stacks
//!
//! A context stack records what is currently executing: the effect whose
//! reads should be tracked, or the component instance whose `setup` is
//! running.
//!
//! # Implementation
//!
//! Entering a context pushes an entry and hands back a guard. Dropping the
//! guard pops the entry, so the previous context is restored when the
//! computation finishes, returns early, or panics.
//!
//! Because this is a stack and not a single slot, nested computations (an
//! effect that reads a computed value, a component that mounts a child)
//! hand tracking back to the outer computation when they finish instead of
//! clearing it.

use std::cell::RefCell;

/// A stack of active contexts owned by one runtime.
pub(crate) struct ContextStack<T> {
    entries: RefCell<Vec<T>>,
}

/// Guard that pops the context when dropped.
pub(crate) struct ContextGuard<'a, T> {
    stack: &'a ContextStack<T>,
    depth: usize,
}

impl<T: Clone> ContextStack<T> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Push `entry` as the current context until the guard is dropped.
    pub fn enter(&self, entry: T) -> ContextGuard<'_, T> {
        let mut entries = self.entries.borrow_mut();
        entries.push(entry);
        ContextGuard {
            stack: self,
            depth: entries.len(),
        }
    }

    /// The innermost active context, if any.
    pub fn current(&self) -> Option<T> {
        self.entries.borrow().last().cloned()
    }

    /// Check if there is an active context.
    pub fn is_active(&self) -> bool {
        !self.entries.borrow().is_empty()
    }

    pub fn depth(&self) -> usize {
        self.entries.borrow().len()
    }
}

impl<T> Drop for ContextGuard<'_, T> {
    fn drop(&mut self) {
        let mut entries = self.stack.entries.borrow_mut();

        // Guards are dropped in reverse order of creation.
        debug_assert_eq!(
            entries.len(),
            self.depth,
            "context stack mismatch: expected depth {}, found {}",
            self.depth,
            entries.len()
        );
        entries.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_current_entry() {
        let stack = ContextStack::new();

        assert!(!stack.is_active());
        assert!(stack.current().is_none());

        {
            let _ctx = stack.enter(1);
            assert!(stack.is_active());
            assert_eq!(stack.current(), Some(1));
        }

        assert!(!stack.is_active());
        assert!(stack.current().is_none());
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let stack = ContextStack::new();

        {
            let _outer = stack.enter("outer");
            assert_eq!(stack.current(), Some("outer"));

            {
                let _inner = stack.enter("inner");
                assert_eq!(stack.current(), Some("inner"));
                assert_eq!(stack.depth(), 2);
            }

            assert_eq!(stack.current(), Some("outer"));
        }

        assert!(stack.current().is_none());
    }

    #[test]
    fn guard_pops_on_panic() {
        let stack = ContextStack::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = stack.enter(7);
            panic!("computation failed");
        }));

        assert!(result.is_err());
        assert!(!stack.is_active());
    }
}
