//! The per-thread current zone slot.
//!
//! Every thread keeps a stack of entered zones. The top of the stack is the
//! current zone; with an empty stack the root zone is current. Only
//! [`ZoneGuard`] pushes and pops, and it restores the stack on drop, so
//! unwinding out of an `execute` can never leave a stale zone behind.

use std::cell::RefCell;
use std::marker::PhantomData;

use lazy_static::lazy_static;

use super::zone::InteractionZone;

lazy_static! {
    static ref ROOT_ZONE: InteractionZone = InteractionZone::new_root();
}

thread_local! {
    static ZONE_STACK: RefCell<Vec<InteractionZone>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn root() -> InteractionZone {
    ROOT_ZONE.clone()
}

pub(crate) fn current() -> InteractionZone {
    ZONE_STACK
        .with(|stack| stack.borrow().last().cloned())
        .unwrap_or_else(root)
}

/// True while at least one `execute` is running on this thread.
pub(crate) fn in_execute() -> bool {
    ZONE_STACK.with(|stack| !stack.borrow().is_empty())
}

/// Keeps `zone` current until dropped.
pub(crate) struct ZoneGuard {
    depth: usize,
    // The slot is thread-local, the guard must not leave the thread.
    _not_send: PhantomData<*const ()>,
}

impl ZoneGuard {
    pub(crate) fn enter(zone: &InteractionZone) -> Self {
        let depth = ZONE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(zone.clone());
            stack.len() - 1
        });

        Self {
            depth,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ZoneGuard {
    fn drop(&mut self) {
        // Thread-local storage may already be torn down during thread exit.
        let _ = ZONE_STACK.try_with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneOptions;

    #[test]
    fn empty_stack_means_root() {
        assert!(!in_execute());
        assert!(current().ptr_eq(&root()));
    }

    #[test]
    fn guards_nest_and_restore() {
        let a = root().create("a", ZoneOptions::default());
        let b = a.create("b", ZoneOptions::default());

        let outer = ZoneGuard::enter(&a);
        assert!(current().ptr_eq(&a));
        {
            let _inner = ZoneGuard::enter(&b);
            assert!(current().ptr_eq(&b));
        }
        assert!(current().ptr_eq(&a));
        drop(outer);
        assert!(current().ptr_eq(&root()));
    }
}
