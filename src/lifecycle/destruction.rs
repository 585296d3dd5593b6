//! Destruction-callback registry
//!
//! Callbacks run once, in registration order, after the main loop exits and
//! before worker threads are torn down. Each registration returns a token
//! that removes exactly that callback. Removal is idempotent and safe from
//! inside a running callback: `run_all` walks a snapshot of the keys that
//! were live when it started and skips any that have since been removed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use log::debug;

type Callback = Box<dyn FnOnce()>;

#[derive(Default)]
struct Slots {
    next_key: u64,
    callbacks: BTreeMap<u64, Callback>,
    ran: bool,
}

/// Ordered, cancellable list of cleanup actions
#[derive(Clone, Default)]
pub struct DestructionRegistry {
    slots: Rc<RefCell<Slots>>,
}

/// Removes one registered callback
#[derive(Clone)]
pub struct DestructionToken {
    slots: Weak<RefCell<Slots>>,
    key: u64,
}

impl DestructionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback`; the token unregisters it
    pub fn register(&self, callback: impl FnOnce() + 'static) -> DestructionToken {
        let mut slots = self.slots.borrow_mut();
        let key = slots.next_key;
        slots.next_key += 1;
        slots.callbacks.insert(key, Box::new(callback));
        DestructionToken {
            slots: Rc::downgrade(&self.slots),
            key,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_run(&self) -> bool {
        self.slots.borrow().ran
    }

    /// Run every callback registered before this call, in order.
    /// Returns how many ran. Panics if called twice.
    pub fn run_all(&self) -> usize {
        let keys: Vec<u64> = {
            let mut slots = self.slots.borrow_mut();
            assert!(!slots.ran, "destruction callbacks already ran");
            slots.ran = true;
            slots.callbacks.keys().copied().collect()
        };

        let mut ran = 0;
        for key in keys {
            // The borrow ends before the callback runs so it may unregister.
            let callback = self.slots.borrow_mut().callbacks.remove(&key);
            if let Some(callback) = callback {
                callback();
                ran += 1;
            }
        }

        debug!("Ran {} destruction callbacks", ran);
        ran
    }
}

impl fmt::Debug for DestructionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.borrow();
        f.debug_struct("DestructionRegistry")
            .field("pending", &slots.callbacks.len())
            .field("ran", &slots.ran)
            .finish()
    }
}

impl DestructionToken {
    /// Remove the callback; returns whether it was still pending
    pub fn unregister(&self) -> bool {
        match self.slots.upgrade() {
            Some(slots) => slots.borrow_mut().callbacks.remove(&self.key).is_some(),
            None => false,
        }
    }
}

impl fmt::Debug for DestructionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestructionToken").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let make = move |n: u32| {
            let log = Rc::clone(&log_clone);
            Box::new(move || log.borrow_mut().push(n)) as Box<dyn FnOnce()>
        };
        (log, make)
    }

    #[test]
    fn test_runs_in_registration_order() {
        let registry = DestructionRegistry::new();
        let (log, make) = recorder();
        for n in 1..=4 {
            registry.register(make(n));
        }
        assert_eq!(registry.run_all(), 4);
        assert_eq!(*log.borrow(), vec![1, 2, 3, 4]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_token_removes_only_its_callback() {
        let registry = DestructionRegistry::new();
        let (log, make) = recorder();
        registry.register(make(1));
        let token = registry.register(make(2));
        registry.register(make(3));

        assert!(token.unregister());
        assert!(!token.unregister());
        registry.run_all();
        assert_eq!(*log.borrow(), vec![1, 3]);
    }

    #[test]
    fn test_self_unregister_while_running() {
        let registry = DestructionRegistry::new();
        let slot: Rc<RefCell<Option<DestructionToken>>> = Rc::new(RefCell::new(None));
        let hits = Rc::new(Cell::new(0));

        let slot_clone = Rc::clone(&slot);
        let hits_clone = Rc::clone(&hits);
        let token = registry.register(move || {
            hits_clone.set(hits_clone.get() + 1);
            if let Some(token) = slot_clone.borrow().as_ref() {
                assert!(!token.unregister());
            }
        });
        *slot.borrow_mut() = Some(token);

        assert_eq!(registry.run_all(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_registered_during_run_is_skipped() {
        let registry = DestructionRegistry::new();
        let late = Rc::new(Cell::new(false));
        let registry_clone = registry.clone();
        let late_clone = Rc::clone(&late);
        registry.register(move || {
            let flag = Rc::clone(&late_clone);
            registry_clone.register(move || flag.set(true));
        });
        assert_eq!(registry.run_all(), 1);
        assert!(!late.get());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_token_outlives_registry() {
        let registry = DestructionRegistry::new();
        let token = registry.register(|| {});
        drop(registry);
        assert!(!token.unregister());
    }

    #[test]
    #[should_panic(expected = "already ran")]
    fn test_run_twice_panics() {
        let registry = DestructionRegistry::new();
        registry.run_all();
        registry.run_all();
    }
}
