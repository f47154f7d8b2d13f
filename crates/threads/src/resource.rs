// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The thread-resource cleanup registry: locks, open transactions, sockets,
//! and anything else that must be forcibly released if the owning thread
//! exits without releasing them first.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use vellum_value::Sink;

/// An opaque handle a holder registers itself under. Lock primitives use
/// their `vellum_sync::PrimitiveId`; other resource kinds mint their own.
pub type ResourceId = u64;

/// Implemented by anything the registry can forcibly release on thread exit.
/// `cleanup` must push a description of the forced release onto `sink`
/// rather than panicking or silently succeeding.
pub trait ThreadResource: fmt::Debug + Send + Sync {
    fn cleanup(&self, sink: &mut Sink);
}

/// An idempotent set of live resource holders for one thread, visited in
/// reverse registration order on thread exit.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    order: RefCell<Vec<ResourceId>>,
    holders: RefCell<HashMap<ResourceId, Arc<dyn ThreadResource>>>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource` under `id`. A no-op if `id` is already
    /// registered, matching the "registering the same holder twice" rule.
    pub fn register(&self, id: ResourceId, resource: Arc<dyn ThreadResource>) {
        let mut holders = self.holders.borrow_mut();
        if holders.contains_key(&id) {
            return;
        }
        holders.insert(id, resource);
        self.order.borrow_mut().push(id);
    }

    /// Removes `id` from the set, e.g. on an ordinary (non-forced) release.
    pub fn unregister(&self, id: ResourceId) {
        if self.holders.borrow_mut().remove(&id).is_some() {
            self.order.borrow_mut().retain(|existing| *existing != id);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holders.borrow().is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.holders.borrow().len()
    }

    /// Invokes every still-registered holder's `cleanup` exactly once, in
    /// reverse registration order, and empties the set.
    pub fn cleanup_all(&self, sink: &mut Sink) {
        let ids: Vec<_> = self.order.borrow_mut().drain(..).collect();
        let mut holders = self.holders.borrow_mut();
        for id in ids.into_iter().rev() {
            if let Some(holder) = holders.remove(&id) {
                holder.cleanup(sink);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl ThreadResource for Recorder {
        fn cleanup(&self, _sink: &mut Sink) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    #[test]
    fn test_cleanup_runs_in_reverse_registration_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = ResourceRegistry::new();
        registry.register(1, Arc::new(Recorder { name: "first", log: log.clone() }));
        registry.register(2, Arc::new(Recorder { name: "second", log: log.clone() }));
        let mut sink = Sink::new();
        registry.cleanup_all(&mut sink);
        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registering_same_id_twice_is_a_no_op() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = ResourceRegistry::new();
        registry.register(1, Arc::new(Recorder { name: "first", log: log.clone() }));
        registry.register(1, Arc::new(Recorder { name: "replacement", log: log.clone() }));
        assert_eq!(registry.len(), 1);
        let mut sink = Sink::new();
        registry.cleanup_all(&mut sink);
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_unregister_excludes_from_cleanup() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = ResourceRegistry::new();
        registry.register(1, Arc::new(Recorder { name: "first", log: log.clone() }));
        registry.unregister(1);
        let mut sink = Sink::new();
        registry.cleanup_all(&mut sink);
        assert!(log.lock().unwrap().is_empty());
    }
}
