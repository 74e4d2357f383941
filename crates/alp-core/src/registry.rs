//! # Binding Registry
//!
//! Maps each canonical path to the set of instances bound to it, and fans
//! notifications out to them.
//!
//! Sets are keyed by [`InstanceId`], so registering twice is a no-op, and an
//! empty set is removed as soon as its last instance leaves. `notify` copies
//! the set before delivering, so a handler that rebinds (or unmounts) itself
//! or another instance does not disturb the delivery in progress.

use crate::lifecycle::Instance;
use crate::{InstanceId, Occasion, lock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type InstanceSet = BTreeMap<InstanceId, Arc<Instance>>;

/// Canonical path -> bound instances, plus instances observing every path.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    paths: Mutex<BTreeMap<String, InstanceSet>>,
    observers: Mutex<InstanceSet>,
}

impl BindingRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `instance` to a canonical path. Idempotent.
    pub fn register(&self, path: &str, instance: Arc<Instance>) {
        lock(&self.paths)
            .entry(path.to_string())
            .or_default()
            .insert(instance.id(), instance);
    }

    /// Remove the binding; returns whether it existed.
    pub fn unregister(&self, path: &str, id: InstanceId) -> bool {
        let mut paths = lock(&self.paths);
        let Some(set) = paths.get_mut(path) else {
            return false;
        };
        let removed = set.remove(&id).is_some();
        if set.is_empty() {
            paths.remove(path);
        }
        removed
    }

    /// Instances bound to the path, ordered by id.
    #[must_use]
    pub fn instances(&self, path: &str) -> Vec<Arc<Instance>> {
        lock(&self.paths)
            .get(path)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any instance is bound to the path.
    #[must_use]
    pub fn is_bound(&self, path: &str) -> bool {
        lock(&self.paths).contains_key(path)
    }

    /// Every path with at least one binding, sorted.
    #[must_use]
    pub fn bound_paths(&self) -> Vec<String> {
        lock(&self.paths).keys().cloned().collect()
    }

    /// Total number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.paths).values().map(BTreeMap::len).sum()
    }

    /// Whether no instance is bound anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.paths).is_empty()
    }

    /// Ping every instance bound to the path, one at a time.
    ///
    /// Returns how many instances were pinged. A path with no bindings is a no-op.
    pub async fn notify(&self, path: &str, payload: Option<&Value>, occasion: Occasion) -> usize {
        let targets = self.instances(path);
        for instance in &targets {
            instance.ping(occasion, payload).await;
        }
        targets.len()
    }

    /// Receive every notification that `Records` sends to observers.
    pub fn observe(&self, instance: Arc<Instance>) {
        lock(&self.observers).insert(instance.id(), instance);
    }

    /// Stop observing; returns whether the instance was observing.
    pub fn unobserve(&self, id: InstanceId) -> bool {
        lock(&self.observers).remove(&id).is_some()
    }

    /// Ping every observer, one at a time.
    pub async fn notify_observers(&self, occasion: Occasion, payload: &Value) -> usize {
        let targets: Vec<Arc<Instance>> = lock(&self.observers).values().cloned().collect();
        for instance in &targets {
            instance.ping(occasion, Some(payload)).await;
        }
        targets.len()
    }
}
