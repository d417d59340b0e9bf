//! Path Request Registry (§4.10).
//!
//! Correlates an outstanding pathfinder `PathRequestId` to the per-agent
//! task state that is waiting on it. O(1) lookups, entries added by
//! `GetWalkingPath` on submission and removed either by the world's
//! completion callback or by task teardown — mirroring the teacher's
//! `PathfindingQueue` resource (a `HashMap`-backed `Resource`), minus the
//! priority tiers the core's Non-goals explicitly disclaim.

use bevy::prelude::*;
use std::collections::HashMap;

use crate::ids::{AgentId, PathRequestId, TaskInstanceId};

/// Which per-agent task state a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOwner {
    pub task: TaskInstanceId,
    pub agent: AgentId,
}

/// Global `requestId -> per-agent task state` correlation map (§4.10, §3
/// invariant 6: a request id appears here iff the owning per-agent state is
/// still `active` and awaiting a result).
#[derive(Resource, Default)]
pub struct PathRequestRegistry {
    owners: HashMap<PathRequestId, RequestOwner>,
}

impl PathRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, request: PathRequestId, owner: RequestOwner) {
        self.owners.insert(request, owner);
    }

    /// Remove and return the owner of a completed/cancelled request. A
    /// callback with no entry is safe to ignore (raced with teardown, §4.10).
    pub fn take(&mut self, request: PathRequestId) -> Option<RequestOwner> {
        self.owners.remove(&request)
    }

    pub fn contains(&self, request: PathRequestId) -> bool {
        self.owners.contains_key(&request)
    }

    /// Remove every request owned by `task` (teardown, §4.4, §5 cancellation
    /// semantics). After this, late callbacks for that branch are no-ops
    /// (§8 property 7).
    pub fn remove_task(&mut self, task: TaskInstanceId) {
        self.owners.retain(|_, owner| owner.task != task);
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(task: u64, agent: u32) -> RequestOwner {
        RequestOwner {
            task: TaskInstanceId::new(task),
            agent: AgentId::new(agent),
        }
    }

    #[test]
    fn take_removes_entry() {
        let mut registry = PathRequestRegistry::new();
        let id = PathRequestId::new(1);
        registry.register(id, owner(1, 1));
        assert!(registry.contains(id));
        assert_eq!(registry.take(id), Some(owner(1, 1)));
        assert!(!registry.contains(id));
    }

    #[test]
    fn take_on_unknown_request_is_none_not_panic() {
        let mut registry = PathRequestRegistry::new();
        assert_eq!(registry.take(PathRequestId::new(42)), None);
    }

    #[test]
    fn remove_task_tears_down_only_that_tasks_requests() {
        let mut registry = PathRequestRegistry::new();
        let a = PathRequestId::new(1);
        let b = PathRequestId::new(2);
        registry.register(a, owner(1, 1));
        registry.register(b, owner(2, 1));

        registry.remove_task(TaskInstanceId::new(1));

        assert!(!registry.contains(a));
        assert!(registry.contains(b));
    }

    #[test]
    fn no_callback_after_teardown_is_a_no_op() {
        // §8 property 7.
        let mut registry = PathRequestRegistry::new();
        let id = PathRequestId::new(1);
        registry.register(id, owner(1, 1));
        registry.remove_task(TaskInstanceId::new(1));
        assert_eq!(registry.take(id), None);
    }
}
