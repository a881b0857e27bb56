//! Context Controller
//!
//! Two reentrant execution modes, keyed by collection:
//!
//! - **skip persistence**: rank mutations change the record in memory but do
//!   not run lifecycle hooks or save. Reference counted; active while the
//!   count is above zero.
//! - **avoid collisions**: a stack of boolean overrides on top of the
//!   collection's configured default.
//!
//! State lives in a tokio task-local. Every scope runs its body with a derived
//! copy of the enclosing modes, so leaving a scope restores the previous state
//! on every exit path: normal return, `?`, panic or cancellation. Spawned
//! tasks start with no modes active.

use crate::domain::value_objects::CollectionId;
use std::collections::HashMap;
use std::future::Future;

tokio::task_local! {
    static MODES: ExecutionModes;
}

/// Snapshot of the execution modes of one logical execution context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionModes {
    skip_persistence: HashMap<CollectionId, usize>,
    avoid_collisions: HashMap<CollectionId, Vec<bool>>,
}

impl ExecutionModes {
    /// Modes of the current task; empty outside any scope.
    pub fn current() -> Self {
        MODES.try_with(Clone::clone).unwrap_or_default()
    }

    pub fn skips_persistence(&self, collection: &CollectionId) -> bool {
        self.skip_depth(collection) > 0
    }

    /// Number of active skip-persistence scopes for `collection`.
    pub fn skip_depth(&self, collection: &CollectionId) -> usize {
        self.skip_persistence.get(collection).copied().unwrap_or(0)
    }

    /// Innermost override for `collection`, else `default`.
    pub fn avoids_collisions(&self, collection: &CollectionId, default: bool) -> bool {
        self.avoid_collisions
            .get(collection)
            .and_then(|stack| stack.last().copied())
            .unwrap_or(default)
    }

    pub fn enter_skip_persistence(&mut self, collection: CollectionId) {
        *self.skip_persistence.entry(collection).or_insert(0) += 1;
    }

    pub fn exit_skip_persistence(&mut self, collection: &CollectionId) {
        if let Some(count) = self.skip_persistence.get_mut(collection) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.skip_persistence.remove(collection);
            }
        }
    }

    pub fn push_avoid_collisions(&mut self, collection: CollectionId, enabled: bool) {
        self.avoid_collisions.entry(collection).or_default().push(enabled);
    }

    pub fn pop_avoid_collisions(&mut self, collection: &CollectionId) {
        if let Some(stack) = self.avoid_collisions.get_mut(collection) {
            stack.pop();
            if stack.is_empty() {
                self.avoid_collisions.remove(collection);
            }
        }
    }

    fn with_skipped(mut self, collections: &[CollectionId]) -> Self {
        for collection in collections {
            self.enter_skip_persistence(collection.clone());
        }
        self
    }

    fn with_override(mut self, collection: &CollectionId, enabled: bool) -> Self {
        self.push_avoid_collisions(collection.clone(), enabled);
        self
    }
}

/// True when skip-persistence is active for `collection` in this task.
pub fn skips_persistence(collection: &CollectionId) -> bool {
    MODES
        .try_with(|modes| modes.skips_persistence(collection))
        .unwrap_or(false)
}

/// Effective collision avoidance for `collection` in this task.
pub fn avoids_collisions(collection: &CollectionId, default: bool) -> bool {
    MODES
        .try_with(|modes| modes.avoids_collisions(collection, default))
        .unwrap_or(default)
}

/// Run `future` with skip-persistence active for every listed collection.
pub async fn with_skip_persistence<F>(collections: &[CollectionId], future: F) -> F::Output
where
    F: Future,
{
    let modes = ExecutionModes::current().with_skipped(collections);
    MODES.scope(modes, future).await
}

/// Run `future` with collision avoidance forced on or off for `collection`.
pub async fn with_avoid_collisions<F>(collection: &CollectionId, enabled: bool, future: F) -> F::Output
where
    F: Future,
{
    let modes = ExecutionModes::current().with_override(collection, enabled);
    MODES.scope(modes, future).await
}

/// Synchronous form of [`with_skip_persistence`].
pub fn with_skip_persistence_sync<R>(collections: &[CollectionId], body: impl FnOnce() -> R) -> R {
    let modes = ExecutionModes::current().with_skipped(collections);
    MODES.sync_scope(modes, body)
}

/// Synchronous form of [`with_avoid_collisions`].
pub fn with_avoid_collisions_sync<R>(
    collection: &CollectionId,
    enabled: bool,
    body: impl FnOnce() -> R,
) -> R {
    let modes = ExecutionModes::current().with_override(collection, enabled);
    MODES.sync_scope(modes, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn todo_items() -> CollectionId {
        CollectionId::new("todo_items")
    }

    fn todo_lists() -> CollectionId {
        CollectionId::new("todo_lists")
    }

    #[test]
    fn test_counter_semantics() {
        let mut modes = ExecutionModes::default();
        modes.enter_skip_persistence(todo_items());
        modes.enter_skip_persistence(todo_items());
        modes.exit_skip_persistence(&todo_items());
        assert!(modes.skips_persistence(&todo_items()));

        modes.exit_skip_persistence(&todo_items());
        assert!(!modes.skips_persistence(&todo_items()));
        assert_eq!(modes, ExecutionModes::default());
    }

    #[test]
    fn test_override_stack_semantics() {
        let mut modes = ExecutionModes::default();
        assert!(modes.avoids_collisions(&todo_items(), true));

        modes.push_avoid_collisions(todo_items(), false);
        modes.push_avoid_collisions(todo_items(), true);
        assert!(modes.avoids_collisions(&todo_items(), false));

        modes.pop_avoid_collisions(&todo_items());
        assert!(!modes.avoids_collisions(&todo_items(), true));
        modes.pop_avoid_collisions(&todo_items());
        assert_eq!(modes, ExecutionModes::default());
    }

    #[tokio::test]
    async fn test_nested_scopes_restore_outer_state() {
        assert!(!skips_persistence(&todo_items()));

        with_skip_persistence(&[todo_items()], async {
            with_skip_persistence(&[todo_items()], async {
                assert_eq!(ExecutionModes::current().skip_depth(&todo_items()), 2);
            })
            .await;
            assert_eq!(ExecutionModes::current().skip_depth(&todo_items()), 1);
        })
        .await;

        assert!(!skips_persistence(&todo_items()));
    }

    #[tokio::test]
    async fn test_error_exit_restores_state() {
        let result: Result<(), &str> = with_avoid_collisions(&todo_items(), false, async {
            assert!(!avoids_collisions(&todo_items(), true));
            Err("boom")
        })
        .await;

        assert!(result.is_err());
        assert!(avoids_collisions(&todo_items(), true));
    }

    #[tokio::test]
    async fn test_modes_are_keyed_by_collection() {
        with_avoid_collisions(&todo_lists(), true, async {
            with_skip_persistence(&[todo_items()], async {
                assert!(skips_persistence(&todo_items()));
                assert!(!skips_persistence(&todo_lists()));
                assert!(avoids_collisions(&todo_lists(), false));
            })
            .await;
            assert!(avoids_collisions(&todo_lists(), false));
        })
        .await;
    }

    #[tokio::test]
    async fn test_spawned_tasks_do_not_inherit_modes() {
        with_skip_persistence(&[todo_items()], async {
            let inherited = tokio::spawn(async { skips_persistence(&todo_items()) })
                .await
                .unwrap();
            assert!(!inherited);
            assert!(skips_persistence(&todo_items()));
        })
        .await;
    }

    #[test]
    fn test_sync_scope_restores_after_panic() {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            with_skip_persistence_sync(&[todo_items()], || {
                assert!(skips_persistence(&todo_items()));
                panic!("inner failure");
            })
        }));

        assert!(outcome.is_err());
        assert!(!skips_persistence(&todo_items()));
    }

    #[test]
    fn test_sync_override_scope() {
        let seen = with_avoid_collisions_sync(&todo_items(), false, || {
            avoids_collisions(&todo_items(), true)
        });
        assert!(!seen);
        assert!(avoids_collisions(&todo_items(), true));
    }
}
