//! Change hook registry.
//!
//! Callbacks run serially, in registration order, from the task that
//! performed the sync, and never under a lock. A panicking callback is
//! contained and logged; the next callback still runs.

use lodestar_core::Model;
use lodestar_sync::{Changeset, ModelChange};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

pub type ModelHook = Arc<dyn Fn(&str, &Model) + Send + Sync>;
pub type UpdateHook = Arc<dyn Fn(&ModelChange) + Send + Sync>;

#[derive(Default)]
pub(crate) struct HookRegistry {
    added: Mutex<Vec<ModelHook>>,
    updated: Mutex<Vec<UpdateHook>>,
    removed: Mutex<Vec<ModelHook>>,
}

fn contained(kind: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(hook = kind, "change hook panicked; continuing");
    }
}

impl HookRegistry {
    pub(crate) fn on_added(&self, hook: ModelHook) {
        self.added.lock().expect("hook registry lock").push(hook);
    }

    pub(crate) fn on_updated(&self, hook: UpdateHook) {
        self.updated.lock().expect("hook registry lock").push(hook);
    }

    pub(crate) fn on_removed(&self, hook: ModelHook) {
        self.removed.lock().expect("hook registry lock").push(hook);
    }

    /// Fire all hooks for an applied changeset. The registration lists are
    /// snapshotted under the lock and invoked outside it.
    pub(crate) fn fire(&self, changeset: &Changeset) {
        let added: Vec<ModelHook> = self.added.lock().expect("hook registry lock").clone();
        let updated: Vec<UpdateHook> = self.updated.lock().expect("hook registry lock").clone();
        let removed: Vec<ModelHook> = self.removed.lock().expect("hook registry lock").clone();

        for entry in &changeset.models_added {
            for hook in &added {
                contained("added", || hook(&entry.provider_id, &entry.model));
            }
        }
        for change in &changeset.models_updated {
            for hook in &updated {
                contained("updated", || hook(change));
            }
        }
        for entry in &changeset.models_removed {
            for hook in &removed {
                contained("removed", || hook(&entry.provider_id, &entry.model));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_sync::ProviderModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn changeset_with_one_added() -> Changeset {
        Changeset {
            models_added: vec![ProviderModel {
                provider_id: "p1".to_string(),
                model: Model::new("m"),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn hooks_fire_in_registration_order() {
        let registry = HookRegistry::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second"] {
            let order = Arc::clone(&order);
            registry.on_added(Arc::new(move |_, _| {
                order.lock().unwrap().push(label);
            }));
        }
        registry.fire(&changeset_with_one_added());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn panicking_hook_does_not_stop_the_chain() {
        let registry = HookRegistry::default();
        registry.on_added(Arc::new(|_, _| panic!("boom")));
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            registry.on_added(Arc::new(move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        registry.fire(&changeset_with_one_added());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hooks_receive_value_copies() {
        let registry = HookRegistry::default();
        registry.on_added(Arc::new(|provider_id, model| {
            assert_eq!(provider_id, "p1");
            assert_eq!(model.id, "m");
        }));
        registry.fire(&changeset_with_one_added());
    }
}
