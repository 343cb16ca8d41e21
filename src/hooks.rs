// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Component lifecycle hooks: `onAdd`/`onRemove`/`onSet`.
//!
//! The teacher has no equivalent of this — its `World` exposes no
//! synchronous callback surface on structural change, since systems poll
//! via queries instead. This module is grounded in the teacher's
//! `ComponentRegistry`/`EventBus` registration idiom (one slot per key,
//! `FxHashMap`-backed) applied to the `spec.md` §4.11 hook contract.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::component::Value;
use crate::entity::Entity;
use crate::error::{EcsError, Result};

/// Field-name snapshot of a component's data at the moment a hook fires.
pub type Snapshot = FxHashMap<String, Value>;

pub type AddHook = Box<dyn FnMut(Entity, &Snapshot) + Send>;
pub type RemoveHook = Box<dyn FnMut(Entity, &Snapshot) + Send>;
/// Receives the field values before and after the write.
pub type SetHook = Box<dyn FnMut(Entity, &Snapshot, &Snapshot) + Send>;

#[derive(Default)]
struct HookSet {
    on_add: Option<AddHook>,
    on_remove: Option<RemoveHook>,
    on_set: Option<SetHook>,
}

/// At most one hook of each kind per component. Hooks run synchronously on
/// the calling thread and are globally suppressible; a re-entrancy guard
/// stops a hook from retriggering itself for the same entity (`spec.md`
/// §4.11 forbids a hook despawning the entity it was invoked for).
#[derive(Default)]
pub struct HookRegistry {
    hooks: FxHashMap<usize, HookSet>,
    enabled: bool,
    active: FxHashSet<Entity>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            hooks: FxHashMap::default(),
            enabled: true,
            active: FxHashSet::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn on_add(
        &mut self,
        component: usize,
        replace: bool,
        handler: impl FnMut(Entity, &Snapshot) + Send + 'static,
        component_name: &str,
    ) -> Result<()> {
        let set = self.hooks.entry(component).or_default();
        if set.on_add.is_some() && !replace {
            return Err(EcsError::DuplicateHooks(component_name.to_string()));
        }
        set.on_add = Some(Box::new(handler));
        Ok(())
    }

    pub fn on_remove(
        &mut self,
        component: usize,
        replace: bool,
        handler: impl FnMut(Entity, &Snapshot) + Send + 'static,
        component_name: &str,
    ) -> Result<()> {
        let set = self.hooks.entry(component).or_default();
        if set.on_remove.is_some() && !replace {
            return Err(EcsError::DuplicateHooks(component_name.to_string()));
        }
        set.on_remove = Some(Box::new(handler));
        Ok(())
    }

    pub fn on_set(
        &mut self,
        component: usize,
        replace: bool,
        handler: impl FnMut(Entity, &Snapshot, &Snapshot) + Send + 'static,
        component_name: &str,
    ) -> Result<()> {
        let set = self.hooks.entry(component).or_default();
        if set.on_set.is_some() && !replace {
            return Err(EcsError::DuplicateHooks(component_name.to_string()));
        }
        set.on_set = Some(Box::new(handler));
        Ok(())
    }

    /// Fire the `onAdd` hook, after the component's initial data is in
    /// place. No-op if disabled, unregistered, or already firing for this
    /// entity.
    pub fn fire_add(&mut self, component: usize, entity: Entity, data: &Snapshot) {
        if !self.enabled || self.active.contains(&entity) {
            return;
        }
        let Some(set) = self.hooks.get_mut(&component) else {
            return;
        };
        let Some(hook) = set.on_add.as_mut() else {
            return;
        };
        self.active.insert(entity);
        hook(entity, data);
        self.active.remove(&entity);
    }

    /// Fire the `onRemove` hook, before the component's data is freed.
    /// `data` is the final snapshot of the component being removed.
    pub fn fire_remove(&mut self, component: usize, entity: Entity, data: &Snapshot) {
        if !self.enabled || self.active.contains(&entity) {
            return;
        }
        let Some(set) = self.hooks.get_mut(&component) else {
            return;
        };
        let Some(hook) = set.on_remove.as_mut() else {
            return;
        };
        self.active.insert(entity);
        hook(entity, data);
        self.active.remove(&entity);
    }

    /// Fire the `onSet` hook, after a write has been applied.
    pub fn fire_set(&mut self, component: usize, entity: Entity, prev: &Snapshot, next: &Snapshot) {
        if !self.enabled || self.active.contains(&entity) {
            return;
        }
        let Some(set) = self.hooks.get_mut(&component) else {
            return;
        };
        let Some(hook) = set.on_set.as_mut() else {
            return;
        };
        self.active.insert(entity);
        hook(entity, prev, next);
        self.active.remove(&entity);
    }

    /// Run `f` with all hook dispatch suppressed, restoring the previous
    /// enabled state afterward (so nested scopes compose).
    pub fn with_hooks_disabled<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.enabled;
        self.enabled = false;
        let result = f(self);
        self.enabled = previous;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn snapshot(pairs: &[(&str, Value)]) -> Snapshot {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn duplicate_registration_fails_without_replace() {
        let mut hooks = HookRegistry::new();
        hooks.on_add(0, false, |_, _| {}, "Health").unwrap();
        assert!(matches!(
            hooks.on_add(0, false, |_, _| {}, "Health"),
            Err(EcsError::DuplicateHooks(_))
        ));
        assert!(hooks.on_add(0, true, |_, _| {}, "Health").is_ok());
    }

    #[test]
    fn on_add_fires_with_snapshot() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = HookRegistry::new();
        let l = log.clone();
        hooks
            .on_add(
                0,
                false,
                move |e, data| {
                    l.lock().unwrap().push((e, data.get("hp").copied()));
                },
                "Health",
            )
            .unwrap();

        let e = Entity::from_raw(1, 0);
        hooks.fire_add(0, e, &snapshot(&[("hp", Value::I32(10))]));
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(log.lock().unwrap()[0], (e, Some(Value::I32(10))));
    }

    #[test]
    fn disabled_scope_suppresses_all_hooks() {
        let fired = Arc::new(Mutex::new(false));
        let mut hooks = HookRegistry::new();
        let f = fired.clone();
        hooks.on_add(0, false, move |_, _| *f.lock().unwrap() = true, "Health").unwrap();

        let e = Entity::from_raw(1, 0);
        hooks.with_hooks_disabled(|h| {
            h.fire_add(0, e, &Snapshot::default());
        });
        assert!(!*fired.lock().unwrap());

        hooks.fire_add(0, e, &Snapshot::default());
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn reentrant_fire_for_same_entity_is_suppressed() {
        let calls = Arc::new(Mutex::new(0));
        let mut hooks = HookRegistry::new();
        let c = calls.clone();
        hooks
            .on_remove(
                0,
                false,
                move |_, _| {
                    *c.lock().unwrap() += 1;
                },
                "Health",
            )
            .unwrap();

        let e = Entity::from_raw(1, 0);
        hooks.active.insert(e);
        hooks.fire_remove(0, e, &Snapshot::default());
        hooks.active.remove(&e);
        assert_eq!(*calls.lock().unwrap(), 0);

        hooks.fire_remove(0, e, &Snapshot::default());
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
