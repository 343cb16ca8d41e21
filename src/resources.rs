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

//! Resource registry: world-singleton state, addressable both as typed Rust
//! values and as string-keyed JSON for snapshotting.
//!
//! Grounded in the teacher's `TypeId`-keyed `resources: AHashMap<TypeId, Box<dyn
//! Any + Send + Sync>>` (`src/world.rs` "Resource API"), kept verbatim for
//! the typed interface and paired with a string-keyed `serde_json::Value`
//! side table so the snapshot format (`spec.md` §6) has something to
//! serialize without requiring every resource type to implement `Reflect`.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;
use serde_json::Value as Json;

/// Typed singleton state plus an independent string-keyed JSON store, both
/// scoped to one world.
#[derive(Default)]
pub struct ResourceRegistry {
    typed: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
    keyed: FxHashMap<String, Json>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<R: Send + Sync + 'static>(&mut self, resource: R) {
        self.typed.insert(TypeId::of::<R>(), Box::new(resource));
    }

    pub fn get<R: 'static>(&self) -> Option<&R> {
        self.typed.get(&TypeId::of::<R>()).and_then(|r| r.downcast_ref())
    }

    pub fn get_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.typed
            .get_mut(&TypeId::of::<R>())
            .and_then(|r| r.downcast_mut())
    }

    pub fn contains<R: 'static>(&self) -> bool {
        self.typed.contains_key(&TypeId::of::<R>())
    }

    pub fn remove<R: 'static>(&mut self) -> Option<R> {
        self.typed
            .remove(&TypeId::of::<R>())
            .and_then(|r| r.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Set a string-keyed JSON resource. Used by the snapshot format and by
    /// callers that don't want to declare a Rust type for simple config
    /// values.
    pub fn set_json(&mut self, key: impl Into<String>, value: Json) {
        self.keyed.insert(key.into(), value);
    }

    pub fn get_json(&self, key: &str) -> Option<&Json> {
        self.keyed.get(key)
    }

    pub fn remove_json(&mut self, key: &str) -> Option<Json> {
        self.keyed.remove(key)
    }

    pub fn json_iter(&self) -> impl Iterator<Item = (&str, &Json)> {
        self.keyed.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear_json(&mut self) {
        self.keyed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tick(u32);

    #[test]
    fn typed_resource_roundtrip() {
        let mut registry = ResourceRegistry::new();
        registry.insert(Tick(7));
        assert_eq!(registry.get::<Tick>(), Some(&Tick(7)));
        registry.get_mut::<Tick>().unwrap().0 = 8;
        assert_eq!(registry.get::<Tick>(), Some(&Tick(8)));
    }

    #[test]
    fn json_resource_roundtrip() {
        let mut registry = ResourceRegistry::new();
        registry.set_json("difficulty", Json::String("hard".into()));
        assert_eq!(
            registry.get_json("difficulty"),
            Some(&Json::String("hard".into()))
        );
    }

    #[test]
    fn remove_returns_owned_value() {
        let mut registry = ResourceRegistry::new();
        registry.insert(Tick(1));
        assert_eq!(registry.remove::<Tick>(), Some(Tick(1)));
        assert!(!registry.contains::<Tick>());
    }
}
