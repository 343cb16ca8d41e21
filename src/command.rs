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

//! Command buffer: deferred structural operations with deterministic
//! `(sort_key, sequence)` ordering.
//!
//! The teacher's `CommandBuffer` (`src/command.rs`) records `FnOnce(&mut
//! World)` closures and replays them in insertion order. `spec.md` §4.8
//! requires a data-driven log instead, so structural operations survive
//! being sorted and so the buffer can be replayed against a world that
//! registered its component types in a different order than the one that
//! recorded them.

use rustc_hash::FxHashMap;

use crate::component::Value;
use crate::entity::Entity;
use crate::error::Result;
use crate::world::World;

/// One recorded structural operation.
#[derive(Debug, Clone)]
pub enum Op {
    Spawn {
        /// Component names (not indices — see `local_registry`).
        components: Vec<String>,
        /// Token used to let later `Add`s on this not-yet-existing entity
        /// in the same buffer address it. Resolved at flush time.
        placeholder: u32,
    },
    Despawn(Entity),
    Add {
        entity: CommandEntity,
        component: String,
        partial: FxHashMap<String, Value>,
    },
    Remove {
        entity: CommandEntity,
        component: String,
    },
}

/// A command-recorded entity reference: either a real, already-live handle,
/// or a placeholder standing in for a `Spawn` recorded earlier in the same
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEntity {
    Real(Entity),
    Placeholder(u32),
}

struct Recorded {
    op: Op,
    sort_key: u32,
    sequence: u32,
}

/// Records four operation kinds and replays them at `flush` time sorted by
/// `(sort_key ASC, sequence ASC)`. The buffer carries its own
/// name-keyed component registry snapshot so ops can be replayed against a
/// world that did not ship every component type at record time — it
/// resolves names against the target world's registry at flush, not at
/// record time.
#[derive(Default)]
pub struct CommandBuffer {
    ops: Vec<Recorded>,
    sort_key: u32,
    sequence: u32,
    next_placeholder: u32,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the sort key used for subsequently-recorded ops. Schedulers
    /// typically use `system_index * 1000 + sub_order`.
    pub fn set_sort_key(&mut self, key: u32) {
        self.sort_key = key;
    }

    fn push(&mut self, op: Op) {
        self.ops.push(Recorded {
            op,
            sort_key: self.sort_key,
            sequence: self.sequence,
        });
        self.sequence += 1;
    }

    /// Record a spawn; returns a placeholder that can be passed to
    /// `add`/`remove` later in the same buffer to address the new entity
    /// before it exists.
    pub fn spawn(&mut self, components: impl IntoIterator<Item = impl Into<String>>) -> CommandEntity {
        let placeholder = self.next_placeholder;
        self.next_placeholder += 1;
        self.push(Op::Spawn {
            components: components.into_iter().map(Into::into).collect(),
            placeholder,
        });
        CommandEntity::Placeholder(placeholder)
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.push(Op::Despawn(entity));
    }

    pub fn add(
        &mut self,
        entity: impl Into<CommandEntity>,
        component: impl Into<String>,
        partial: FxHashMap<String, Value>,
    ) {
        self.push(Op::Add {
            entity: entity.into(),
            component: component.into(),
            partial,
        });
    }

    pub fn remove(&mut self, entity: impl Into<CommandEntity>, component: impl Into<String>) {
        self.push(Op::Remove {
            entity: entity.into(),
            component: component.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.sort_key = 0;
        self.sequence = 0;
        self.next_placeholder = 0;
    }

    /// Stable-sort by `(sort_key, sequence)` and apply to `world`. Sort
    /// keys and sequences reset once the buffer has been drained.
    ///
    /// Commands recorded against an entity that is despawned before flush
    /// silently no-op (`spec.md` §9), matching every entity-addressing
    /// world operation's dead-handle semantics.
    pub fn flush(&mut self, world: &mut World) -> Result<()> {
        self.ops.sort_by_key(|r| (r.sort_key, r.sequence));
        let mut placeholders: FxHashMap<u32, Entity> = FxHashMap::default();

        for recorded in self.ops.drain(..) {
            match recorded.op {
                Op::Spawn {
                    components,
                    placeholder,
                } => {
                    let entity = world.spawn_named(&components)?;
                    placeholders.insert(placeholder, entity);
                }
                Op::Despawn(entity) => {
                    world.despawn(entity);
                }
                Op::Add {
                    entity,
                    component,
                    partial,
                } => {
                    if let Some(real) = resolve(entity, &placeholders) {
                        world.add_named(real, &component, partial)?;
                    }
                }
                Op::Remove { entity, component } => {
                    if let Some(real) = resolve(entity, &placeholders) {
                        world.remove_named(real, &component)?;
                    }
                }
            }
        }

        self.sort_key = 0;
        self.sequence = 0;
        self.next_placeholder = 0;
        Ok(())
    }
}

fn resolve(entity: CommandEntity, placeholders: &FxHashMap<u32, Entity>) -> Option<Entity> {
    match entity {
        CommandEntity::Real(e) => Some(e),
        CommandEntity::Placeholder(p) => placeholders.get(&p).copied(),
    }
}

impl From<Entity> for CommandEntity {
    fn from(e: Entity) -> Self {
        CommandEntity::Real(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_sort_by_key_then_sequence() {
        let mut buf = CommandBuffer::new();
        buf.set_sort_key(10);
        buf.despawn(Entity::from_raw(1, 0));
        buf.set_sort_key(5);
        buf.despawn(Entity::from_raw(2, 0));
        buf.set_sort_key(5);
        buf.despawn(Entity::from_raw(3, 0));

        buf.ops.sort_by_key(|r| (r.sort_key, r.sequence));
        let order: Vec<_> = buf
            .ops
            .iter()
            .map(|r| match r.op {
                Op::Despawn(e) => e.index(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn clear_resets_counters() {
        let mut buf = CommandBuffer::new();
        buf.despawn(Entity::from_raw(1, 0));
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.sequence, 0);
    }
}
