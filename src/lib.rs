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

//! Archetype ECS - schema-driven Entity Component System runtime.
//!
//! Single-threaded, cooperative, and dynamically typed: component shapes
//! are declared at runtime rather than expressed as Rust types, so a host
//! application (a scripting layer, a level editor, a network replication
//! boundary) can define and evolve a schema without recompiling this crate.

pub mod archetype;
pub mod archetype_graph;
pub mod command;
pub mod component;
pub mod entity;
pub mod entity_ref;
pub mod error;
pub mod event;
pub mod hooks;
pub mod inspector;
pub mod mask;
pub mod query;
pub mod relation;
pub mod resources;
pub mod schedule;
pub mod serialization;
pub mod spatial;
pub mod string_pool;
pub mod system;
pub mod world;

pub use archetype::{Archetype, ChangeFlag, Column};
pub use archetype_graph::ArchetypeGraph;
pub use command::{CommandBuffer, CommandEntity};
pub use component::{ComponentBuilder, ComponentDef, ComponentRegistry, PrimitiveType, Value};
pub use entity::{Entity, EntityAllocator, EntityRecord, NULL_ENTITY};
pub use entity_ref::EntityRefStore;
pub use error::{EcsError, Result};
pub use event::EventQueue;
pub use hooks::{HookRegistry, Snapshot};
pub use mask::{ChangeMask, Mask};
pub use query::{ChangeFilter, Predicate, Query, QueryCache, QueryDescriptor, View};
pub use relation::{CascadePolicy, RelationStore, RelationTypeDef};
pub use resources::ResourceRegistry;
pub use schedule::Scheduler;
pub use spatial::{SpatialGrid, SpatialIndex};
pub use string_pool::StringPool;
pub use system::{Phase, System};
pub use world::{World, WorldConfig};
