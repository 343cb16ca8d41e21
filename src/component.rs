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

//! Component registration and metadata.
//!
//! Replaces the teacher crate's `TypeId`-keyed `Component`/`Bundle` traits
//! (generic Rust types written straight into typed columns) with the
//! explicit schema declaration `spec.md` §9 calls for: a component is a
//! named, ordered list of primitive-typed fields registered once at
//! startup, and assigned a stable dense index for the lifetime of the
//! process.

use rustc_hash::FxHashMap;

use crate::entity::Entity;
use crate::error::{EcsError, Result};

/// Primitive field types a component's fields may hold (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    F32,
    F64,
    /// u32 index into the string pool.
    String,
    /// u32 entity handle.
    Entity,
}

impl PrimitiveType {
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::I8 => "i8",
            PrimitiveType::I16 => "i16",
            PrimitiveType::I32 => "i32",
            PrimitiveType::U8 => "u8",
            PrimitiveType::U16 => "u16",
            PrimitiveType::U32 => "u32",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
            PrimitiveType::String => "string",
            PrimitiveType::Entity => "entity",
        }
    }
}

/// A field value of any primitive type; used both as a default and as the
/// payload carried through `set`/`add`/`get` partial-component maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    U8(u8),
    U16(u16),
    U32(u32),
    F32(f32),
    F64(f64),
    /// Pool index (already interned).
    Str(u32),
    Entity(Entity),
}

impl Value {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Value::Bool(_) => PrimitiveType::Bool,
            Value::I8(_) => PrimitiveType::I8,
            Value::I16(_) => PrimitiveType::I16,
            Value::I32(_) => PrimitiveType::I32,
            Value::U8(_) => PrimitiveType::U8,
            Value::U16(_) => PrimitiveType::U16,
            Value::U32(_) => PrimitiveType::U32,
            Value::F32(_) => PrimitiveType::F32,
            Value::F64(_) => PrimitiveType::F64,
            Value::Str(_) => PrimitiveType::String,
            Value::Entity(_) => PrimitiveType::Entity,
        }
    }

    pub fn as_entity(&self) -> Option<Entity> {
        match self {
            Value::Entity(e) => Some(*e),
            _ => None,
        }
    }

    pub fn as_str_index(&self) -> Option<u32> {
        match self {
            Value::Str(i) => Some(*i),
            _ => None,
        }
    }

    /// Best-effort conversion to f64, for numeric predicate evaluation.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            Value::I8(v) => Some(v as f64),
            Value::I16(v) => Some(v as f64),
            Value::I32(v) => Some(v as f64),
            Value::U8(v) => Some(v as f64),
            Value::U16(v) => Some(v as f64),
            Value::U32(v) => Some(v as f64),
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            Value::Str(_) | Value::Entity(_) => None,
        }
    }
}

fn default_for(primitive: PrimitiveType) -> Value {
    match primitive {
        PrimitiveType::Bool => Value::Bool(false),
        PrimitiveType::I8 => Value::I8(0),
        PrimitiveType::I16 => Value::I16(0),
        PrimitiveType::I32 => Value::I32(0),
        PrimitiveType::U8 => Value::U8(0),
        PrimitiveType::U16 => Value::U16(0),
        PrimitiveType::U32 => Value::U32(0),
        PrimitiveType::F32 => Value::F32(0.0),
        PrimitiveType::F64 => Value::F64(0.0),
        PrimitiveType::String => Value::Str(0),
        PrimitiveType::Entity => Value::Entity(crate::entity::NULL_ENTITY),
    }
}

/// One declared field of a component: name, primitive type, default value.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub primitive: PrimitiveType,
    pub default: Value,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, primitive: PrimitiveType) -> Self {
        let default = default_for(primitive);
        Self {
            name: name.into(),
            primitive,
            default,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        debug_assert_eq!(default.primitive_type(), self.primitive);
        self.default = default;
        self
    }
}

/// Metadata captured at registration time for one component type.
#[derive(Debug, Clone)]
pub struct ComponentDef {
    pub index: usize,
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub stride: usize,
    pub is_tag: bool,
}

impl ComponentDef {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn primitive_size(p: PrimitiveType) -> usize {
    match p {
        PrimitiveType::Bool | PrimitiveType::I8 | PrimitiveType::U8 => 1,
        PrimitiveType::I16 | PrimitiveType::U16 => 2,
        PrimitiveType::I32 | PrimitiveType::U32 | PrimitiveType::F32 | PrimitiveType::String => 4,
        PrimitiveType::F64 => 8,
        PrimitiveType::Entity => 4,
    }
}

/// Builder for declaring a component type before registration.
#[derive(Debug, Clone, Default)]
pub struct ComponentBuilder {
    fields: Vec<FieldDef>,
}

impl ComponentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, primitive: PrimitiveType) -> Self {
        self.fields.push(FieldDef::new(name, primitive));
        self
    }

    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        primitive: PrimitiveType,
        default: Value,
    ) -> Self {
        self.fields.push(FieldDef::new(name, primitive).with_default(default));
        self
    }
}

/// Registers component types and assigns stable dense indices.
///
/// Grounded in the teacher's append-only `archetype_index`/`component_indices`
/// tables (`src/archetype.rs`, `src/world.rs`), generalized to hold field
/// schemas instead of `TypeId`s.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    defs: Vec<ComponentDef>,
    by_name: FxHashMap<String, usize>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag component (no fields).
    pub fn register_tag(&mut self, name: impl Into<String>) -> Result<usize> {
        self.register(name, ComponentBuilder::new())
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: ComponentBuilder,
    ) -> Result<usize> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(EcsError::DuplicateRegistration(name));
        }
        let index = self.defs.len();
        let stride = builder.fields.iter().map(|f| primitive_size(f.primitive)).sum();
        let is_tag = builder.fields.is_empty();
        let def = ComponentDef {
            index,
            name: name.clone(),
            fields: builder.fields,
            stride,
            is_tag,
        };
        self.defs.push(def);
        self.by_name.insert(name, index);
        Ok(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn by_index(&self, index: usize) -> Result<&ComponentDef> {
        self.defs
            .get(index)
            .ok_or_else(|| EcsError::UnknownComponent(format!("#{index}")))
    }

    pub fn by_name(&self, name: &str) -> Result<&ComponentDef> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| EcsError::UnknownComponent(name.to_string()))?;
        Ok(&self.defs[idx])
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentDef> {
        self.defs.iter()
    }
}
