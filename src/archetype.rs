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

//! Archetype storage: one struct-of-arrays table per distinct component set.
//!
//! Grounded in the teacher's `Archetype`/`ComponentColumn` pair
//! (`src/archetype.rs`), generalized from a single type-erased byte buffer
//! per Rust type to one typed array per declared *field*, since components
//! here are schema-driven rather than Rust structs.

use rustc_hash::FxHashMap;

use crate::component::{ComponentDef, ComponentRegistry, PrimitiveType, Value};
use crate::entity::Entity;
use crate::error::{EcsError, Result};
use crate::mask::{ChangeMask, Mask};

/// Archetypes and their columns reserve this many rows up front; std
/// `Vec`'s amortized growth already doubles on overflow, matching
/// `spec.md` §4.3's 2x growth factor.
pub const INITIAL_CAPACITY: usize = 64;

/// Per-row change status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFlag {
    None,
    Added,
    Modified,
}

/// One typed array, one per declared field. Never a boxed/`dyn` value —
/// the primitive type selects the array kind at registration time.
#[derive(Debug, Clone)]
pub enum Column {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Str(Vec<u32>),
    Entity(Vec<Entity>),
}

impl Column {
    fn new(primitive: PrimitiveType) -> Self {
        match primitive {
            PrimitiveType::Bool => Column::Bool(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::I8 => Column::I8(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::I16 => Column::I16(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::I32 => Column::I32(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::U8 => Column::U8(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::U16 => Column::U16(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::U32 => Column::U32(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::F32 => Column::F32(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::F64 => Column::F64(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::String => Column::Str(Vec::with_capacity(INITIAL_CAPACITY)),
            PrimitiveType::Entity => Column::Entity(Vec::with_capacity(INITIAL_CAPACITY)),
        }
    }

    fn push_default(&mut self, default: &Value) {
        self.push(default);
    }

    fn push(&mut self, value: &Value) {
        match (self, value) {
            (Column::Bool(v), Value::Bool(x)) => v.push(*x),
            (Column::I8(v), Value::I8(x)) => v.push(*x),
            (Column::I16(v), Value::I16(x)) => v.push(*x),
            (Column::I32(v), Value::I32(x)) => v.push(*x),
            (Column::U8(v), Value::U8(x)) => v.push(*x),
            (Column::U16(v), Value::U16(x)) => v.push(*x),
            (Column::U32(v), Value::U32(x)) => v.push(*x),
            (Column::F32(v), Value::F32(x)) => v.push(*x),
            (Column::F64(v), Value::F64(x)) => v.push(*x),
            (Column::Str(v), Value::Str(x)) => v.push(*x),
            (Column::Entity(v), Value::Entity(x)) => v.push(*x),
            _ => unreachable!("column/value primitive type mismatch"),
        }
    }

    fn set(&mut self, row: usize, value: &Value) {
        match (self, value) {
            (Column::Bool(v), Value::Bool(x)) => v[row] = *x,
            (Column::I8(v), Value::I8(x)) => v[row] = *x,
            (Column::I16(v), Value::I16(x)) => v[row] = *x,
            (Column::I32(v), Value::I32(x)) => v[row] = *x,
            (Column::U8(v), Value::U8(x)) => v[row] = *x,
            (Column::U16(v), Value::U16(x)) => v[row] = *x,
            (Column::U32(v), Value::U32(x)) => v[row] = *x,
            (Column::F32(v), Value::F32(x)) => v[row] = *x,
            (Column::F64(v), Value::F64(x)) => v[row] = *x,
            (Column::Str(v), Value::Str(x)) => v[row] = *x,
            (Column::Entity(v), Value::Entity(x)) => v[row] = *x,
            _ => unreachable!("column/value primitive type mismatch"),
        }
    }

    pub fn get(&self, row: usize) -> Value {
        match self {
            Column::Bool(v) => Value::Bool(v[row]),
            Column::I8(v) => Value::I8(v[row]),
            Column::I16(v) => Value::I16(v[row]),
            Column::I32(v) => Value::I32(v[row]),
            Column::U8(v) => Value::U8(v[row]),
            Column::U16(v) => Value::U16(v[row]),
            Column::U32(v) => Value::U32(v[row]),
            Column::F32(v) => Value::F32(v[row]),
            Column::F64(v) => Value::F64(v[row]),
            Column::Str(v) => Value::Str(v[row]),
            Column::Entity(v) => Value::Entity(v[row]),
        }
    }

    fn swap_remove(&mut self, row: usize) {
        macro_rules! sr {
            ($v:expr) => {{
                $v.swap_remove(row);
            }};
        }
        match self {
            Column::Bool(v) => sr!(v),
            Column::I8(v) => sr!(v),
            Column::I16(v) => sr!(v),
            Column::I32(v) => sr!(v),
            Column::U8(v) => sr!(v),
            Column::U16(v) => sr!(v),
            Column::U32(v) => sr!(v),
            Column::F32(v) => sr!(v),
            Column::F64(v) => sr!(v),
            Column::Str(v) => sr!(v),
            Column::Entity(v) => sr!(v),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::I8(v) => v.len(),
            Column::I16(v) => v.len(),
            Column::I32(v) => v.len(),
            Column::U8(v) => v.len(),
            Column::U16(v) => v.len(),
            Column::U32(v) => v.len(),
            Column::F32(v) => v.len(),
            Column::F64(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::Entity(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytewise copy of one row from `src` into a freshly pushed slot
    /// in `self`. Used for archetype-transition column copies: no change
    /// flags are touched (`spec.md` §4.3 `copy_component_from`).
    fn copy_row_from(&mut self, src: &Column, row: usize) {
        macro_rules! cp {
            ($dst:expr, $src:expr, $variant:ident) => {
                if let Column::$variant(s) = $src {
                    $dst.push(s[row]);
                } else {
                    unreachable!("mismatched column kinds in copy_row_from");
                }
            };
        }
        match self {
            Column::Bool(d) => cp!(d, src, Bool),
            Column::I8(d) => cp!(d, src, I8),
            Column::I16(d) => cp!(d, src, I16),
            Column::I32(d) => cp!(d, src, I32),
            Column::U8(d) => cp!(d, src, U8),
            Column::U16(d) => cp!(d, src, U16),
            Column::U32(d) => cp!(d, src, U32),
            Column::F32(d) => cp!(d, src, F32),
            Column::F64(d) => cp!(d, src, F64),
            Column::Str(d) => cp!(d, src, Str),
            Column::Entity(d) => cp!(d, src, Entity),
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            Column::I32(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_u32(&self) -> Option<&[u32]> {
        match self {
            Column::U32(v) | Column::Str(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Column::F32(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Column::F64(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_entity(&self) -> Option<&[Entity]> {
        match self {
            Column::Entity(v) => Some(v),
            _ => None,
        }
    }
}

/// One component group within an archetype: the field columns for a single
/// non-tag component, in declared-field order.
#[derive(Debug, Clone)]
pub struct ComponentColumns {
    pub columns: Vec<Column>,
}

/// One per distinct component set.
pub struct Archetype {
    pub mask: Mask,
    pub component_indices: Vec<usize>,
    entities: Vec<Entity>,
    groups: FxHashMap<usize, ComponentColumns>,
    change_flag: Vec<ChangeFlag>,
    component_change_mask: Vec<ChangeMask>,
    pub version: u64,
    pub column_versions: FxHashMap<usize, u64>,
}

impl Archetype {
    pub fn new(component_indices: Vec<usize>, registry: &ComponentRegistry) -> Result<Self> {
        let mut mask = Mask::new();
        let mut groups = FxHashMap::default();
        for &idx in &component_indices {
            mask.set(idx);
            let def = registry.by_index(idx)?;
            if !def.is_tag {
                let columns = def
                    .fields
                    .iter()
                    .map(|f| Column::new(f.primitive))
                    .collect();
                groups.insert(idx, ComponentColumns { columns });
            }
        }
        Ok(Self {
            mask,
            component_indices,
            entities: Vec::with_capacity(INITIAL_CAPACITY),
            groups,
            change_flag: Vec::with_capacity(INITIAL_CAPACITY),
            component_change_mask: Vec::with_capacity(INITIAL_CAPACITY),
            version: 0,
            column_versions: FxHashMap::default(),
        })
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, row: usize) -> Entity {
        self.entities[row]
    }

    pub fn has_component(&self, component: usize) -> bool {
        self.mask.get(component)
    }

    pub fn component_group(&self, component: usize) -> Option<&ComponentColumns> {
        self.groups.get(&component)
    }

    pub fn change_flag(&self, row: usize) -> ChangeFlag {
        self.change_flag[row]
    }

    pub fn component_change_mask(&self, row: usize) -> ChangeMask {
        self.component_change_mask[row]
    }

    /// Allocate a new row for `entity`, marking it `Added` with every
    /// resident component flagged as touched this tick.
    pub fn allocate_row(&mut self, entity: Entity, registry: &ComponentRegistry) -> Result<usize> {
        let row = self.entities.len();
        self.entities.push(entity);

        let mut row_change_mask = ChangeMask::EMPTY;
        for &idx in &self.component_indices.clone() {
            let def = registry.by_index(idx)?;
            if let Some(group) = self.groups.get_mut(&idx) {
                for (field, column) in def.fields.iter().zip(group.columns.iter_mut()) {
                    column.push_default(&field.default);
                }
            }
            row_change_mask.set(idx);
        }
        self.change_flag.push(ChangeFlag::Added);
        self.component_change_mask.push(row_change_mask);
        let components = self.component_indices.clone();
        self.bump_version_for(&components);
        Ok(row)
    }

    /// Swap-remove `row`. Returns the handle of the entity that was moved
    /// into `row`, if any (`spec.md` §4.3 `free_row`).
    pub fn free_row(&mut self, row: usize) -> Option<Entity> {
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        self.change_flag.swap_remove(row);
        self.component_change_mask.swap_remove(row);
        for group in self.groups.values_mut() {
            for column in &mut group.columns {
                column.swap_remove(row);
            }
        }
        if row < last {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Write only the fields present in `partial`; others are preserved.
    pub fn set_component_data(
        &mut self,
        row: usize,
        component: usize,
        def: &ComponentDef,
        partial: &FxHashMap<String, Value>,
    ) -> Result<()> {
        if let Some(group) = self.groups.get_mut(&component) {
            for (field, column) in def.fields.iter().zip(group.columns.iter_mut()) {
                if let Some(value) = partial.get(&field.name) {
                    column.set(row, value);
                }
            }
        }
        if self.change_flag[row] != ChangeFlag::Added {
            self.change_flag[row] = ChangeFlag::Modified;
        }
        self.component_change_mask[row].set(component);
        self.bump_version_for(&[component]);
        Ok(())
    }

    /// Raw bytewise column copy, field by field, with no change-flag
    /// side effects — used during archetype transitions.
    pub fn copy_component_from(
        &mut self,
        target_row: usize,
        src: &Archetype,
        src_row: usize,
        component: usize,
    ) {
        if let (Some(dst_group), Some(src_group)) =
            (self.groups.get_mut(&component), src.groups.get(&component))
        {
            for (dst_col, src_col) in dst_group.columns.iter_mut().zip(src_group.columns.iter()) {
                debug_assert_eq!(dst_col.len(), target_row);
                dst_col.copy_row_from(src_col, src_row);
            }
        }
    }

    pub fn clear_change_flags(&mut self) {
        for flag in &mut self.change_flag {
            *flag = ChangeFlag::None;
        }
        for mask in &mut self.component_change_mask {
            *mask = ChangeMask::EMPTY;
        }
    }

    fn bump_version_for(&mut self, components: &[usize]) {
        self.version += 1;
        for &c in components {
            self.column_versions.insert(c, self.version);
        }
    }

    pub fn field_column(&self, component: usize, field_index: usize) -> Result<&Column> {
        self.groups
            .get(&component)
            .and_then(|g| g.columns.get(field_index))
            .ok_or_else(|| EcsError::ColumnNotFound {
                component: component.to_string(),
                field: field_index.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentBuilder, PrimitiveType};

    fn registry() -> ComponentRegistry {
        let mut reg = ComponentRegistry::new();
        reg.register(
            "Position",
            ComponentBuilder::new()
                .field("x", PrimitiveType::F32)
                .field("y", PrimitiveType::F32),
        )
        .unwrap();
        reg
    }

    #[test]
    fn allocate_row_marks_added() {
        let reg = registry();
        let mut arch = Archetype::new(vec![0], &reg).unwrap();
        let e = Entity::from_raw(1, 0);
        let row = arch.allocate_row(e, &reg).unwrap();
        assert_eq!(arch.change_flag(row), ChangeFlag::Added);
        assert!(arch.component_change_mask(row).get(0));
    }

    #[test]
    fn free_row_swaps_last_entity() {
        let reg = registry();
        let mut arch = Archetype::new(vec![0], &reg).unwrap();
        let e0 = Entity::from_raw(0, 0);
        let e1 = Entity::from_raw(1, 0);
        let e2 = Entity::from_raw(2, 0);
        arch.allocate_row(e0, &reg).unwrap();
        arch.allocate_row(e1, &reg).unwrap();
        arch.allocate_row(e2, &reg).unwrap();

        let moved = arch.free_row(0);
        assert_eq!(moved, Some(e2));
        assert_eq!(arch.entity(0), e2);
        assert_eq!(arch.count(), 2);
    }

    #[test]
    fn free_last_row_returns_none() {
        let reg = registry();
        let mut arch = Archetype::new(vec![0], &reg).unwrap();
        let e0 = Entity::from_raw(0, 0);
        arch.allocate_row(e0, &reg).unwrap();
        assert_eq!(arch.free_row(0), None);
    }

    #[test]
    fn set_component_data_preserves_unset_fields() {
        let reg = registry();
        let mut arch = Archetype::new(vec![0], &reg).unwrap();
        let e = Entity::from_raw(0, 0);
        let row = arch.allocate_row(e, &reg).unwrap();
        arch.clear_change_flags();

        let def = reg.by_index(0).unwrap().clone();
        let mut partial = FxHashMap::default();
        partial.insert("x".to_string(), Value::F32(10.0));
        arch.set_component_data(row, 0, &def, &partial).unwrap();

        let col = arch.field_column(0, 0).unwrap();
        assert_eq!(col.as_f32().unwrap()[0], 10.0);
        let col_y = arch.field_column(0, 1).unwrap();
        assert_eq!(col_y.as_f32().unwrap()[0], 0.0);
        assert_eq!(arch.change_flag(row), ChangeFlag::Modified);
    }

    #[test]
    fn version_is_monotonic() {
        let reg = registry();
        let mut arch = Archetype::new(vec![0], &reg).unwrap();
        let e = Entity::from_raw(0, 0);
        let row = arch.allocate_row(e, &reg).unwrap();
        let v1 = arch.version;
        let def = reg.by_index(0).unwrap().clone();
        let mut partial = FxHashMap::default();
        partial.insert("x".to_string(), Value::F32(1.0));
        arch.set_component_data(row, 0, &def, &partial).unwrap();
        assert!(arch.version > v1);
        assert!(arch.column_versions[&0] <= arch.version);
    }
}
