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

//! Uniform-cell spatial hash for rect/radius/k-nearest queries over 2D
//! entity positions, decoupled from archetype storage.
//!
//! The teacher carries no spatial index (it targets generic simulation, not
//! a tile/room dungeon-crawler). Grounded in the teacher's `glam`-based
//! vector math (`Cargo.toml`) and its `FxHashMap`-keyed bucket pattern from
//! `src/archetype.rs`, applied to `spec.md` §4.14.

use rustc_hash::FxHashMap;

use crate::entity::Entity;
use crate::world::World;

type CellCoord = (i64, i64);

/// A uniform grid over a fixed `width x height` world, clamping positions
/// to bounds at insertion (`spec.md` §4.14).
pub struct SpatialGrid {
    width: f32,
    height: f32,
    cell_size: f32,
    cells: FxHashMap<CellCoord, Vec<Entity>>,
    positions: FxHashMap<Entity, (f32, f32)>,
}

impl SpatialGrid {
    pub fn new(width: f32, height: f32, cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        Self {
            width,
            height,
            cell_size,
            cells: FxHashMap::default(),
            positions: FxHashMap::default(),
        }
    }

    /// Grid dimensions in cells, i.e. `ceil(world / cell)`.
    pub fn grid_dimensions(&self) -> (u32, u32) {
        (
            (self.width / self.cell_size).ceil() as u32,
            (self.height / self.cell_size).ceil() as u32,
        )
    }

    fn clamp(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }

    fn cell_of(&self, x: f32, y: f32) -> CellCoord {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    pub fn insert(&mut self, entity: Entity, x: f32, y: f32) {
        self.remove(entity);
        let (x, y) = self.clamp(x, y);
        let cell = self.cell_of(x, y);
        self.cells.entry(cell).or_default().push(entity);
        self.positions.insert(entity, (x, y));
    }

    pub fn update(&mut self, entity: Entity, x: f32, y: f32) {
        self.insert(entity, x, y);
    }

    pub fn remove(&mut self, entity: Entity) {
        if let Some((x, y)) = self.positions.remove(&entity) {
            let cell = self.cell_of(x, y);
            if let Some(bucket) = self.cells.get_mut(&cell) {
                bucket.retain(|&e| e != entity);
                if bucket.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    pub fn position(&self, entity: Entity) -> Option<(f32, f32)> {
        self.positions.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// All entities whose tracked position falls within `[x, x+w] x [y,
    /// y+h]`. Cells intersecting the AABB are scanned, then each candidate's
    /// precise position is re-checked against the rectangle.
    pub fn query_rect(&self, x: f32, y: f32, w: f32, h: f32) -> Vec<Entity> {
        let min_cell = self.cell_of(x, y);
        let max_cell = self.cell_of(x + w, y + h);
        let mut out = Vec::new();
        for cx in min_cell.0..=max_cell.0 {
            for cy in min_cell.1..=max_cell.1 {
                let Some(bucket) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for &entity in bucket {
                    let (px, py) = self.positions[&entity];
                    if px >= x && px <= x + w && py >= y && py <= y + h {
                        out.push(entity);
                    }
                }
            }
        }
        out
    }

    /// Entities within `r` of `(cx, cy)`: scans the bounding square's cells,
    /// then filters by squared distance.
    pub fn query_radius(&self, cx: f32, cy: f32, r: f32) -> Vec<Entity> {
        let radius_sq = r * r;
        self.query_rect(cx - r, cy - r, 2.0 * r, 2.0 * r)
            .into_iter()
            .filter(|&e| {
                let (px, py) = self.positions[&e];
                let dx = px - cx;
                let dy = py - cy;
                dx * dx + dy * dy <= radius_sq
            })
            .collect()
    }

    /// Nearest `k` entities to `(x, y)`, closest first. Doubles the search
    /// radius until at least `k` candidates are found (capped by `max_r` if
    /// given, or the grid's diagonal otherwise), then sorts by true squared
    /// distance.
    pub fn query_nearest(&self, x: f32, y: f32, k: usize, max_r: Option<f32>) -> Vec<Entity> {
        if k == 0 || self.positions.is_empty() {
            return Vec::new();
        }

        let ceiling = max_r.unwrap_or_else(|| (self.width * self.width + self.height * self.height).sqrt());
        let mut radius = self.cell_size.max(1.0);
        let mut candidates: Vec<Entity>;

        loop {
            candidates = self.query_radius(x, y, radius);
            if candidates.len() >= k || radius >= ceiling {
                break;
            }
            radius = (radius * 2.0).min(ceiling);
        }

        candidates.sort_by(|&a, &b| {
            let da = dist_sq(self.positions[&a], (x, y));
            let db = dist_sq(self.positions[&b], (x, y));
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        candidates
    }
}

fn dist_sq(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

/// Binds a `SpatialGrid` to one component's (x, y) fields so callers don't
/// have to thread field lookups through every call site.
pub struct SpatialIndex {
    pub grid: SpatialGrid,
    pub component: usize,
    pub x_field: usize,
    pub y_field: usize,
}

impl SpatialIndex {
    pub fn new(width: f32, height: f32, cell_size: f32, component: usize, x_field: usize, y_field: usize) -> Self {
        Self {
            grid: SpatialGrid::new(width, height, cell_size),
            component,
            x_field,
            y_field,
        }
    }

    /// Reconcile `self.grid`'s copy of `entity`'s position from its bound
    /// component's `(x_field, y_field)`. Removes the entity from the grid
    /// if either field is absent, matching `World::sync_spatial_entity`
    /// (`spec.md` §4.14).
    pub fn sync_entity(&mut self, world: &World, entity: Entity) -> bool {
        let x = world.field_value_by_index(entity, self.component, self.x_field).and_then(|v| v.as_f64());
        let y = world.field_value_by_index(entity, self.component, self.y_field).and_then(|v| v.as_f64());
        match (x, y) {
            (Some(x), Some(y)) => {
                self.grid.update(entity, x as f32, y as f32);
                true
            }
            _ => {
                self.grid.remove(entity);
                false
            }
        }
    }
}
