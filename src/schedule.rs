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

//! Phase-bucketed system scheduler with Kahn-style per-phase topological
//! sort.
//!
//! Grounded in the teacher's `SystemGraph`/`Schedule` pair
//! (`src/schedule.rs`), generalized from access-conflict edges (which this
//! crate's single-threaded model has no use for, `spec.md` §5) to the
//! declared `before`/`after` name edges `spec.md` §4.10 specifies.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use crate::error::{EcsError, Result};
use crate::system::{Phase, System};
use crate::world::World;

#[derive(Default)]
struct PhaseBucket {
    systems: Vec<System>,
    order: Vec<usize>,
    dirty: bool,
}

/// Append-only system registry; ordering is recomputed lazily per phase.
#[derive(Default)]
pub struct Scheduler {
    phases: FxHashMap<Phase, PhaseBucket>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, system: System) {
        let phase = system.phase;
        let bucket = self.phases.entry(phase).or_default();
        bucket.systems.push(system);
        bucket.dirty = true;
    }

    fn ensure_built(&mut self, phase: Phase) -> Result<()> {
        let bucket = self.phases.entry(phase).or_default();
        if !bucket.dirty {
            return Ok(());
        }
        bucket.order = topological_sort(&bucket.systems)?;
        bucket.dirty = false;
        Ok(())
    }

    pub fn run_phase(&mut self, phase: Phase, world: &mut World) -> Result<()> {
        self.ensure_built(phase)?;
        let bucket = self.phases.entry(phase).or_default();
        for &idx in &bucket.order {
            let system = &mut bucket.systems[idx];
            if !system.enabled {
                continue;
            }
            (system.run)(world)?;
        }
        Ok(())
    }

    pub fn run_all(&mut self, world: &mut World) -> Result<()> {
        for phase in Phase::ALL {
            self.run_phase(phase, world)?;
        }
        Ok(())
    }

    /// Ordering for a phase, by system name, for tests/inspection.
    pub fn order_names(&mut self, phase: Phase) -> Result<Vec<String>> {
        self.ensure_built(phase)?;
        let bucket = &self.phases[&phase];
        Ok(bucket
            .order
            .iter()
            .map(|&i| bucket.systems[i].name.clone())
            .collect())
    }

    pub fn system_count(&self, phase: Phase) -> usize {
        self.phases.get(&phase).map_or(0, |b| b.systems.len())
    }
}

/// Kahn's algorithm over declared `before`/`after` edges. Unknown names
/// (not registered in this phase) contribute no edges rather than failing
/// — `spec.md` §4.10 and §9 both call this out as tolerated, not an error.
/// Ties (no remaining edge constraints) are broken by registration order,
/// which is what gives the sort its stability.
fn topological_sort(systems: &[System]) -> Result<Vec<usize>> {
    let index_of: FxHashMap<&str, usize> = systems
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; systems.len()];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); systems.len()];

    for (i, system) in systems.iter().enumerate() {
        for before in &system.before {
            if let Some(&j) = index_of.get(before.as_str()) {
                adjacency[i].push(j);
                in_degree[j] += 1;
            }
        }
        for after in &system.after {
            if let Some(&j) = index_of.get(after.as_str()) {
                adjacency[j].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..systems.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut result = Vec::with_capacity(systems.len());

    while let Some(i) = queue.pop_front() {
        result.push(i);
        for &j in &adjacency[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                queue.push_back(j);
            }
        }
    }

    if result.len() != systems.len() {
        let stuck: Vec<&str> = (0..systems.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| systems[i].name.as_str())
            .collect();
        return Err(EcsError::CircularSystemDependency(stuck.join(", ")));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str, phase: Phase) -> System {
        System::new(name, phase, |_| Ok(()))
    }

    #[test]
    fn order_follows_after_edges_regardless_of_registration_order() {
        let mut scheduler = Scheduler::new();
        scheduler.register(noop("D", Phase::Update).after("C"));
        scheduler.register(noop("B", Phase::Update).after("A"));
        scheduler.register(noop("C", Phase::Update).after("B"));
        scheduler.register(noop("A", Phase::Update));

        let order = scheduler.order_names(Phase::Update).unwrap();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn unknown_before_name_is_ignored() {
        let mut scheduler = Scheduler::new();
        scheduler.register(noop("A", Phase::Update).before("Typo"));
        let order = scheduler.order_names(Phase::Update).unwrap();
        assert_eq!(order, vec!["A"]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut scheduler = Scheduler::new();
        scheduler.register(noop("A", Phase::Update).after("B"));
        scheduler.register(noop("B", Phase::Update).after("A"));
        assert!(matches!(
            scheduler.order_names(Phase::Update),
            Err(EcsError::CircularSystemDependency(_))
        ));
    }

    #[test]
    fn phases_run_in_pre_update_then_post_order() {
        use std::sync::{Arc, Mutex};
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        for (name, phase) in [
            ("post", Phase::PostUpdate),
            ("pre", Phase::PreUpdate),
            ("update", Phase::Update),
        ] {
            let l = log.clone();
            let tag = name.to_string();
            scheduler.register(System::new(name, phase, move |_| {
                l.lock().unwrap().push(tag.clone());
                Ok(())
            }));
        }

        let mut world = World::new().unwrap();
        scheduler.run_all(&mut world).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["pre", "update", "post"]);
    }
}
