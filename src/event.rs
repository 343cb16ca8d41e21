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

//! Event queue: per-type FIFO queues, priority handlers, deterministic
//! flush order.
//!
//! Replaces the teacher's `EventBus` (`src/event_bus.rs`, `TypeId`-keyed,
//! subscriber trait objects) with the string-typed, priority-ordered queue
//! `spec.md` §4.9 requires: events here are named dynamically (they flow
//! out of systems, not out of the Rust type system), so the type key is a
//! `String` rather than a `TypeId`, and handlers carry an explicit priority
//! field instead of being partitioned by registration order alone.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use crate::error::{EcsError, Result};

pub type HandlerFn = Box<dyn FnMut(&str, &Json) + Send>;

struct Handler {
    priority: i32,
    sequence: u32,
    callback: HandlerFn,
}

#[derive(Default)]
struct TypeQueue {
    events: VecDeque<Json>,
    handlers: Vec<Handler>,
}

/// Per-type FIFO queues with priority-ordered handlers and deterministic,
/// sorted-type-name flush order.
#[derive(Default)]
pub struct EventQueue {
    types: FxHashMap<String, TypeQueue>,
    wildcards: Vec<Handler>,
    flushing: bool,
    next_sequence: u32,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &mut self,
        event_type: impl Into<String>,
        priority: i32,
        handler: impl FnMut(&str, &Json) + Send + 'static,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.types
            .entry(event_type.into())
            .or_default()
            .handlers
            .push(Handler {
                priority,
                sequence,
                callback: Box::new(handler),
            });
    }

    pub fn on_wildcard(&mut self, priority: i32, handler: impl FnMut(&str, &Json) + Send + 'static) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.wildcards.push(Handler {
            priority,
            sequence,
            callback: Box::new(handler),
        });
    }

    pub fn emit(&mut self, event_type: impl Into<String>, payload: Json) {
        self.types
            .entry(event_type.into())
            .or_default()
            .events
            .push_back(payload);
    }

    pub fn drain(&mut self, event_type: &str) -> Vec<Json> {
        self.types
            .get_mut(event_type)
            .map(|q| q.events.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn peek(&self, event_type: &str) -> Option<&Json> {
        self.types.get(event_type).and_then(|q| q.events.front())
    }

    pub fn clear(&mut self, event_type: &str) {
        if let Some(q) = self.types.get_mut(event_type) {
            q.events.clear();
        }
    }

    pub fn clear_all(&mut self) {
        for q in self.types.values_mut() {
            q.events.clear();
        }
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.types.get(event_type).map_or(0, |q| q.events.len())
    }

    pub fn total_count(&self) -> usize {
        self.types.values().map(|q| q.events.len()).sum()
    }

    /// Flush every type's queue in ascending sorted type-name order;
    /// within a type, events fire FIFO, and for each event type-specific
    /// handlers run before wildcard handlers, both in ascending priority
    /// with insertion order breaking ties (`spec.md` §4.9).
    pub fn flush(&mut self) -> Result<()> {
        if self.flushing {
            return Err(EcsError::ReentrantFlush);
        }
        self.flushing = true;

        let mut type_names: Vec<String> = self
            .types
            .iter()
            .filter(|(_, q)| !q.events.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        type_names.sort();

        for name in type_names {
            let events: Vec<Json> = {
                let q = self.types.get_mut(&name).unwrap();
                q.events.drain(..).collect()
            };

            let mut type_handlers: Vec<usize> = (0..self.types[&name].handlers.len()).collect();
            type_handlers.sort_by_key(|&i| {
                let h = &self.types[&name].handlers[i];
                (h.priority, h.sequence)
            });
            let mut wildcard_order: Vec<usize> = (0..self.wildcards.len()).collect();
            wildcard_order.sort_by_key(|&i| (self.wildcards[i].priority, self.wildcards[i].sequence));

            for event in &events {
                for &i in &type_handlers {
                    (self.types.get_mut(&name).unwrap().handlers[i].callback)(&name, event);
                }
                for &i in &wildcard_order {
                    (self.wildcards[i].callback)(&name, event);
                }
            }
        }

        self.flushing = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn flush_orders_by_type_name_then_fifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut q = EventQueue::new();

        let l = log.clone();
        q.on_wildcard(0, move |ty, _| l.lock().unwrap().push(ty.to_string()));

        q.emit("movement.moved", Json::Null);
        q.emit("combat.death", Json::Null);
        q.emit("entity.spawned", Json::Null);
        q.emit("combat.damage", Json::Null);

        q.flush().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["combat.damage", "combat.death", "entity.spawned", "movement.moved"]
        );
    }

    #[test]
    fn handlers_run_priority_then_type_before_wildcard() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut q = EventQueue::new();

        let l1 = log.clone();
        q.on("hit", 5, move |_, _| l1.lock().unwrap().push("low-prio"));
        let l2 = log.clone();
        q.on("hit", 1, move |_, _| l2.lock().unwrap().push("high-prio"));
        let l3 = log.clone();
        q.on_wildcard(0, move |_, _| l3.lock().unwrap().push("wildcard"));

        q.emit("hit", Json::Null);
        q.flush().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["high-prio", "low-prio", "wildcard"]);
    }

    #[test]
    fn reentrant_flush_fails() {
        let mut q = EventQueue::new();
        q.flushing = true;
        assert!(matches!(q.flush(), Err(EcsError::ReentrantFlush)));
    }
}
