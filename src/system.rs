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

//! System declaration: name, phase, ordering edges, run function.

use crate::error::Result;
use crate::world::World;

/// Single-threaded cooperative execution phase (`spec.md` §4.10, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreUpdate,
    Update,
    PostUpdate,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::PreUpdate, Phase::Update, Phase::PostUpdate];
}

pub type RunFn = Box<dyn FnMut(&mut World) -> Result<()> + Send>;

/// A scheduled unit of work: `(name, phase, before, after, enabled, run_fn)`.
pub struct System {
    pub name: String,
    pub phase: Phase,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub enabled: bool,
    pub run: RunFn,
}

impl System {
    pub fn new(
        name: impl Into<String>,
        phase: Phase,
        run: impl FnMut(&mut World) -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            before: Vec::new(),
            after: Vec::new(),
            enabled: true,
            run: Box::new(run),
        }
    }

    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("enabled", &self.enabled)
            .finish()
    }
}
