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

//! Error types

use std::fmt;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// `spawn` with the free list empty and the index space exhausted.
    EntityLimitExceeded,

    /// Metadata requested for an unregistered component type.
    UnknownComponent(String),

    /// A component type was registered twice.
    DuplicateRegistration(String),

    /// `view.column` addressed a component/field that isn't resident.
    ColumnNotFound { component: String, field: String },

    /// `hooks.register` called on a component that already has hooks.
    DuplicateHooks(String),

    /// `event_queue.flush` called while already flushing.
    ReentrantFlush,

    /// Scheduler detected a dependency cycle while compiling a phase.
    CircularSystemDependency(String),

    /// Snapshot restore found no migration path to the current version.
    NoMigrationPath { from: String, to: String },

    /// Snapshot restore found an incompatible version with no migrations at all.
    VersionMismatch { found: String, expected: String },

    /// Snapshot restore referenced a relation type that isn't registered.
    UnknownRelation(String),

    /// A component field name referenced during restore doesn't exist.
    UnknownField { component: String, field: String },

    /// A field's declared primitive type didn't match the value supplied.
    TypeMismatch { field: String, expected: &'static str },

    /// Serialization failed while producing a snapshot.
    SerializationError(String),

    /// Deserialization failed while restoring a snapshot.
    DeserializationError(String),

    /// I/O failure surfaced while reading/writing a snapshot document.
    IoError(String),

    /// A relation or entity-ref operation addressed a non-live entity.
    DeadEntity,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityLimitExceeded => write!(f, "entity limit exceeded"),
            EcsError::UnknownComponent(name) => write!(f, "unknown component: {name}"),
            EcsError::DuplicateRegistration(name) => {
                write!(f, "component already registered: {name}")
            }
            EcsError::ColumnNotFound { component, field } => {
                write!(f, "column not found: {component}.{field}")
            }
            EcsError::DuplicateHooks(name) => write!(f, "hooks already registered for {name}"),
            EcsError::ReentrantFlush => write!(f, "event queue is already flushing"),
            EcsError::CircularSystemDependency(msg) => {
                write!(f, "circular system dependency: {msg}")
            }
            EcsError::NoMigrationPath { from, to } => {
                write!(f, "no migration path from {from} to {to}")
            }
            EcsError::VersionMismatch { found, expected } => {
                write!(f, "version mismatch: found {found}, expected {expected}")
            }
            EcsError::UnknownRelation(name) => write!(f, "unknown relation: {name}"),
            EcsError::UnknownField { component, field } => {
                write!(f, "unknown field: {component}.{field}")
            }
            EcsError::TypeMismatch { field, expected } => {
                write!(f, "type mismatch on field {field}: expected {expected}")
            }
            EcsError::SerializationError(msg) => write!(f, "serialization error: {msg}"),
            EcsError::DeserializationError(msg) => write!(f, "deserialization error: {msg}"),
            EcsError::IoError(msg) => write!(f, "io error: {msg}"),
            EcsError::DeadEntity => write!(f, "operation addressed a non-live entity"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<std::io::Error> for EcsError {
    fn from(err: std::io::Error) -> Self {
        EcsError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::SerializationError(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
