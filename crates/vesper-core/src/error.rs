// Copyright 2025 eraflo
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

//! Defines the engine-wide typed error surfaced by the core subsystems.
//!
//! Every fallible public operation of the serialization engine and the
//! audio graph returns one of these kinds. Callers dispatch on the
//! variant, never on message text.

use thiserror::Error;

/// The error type shared by the serialization engine and the audio graph.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An underlying I/O operation failed (open, read, write, truncation,
    /// or a corrupt compressed block header).
    #[error("i/o error: {0}")]
    Io(String),

    /// The file's magic bytes do not identify a resource container.
    #[error("unrecognized resource file: {path}")]
    FileUnrecognized {
        /// The path of the offending file.
        path: String,
    },

    /// The file declares a format or engine version newer than this build
    /// can read.
    #[error("file '{path}' uses format {format} / engine {major}.{minor}, which is not supported")]
    VersionUnsupported {
        /// The path of the offending file.
        path: String,
        /// The container format version stored in the header.
        format: u32,
        /// The engine major version stored in the header.
        major: u32,
        /// The engine minor version stored in the header.
        minor: u32,
    },

    /// A tag, length, or table entry in the file contradicts the format.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The class registry has no constructor for a stored type-name.
    #[error("resource type '{type_name}' is not registered")]
    TypeNotRegistered {
        /// The type-name found in the file.
        type_name: String,
    },

    /// A required external dependency could not be loaded.
    #[error("missing dependency '{dependency}' while loading '{path}'")]
    MissingDependency {
        /// The file whose load required the dependency.
        path: String,
        /// The dependency path that failed to load.
        dependency: String,
    },

    /// A resource graph reaches back into the file being written through
    /// an external reference.
    #[error("circular reference through '{path}'")]
    CircularReference {
        /// The path the cycle passes through.
        path: String,
    },

    /// A caller-supplied argument is invalid (bad index, reentrant load,
    /// unnamed bus, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A name or path that must be unique is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}
