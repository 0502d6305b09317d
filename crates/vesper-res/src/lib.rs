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

//! # Vesper Res
//!
//! Binary resource serialization: the `RSRC` container format with its
//! interactive loader, two-pass saver, dependency renamer, block
//! compression wrapper, variant codec, and the process-wide resource
//! cache.

#![warn(missing_docs)]

pub mod cache;
pub mod codec;
pub mod compressed;
pub mod context;
pub mod loader;
pub mod paths;
pub mod registry;
pub mod renamer;
pub mod saver;
pub mod stream;

pub use cache::ResourceCache;
pub use compressed::CompressedStream;
pub use context::{LoadOptions, SerializationContext};
pub use loader::{dependencies, recognize, resource_type, InteractiveLoader, LoadStatus};
pub use paths::ProjectPaths;
pub use registry::SimpleClassRegistry;
pub use renamer::rename_dependencies;
pub use saver::save;
pub use stream::{ByteStream, FileStream, MemoryStream, StreamError};

/// Magic identifying an uncompressed container, and the trailer of
/// every container.
pub const CONTAINER_MAGIC: &[u8; 4] = b"RSRC";

/// Engine major version written into container headers.
pub const VERSION_MAJOR: u32 = 1;
/// Engine minor version written into container headers.
pub const VERSION_MINOR: u32 = 0;

/// Current container format version.
pub const FORMAT_VERSION: u32 = 3;
/// First format version whose external table can be rewritten in place.
pub const FORMAT_VERSION_CAN_RENAME_DEPS: u32 = 1;
/// First format version that stops reserving a node-path subname slot
/// for the trailing property.
pub const FORMAT_VERSION_NO_NODEPATH_PROPERTY: u32 = 3;
