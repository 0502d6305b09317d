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

//! Interactive reader for binary resource containers.
//!
//! Opening a loader parses the header and the three tables; each
//! [`poll`](InteractiveLoader::poll) then performs exactly one step:
//! load one external dependency, or decode one internal resource body.
//! The final body is the main resource. The loader holds a loading-map
//! entry for its path from `open` until it is dropped.

use ahash::AHashMap;
use vesper_core::resource::path::{base_dir, is_relative, plus_file, simplify};
use vesper_core::{EngineError, Res};

use crate::codec::{decode_variant, get_ustring, DecodeContext, ResourceResolver};
use crate::compressed::{CompressedStream, COMPRESSED_MAGIC};
use crate::context::{LoadOptions, SerializationContext};
use crate::stream::{ByteStream, FileStream, StreamError};
use crate::{CONTAINER_MAGIC, FORMAT_VERSION, VERSION_MAJOR};

struct ExtEntry {
    type_name: String,
    path: String,
    resource: Option<Res>,
}

struct IntEntry {
    path: String,
    offset: u64,
}

struct Header {
    use_real64: bool,
    ver_format: u32,
    type_name: String,
    #[allow(dead_code)]
    importmd_ofs: u64,
}

/// The outcome of one loader step.
#[derive(Debug, Clone)]
pub enum LoadStatus {
    /// More steps remain; `stage` of `total` are complete.
    InProgress {
        /// Steps completed so far.
        stage: usize,
        /// Total step count (`ext_count + int_count`).
        total: usize,
    },
    /// The main resource finished loading.
    Done(Res),
}

/// Opens the physical stream and consumes the container magic,
/// transparently unwrapping a compressed payload.
fn open_stream(fs_path: &str, local_path: &str) -> Result<Box<dyn ByteStream>, EngineError> {
    let mut stream: Box<dyn ByteStream> = Box::new(FileStream::open_read(fs_path)?);
    let mut magic = [0u8; 4];
    stream.get_buffer(&mut magic);
    if &magic == COMPRESSED_MAGIC {
        stream = Box::new(CompressedStream::open_after_magic(stream)?);
        stream.get_buffer(&mut magic);
    }
    if &magic != CONTAINER_MAGIC {
        return Err(EngineError::FileUnrecognized {
            path: local_path.to_owned(),
        });
    }
    Ok(stream)
}

fn read_header(s: &mut dyn ByteStream, local_path: &str) -> Result<Header, EngineError> {
    let big_endian = s.get_u32() != 0;
    s.set_endian_swap(big_endian);
    let use_real64 = s.get_u32() != 0;
    let ver_major = s.get_u32();
    let ver_minor = s.get_u32();
    let ver_format = s.get_u32();
    if ver_format > FORMAT_VERSION || ver_major > VERSION_MAJOR {
        return Err(EngineError::VersionUnsupported {
            path: local_path.to_owned(),
            format: ver_format,
            major: ver_major,
            minor: ver_minor,
        });
    }
    let type_name = get_ustring(s)?;
    let importmd_ofs = s.get_u64();
    for _ in 0..14 {
        s.get_u32(); // reserved
    }
    if s.get_error() != StreamError::Ok {
        return Err(EngineError::CorruptData("truncated container header".into()));
    }
    Ok(Header {
        use_real64,
        ver_format,
        type_name,
        importmd_ofs,
    })
}

fn read_count(s: &mut dyn ByteStream, what: &str) -> Result<u32, EngineError> {
    let count = s.get_u32();
    // Every table entry holds at least one length-prefixed string.
    if u64::from(count) * 5 > s.len().saturating_sub(s.position()) {
        return Err(EngineError::CorruptData(format!(
            "{what} count {count} exceeds remaining stream"
        )));
    }
    Ok(count)
}

fn read_string_table(s: &mut dyn ByteStream) -> Result<Vec<String>, EngineError> {
    let count = read_count(s, "string table")?;
    let mut table = Vec::with_capacity(count as usize);
    for _ in 0..count {
        table.push(get_ustring(s)?);
    }
    Ok(table)
}

fn read_ext_table(s: &mut dyn ByteStream) -> Result<Vec<ExtEntry>, EngineError> {
    let count = read_count(s, "external table")?;
    let mut table = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let type_name = get_ustring(s)?;
        let path = get_ustring(s)?;
        table.push(ExtEntry {
            type_name,
            path,
            resource: None,
        });
    }
    Ok(table)
}

fn read_int_table(s: &mut dyn ByteStream) -> Result<Vec<IntEntry>, EngineError> {
    let count = read_count(s, "internal table")?;
    let mut table = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let path = get_ustring(s)?;
        let offset = s.get_u64();
        table.push(IntEntry { path, offset });
    }
    if s.get_error() != StreamError::Ok {
        return Err(EngineError::CorruptData("truncated resource tables".into()));
    }
    Ok(table)
}

/// Expands a possibly-relative dependency path against the containing
/// file.
fn expand_dependency(local_path: &str, dep: &str) -> String {
    if is_relative(dep) {
        simplify(&plus_file(&base_dir(local_path), dep))
    } else {
        dep.to_owned()
    }
}

struct LoaderResolver<'r> {
    ctx: &'r SerializationContext,
    options: &'r LoadOptions,
    local_path: &'r str,
    external: &'r [ExtEntry],
    internal_cache: &'r AHashMap<String, Res>,
}

impl ResourceResolver for LoaderResolver<'_> {
    fn external_by_index(&mut self, index: u32) -> Result<Option<Res>, EngineError> {
        let entry = self.external.get(index as usize).ok_or_else(|| {
            EngineError::CorruptData(format!(
                "external reference index {index} outside external table"
            ))
        })?;
        match &entry.resource {
            Some(res) => Ok(Some(res.clone())),
            None => {
                log::warn!(
                    "'{}': external '{}' is unavailable, substituting null",
                    self.local_path,
                    entry.path
                );
                Ok(None)
            }
        }
    }

    fn external_by_path(&mut self, path: &str) -> Result<Option<Res>, EngineError> {
        let full = expand_dependency(self.local_path, path);
        match self.ctx.load_with(&full, self.options) {
            Ok(res) => Ok(Some(res)),
            Err(_) if !self.options.abort_on_missing => {
                self.ctx.report_dependency_error(self.local_path, &full);
                Ok(None)
            }
            Err(_) => Err(EngineError::MissingDependency {
                path: self.local_path.to_owned(),
                dependency: full,
            }),
        }
    }

    fn internal_by_index(&mut self, index: u32) -> Result<Option<Res>, EngineError> {
        let path = format!("{}::{}", self.local_path, index);
        match self.internal_cache.get(&path) {
            Some(res) => Ok(Some(res.clone())),
            None => {
                log::warn!("internal reference '{path}' has no loaded body, substituting null");
                Ok(None)
            }
        }
    }
}

/// Step-at-a-time loader for one container file.
pub struct InteractiveLoader<'a> {
    ctx: &'a SerializationContext,
    options: LoadOptions,
    stream: Box<dyn ByteStream>,
    local_path: String,
    use_real64: bool,
    ver_format: u32,
    type_name: String,
    string_table: Vec<String>,
    external: Vec<ExtEntry>,
    internal: Vec<IntEntry>,
    stage: usize,
    internal_cache: AHashMap<String, Res>,
    resource: Option<Res>,
}

impl<'a> InteractiveLoader<'a> {
    pub(crate) fn open(
        ctx: &'a SerializationContext,
        path: &str,
        options: LoadOptions,
    ) -> Result<Self, EngineError> {
        ctx.begin_load(path)?;
        match Self::open_inner(ctx, path, options) {
            Ok(loader) => Ok(loader),
            Err(err) => {
                ctx.end_load(path);
                Err(err)
            }
        }
    }

    fn open_inner(
        ctx: &'a SerializationContext,
        path: &str,
        options: LoadOptions,
    ) -> Result<Self, EngineError> {
        let fs_path = ctx.paths().globalize(path);
        let mut stream = open_stream(&fs_path, path)?;
        let header = read_header(stream.as_mut(), path)?;
        let string_table = read_string_table(stream.as_mut())?;
        let external = read_ext_table(stream.as_mut())?;
        let internal = read_int_table(stream.as_mut())?;
        if internal.is_empty() {
            return Err(EngineError::CorruptData(format!(
                "'{path}' declares no internal resources"
            )));
        }
        log::debug!(
            "opened '{path}': format {}, {} strings, {} external, {} internal",
            header.ver_format,
            string_table.len(),
            external.len(),
            internal.len()
        );
        Ok(Self {
            ctx,
            options,
            stream,
            local_path: path.to_owned(),
            use_real64: header.use_real64,
            ver_format: header.ver_format,
            type_name: header.type_name,
            string_table,
            external,
            internal,
            stage: 0,
            internal_cache: AHashMap::new(),
            resource: None,
        })
    }

    /// The type-name of the main resource, known before any body loads.
    pub fn resource_type(&self) -> &str {
        &self.type_name
    }

    /// Steps completed so far.
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Total number of steps (`ext_count + int_count`).
    pub fn stage_count(&self) -> usize {
        self.external.len() + self.internal.len()
    }

    /// The main resource, once loading has finished.
    pub fn get_resource(&self) -> Option<Res> {
        self.resource.clone()
    }

    /// Advances the load by one step.
    pub fn poll(&mut self) -> Result<LoadStatus, EngineError> {
        if let Some(res) = &self.resource {
            return Ok(LoadStatus::Done(res.clone()));
        }
        let ext_count = self.external.len();
        if self.stage < ext_count {
            self.load_external(self.stage)?;
        } else {
            let index = self.stage - ext_count;
            if let Some(main) = self.load_internal(index)? {
                self.stage += 1;
                self.resource = Some(main.clone());
                return Ok(LoadStatus::Done(main));
            }
        }
        self.stage += 1;
        Ok(LoadStatus::InProgress {
            stage: self.stage,
            total: self.stage_count(),
        })
    }

    fn load_external(&mut self, index: usize) -> Result<(), EngineError> {
        let mut path = expand_dependency(&self.local_path, &self.external[index].path);
        if let Some(mapped) = self.options.remaps.get(&path) {
            path = mapped.clone();
        }
        match self.ctx.load_with(&path, &self.options) {
            Ok(res) => {
                self.external[index].resource = Some(res);
                Ok(())
            }
            Err(err) => {
                if self.options.abort_on_missing {
                    log::debug!("'{}': dependency failed: {err}", self.local_path);
                    return Err(EngineError::MissingDependency {
                        path: self.local_path.clone(),
                        dependency: path,
                    });
                }
                self.ctx.report_dependency_error(&self.local_path, &path);
                self.external[index].resource = None;
                Ok(())
            }
        }
    }

    /// Loads internal body `index`; returns the resource when it is the
    /// main one.
    fn load_internal(&mut self, index: usize) -> Result<Option<Res>, EngineError> {
        let main = index + 1 == self.internal.len();
        let entry_path = self.internal[index].path.clone();
        let (subpath, subindex) = if let Some(rest) = entry_path.strip_prefix("local://") {
            let n: u32 = rest.parse().map_err(|_| {
                EngineError::CorruptData(format!("invalid internal path '{entry_path}'"))
            })?;
            (format!("{}::{}", self.local_path, n), n)
        } else {
            (entry_path, 0)
        };

        if !main && !self.options.no_subresource_cache {
            if let Some(cached) = self.ctx.cache().get(&subpath) {
                self.internal_cache.insert(subpath, cached);
                return Ok(None);
            }
        }

        self.stream.seek(self.internal[index].offset);
        let type_name = get_ustring(self.stream.as_mut())?;
        let res = self
            .ctx
            .registry()
            .instantiate(&type_name)
            .ok_or(EngineError::TypeNotRegistered { type_name })?;

        let path = if main {
            self.local_path.clone()
        } else {
            subpath
        };
        res.set_path(&path);
        res.set_subindex(subindex);

        let prop_count = self.stream.get_u32();
        for _ in 0..prop_count {
            let name_index = self.stream.get_u32();
            let name = self
                .string_table
                .get(name_index as usize)
                .cloned()
                .ok_or_else(|| {
                    EngineError::CorruptData(format!(
                        "property name index {name_index} outside string table"
                    ))
                })?;
            let mut resolver = LoaderResolver {
                ctx: self.ctx,
                options: &self.options,
                local_path: &self.local_path,
                external: &self.external,
                internal_cache: &self.internal_cache,
            };
            let value = decode_variant(
                self.stream.as_mut(),
                &mut DecodeContext {
                    ver_format: self.ver_format,
                    use_real64: self.use_real64,
                    string_table: &self.string_table,
                    resolver: &mut resolver,
                },
            )?;
            res.set_property(name, value);
        }
        if self.stream.get_error() != StreamError::Ok {
            return Err(EngineError::CorruptData(
                "resource body ran past end of file".into(),
            ));
        }

        self.internal_cache.insert(path.clone(), res.clone());
        self.ctx.cache().put(&path, &res);
        Ok(main.then_some(res))
    }
}

impl Drop for InteractiveLoader<'_> {
    fn drop(&mut self) {
        self.ctx.end_load(&self.local_path);
    }
}

/// Returns `true` if the file at `path` carries a container magic.
pub fn recognize(ctx: &SerializationContext, path: &str) -> bool {
    let fs_path = ctx.paths().globalize(path);
    open_stream(&fs_path, path).is_ok()
}

/// Reads the main resource's type-name without loading any body.
pub fn resource_type(ctx: &SerializationContext, path: &str) -> Result<String, EngineError> {
    let fs_path = ctx.paths().globalize(path);
    let mut stream = open_stream(&fs_path, path)?;
    let header = read_header(stream.as_mut(), path)?;
    Ok(header.type_name)
}

/// Lists the external dependencies recorded in the file's table, in
/// table order. With `add_types`, each entry is suffixed `::<type>`
/// when the type was recorded.
pub fn dependencies(
    ctx: &SerializationContext,
    path: &str,
    add_types: bool,
) -> Result<Vec<String>, EngineError> {
    let fs_path = ctx.paths().globalize(path);
    let mut stream = open_stream(&fs_path, path)?;
    read_header(stream.as_mut(), path)?;
    read_string_table(stream.as_mut())?;
    let external = read_ext_table(stream.as_mut())?;
    Ok(external
        .into_iter()
        .map(|entry| {
            if add_types && !entry.type_name.is_empty() {
                format!("{}::{}", entry.path, entry.type_name)
            } else {
                entry.path
            }
        })
        .collect())
}
