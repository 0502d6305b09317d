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

//! Two-pass writer for binary resource containers.
//!
//! Pass A walks the property graph depth-first, splitting reachable
//! resources into externals (real path, referenced by table index) and
//! internals (emitted as bodies, main resource last) while interning
//! property names and node-path tokens. Pass B emits header, tables and
//! bodies, then seeks back to patch the body offsets recorded as
//! placeholders.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use vesper_core::resource::path::path_to_file;
use vesper_core::{EngineError, Res, Variant};

use crate::codec::{encode_variant, store_ustring, EncodeContext, ObjectRef, ResourceInterner};
use crate::compressed::{CompressedStream, DEFAULT_BLOCK_SIZE};
use crate::context::SerializationContext;
use crate::stream::{ByteStream, FileStream, StreamError};
use crate::{CONTAINER_MAGIC, FORMAT_VERSION, VERSION_MAJOR, VERSION_MINOR};

/// Emit external-reference paths relative to the output file.
pub const FLAG_RELATIVE_PATHS: u32 = 1;
/// Inline every reachable resource as an internal body.
pub const FLAG_BUNDLE_RESOURCES: u32 = 2;
/// Re-path the main resource to the output path.
pub const FLAG_CHANGE_PATH: u32 = 4;
/// Skip properties whose name starts with `__editor`.
pub const FLAG_OMIT_EDITOR_PROPERTIES: u32 = 8;
/// Write every multi-byte scalar big-endian.
pub const FLAG_SAVE_BIG_ENDIAN: u32 = 16;
/// Wrap the payload in the block-compressed container.
pub const FLAG_COMPRESS: u32 = 32;
/// Rewrite sub-resource paths to point into the output file.
pub const FLAG_REPLACE_SUBRESOURCE_PATHS: u32 = 64;

/// Identity key for a resource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ResKey(usize);

impl ResKey {
    fn of(res: &Res) -> Self {
        Self(Arc::as_ptr(res) as usize)
    }
}

struct SaveInterner<'s> {
    external_index: &'s AHashMap<ResKey, u32>,
    resource_set: &'s AHashSet<ResKey>,
    string_map: &'s AHashMap<String, u32>,
}

impl ResourceInterner for SaveInterner<'_> {
    fn object_ref(&mut self, res: &Res) -> ObjectRef {
        let key = ResKey::of(res);
        if let Some(&index) = self.external_index.get(&key) {
            return ObjectRef::ExternalIndex(index);
        }
        if self.resource_set.contains(&key) {
            return ObjectRef::Internal(res.subindex());
        }
        ObjectRef::Empty
    }

    fn string_index(&mut self, token: &str) -> Option<u32> {
        self.string_map.get(token).copied()
    }
}

struct SaveSession<'a> {
    ctx: &'a SerializationContext,
    local_path: String,
    relative_paths: bool,
    bundle: bool,
    takeover: bool,
    skip_editor: bool,
    resource_set: AHashSet<ResKey>,
    external: Vec<Res>,
    external_index: AHashMap<ResKey, u32>,
    saved: Vec<Res>,
    string_map: AHashMap<String, u32>,
    strings: Vec<String>,
}

impl SaveSession<'_> {
    fn get_string_index(&mut self, text: &str) -> u32 {
        if let Some(&index) = self.string_map.get(text) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(text.to_owned());
        self.string_map.insert(text.to_owned(), index);
        index
    }

    /// Pass A over one resource.
    fn find_resources_in(&mut self, res: &Res, main: bool) -> Result<(), EngineError> {
        let key = ResKey::of(res);
        if self.resource_set.contains(&key) || self.external_index.contains_key(&key) {
            return Ok(());
        }

        let path = res.path();
        if !main && !self.bundle && !path.is_empty() && !path.contains("::") {
            if path == self.local_path {
                return Err(EngineError::CircularReference { path });
            }
            self.external_index.insert(key, self.external.len() as u32);
            self.external.push(res.clone());
            return Ok(());
        }

        // Inserted before recursing so reference cycles terminate.
        self.resource_set.insert(key);
        for (_, value) in res.properties() {
            self.find_resources_in_variant(&value)?;
        }
        self.saved.push(res.clone());
        Ok(())
    }

    fn find_resources_in_variant(&mut self, value: &Variant) -> Result<(), EngineError> {
        match value {
            Variant::Object(Some(res)) => self.find_resources_in(res, false)?,
            Variant::Array(items) => {
                for item in items {
                    self.find_resources_in_variant(item)?;
                }
            }
            Variant::Dictionary(dict) => {
                for (_, item) in dict.iter() {
                    self.find_resources_in_variant(item)?;
                }
            }
            Variant::NodePath(np) => {
                for token in np.names().iter().chain(np.subnames()) {
                    self.get_string_index(token);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn needs_local_entry(&self, res: &Res, is_main: bool) -> bool {
        let path = res.path();
        path.is_empty() || path.contains("::") || (self.bundle && !is_main)
    }

    /// Assigns sub-indices to internal bodies that need one, keeping
    /// explicit indices where they are unique. `takeover` additionally
    /// re-points sub-resource paths into the output file.
    ///
    /// Two passes: all explicit indices are claimed before any fresh
    /// one is handed out, so a previously saved sub-resource keeps its
    /// index no matter where it sits in discovery order.
    fn assign_subindices(&mut self) {
        let main_key = self
            .saved
            .last()
            .map(ResKey::of)
            .unwrap_or(ResKey(0));

        let mut used: AHashSet<u32> = AHashSet::new();
        for res in &self.saved {
            if !self.needs_local_entry(res, ResKey::of(res) == main_key) {
                continue;
            }
            let subindex = res.subindex();
            if subindex != 0 && !used.insert(subindex) {
                log::warn!(
                    "duplicate sub-index {subindex} under '{}', reassigning",
                    self.local_path
                );
                res.set_subindex(0);
            }
        }

        let mut next = used.iter().copied().max().unwrap_or(0);
        for res in &self.saved {
            let is_main = ResKey::of(res) == main_key;
            if !self.needs_local_entry(res, is_main) {
                continue;
            }
            let mut subindex = res.subindex();
            if subindex == 0 {
                next += 1;
                subindex = next;
                res.set_subindex(subindex);
            }

            if self.takeover && !is_main {
                let new_path = format!("{}::{}", self.local_path, subindex);
                res.set_path(&new_path);
                self.ctx.cache().put(&new_path, res);
            }
        }
    }

    /// Builds the filtered, name-interned property list for one body.
    fn prepare_properties(&mut self, res: &Res) -> Vec<(u32, Variant)> {
        let mut out = Vec::new();
        for (name, value) in res.properties() {
            if self.skip_editor && name.starts_with("__editor") {
                continue;
            }
            if let Some(default) = self
                .ctx
                .registry()
                .default_property_value(res.type_name(), &name)
            {
                if default == value {
                    continue;
                }
            }
            let index = self.get_string_index(&name);
            out.push((index, value));
        }
        out
    }

    fn internal_entry_path(&self, res: &Res, is_main: bool) -> String {
        if self.needs_local_entry(res, is_main) {
            format!("local://{}", res.subindex())
        } else {
            res.path()
        }
    }
}

/// Saves a resource graph to `path` as a binary container.
pub fn save(
    ctx: &SerializationContext,
    path: &str,
    resource: &Res,
    flags: u32,
) -> Result<(), EngineError> {
    if flags & FLAG_CHANGE_PATH != 0 {
        resource.set_path(path);
    }

    let mut session = SaveSession {
        ctx,
        local_path: path.to_owned(),
        relative_paths: flags & FLAG_RELATIVE_PATHS != 0,
        bundle: flags & FLAG_BUNDLE_RESOURCES != 0,
        takeover: flags & FLAG_REPLACE_SUBRESOURCE_PATHS != 0 && path.starts_with("res://"),
        skip_editor: flags & FLAG_OMIT_EDITOR_PROPERTIES != 0,
        resource_set: AHashSet::new(),
        external: Vec::new(),
        external_index: AHashMap::new(),
        saved: Vec::new(),
        string_map: AHashMap::new(),
        strings: Vec::new(),
    };

    session.find_resources_in(resource, true)?;
    session.assign_subindices();

    let bodies: Vec<(Res, Vec<(u32, Variant)>)> = session
        .saved
        .clone()
        .into_iter()
        .map(|res| {
            let props = session.prepare_properties(&res);
            (res, props)
        })
        .collect();

    let fs_path = ctx.paths().globalize(path);
    let mut stream: Box<dyn ByteStream> = if flags & FLAG_COMPRESS != 0 {
        Box::new(CompressedStream::new_write(
            Box::new(FileStream::create(&fs_path)?),
            DEFAULT_BLOCK_SIZE,
        ))
    } else {
        Box::new(FileStream::create(&fs_path)?)
    };
    let s = stream.as_mut();

    s.store_buffer(CONTAINER_MAGIC);
    let big_endian = flags & FLAG_SAVE_BIG_ENDIAN != 0;
    s.store_u32(u32::from(big_endian));
    s.set_endian_swap(big_endian);
    s.store_u32(0); // 32-bit reals
    s.store_u32(VERSION_MAJOR);
    s.store_u32(VERSION_MINOR);
    s.store_u32(FORMAT_VERSION);
    store_ustring(s, resource.type_name());
    s.store_u64(0); // metadata offset, unused
    for _ in 0..14 {
        s.store_u32(0); // reserved
    }

    s.store_u32(session.strings.len() as u32);
    for text in &session.strings {
        store_ustring(s, text);
    }

    s.store_u32(session.external.len() as u32);
    for res in &session.external {
        store_ustring(s, res.type_name());
        let dep_path = res.path();
        let written = if session.relative_paths {
            path_to_file(&session.local_path, &dep_path)
        } else {
            dep_path
        };
        store_ustring(s, &written);
    }

    let main_key = bodies.last().map(|(r, _)| ResKey::of(r)).unwrap_or(ResKey(0));
    s.store_u32(bodies.len() as u32);
    let mut placeholder_positions = Vec::with_capacity(bodies.len());
    for (res, _) in &bodies {
        let entry = session.internal_entry_path(res, ResKey::of(res) == main_key);
        store_ustring(s, &entry);
        placeholder_positions.push(s.position());
        s.store_u64(0);
    }

    let mut body_offsets = Vec::with_capacity(bodies.len());
    for (res, props) in &bodies {
        body_offsets.push(s.position());
        store_ustring(s, res.type_name());
        s.store_u32(props.len() as u32);
        for (name_index, value) in props {
            s.store_u32(*name_index);
            let mut interner = SaveInterner {
                external_index: &session.external_index,
                resource_set: &session.resource_set,
                string_map: &session.string_map,
            };
            encode_variant(s, value, &mut EncodeContext {
                interner: &mut interner,
            })?;
        }
    }

    for (position, offset) in placeholder_positions.iter().zip(&body_offsets) {
        s.seek(*position);
        s.store_u64(*offset);
    }
    s.seek_end(0);
    s.store_buffer(CONTAINER_MAGIC);

    if s.get_error() != StreamError::Ok {
        return Err(EngineError::Io(format!("failed writing '{path}'")));
    }
    stream.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::ProjectPaths;
    use crate::registry::SimpleClassRegistry;
    use vesper_core::Resource;

    fn context(root: &std::path::Path) -> SerializationContext {
        let registry = SimpleClassRegistry::new();
        registry.register_basic("Thing");
        SerializationContext::new(Arc::new(registry), Arc::new(ProjectPaths::rooted(root)))
    }

    #[test]
    fn circular_reference_through_output_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let root = Resource::new("Thing");
        let dep = Resource::new("Thing");
        dep.set_path("res://out.res"); // resolves to the file being written
        root.set_property("dep", Variant::Object(Some(dep)));
        assert!(matches!(
            save(&ctx, "res://out.res", &root, 0),
            Err(EngineError::CircularReference { .. })
        ));
    }

    #[test]
    fn duplicate_subindices_are_reassigned() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let root = Resource::new("Thing");
        let a = Resource::new("Thing");
        let b = Resource::new("Thing");
        a.set_subindex(3);
        b.set_subindex(3);
        root.set_property("a", Variant::Object(Some(a.clone())));
        root.set_property("b", Variant::Object(Some(b.clone())));
        save(&ctx, "res://dup.res", &root, 0).unwrap();
        assert_ne!(a.subindex(), b.subindex());
        assert!(a.subindex() == 3 || b.subindex() == 3);
    }

    #[test]
    fn explicit_subindices_survive_fresh_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let root = Resource::new("Thing");
        let fresh = Resource::new("Thing");
        let kept = Resource::new("Thing");
        kept.set_subindex(1);
        // Discovery visits the fresh resource first; it must not claim
        // index 1 out from under the previously saved sibling.
        root.set_property("a", Variant::Object(Some(fresh.clone())));
        root.set_property("b", Variant::Object(Some(kept.clone())));
        save(&ctx, "res://out.res", &root, 0).unwrap();
        assert_eq!(kept.subindex(), 1);
        assert_eq!(fresh.subindex(), 2);
    }

    #[test]
    fn takeover_rewrites_subresource_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let root = Resource::new("Thing");
        let sub = Resource::new("Thing");
        root.set_property("sub", Variant::Object(Some(sub.clone())));
        save(&ctx, "res://owner.res", &root, FLAG_REPLACE_SUBRESOURCE_PATHS).unwrap();
        let sub_path = sub.path();
        assert!(sub_path.starts_with("res://owner.res::"), "{sub_path}");
        assert!(ctx.cache().has(&sub_path));
    }
}
