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

//! Coverage for in-place external-reference rewriting.

use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use vesper_core::{Resource, Variant};
use vesper_res::codec::get_ustring;
use vesper_res::saver::{FLAG_CHANGE_PATH, FLAG_COMPRESS, FLAG_RELATIVE_PATHS};
use vesper_res::{
    dependencies, rename_dependencies, save, ByteStream, MemoryStream, ProjectPaths,
    SerializationContext, SimpleClassRegistry,
};

fn make_ctx(root: &Path) -> SerializationContext {
    let registry = SimpleClassRegistry::new();
    registry.register_basic("Thing");
    registry.register_basic("Material");
    SerializationContext::new(Arc::new(registry), Arc::new(ProjectPaths::rooted(root)))
}

struct Layout {
    metadata_offset: u64,
    externals: Vec<(String, String)>,
    internal_offsets: Vec<u64>,
    /// Bytes from the first body to the end of the file.
    tail: Vec<u8>,
}

fn read_layout(bytes: Vec<u8>) -> Layout {
    let mut s = MemoryStream::from_vec(bytes.clone());
    let mut magic = [0u8; 4];
    s.get_buffer(&mut magic);
    assert_eq!(&magic, b"RSRC");
    let big_endian = s.get_u32() != 0;
    s.set_endian_swap(big_endian);
    for _ in 0..4 {
        s.get_u32(); // real64 + version triple
    }
    get_ustring(&mut s).unwrap();
    let metadata_offset = s.get_u64();
    for _ in 0..14 {
        s.get_u32();
    }
    let string_count = s.get_u32();
    for _ in 0..string_count {
        get_ustring(&mut s).unwrap();
    }
    let ext_count = s.get_u32();
    let externals = (0..ext_count)
        .map(|_| {
            (
                get_ustring(&mut s).unwrap(),
                get_ustring(&mut s).unwrap(),
            )
        })
        .collect();
    let int_count = s.get_u32();
    let internal_offsets = (0..int_count).map(|_| {
        get_ustring(&mut s).unwrap();
        s.get_u64()
    })
    .collect();
    let tail = bytes[s.position() as usize..].to_vec();
    Layout {
        metadata_offset,
        externals,
        internal_offsets,
        tail,
    }
}

fn save_root_with_dep(ctx: &SerializationContext, root_path: &str, dep_path: &str, flags: u32) {
    let dep = Resource::new("Material");
    dep.set_property("tint", Variant::Float(0.25));
    save(ctx, dep_path, &dep, FLAG_CHANGE_PATH).unwrap();
    let root = Resource::new("Thing");
    root.set_property("material", Variant::Object(Some(dep)));
    root.set_property("x", Variant::Int(7));
    save(ctx, root_path, &root, flags).unwrap();
}

#[test]
fn rename_shifts_offsets_and_keeps_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path());
    save_root_with_dep(&ctx, "res://root.res", "res://dep.res", 0);

    let before = read_layout(std::fs::read(dir.path().join("root.res")).unwrap());
    assert_eq!(before.externals[0].1, "res://dep.res");

    let mut renames = AHashMap::new();
    renames.insert(
        "res://dep.res".to_owned(),
        "res://renamed_dep.res".to_owned(),
    );
    rename_dependencies(&ctx, "res://root.res", &renames).unwrap();

    let after = read_layout(std::fs::read(dir.path().join("root.res")).unwrap());
    assert_eq!(after.externals[0].1, "res://renamed_dep.res");
    let diff = ("res://renamed_dep.res".len() - "res://dep.res".len()) as u64;
    assert!(diff > 0);
    for (old, new) in before.internal_offsets.iter().zip(&after.internal_offsets) {
        assert_eq!(old + diff, *new);
    }
    assert_eq!(before.metadata_offset + diff, after.metadata_offset);
    assert_eq!(before.tail, after.tail);
    assert!(!dir.path().join("root.res.depren").exists());

    // Put the dependency at its new name and the graph still loads.
    std::fs::rename(
        dir.path().join("dep.res"),
        dir.path().join("renamed_dep.res"),
    )
    .unwrap();
    let ctx = make_ctx(dir.path());
    let loaded = ctx.load("res://root.res").unwrap();
    let dep = loaded.get_property("material").unwrap();
    assert_eq!(dep.as_object().unwrap().path(), "res://renamed_dep.res");
}

#[test]
fn rename_preserves_relative_form() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path());
    save_root_with_dep(&ctx, "res://root.res", "res://dep.res", FLAG_RELATIVE_PATHS);
    assert_eq!(
        dependencies(&ctx, "res://root.res", false).unwrap(),
        vec!["dep.res".to_owned()]
    );

    let mut renames = AHashMap::new();
    renames.insert("res://dep.res".to_owned(), "res://other.res".to_owned());
    rename_dependencies(&ctx, "res://root.res", &renames).unwrap();

    assert_eq!(
        dependencies(&ctx, "res://root.res", false).unwrap(),
        vec!["other.res".to_owned()]
    );
}

#[test]
fn rename_works_on_compressed_containers() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path());
    save_root_with_dep(&ctx, "res://root.res", "res://dep.res", FLAG_COMPRESS);

    let mut renames = AHashMap::new();
    renames.insert("res://dep.res".to_owned(), "res://moved.res".to_owned());
    rename_dependencies(&ctx, "res://root.res", &renames).unwrap();

    let header = std::fs::read(dir.path().join("root.res")).unwrap();
    assert_eq!(&header[..4], b"RSCC");

    std::fs::rename(dir.path().join("dep.res"), dir.path().join("moved.res")).unwrap();
    let ctx = make_ctx(dir.path());
    let loaded = ctx.load("res://root.res").unwrap();
    assert_eq!(loaded.get_property("x"), Some(Variant::Int(7)));
}

#[test]
fn unmapped_references_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path());
    save_root_with_dep(&ctx, "res://root.res", "res://dep.res", 0);

    let mut renames = AHashMap::new();
    renames.insert(
        "res://unrelated.res".to_owned(),
        "res://elsewhere.res".to_owned(),
    );
    rename_dependencies(&ctx, "res://root.res", &renames).unwrap();

    assert_eq!(
        dependencies(&ctx, "res://root.res", false).unwrap(),
        vec!["res://dep.res".to_owned()]
    );
    let loaded = ctx.load("res://root.res").unwrap();
    assert_eq!(loaded.get_property("x"), Some(Variant::Int(7)));
}

#[test]
fn pre_rename_formats_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = MemoryStream::new();
    s.store_buffer(b"RSRC");
    s.store_u32(0);
    s.store_u32(0);
    s.store_u32(1);
    s.store_u32(0);
    s.store_u32(0); // format predating renameable tables
    std::fs::write(dir.path().join("old.res"), s.into_vec()).unwrap();

    let ctx = make_ctx(dir.path());
    let renames = AHashMap::new();
    assert!(matches!(
        rename_dependencies(&ctx, "res://old.res", &renames),
        Err(vesper_core::EngineError::VersionUnsupported { format: 0, .. })
    ));
}
