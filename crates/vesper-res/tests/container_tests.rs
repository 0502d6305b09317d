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

//! End-to-end save/load coverage for the binary container.

use std::path::Path;
use std::sync::Arc;

use vesper_core::{Resource, Variant};
use vesper_res::codec::get_ustring;
use vesper_res::saver::{
    FLAG_CHANGE_PATH, FLAG_COMPRESS, FLAG_RELATIVE_PATHS, FLAG_SAVE_BIG_ENDIAN,
};
use vesper_res::{
    dependencies, recognize, resource_type, save, ByteStream, CompressedStream, FileStream,
    LoadOptions, LoadStatus, MemoryStream, ProjectPaths, SerializationContext,
    SimpleClassRegistry,
};

fn make_ctx(root: &Path) -> SerializationContext {
    let registry = SimpleClassRegistry::new();
    registry.register_basic("Thing");
    registry.register_basic("Material");
    SerializationContext::new(Arc::new(registry), Arc::new(ProjectPaths::rooted(root)))
}

struct ParsedFile {
    strings: Vec<String>,
    externals: Vec<(String, String)>,
    internals: Vec<(String, u64)>,
    metadata_offset: u64,
    body_start: u64,
}

/// Walks header and tables of a raw container image.
fn parse_tables(bytes: Vec<u8>) -> ParsedFile {
    let mut s = MemoryStream::from_vec(bytes);
    let mut magic = [0u8; 4];
    s.get_buffer(&mut magic);
    assert_eq!(&magic, b"RSRC");
    let big_endian = s.get_u32() != 0;
    s.set_endian_swap(big_endian);
    let _real64 = s.get_u32();
    let _major = s.get_u32();
    let _minor = s.get_u32();
    let _format = s.get_u32();
    get_ustring(&mut s).unwrap(); // main type
    let metadata_offset = s.get_u64();
    for _ in 0..14 {
        s.get_u32();
    }

    let string_count = s.get_u32();
    let strings = (0..string_count)
        .map(|_| get_ustring(&mut s).unwrap())
        .collect();
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
    let internals = (0..int_count)
        .map(|_| (get_ustring(&mut s).unwrap(), s.get_u64()))
        .collect();
    let body_start = s.position();
    ParsedFile {
        strings,
        externals,
        internals,
        metadata_offset,
        body_start,
    }
}

#[test]
fn two_internal_resources_share_one_string_table() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path());

    let sub = Resource::new("Thing");
    sub.set_property("y", Variant::Int(-2));
    let root = Resource::new("Thing");
    root.set_property("x", Variant::Float(1.5));
    root.set_property("child", Variant::Object(Some(sub)));

    save(&ctx, "res://graph.res", &root, 0).unwrap();

    let bytes = std::fs::read(dir.path().join("graph.res")).unwrap();
    let parsed = parse_tables(bytes);
    assert!(parsed.externals.is_empty());
    assert_eq!(parsed.internals.len(), 2);
    assert_eq!(parsed.internals[0].0, "local://1");
    assert!(parsed.strings.iter().filter(|s| *s == "x").count() == 1);
    assert!(parsed.strings.iter().filter(|s| *s == "y").count() == 1);
    // Each internal offset lands on a parseable body of the recorded type.
    let bytes = std::fs::read(dir.path().join("graph.res")).unwrap();
    for (_, offset) in &parsed.internals {
        assert!(*offset >= parsed.body_start);
        let mut s = MemoryStream::from_vec(bytes.clone());
        s.seek(*offset);
        assert_eq!(get_ustring(&mut s).unwrap(), "Thing");
    }
}

#[test]
fn saved_graph_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let sub = Resource::new("Thing");
        sub.set_property("y", Variant::Int(-2));
        let root = Resource::new("Thing");
        root.set_property("x", Variant::Float(1.5));
        root.set_property("child", Variant::Object(Some(sub)));
        save(&ctx, "res://graph.res", &root, 0).unwrap();
    }

    let ctx = make_ctx(dir.path());
    let loaded = ctx.load("res://graph.res").unwrap();
    assert_eq!(loaded.path(), "res://graph.res");
    assert_eq!(loaded.get_property("x"), Some(Variant::Float(1.5)));
    let child = loaded.get_property("child").unwrap();
    let child = child.as_object().unwrap();
    assert_eq!(child.get_property("y"), Some(Variant::Int(-2)));
    assert_eq!(child.path(), "res://graph.res::1");
    assert_eq!(child.subindex(), 1);
}

#[test]
fn shared_subresource_keeps_identity() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let shared = Resource::new("Material");
        let root = Resource::new("Thing");
        root.set_property("left", Variant::Object(Some(shared.clone())));
        root.set_property("right", Variant::Object(Some(shared)));
        save(&ctx, "res://shared.res", &root, 0).unwrap();
    }

    let ctx = make_ctx(dir.path());
    let loaded = ctx.load("res://shared.res").unwrap();
    // One body, referenced twice; identity survives the round trip.
    assert_eq!(loaded.get_property("left"), loaded.get_property("right"));
}

#[test]
fn default_valued_properties_are_elided() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = SimpleClassRegistry::new();
        registry.register_basic("Thing");
        registry.set_default("Thing", "visible", Variant::Bool(true));
        let ctx = SerializationContext::new(
            Arc::new(registry),
            Arc::new(ProjectPaths::rooted(dir.path())),
        );
        let root = Resource::new("Thing");
        root.set_property("visible", Variant::Bool(true));
        root.set_property("speed", Variant::Float(2.0));
        save(&ctx, "res://elide.res", &root, 0).unwrap();
    }

    let ctx = make_ctx(dir.path());
    let loaded = ctx.load("res://elide.res").unwrap();
    assert_eq!(loaded.get_property("visible"), None);
    assert_eq!(loaded.get_property("speed"), Some(Variant::Float(2.0)));
}

#[test]
fn external_references_load_their_file() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let dep = Resource::new("Material");
        dep.set_property("tint", Variant::Float(0.5));
        save(&ctx, "res://dep.res", &dep, FLAG_CHANGE_PATH).unwrap();

        let root = Resource::new("Thing");
        root.set_property("material", Variant::Object(Some(dep)));
        save(&ctx, "res://root.res", &root, 0).unwrap();
    }

    let ctx = make_ctx(dir.path());
    assert_eq!(
        dependencies(&ctx, "res://root.res", true).unwrap(),
        vec!["res://dep.res::Material".to_owned()]
    );
    let loaded = ctx.load("res://root.res").unwrap();
    let dep = loaded.get_property("material").unwrap();
    let dep = dep.as_object().unwrap();
    assert_eq!(dep.path(), "res://dep.res");
    assert_eq!(dep.get_property("tint"), Some(Variant::Float(0.5)));
}

#[test]
fn relative_external_paths_resolve_against_the_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    {
        let ctx = make_ctx(dir.path());
        let dep = Resource::new("Material");
        save(&ctx, "res://sub/dep.res", &dep, FLAG_CHANGE_PATH).unwrap();
        let root = Resource::new("Thing");
        root.set_property("material", Variant::Object(Some(dep)));
        save(&ctx, "res://sub/root.res", &root, FLAG_RELATIVE_PATHS).unwrap();
    }

    let ctx = make_ctx(dir.path());
    assert_eq!(
        dependencies(&ctx, "res://sub/root.res", false).unwrap(),
        vec!["dep.res".to_owned()]
    );
    let loaded = ctx.load("res://sub/root.res").unwrap();
    let dep = loaded.get_property("material").unwrap();
    assert_eq!(dep.as_object().unwrap().path(), "res://sub/dep.res");
}

#[test]
fn missing_dependency_aborts_or_substitutes_null() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let dep = Resource::new("Material");
        save(&ctx, "res://dep.res", &dep, FLAG_CHANGE_PATH).unwrap();
        let root = Resource::new("Thing");
        root.set_property("material", Variant::Object(Some(dep)));
        save(&ctx, "res://root.res", &root, 0).unwrap();
    }
    std::fs::remove_file(dir.path().join("dep.res")).unwrap();

    let ctx = make_ctx(dir.path());
    assert!(matches!(
        ctx.load("res://root.res"),
        Err(vesper_core::EngineError::MissingDependency { .. })
    ));

    let ctx = make_ctx(dir.path());
    let loaded = ctx
        .load_with("res://root.res", &LoadOptions::default())
        .unwrap();
    assert_eq!(loaded.get_property("material"), Some(Variant::Object(None)));
    let errors = ctx.take_dependency_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, "res://dep.res");
}

#[test]
fn compressed_payload_matches_uncompressed_image() {
    let dir = tempfile::tempdir().unwrap();
    let build = |ctx: &SerializationContext, path: &str, flags: u32| {
        let sub = Resource::new("Thing");
        sub.set_property("y", Variant::Int(-2));
        let root = Resource::new("Thing");
        root.set_property("x", Variant::Float(1.5));
        root.set_property("child", Variant::Object(Some(sub)));
        save(ctx, path, &root, flags).unwrap();
    };
    let ctx = make_ctx(dir.path());
    build(&ctx, "res://plain.res", 0);
    build(&ctx, "res://packed.res", FLAG_COMPRESS);

    let packed = std::fs::read(dir.path().join("packed.res")).unwrap();
    assert_eq!(&packed[..4], b"RSCC");

    let mut inner = Box::new(FileStream::open_read(dir.path().join("packed.res")).unwrap());
    let mut magic = [0u8; 4];
    inner.get_buffer(&mut magic);
    let mut unpacked = CompressedStream::open_after_magic(inner).unwrap();
    let mut payload = vec![0u8; unpacked.len() as usize];
    unpacked.get_buffer(&mut payload);

    let plain = std::fs::read(dir.path().join("plain.res")).unwrap();
    assert_eq!(payload, plain);

    // And the compressed file loads like any other.
    let ctx = make_ctx(dir.path());
    let loaded = ctx.load("res://packed.res").unwrap();
    assert_eq!(loaded.get_property("x"), Some(Variant::Float(1.5)));
}

#[test]
fn big_endian_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let root = Resource::new("Thing");
        root.set_property("x", Variant::Float(1.5));
        root.set_property("n", Variant::Int(123456));
        save(&ctx, "res://be.res", &root, FLAG_SAVE_BIG_ENDIAN).unwrap();
    }
    let ctx = make_ctx(dir.path());
    let loaded = ctx.load("res://be.res").unwrap();
    assert_eq!(loaded.get_property("x"), Some(Variant::Float(1.5)));
    assert_eq!(loaded.get_property("n"), Some(Variant::Int(123456)));
}

#[test]
fn unknown_magic_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("junk.res"), b"XXXXnot a container").unwrap();
    let ctx = make_ctx(dir.path());
    assert!(!recognize(&ctx, "res://junk.res"));
    assert!(matches!(
        ctx.load("res://junk.res"),
        Err(vesper_core::EngineError::FileUnrecognized { .. })
    ));
}

#[test]
fn future_format_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = MemoryStream::new();
    s.store_buffer(b"RSRC");
    s.store_u32(0); // little-endian
    s.store_u32(0); // real32
    s.store_u32(1);
    s.store_u32(0);
    s.store_u32(99); // format from the future
    std::fs::write(dir.path().join("future.res"), s.into_vec()).unwrap();

    let ctx = make_ctx(dir.path());
    assert!(matches!(
        ctx.load("res://future.res"),
        Err(vesper_core::EngineError::VersionUnsupported { format: 99, .. })
    ));
}

#[test]
fn unregistered_type_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let root = Resource::new("Exotic");
        save(&ctx, "res://exotic.res", &root, 0).unwrap();
    }
    let ctx = make_ctx(dir.path()); // has no "Exotic" class
    assert!(matches!(
        ctx.load("res://exotic.res"),
        Err(vesper_core::EngineError::TypeNotRegistered { type_name }) if type_name == "Exotic"
    ));
}

#[test]
fn interactive_loader_steps_and_loading_map() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let dep = Resource::new("Material");
        save(&ctx, "res://dep.res", &dep, FLAG_CHANGE_PATH).unwrap();
        let sub = Resource::new("Thing");
        let root = Resource::new("Thing");
        root.set_property("material", Variant::Object(Some(dep)));
        root.set_property("child", Variant::Object(Some(sub)));
        save(&ctx, "res://root.res", &root, 0).unwrap();
    }

    let ctx = make_ctx(dir.path());
    let mut loader = ctx
        .load_interactive("res://root.res", LoadOptions::strict())
        .unwrap();
    assert!(ctx.is_loading("res://root.res"));
    assert_eq!(loader.resource_type(), "Thing");
    assert_eq!(loader.stage_count(), 3); // 1 external + 2 internal

    let mut polls = 0;
    let resource = loop {
        polls += 1;
        match loader.poll().unwrap() {
            LoadStatus::Done(res) => break res,
            LoadStatus::InProgress { stage, total } => {
                assert_eq!(total, 3);
                assert_eq!(stage, polls);
            }
        }
    };
    assert_eq!(polls, 3);
    assert_eq!(resource.path(), "res://root.res");
    drop(loader);
    assert!(!ctx.is_loading("res://root.res"));
}

#[test]
fn repeated_loads_hit_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let root = Resource::new("Thing");
        save(&ctx, "res://cached.res", &root, 0).unwrap();
    }
    let ctx = make_ctx(dir.path());
    let first = ctx.load("res://cached.res").unwrap();
    let second = ctx.load("res://cached.res").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn type_sniffing_reads_only_the_header() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ctx = make_ctx(dir.path());
        let root = Resource::new("Material");
        save(&ctx, "res://sniff.res", &root, 0).unwrap();
    }
    let ctx = make_ctx(dir.path());
    assert!(recognize(&ctx, "res://sniff.res"));
    assert_eq!(resource_type(&ctx, "res://sniff.res").unwrap(), "Material");
}
