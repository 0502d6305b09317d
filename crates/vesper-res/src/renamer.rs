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

//! Fast external-reference rewriting.
//!
//! Rewrites a container's external table against a `{old → new}` path
//! map without decoding any body: the header streams through verbatim,
//! the rewritten table changes the byte length by some delta, and every
//! internal body offset plus the metadata offset shifts by exactly that
//! delta while the bodies are copied byte-for-byte.
//!
//! The rewrite lands in a `<path>.depren` sidecar that atomically
//! replaces the original on success; on failure the sidecar is left
//! behind and the original is untouched.

use ahash::AHashMap;
use vesper_core::resource::path::{base_dir, is_relative, path_to_file, plus_file, simplify};
use vesper_core::EngineError;

use crate::codec::{get_ustring, store_ustring};
use crate::compressed::{CompressedStream, COMPRESSED_MAGIC, DEFAULT_BLOCK_SIZE};
use crate::context::SerializationContext;
use crate::stream::{ByteStream, FileStream, StreamError};
use crate::{
    CONTAINER_MAGIC, FORMAT_VERSION, FORMAT_VERSION_CAN_RENAME_DEPS, VERSION_MAJOR,
};

/// Applies `renames` to the external table of the container at `path`.
///
/// Files older than the first renameable format version are refused
/// with `VersionUnsupported`; the caller falls back to a full load and
/// re-save for those.
pub fn rename_dependencies(
    ctx: &SerializationContext,
    path: &str,
    renames: &AHashMap<String, String>,
) -> Result<(), EngineError> {
    let fs_path = ctx.paths().globalize(path);
    let sidecar_path = format!("{fs_path}.depren");

    let mut input: Box<dyn ByteStream> = Box::new(FileStream::open_read(&fs_path)?);
    let mut magic = [0u8; 4];
    input.get_buffer(&mut magic);
    let compressed = &magic == COMPRESSED_MAGIC;
    if compressed {
        input = Box::new(CompressedStream::open_after_magic(input)?);
        input.get_buffer(&mut magic);
    }
    if &magic != CONTAINER_MAGIC {
        return Err(EngineError::FileUnrecognized {
            path: path.to_owned(),
        });
    }

    let mut output: Box<dyn ByteStream> = if compressed {
        Box::new(CompressedStream::new_write(
            Box::new(FileStream::create(&sidecar_path)?),
            DEFAULT_BLOCK_SIZE,
        ))
    } else {
        Box::new(FileStream::create(&sidecar_path)?)
    };

    let fin = input.as_mut();
    let out = output.as_mut();
    out.store_buffer(CONTAINER_MAGIC);

    let big_endian = fin.get_u32() != 0;
    fin.set_endian_swap(big_endian);
    out.store_u32(u32::from(big_endian));
    out.set_endian_swap(big_endian);

    out.store_u32(fin.get_u32()); // real64
    let ver_major = fin.get_u32();
    let ver_minor = fin.get_u32();
    let ver_format = fin.get_u32();
    if ver_format < FORMAT_VERSION_CAN_RENAME_DEPS
        || ver_format > FORMAT_VERSION
        || ver_major > VERSION_MAJOR
    {
        return Err(EngineError::VersionUnsupported {
            path: path.to_owned(),
            format: ver_format,
            major: ver_major,
            minor: ver_minor,
        });
    }
    out.store_u32(ver_major);
    out.store_u32(ver_minor);
    out.store_u32(ver_format);

    store_ustring(out, &get_ustring(fin)?);

    let metadata_offset = fin.get_u64();
    let metadata_position = out.position();
    out.store_u64(0); // patched last
    for _ in 0..14 {
        out.store_u32(fin.get_u32()); // reserved
    }

    let string_count = fin.get_u32();
    out.store_u32(string_count);
    for _ in 0..string_count {
        store_ustring(out, &get_ustring(fin)?);
    }

    let ext_count = fin.get_u32();
    out.store_u32(ext_count);
    for _ in 0..ext_count {
        store_ustring(out, &get_ustring(fin)?); // type
        let dep = get_ustring(fin)?;
        let full = if is_relative(&dep) {
            simplify(&plus_file(&base_dir(path), &dep))
        } else {
            dep.clone()
        };
        let written = match renames.get(&full) {
            Some(new_path) if is_relative(&dep) => path_to_file(path, new_path),
            Some(new_path) => new_path.clone(),
            None => dep,
        };
        store_ustring(out, &written);
    }

    // Table rewrites above are the only place the two streams diverge.
    let size_diff = out.position() as i64 - fin.position() as i64;

    let int_count = fin.get_u32();
    out.store_u32(int_count);
    for _ in 0..int_count {
        store_ustring(out, &get_ustring(fin)?);
        let offset = fin.get_u64();
        out.store_u64((offset as i64 + size_diff) as u64);
    }
    if fin.get_error() != StreamError::Ok {
        return Err(EngineError::CorruptData(format!(
            "'{path}' ended inside its resource tables"
        )));
    }

    // Bodies and trailer, byte for byte.
    let mut chunk = [0u8; 4096];
    loop {
        let read = fin.get_buffer(&mut chunk);
        if read == 0 {
            break;
        }
        out.store_buffer(&chunk[..read]);
    }

    out.seek(metadata_position);
    out.store_u64((metadata_offset as i64 + size_diff) as u64);
    out.seek_end(0);

    output.close()?;
    drop(input);
    std::fs::rename(&sidecar_path, &fs_path)?;
    Ok(())
}
