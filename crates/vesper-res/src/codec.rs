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

//! Wire codec for [`Variant`] values.
//!
//! Every variant is written as a `tag:u32` followed by a tag-specific
//! payload. The tag table is a stable wire contract, deliberately
//! decoupled from the enum's runtime discriminant. Integers pick the
//! narrow tag when the value fits in 32 bits; floats pick the narrow tag
//! when the value survives an `f32` round-trip. Real-valued payloads
//! (vectors, transforms, colors) honor the file-level `real64` flag on
//! read and are always written at 32-bit width.
//!
//! Resource references serialize as indirect handles resolved through a
//! [`ResourceResolver`] (read) or [`ResourceInterner`] (write) supplied
//! by the loader and saver.

use vesper_core::math::{
    Aabb, Basis, Color, Plane, Quat, Rect2, Transform2D, Transform3D, Vector2, Vector3,
};
use vesper_core::variant::{Dictionary, NodePath};
use vesper_core::{EngineError, Res, Variant};

use crate::stream::{ByteStream, StreamError};
use crate::FORMAT_VERSION_NO_NODEPATH_PROPERTY;

/// The stable wire tag for each variant kind.
pub mod tag {
    #![allow(missing_docs)]
    pub const NIL: u32 = 1;
    pub const BOOL: u32 = 2;
    pub const INT: u32 = 3;
    pub const FLOAT: u32 = 4;
    pub const STRING: u32 = 5;
    pub const VECTOR2: u32 = 10;
    pub const RECT2: u32 = 11;
    pub const VECTOR3: u32 = 12;
    pub const PLANE: u32 = 13;
    pub const QUAT: u32 = 14;
    pub const AABB: u32 = 15;
    pub const BASIS: u32 = 16;
    pub const TRANSFORM: u32 = 17;
    pub const TRANSFORM2D: u32 = 18;
    pub const COLOR: u32 = 20;
    pub const NODE_PATH: u32 = 22;
    pub const RID: u32 = 23;
    pub const OBJECT: u32 = 24;
    pub const DICTIONARY: u32 = 26;
    pub const ARRAY: u32 = 30;
    pub const BYTE_ARRAY: u32 = 31;
    pub const INT32_ARRAY: u32 = 32;
    pub const FLOAT32_ARRAY: u32 = 33;
    pub const STRING_ARRAY: u32 = 34;
    pub const VECTOR3_ARRAY: u32 = 35;
    pub const COLOR_ARRAY: u32 = 36;
    pub const VECTOR2_ARRAY: u32 = 37;
    pub const INT64: u32 = 40;
    pub const DOUBLE: u32 = 41;
    pub const STRING_NAME: u32 = 44;
}

/// Object-reference sub-tag: null reference.
pub const OBJECT_EMPTY: u32 = 0;
/// Object-reference sub-tag: legacy self-contained external reference.
pub const OBJECT_EXTERNAL: u32 = 1;
/// Object-reference sub-tag: internal resource by sub-index.
pub const OBJECT_INTERNAL: u32 = 2;
/// Object-reference sub-tag: external table entry by index.
pub const OBJECT_EXTERNAL_INDEX: u32 = 3;

/// High bit flagging an inline node-path token (as opposed to a
/// string-table index).
const NODE_PATH_INLINE_BIT: u32 = 0x8000_0000;

/// How a resource reference lands on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    /// Null reference.
    Empty,
    /// Sub-resource of the file being written, by sub-index.
    Internal(u32),
    /// Entry in the file's external-reference table.
    ExternalIndex(u32),
}

/// Resolves indirect resource references while decoding.
pub trait ResourceResolver {
    /// Resolves an external-table entry. `Ok(None)` substitutes null
    /// (the entry failed to load and the loader is configured to
    /// continue).
    fn external_by_index(&mut self, index: u32) -> Result<Option<Res>, EngineError>;

    /// Resolves a legacy self-contained external reference by path.
    fn external_by_path(&mut self, path: &str) -> Result<Option<Res>, EngineError>;

    /// Resolves an internal sub-resource by sub-index.
    fn internal_by_index(&mut self, index: u32) -> Result<Option<Res>, EngineError>;
}

/// Maps resources and interned strings to wire handles while encoding.
pub trait ResourceInterner {
    /// Classifies a resource reference for the file being written.
    fn object_ref(&mut self, res: &Res) -> ObjectRef;

    /// Returns the string-table index of a node-path token, or `None`
    /// to emit the token inline.
    fn string_index(&mut self, token: &str) -> Option<u32>;
}

/// Everything decode needs besides the stream itself.
pub struct DecodeContext<'a> {
    /// Container format version; changes node-path subname semantics.
    pub ver_format: u32,
    /// File-level real width flag.
    pub use_real64: bool,
    /// The file's interned string table.
    pub string_table: &'a [String],
    /// Reference resolution, provided by the loader.
    pub resolver: &'a mut dyn ResourceResolver,
}

/// Everything encode needs besides the stream itself.
pub struct EncodeContext<'a> {
    /// Reference and token interning, provided by the saver.
    pub interner: &'a mut dyn ResourceInterner,
}

/// Reads a length-prefixed, NUL-terminated UTF-8 string.
pub fn get_ustring(s: &mut dyn ByteStream) -> Result<String, EngineError> {
    let stored = s.get_u32() as u64;
    if stored == 0 || stored > s.len().saturating_sub(s.position()) {
        return Err(EngineError::CorruptData(format!(
            "string length {stored} exceeds remaining stream"
        )));
    }
    let mut buf = vec![0u8; stored as usize];
    s.get_buffer(&mut buf);
    if s.get_error() != StreamError::Ok {
        return Err(EngineError::CorruptData("truncated string payload".into()));
    }
    buf.pop(); // trailing NUL
    String::from_utf8(buf)
        .map_err(|_| EngineError::CorruptData("string payload is not UTF-8".into()))
}

/// Writes a length-prefixed, NUL-terminated UTF-8 string.
pub fn store_ustring(s: &mut dyn ByteStream, text: &str) {
    s.store_u32(text.len() as u32 + 1);
    s.store_buffer(text.as_bytes());
    s.store_u8(0);
}

fn check_remaining(s: &dyn ByteStream, count: u64, element_size: u64) -> Result<(), EngineError> {
    let needed = count.saturating_mul(element_size);
    if needed > s.len().saturating_sub(s.position()) {
        return Err(EngineError::CorruptData(format!(
            "declared length {count} exceeds remaining stream"
        )));
    }
    Ok(())
}

fn get_vector2(s: &mut dyn ByteStream, real64: bool) -> Vector2 {
    Vector2::new(s.get_real(real64), s.get_real(real64))
}

fn get_vector3(s: &mut dyn ByteStream, real64: bool) -> Vector3 {
    Vector3::new(s.get_real(real64), s.get_real(real64), s.get_real(real64))
}

fn get_color(s: &mut dyn ByteStream, real64: bool) -> Color {
    Color::new(
        s.get_real(real64),
        s.get_real(real64),
        s.get_real(real64),
        s.get_real(real64),
    )
}

fn store_vector2(s: &mut dyn ByteStream, v: Vector2) {
    s.store_real(v.x);
    s.store_real(v.y);
}

fn store_vector3(s: &mut dyn ByteStream, v: Vector3) {
    s.store_real(v.x);
    s.store_real(v.y);
    s.store_real(v.z);
}

fn store_color(s: &mut dyn ByteStream, c: Color) {
    s.store_real(c.r);
    s.store_real(c.g);
    s.store_real(c.b);
    s.store_real(c.a);
}

fn decode_node_path(
    s: &mut dyn ByteStream,
    ctx: &mut DecodeContext,
) -> Result<NodePath, EngineError> {
    let name_count = s.get_u16() as u32;
    let raw_subnames = s.get_u16() as u32;
    let absolute = raw_subnames & 0x8000 != 0;
    let mut subname_count = raw_subnames & 0x7FFF;
    if ctx.ver_format < FORMAT_VERSION_NO_NODEPATH_PROPERTY {
        // Old files stored the trailing property as one extra subname.
        subname_count += 1;
    }

    let mut names = Vec::with_capacity(name_count as usize);
    let mut subnames = Vec::with_capacity(subname_count as usize);
    for i in 0..name_count + subname_count {
        let token = s.get_u32();
        let text = if token & NODE_PATH_INLINE_BIT != 0 {
            let stored = token & !NODE_PATH_INLINE_BIT;
            check_remaining(s, u64::from(stored), 1)?;
            if stored == 0 {
                return Err(EngineError::CorruptData("empty node-path token".into()));
            }
            let mut buf = vec![0u8; stored as usize];
            s.get_buffer(&mut buf);
            buf.pop();
            String::from_utf8(buf).map_err(|_| {
                EngineError::CorruptData("node-path token is not UTF-8".into())
            })?
        } else {
            ctx.string_table
                .get(token as usize)
                .cloned()
                .ok_or_else(|| {
                    EngineError::CorruptData(format!(
                        "node-path token index {token} outside string table"
                    ))
                })?
        };
        if i < name_count {
            names.push(text);
        } else {
            subnames.push(text);
        }
    }
    Ok(NodePath::new(names, subnames, absolute))
}

fn encode_node_path(s: &mut dyn ByteStream, np: &NodePath, ctx: &mut EncodeContext) {
    s.store_u16(np.names().len() as u16);
    let mut subnames = np.subnames().len() as u16;
    if np.is_absolute() {
        subnames |= 0x8000;
    }
    s.store_u16(subnames);
    for token in np.names().iter().chain(np.subnames()) {
        match ctx.interner.string_index(token) {
            Some(index) => s.store_u32(index),
            None => {
                s.store_u32((token.len() as u32 + 1) | NODE_PATH_INLINE_BIT);
                s.store_buffer(token.as_bytes());
                s.store_u8(0);
            }
        }
    }
}

/// Decodes one tagged variant from the stream.
pub fn decode_variant(
    s: &mut dyn ByteStream,
    ctx: &mut DecodeContext,
) -> Result<Variant, EngineError> {
    let real64 = ctx.use_real64;
    let t = s.get_u32();
    let value = match t {
        tag::NIL => Variant::Nil,
        tag::BOOL => Variant::Bool(s.get_u32() != 0),
        tag::INT => Variant::Int(i64::from(s.get_u32() as i32)),
        tag::INT64 => Variant::Int(s.get_u64() as i64),
        tag::FLOAT => Variant::Float(f64::from(s.get_real(real64))),
        tag::DOUBLE => Variant::Float(s.get_f64()),
        tag::STRING => Variant::String(get_ustring(s)?),
        tag::STRING_NAME => Variant::StringName(get_ustring(s)?),
        tag::VECTOR2 => Variant::Vector2(get_vector2(s, real64)),
        tag::RECT2 => Variant::Rect2(Rect2 {
            position: get_vector2(s, real64),
            size: get_vector2(s, real64),
        }),
        tag::VECTOR3 => Variant::Vector3(get_vector3(s, real64)),
        tag::PLANE => Variant::Plane(Plane {
            normal: get_vector3(s, real64),
            d: s.get_real(real64),
        }),
        tag::QUAT => {
            let x = s.get_real(real64);
            let y = s.get_real(real64);
            let z = s.get_real(real64);
            let w = s.get_real(real64);
            Variant::Quat(Quat { x, y, z, w })
        }
        tag::AABB => Variant::Aabb(Aabb {
            position: get_vector3(s, real64),
            size: get_vector3(s, real64),
        }),
        tag::BASIS => Variant::Basis(Basis::from_rows(
            get_vector3(s, real64),
            get_vector3(s, real64),
            get_vector3(s, real64),
        )),
        tag::TRANSFORM => Variant::Transform(Transform3D::new(
            Basis::from_rows(
                get_vector3(s, real64),
                get_vector3(s, real64),
                get_vector3(s, real64),
            ),
            get_vector3(s, real64),
        )),
        tag::TRANSFORM2D => Variant::Transform2D(Transform2D::from_columns(
            get_vector2(s, real64),
            get_vector2(s, real64),
            get_vector2(s, real64),
        )),
        tag::COLOR => Variant::Color(get_color(s, real64)),
        tag::NODE_PATH => Variant::NodePath(decode_node_path(s, ctx)?),
        tag::RID => Variant::Rid(s.get_u32()),
        tag::OBJECT => {
            let kind = s.get_u32();
            let res = match kind {
                OBJECT_EMPTY => None,
                OBJECT_INTERNAL => {
                    let index = s.get_u32();
                    ctx.resolver.internal_by_index(index)?
                }
                OBJECT_EXTERNAL => {
                    // Legacy self-contained form: type then path, with the
                    // type kept only for diagnostics.
                    let _type_name = get_ustring(s)?;
                    let path = get_ustring(s)?;
                    ctx.resolver.external_by_path(&path)?
                }
                OBJECT_EXTERNAL_INDEX => {
                    let index = s.get_u32();
                    ctx.resolver.external_by_index(index)?
                }
                other => {
                    return Err(EngineError::CorruptData(format!(
                        "unknown object reference kind {other}"
                    )))
                }
            };
            Variant::Object(res)
        }
        tag::DICTIONARY => {
            let count = s.get_u32() & 0x7FFF_FFFF;
            check_remaining(s, u64::from(count), 8)?;
            let mut dict = Dictionary::new();
            for _ in 0..count {
                let key = match decode_variant(s, ctx)? {
                    Variant::String(k) | Variant::StringName(k) => k,
                    other => {
                        return Err(EngineError::CorruptData(format!(
                            "dictionary key is not a string: {other:?}"
                        )))
                    }
                };
                let value = decode_variant(s, ctx)?;
                dict.insert(key, value);
            }
            Variant::Dictionary(dict)
        }
        tag::ARRAY => {
            let count = s.get_u32() & 0x7FFF_FFFF;
            check_remaining(s, u64::from(count), 4)?;
            let mut out = Vec::with_capacity(count as usize);
            for _ in 0..count {
                out.push(decode_variant(s, ctx)?);
            }
            Variant::Array(out)
        }
        tag::BYTE_ARRAY => {
            let count = s.get_u32();
            check_remaining(s, u64::from(count), 1)?;
            let mut out = vec![0u8; count as usize];
            s.get_buffer(&mut out);
            let pad = (4 - count % 4) % 4;
            for _ in 0..pad {
                s.get_u8();
            }
            Variant::ByteArray(out)
        }
        tag::INT32_ARRAY => {
            let count = s.get_u32();
            check_remaining(s, u64::from(count), 4)?;
            let mut out = Vec::with_capacity(count as usize);
            for _ in 0..count {
                out.push(s.get_u32() as i32);
            }
            Variant::Int32Array(out)
        }
        tag::FLOAT32_ARRAY => {
            let count = s.get_u32();
            check_remaining(s, u64::from(count), 4)?;
            let mut out = Vec::with_capacity(count as usize);
            for _ in 0..count {
                out.push(s.get_f32());
            }
            Variant::Float32Array(out)
        }
        tag::STRING_ARRAY => {
            let count = s.get_u32();
            check_remaining(s, u64::from(count), 4)?;
            let mut out = Vec::with_capacity(count as usize);
            for _ in 0..count {
                out.push(get_ustring(s)?);
            }
            Variant::StringArray(out)
        }
        tag::VECTOR2_ARRAY => {
            let count = s.get_u32();
            check_remaining(s, u64::from(count), 8)?;
            let mut out = Vec::with_capacity(count as usize);
            for _ in 0..count {
                out.push(get_vector2(s, real64));
            }
            Variant::Vector2Array(out)
        }
        tag::VECTOR3_ARRAY => {
            let count = s.get_u32();
            check_remaining(s, u64::from(count), 12)?;
            let mut out = Vec::with_capacity(count as usize);
            for _ in 0..count {
                out.push(get_vector3(s, real64));
            }
            Variant::Vector3Array(out)
        }
        tag::COLOR_ARRAY => {
            let count = s.get_u32();
            check_remaining(s, u64::from(count), 16)?;
            let mut out = Vec::with_capacity(count as usize);
            for _ in 0..count {
                out.push(get_color(s, real64));
            }
            Variant::ColorArray(out)
        }
        unknown => {
            return Err(EngineError::CorruptData(format!(
                "unknown variant tag {unknown}"
            )))
        }
    };
    if s.get_error() != StreamError::Ok {
        return Err(EngineError::CorruptData(
            "variant payload ran past end of stream".into(),
        ));
    }
    Ok(value)
}

/// Encodes one tagged variant onto the stream.
pub fn encode_variant(
    s: &mut dyn ByteStream,
    value: &Variant,
    ctx: &mut EncodeContext,
) -> Result<(), EngineError> {
    match value {
        Variant::Nil => s.store_u32(tag::NIL),
        Variant::Bool(b) => {
            s.store_u32(tag::BOOL);
            s.store_u32(u32::from(*b));
        }
        Variant::Int(i) => {
            if i32::try_from(*i).is_ok() {
                s.store_u32(tag::INT);
                s.store_u32(*i as i32 as u32);
            } else {
                s.store_u32(tag::INT64);
                s.store_u64(*i as u64);
            }
        }
        Variant::Float(f) => {
            if f64::from(*f as f32) == *f || f.is_nan() {
                s.store_u32(tag::FLOAT);
                s.store_real(*f as f32);
            } else {
                s.store_u32(tag::DOUBLE);
                s.store_f64(*f);
            }
        }
        Variant::String(text) => {
            s.store_u32(tag::STRING);
            store_ustring(s, text);
        }
        Variant::StringName(text) => {
            s.store_u32(tag::STRING_NAME);
            store_ustring(s, text);
        }
        Variant::Vector2(v) => {
            s.store_u32(tag::VECTOR2);
            store_vector2(s, *v);
        }
        Variant::Rect2(r) => {
            s.store_u32(tag::RECT2);
            store_vector2(s, r.position);
            store_vector2(s, r.size);
        }
        Variant::Vector3(v) => {
            s.store_u32(tag::VECTOR3);
            store_vector3(s, *v);
        }
        Variant::Plane(p) => {
            s.store_u32(tag::PLANE);
            store_vector3(s, p.normal);
            s.store_real(p.d);
        }
        Variant::Quat(q) => {
            s.store_u32(tag::QUAT);
            s.store_real(q.x);
            s.store_real(q.y);
            s.store_real(q.z);
            s.store_real(q.w);
        }
        Variant::Aabb(b) => {
            s.store_u32(tag::AABB);
            store_vector3(s, b.position);
            store_vector3(s, b.size);
        }
        Variant::Basis(m) => {
            s.store_u32(tag::BASIS);
            for row in m.rows {
                store_vector3(s, row);
            }
        }
        Variant::Transform(t) => {
            s.store_u32(tag::TRANSFORM);
            for row in t.basis.rows {
                store_vector3(s, row);
            }
            store_vector3(s, t.origin);
        }
        Variant::Transform2D(t) => {
            s.store_u32(tag::TRANSFORM2D);
            for column in t.columns {
                store_vector2(s, column);
            }
        }
        Variant::Color(c) => {
            s.store_u32(tag::COLOR);
            store_color(s, *c);
        }
        Variant::NodePath(np) => {
            s.store_u32(tag::NODE_PATH);
            encode_node_path(s, np, ctx);
        }
        Variant::Rid(rid) => {
            s.store_u32(tag::RID);
            s.store_u32(*rid);
        }
        Variant::Object(res) => {
            s.store_u32(tag::OBJECT);
            match res {
                None => s.store_u32(OBJECT_EMPTY),
                Some(res) => match ctx.interner.object_ref(res) {
                    ObjectRef::Empty => {
                        log::warn!(
                            "resource '{}' was not gathered during discovery; saving a null reference",
                            res.path()
                        );
                        s.store_u32(OBJECT_EMPTY);
                    }
                    ObjectRef::Internal(index) => {
                        s.store_u32(OBJECT_INTERNAL);
                        s.store_u32(index);
                    }
                    ObjectRef::ExternalIndex(index) => {
                        s.store_u32(OBJECT_EXTERNAL_INDEX);
                        s.store_u32(index);
                    }
                },
            }
        }
        Variant::Dictionary(dict) => {
            s.store_u32(tag::DICTIONARY);
            s.store_u32(dict.len() as u32);
            for (key, value) in dict.iter() {
                s.store_u32(tag::STRING);
                store_ustring(s, key);
                encode_variant(s, value, ctx)?;
            }
        }
        Variant::Array(items) => {
            s.store_u32(tag::ARRAY);
            s.store_u32(items.len() as u32);
            for item in items {
                encode_variant(s, item, ctx)?;
            }
        }
        Variant::ByteArray(bytes) => {
            s.store_u32(tag::BYTE_ARRAY);
            s.store_u32(bytes.len() as u32);
            s.store_buffer(bytes);
            let pad = (4 - bytes.len() % 4) % 4;
            for _ in 0..pad {
                s.store_u8(0);
            }
        }
        Variant::Int32Array(items) => {
            s.store_u32(tag::INT32_ARRAY);
            s.store_u32(items.len() as u32);
            for item in items {
                s.store_u32(*item as u32);
            }
        }
        Variant::Float32Array(items) => {
            s.store_u32(tag::FLOAT32_ARRAY);
            s.store_u32(items.len() as u32);
            for item in items {
                s.store_f32(*item);
            }
        }
        Variant::StringArray(items) => {
            s.store_u32(tag::STRING_ARRAY);
            s.store_u32(items.len() as u32);
            for item in items {
                store_ustring(s, item);
            }
        }
        Variant::Vector2Array(items) => {
            s.store_u32(tag::VECTOR2_ARRAY);
            s.store_u32(items.len() as u32);
            for item in items {
                store_vector2(s, *item);
            }
        }
        Variant::Vector3Array(items) => {
            s.store_u32(tag::VECTOR3_ARRAY);
            s.store_u32(items.len() as u32);
            for item in items {
                store_vector3(s, *item);
            }
        }
        Variant::ColorArray(items) => {
            s.store_u32(tag::COLOR_ARRAY);
            s.store_u32(items.len() as u32);
            for item in items {
                store_color(s, *item);
            }
        }
    }
    if s.get_error() != StreamError::Ok {
        return Err(EngineError::Io("failed to write variant payload".into()));
    }
    Ok(())
}
