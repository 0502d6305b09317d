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

//! Defines the `Variant` tagged value model.
//!
//! A `Variant` is the unit of data the serialization engine moves around:
//! every resource property is one. Equality is structural for all kinds
//! except object references, which compare by identity — two references
//! are equal only when they point at the same live resource.
//!
//! The enum discriminant is deliberately *not* the wire tag; the codec in
//! `vesper-res` owns the stable tag table so variants can be added here
//! without perturbing the file format.

pub mod node_path;

pub use node_path::NodePath;

use crate::math::{Aabb, Basis, Color, Plane, Quat, Rect2, Transform2D, Transform3D, Vector2, Vector3};
use crate::resource::Res;
use std::sync::Arc;

/// An ordered string-keyed dictionary of variants.
///
/// Keys are plain strings (the wire format only permits string keys) and
/// insertion order is preserved; equality is structural and
/// order-sensitive.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary {
    entries: Vec<(String, Variant)>,
}

impl Dictionary {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Variant) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Returns the value under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the dictionary holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variant)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Variant)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (String, Variant)>>(iter: T) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

/// The tagged union value carried by resource properties.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    /// The absence of a value.
    #[default]
    Nil,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer. The codec narrows to 32 bits on disk
    /// when the value fits.
    Int(i64),
    /// A 64-bit float. The codec narrows to the file's real width on
    /// disk when the value survives the round-trip.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// An interned name string; distinct from `String` on the wire.
    StringName(String),
    /// A 2D vector.
    Vector2(Vector2),
    /// A 2D rectangle.
    Rect2(Rect2),
    /// A 3D vector.
    Vector3(Vector3),
    /// A 3D plane.
    Plane(Plane),
    /// A rotation quaternion.
    Quat(Quat),
    /// An axis-aligned 3D box.
    Aabb(Aabb),
    /// A 3x3 matrix.
    Basis(Basis),
    /// A 3D affine transform.
    Transform(Transform3D),
    /// A 2D affine transform.
    Transform2D(Transform2D),
    /// An RGBA color.
    Color(Color),
    /// A pre-split node-tree path.
    NodePath(NodePath),
    /// An opaque runtime resource id. Serializable for compatibility but
    /// meaningless across processes.
    Rid(u32),
    /// A reference to a resource, or a null reference. Serialized as an
    /// indirect handle into the container's reference tables.
    Object(Option<Res>),
    /// A string-keyed dictionary.
    Dictionary(Dictionary),
    /// A heterogeneous array.
    Array(Vec<Variant>),
    /// A packed byte pool.
    ByteArray(Vec<u8>),
    /// A packed 32-bit integer pool.
    Int32Array(Vec<i32>),
    /// A packed 32-bit float pool.
    Float32Array(Vec<f32>),
    /// A packed string pool.
    StringArray(Vec<String>),
    /// A packed 2D vector pool.
    Vector2Array(Vec<Vector2>),
    /// A packed 3D vector pool.
    Vector3Array(Vec<Vector3>),
    /// A packed color pool.
    ColorArray(Vec<Color>),
}

impl Variant {
    /// Returns `true` for `Variant::Nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    /// Returns the contained resource reference, if this is a non-null
    /// object variant.
    pub fn as_object(&self) -> Option<&Res> {
        match self {
            Variant::Object(Some(res)) => Some(res),
            _ => None,
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        use Variant::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (StringName(a), StringName(b)) => a == b,
            (Vector2(a), Vector2(b)) => a == b,
            (Rect2(a), Rect2(b)) => a == b,
            (Vector3(a), Vector3(b)) => a == b,
            (Plane(a), Plane(b)) => a == b,
            (Quat(a), Quat(b)) => a == b,
            (Aabb(a), Aabb(b)) => a == b,
            (Basis(a), Basis(b)) => a == b,
            (Transform(a), Transform(b)) => a == b,
            (Transform2D(a), Transform2D(b)) => a == b,
            (Color(a), Color(b)) => a == b,
            (NodePath(a), NodePath(b)) => a == b,
            (Rid(a), Rid(b)) => a == b,
            // Object references compare by identity, never by content.
            (Object(None), Object(None)) => true,
            (Object(Some(a)), Object(Some(b))) => Arc::ptr_eq(a, b),
            (Dictionary(a), Dictionary(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (ByteArray(a), ByteArray(b)) => a == b,
            (Int32Array(a), Int32Array(b)) => a == b,
            (Float32Array(a), Float32Array(b)) => a == b,
            (StringArray(a), StringArray(b)) => a == b,
            (Vector2Array(a), Vector2Array(b)) => a == b,
            (Vector3Array(a), Vector3Array(b)) => a == b,
            (ColorArray(a), ColorArray(b)) => a == b,
            _ => false,
        }
    }
}
