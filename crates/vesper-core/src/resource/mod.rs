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

//! Defines the runtime resource object and its shared-reference handle.
//!
//! A [`Resource`] is a typed bag of named [`Variant`] properties plus a
//! path identity. Resources are always handled through [`Res`], a shared
//! reference-counted handle; identity (pointer equality) is what the
//! serialization engine uses to deduplicate and to detect cycles.

pub mod path;
pub mod registry;

pub use path::PathProvider;
pub use registry::ClassRegistry;

use crate::variant::Variant;
use std::sync::{Arc, RwLock};

/// Shared handle to a [`Resource`].
///
/// Cloning is cheap; all clones refer to the same object. Two handles are
/// the *same* resource exactly when `Arc::ptr_eq` holds.
pub type Res = Arc<Resource>;

#[derive(Debug, Default)]
struct ResourceInner {
    path: String,
    subindex: u32,
    translation_remapped: bool,
    properties: Vec<(String, Variant)>,
}

/// A typed, path-addressable bag of properties.
///
/// The type name is fixed at construction; everything else sits behind an
/// interior lock so loaders and savers can work with plain `Res` handles.
#[derive(Debug)]
pub struct Resource {
    type_name: String,
    inner: RwLock<ResourceInner>,
}

impl Resource {
    /// Creates a new resource of the given type, with no path and no
    /// properties, and returns its handle.
    pub fn new(type_name: impl Into<String>) -> Res {
        Arc::new(Self {
            type_name: type_name.into(),
            inner: RwLock::new(ResourceInner::default()),
        })
    }

    /// Returns the resource's type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the resource's path. Empty for resources that have never
    /// been saved or loaded.
    pub fn path(&self) -> String {
        self.inner.read().unwrap().path.clone()
    }

    /// Sets the resource's path.
    pub fn set_path(&self, path: impl Into<String>) {
        self.inner.write().unwrap().path = path.into();
    }

    /// Returns `true` if the path marks this as a subresource embedded in
    /// another file (it contains a `::` separator).
    pub fn is_subresource(&self) -> bool {
        self.inner.read().unwrap().path.contains("::")
    }

    /// Returns the stable sub-index used when this resource is embedded
    /// inside a container file. Zero means "not yet assigned".
    pub fn subindex(&self) -> u32 {
        self.inner.read().unwrap().subindex
    }

    /// Sets the embedded sub-index.
    pub fn set_subindex(&self, subindex: u32) {
        self.inner.write().unwrap().subindex = subindex;
    }

    /// Returns `true` if this resource was substituted through a
    /// locale remap when it was loaded.
    pub fn is_translation_remapped(&self) -> bool {
        self.inner.read().unwrap().translation_remapped
    }

    /// Marks this resource as having been substituted through a locale
    /// remap.
    pub fn set_translation_remapped(&self, remapped: bool) {
        self.inner.write().unwrap().translation_remapped = remapped;
    }

    /// Sets (or replaces) a property.
    pub fn set_property(&self, name: impl Into<String>, value: Variant) {
        let name = name.into();
        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.properties.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            inner.properties.push((name, value));
        }
    }

    /// Returns a clone of the named property's value, if set.
    pub fn get_property(&self, name: &str) -> Option<Variant> {
        self.inner
            .read()
            .unwrap()
            .properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Returns a snapshot of all properties in insertion order.
    pub fn properties(&self) -> Vec<(String, Variant)> {
        self.inner.read().unwrap().properties.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_set_get_replace() {
        let res = Resource::new("Material");
        assert_eq!(res.get_property("metallic"), None);
        res.set_property("metallic", Variant::Float(0.5));
        res.set_property("metallic", Variant::Float(0.8));
        assert_eq!(res.get_property("metallic"), Some(Variant::Float(0.8)));
        assert_eq!(res.properties().len(), 1);
    }

    #[test]
    fn subresource_path_detection() {
        let res = Resource::new("Texture");
        res.set_path("res://scene.res::3");
        assert!(res.is_subresource());
        res.set_path("res://texture.res");
        assert!(!res.is_subresource());
    }
}
