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

//! A [`ClassRegistry`] backed by registered constructors and defaults.
//!
//! Applications register their classes at startup; the registry is
//! read-only afterwards. Default property values registered on a parent
//! class apply to its descendants.

use std::sync::RwLock;

use ahash::AHashMap;
use vesper_core::resource::ClassRegistry;
use vesper_core::{Res, Resource, Variant};

type Constructor = Box<dyn Fn() -> Res + Send + Sync>;

struct ClassEntry {
    constructor: Constructor,
    parent: Option<String>,
    defaults: Vec<(String, Variant)>,
}

/// Constructor-and-defaults table implementing [`ClassRegistry`].
#[derive(Default)]
pub struct SimpleClassRegistry {
    classes: RwLock<AHashMap<String, ClassEntry>>,
}

impl SimpleClassRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class with an explicit constructor.
    pub fn register(
        &self,
        name: impl Into<String>,
        parent: Option<&str>,
        constructor: impl Fn() -> Res + Send + Sync + 'static,
    ) {
        self.classes.write().unwrap().insert(
            name.into(),
            ClassEntry {
                constructor: Box::new(constructor),
                parent: parent.map(str::to_owned),
                defaults: Vec::new(),
            },
        );
    }

    /// Registers a class whose instances are plain property bags.
    pub fn register_basic(&self, name: &str) {
        let type_name = name.to_owned();
        self.register(name, None, move || Resource::new(type_name.clone()));
    }

    /// Records the default value of a property on a class. Properties
    /// holding their default are elided on save.
    pub fn set_default(&self, class: &str, property: impl Into<String>, value: Variant) {
        let mut classes = self.classes.write().unwrap();
        if let Some(entry) = classes.get_mut(class) {
            let property = property.into();
            if let Some(slot) = entry.defaults.iter_mut().find(|(n, _)| *n == property) {
                slot.1 = value;
            } else {
                entry.defaults.push((property, value));
            }
        } else {
            log::warn!("default registered for unknown class '{class}'");
        }
    }
}

impl ClassRegistry for SimpleClassRegistry {
    fn instantiate(&self, type_name: &str) -> Option<Res> {
        let classes = self.classes.read().unwrap();
        classes.get(type_name).map(|entry| (entry.constructor)())
    }

    fn default_property_value(&self, type_name: &str, property: &str) -> Option<Variant> {
        let classes = self.classes.read().unwrap();
        let mut current = type_name;
        loop {
            let entry = classes.get(current)?;
            if let Some((_, value)) = entry.defaults.iter().find(|(n, _)| n == property) {
                return Some(value.clone());
            }
            current = entry.parent.as_deref()?;
        }
    }

    fn is_parent_class(&self, child: &str, parent: &str) -> bool {
        if child == parent {
            return true;
        }
        let classes = self.classes.read().unwrap();
        let mut current = child;
        while let Some(entry) = classes.get(current) {
            match entry.parent.as_deref() {
                Some(p) if p == parent => return true,
                Some(p) => current = p,
                None => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_registered_class() {
        let registry = SimpleClassRegistry::new();
        registry.register_basic("Material");
        let res = registry.instantiate("Material").unwrap();
        assert_eq!(res.type_name(), "Material");
        assert!(registry.instantiate("Unknown").is_none());
    }

    #[test]
    fn defaults_walk_the_parent_chain() {
        let registry = SimpleClassRegistry::new();
        registry.register_basic("Resource");
        registry.register("Material", Some("Resource"), || Resource::new("Material"));
        registry.set_default("Resource", "metallic", Variant::Float(0.0));
        assert_eq!(
            registry.default_property_value("Material", "metallic"),
            Some(Variant::Float(0.0))
        );
        assert_eq!(registry.default_property_value("Material", "other"), None);
    }

    #[test]
    fn parent_class_queries() {
        let registry = SimpleClassRegistry::new();
        registry.register_basic("Resource");
        registry.register("Texture", Some("Resource"), || Resource::new("Texture"));
        assert!(registry.is_parent_class("Texture", "Resource"));
        assert!(registry.is_parent_class("Texture", "Texture"));
        assert!(!registry.is_parent_class("Resource", "Texture"));
    }
}
