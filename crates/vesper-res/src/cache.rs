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

//! Path-keyed cache of live resources.
//!
//! The cache holds weak references: it never keeps a resource alive, it
//! only answers "is this path already loaded". Sub-resource paths
//! (`parent::n`) are first-class keys. One mutex guards the map;
//! [`for_each`](ResourceCache::for_each) holds it for the whole
//! callback.

use std::sync::{Mutex, Weak};

use ahash::AHashMap;
use vesper_core::{Res, Resource};

/// Weak map from canonical path to live resource.
#[derive(Debug, Default)]
pub struct ResourceCache {
    map: Mutex<AHashMap<String, Weak<Resource>>>,
}

impl ResourceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live resource registered under `path`, pruning the
    /// entry if the resource has died.
    pub fn get(&self, path: &str) -> Option<Res> {
        let mut map = self.map.lock().unwrap();
        match map.get(path).map(Weak::upgrade) {
            Some(Some(res)) => Some(res),
            Some(None) => {
                map.remove(path);
                None
            }
            None => None,
        }
    }

    /// Returns `true` if `path` maps to a live resource.
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Registers `res` under `path`, silently overwriting any previous
    /// entry.
    pub fn put(&self, path: &str, res: &Res) {
        self.map
            .lock()
            .unwrap()
            .insert(path.to_owned(), std::sync::Arc::downgrade(res));
    }

    /// Removes the entry under `path`, if any.
    pub fn drop_path(&self, path: &str) {
        self.map.lock().unwrap().remove(path);
    }

    /// Invokes `f` for every live entry. The cache mutex is held for the
    /// duration; `f` must not call back into the cache.
    pub fn for_each(&self, mut f: impl FnMut(&str, &Res)) {
        let map = self.map.lock().unwrap();
        for (path, weak) in map.iter() {
            if let Some(res) = weak.upgrade() {
                f(path, &res);
            }
        }
    }
}
