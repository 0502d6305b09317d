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

//! The shared state every load and save request runs against.
//!
//! A [`SerializationContext`] bundles the class registry, the path
//! collaborator, the resource cache, and the loading map that blocks
//! reentrant loads. All public entrypoints take the context explicitly;
//! there is no process-wide singleton.

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use ahash::{AHashMap, AHashSet};
use vesper_core::resource::{ClassRegistry, PathProvider};
use vesper_core::{EngineError, Res};

use crate::cache::ResourceCache;
use crate::loader::{InteractiveLoader, LoadStatus};

/// Per-request load configuration.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// External-reference path substitutions applied before each
    /// dependency load.
    pub remaps: AHashMap<String, String>,
    /// When `true`, a failed dependency aborts the whole load instead
    /// of substituting null. `default()` leaves this off;
    /// [`LoadOptions::strict`] (used by the plain load entrypoints)
    /// turns it on.
    pub abort_on_missing: bool,
    /// Skip the cache lookup for sub-resource bodies, forcing fresh
    /// instances.
    pub no_subresource_cache: bool,
}

impl LoadOptions {
    /// The configuration used by the plain load entrypoints: abort on a
    /// missing dependency, use the cache.
    pub fn strict() -> Self {
        Self {
            abort_on_missing: true,
            ..Self::default()
        }
    }
}

/// Registry, paths, cache, and loading map for one engine instance.
pub struct SerializationContext {
    registry: Arc<dyn ClassRegistry>,
    paths: Arc<dyn PathProvider>,
    cache: ResourceCache,
    loading: Mutex<AHashSet<(String, ThreadId)>>,
    dependency_errors: Mutex<Vec<(String, String)>>,
}

impl SerializationContext {
    /// Creates a context with the given collaborators and an empty
    /// cache.
    pub fn new(registry: Arc<dyn ClassRegistry>, paths: Arc<dyn PathProvider>) -> Self {
        Self {
            registry,
            paths,
            cache: ResourceCache::new(),
            loading: Mutex::new(AHashSet::new()),
            dependency_errors: Mutex::new(Vec::new()),
        }
    }

    /// The class registry collaborator.
    pub fn registry(&self) -> &dyn ClassRegistry {
        self.registry.as_ref()
    }

    /// The path collaborator.
    pub fn paths(&self) -> &dyn PathProvider {
        self.paths.as_ref()
    }

    /// The process-wide resource cache.
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Loads a resource, returning the cached instance when the path is
    /// already live. Missing dependencies abort the load.
    pub fn load(&self, path: &str) -> Result<Res, EngineError> {
        self.load_with(path, &LoadOptions::strict())
    }

    /// Loads a resource with explicit options.
    pub fn load_with(&self, path: &str, options: &LoadOptions) -> Result<Res, EngineError> {
        if let Some(res) = self.cache.get(path) {
            return Ok(res);
        }
        let mut loader = InteractiveLoader::open(self, path, options.clone())?;
        loop {
            if let LoadStatus::Done(res) = loader.poll()? {
                return Ok(res);
            }
        }
    }

    /// Opens an interactive loader; the caller drives it with `poll`.
    pub fn load_interactive(
        &self,
        path: &str,
        options: LoadOptions,
    ) -> Result<InteractiveLoader<'_>, EngineError> {
        InteractiveLoader::open(self, path, options)
    }

    /// Marks `path` as loading on the current thread. A hit means a
    /// reentrant load of the same file from the same thread.
    pub(crate) fn begin_load(&self, path: &str) -> Result<(), EngineError> {
        let key = (path.to_owned(), thread::current().id());
        let mut loading = self.loading.lock().unwrap();
        if !loading.insert(key) {
            return Err(EngineError::InvalidArgument(format!(
                "resource '{path}' is already being loaded on this thread (circular load)"
            )));
        }
        Ok(())
    }

    /// Releases the loading-map entry taken by [`begin_load`].
    pub(crate) fn end_load(&self, path: &str) {
        let key = (path.to_owned(), thread::current().id());
        self.loading.lock().unwrap().remove(&key);
    }

    /// Returns `true` while `path` is loading on the current thread.
    pub fn is_loading(&self, path: &str) -> bool {
        let key = (path.to_owned(), thread::current().id());
        self.loading.lock().unwrap().contains(&key)
    }

    /// Records a dependency that failed to load while
    /// `abort_on_missing` was off.
    pub(crate) fn report_dependency_error(&self, path: &str, dependency: &str) {
        log::warn!("'{path}': dependency '{dependency}' failed to load, substituting null");
        self.dependency_errors
            .lock()
            .unwrap()
            .push((path.to_owned(), dependency.to_owned()));
    }

    /// Drains the recorded dependency failures as
    /// `(file, missing dependency)` pairs.
    pub fn take_dependency_errors(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.dependency_errors.lock().unwrap())
    }
}
