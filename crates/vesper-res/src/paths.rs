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

//! Filesystem-rooted [`PathProvider`].

use std::path::{Path, PathBuf};

use vesper_core::resource::PathProvider;

/// Maps `res://` under a project directory and `user://` under a user
/// data directory.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    project_root: PathBuf,
    user_root: PathBuf,
}

impl ProjectPaths {
    /// Creates a provider with explicit roots for both schemes.
    pub fn new(project_root: impl Into<PathBuf>, user_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            user_root: user_root.into(),
        }
    }

    /// Creates a provider rooted at `project_root`, with user data kept
    /// in a `user` directory underneath it.
    pub fn rooted(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let user_root = project_root.join("user");
        Self {
            project_root,
            user_root,
        }
    }

    fn localize_under(root: &Path, scheme: &str, path: &str) -> Option<String> {
        let rel = Path::new(path).strip_prefix(root).ok()?;
        let rel = rel.to_string_lossy().replace('\\', "/");
        Some(format!("{scheme}://{rel}"))
    }
}

impl PathProvider for ProjectPaths {
    fn localize(&self, path: &str) -> String {
        Self::localize_under(&self.project_root, "res", path)
            .or_else(|| Self::localize_under(&self.user_root, "user", path))
            .unwrap_or_else(|| path.to_owned())
    }

    fn globalize(&self, path: &str) -> String {
        let (root, rest) = if let Some(rest) = path.strip_prefix("res://") {
            (&self.project_root, rest)
        } else if let Some(rest) = path.strip_prefix("user://") {
            (&self.user_root, rest)
        } else {
            return path.to_owned();
        };
        root.join(rest).to_string_lossy().replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globalize_and_localize_are_inverse() {
        let paths = ProjectPaths::new("/proj", "/data/user");
        let global = paths.globalize("res://scenes/main.res");
        assert_eq!(global, "/proj/scenes/main.res");
        assert_eq!(paths.localize(&global), "res://scenes/main.res");
        assert_eq!(paths.globalize("user://save.res"), "/data/user/save.res");
    }

    #[test]
    fn foreign_paths_pass_through() {
        let paths = ProjectPaths::rooted("/proj");
        assert_eq!(paths.globalize("/etc/hosts"), "/etc/hosts");
        assert_eq!(paths.localize("/etc/hosts"), "/etc/hosts");
    }
}
