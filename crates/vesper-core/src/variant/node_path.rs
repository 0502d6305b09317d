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

//! Defines the node-path value: a pre-split path through a node tree.
//!
//! A node-path is a sequence of name tokens (`/`-separated) optionally
//! followed by subname tokens (`:`-separated), plus an absolute flag.
//! The serialization engine interns these tokens into the container's
//! string table.

use std::fmt;

/// A parsed node-path value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodePath {
    names: Vec<String>,
    subnames: Vec<String>,
    absolute: bool,
}

impl NodePath {
    /// Creates a node-path from pre-split tokens.
    pub fn new(names: Vec<String>, subnames: Vec<String>, absolute: bool) -> Self {
        Self {
            names,
            subnames,
            absolute,
        }
    }

    /// Parses a node-path from its text form, e.g. `/root/Node:prop`.
    ///
    /// A leading `/` marks the path absolute; everything after the first
    /// `:` is split into subname tokens.
    pub fn parse(text: &str) -> Self {
        let absolute = text.starts_with('/');
        let body = text.strip_prefix('/').unwrap_or(text);

        let (name_part, subname_part) = match body.split_once(':') {
            Some((n, s)) => (n, Some(s)),
            None => (body, None),
        };

        let names = name_part
            .split('/')
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();
        let subnames = subname_part
            .map(|s| {
                s.split(':')
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            names,
            subnames,
            absolute,
        }
    }

    /// Returns the name tokens.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the subname tokens.
    pub fn subnames(&self) -> &[String] {
        &self.subnames
    }

    /// Returns `true` if the path is anchored at the tree root.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Returns `true` if the path has no tokens at all.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.subnames.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "/")?;
        }
        write!(f, "{}", self.names.join("/"))?;
        for subname in &self.subnames {
            write!(f, ":{}", subname)?;
        }
        Ok(())
    }
}
