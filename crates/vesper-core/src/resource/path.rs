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

//! Path handling for resource identities.
//!
//! Resource paths use a virtual scheme (`res://...`) mapped onto the
//! filesystem by a [`PathProvider`]. The free functions here are pure
//! string manipulation shared by the loader, saver and renamer.

/// Maps between virtual resource paths and filesystem paths.
pub trait PathProvider: Send + Sync {
    /// Converts a filesystem path into its virtual form, or returns the
    /// input unchanged when it lies outside the project root.
    fn localize(&self, path: &str) -> String;

    /// Converts a virtual path into a filesystem path. Paths that carry
    /// no recognized scheme pass through unchanged.
    fn globalize(&self, path: &str) -> String;
}

/// Splits a path into its scheme prefix (like `res://`) and remainder.
fn split_scheme(path: &str) -> (&str, &str) {
    match path.find("://") {
        Some(idx) => path.split_at(idx + 3),
        None => ("", path),
    }
}

/// Returns `true` if `path` carries neither a scheme nor a leading slash.
pub fn is_relative(path: &str) -> bool {
    let (scheme, rest) = split_scheme(path);
    scheme.is_empty() && !rest.starts_with('/')
}

/// Returns the directory part of `path`, scheme included.
///
/// `res://a/b.res` yields `res://a`, `res://b.res` yields `res://`, a
/// bare file name yields the empty string.
pub fn base_dir(path: &str) -> String {
    let (scheme, rest) = split_scheme(path);
    match rest.rfind('/') {
        Some(idx) => format!("{}{}", scheme, &rest[..idx]),
        None => scheme.to_owned(),
    }
}

/// Joins `file` onto `base`, inserting a separator when needed.
pub fn plus_file(base: &str, file: &str) -> String {
    if base.is_empty() {
        file.to_owned()
    } else if base.ends_with('/') {
        format!("{}{}", base, file)
    } else {
        format!("{}/{}", base, file)
    }
}

/// Normalizes a path: collapses `//`, drops `.` segments and resolves
/// `..` segments. The scheme prefix is preserved untouched.
pub fn simplify(path: &str) -> String {
    let (scheme, rest) = split_scheme(path);
    let rooted = rest.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(&s) if s != "..") {
                    segments.pop();
                } else if !rooted && scheme.is_empty() {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = String::from(scheme);
    if rooted {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    out
}

/// Computes the relative path from the directory of `from` to the file
/// `to`.
///
/// Both paths must share the same scheme; otherwise `to` is returned
/// unchanged.
pub fn path_to_file(from: &str, to: &str) -> String {
    let (from_scheme, _) = split_scheme(from);
    let (to_scheme, _) = split_scheme(to);
    if from_scheme != to_scheme {
        return to.to_owned();
    }

    let from_dir = base_dir(&simplify(from));
    let (_, from_rest) = split_scheme(&from_dir);
    let to_simple = simplify(to);
    let (_, to_rest) = split_scheme(&to_simple);

    let from_segments: Vec<&str> = from_rest.split('/').filter(|s| !s.is_empty()).collect();
    let mut to_segments: Vec<&str> = to_rest.split('/').filter(|s| !s.is_empty()).collect();
    let file = match to_segments.pop() {
        Some(f) => f,
        None => return to.to_owned(),
    };

    let common = from_segments
        .iter()
        .zip(to_segments.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = String::new();
    for _ in common..from_segments.len() {
        out.push_str("../");
    }
    for segment in &to_segments[common..] {
        out.push_str(segment);
        out.push('/');
    }
    out.push_str(file);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_detection() {
        assert!(is_relative("texture.res"));
        assert!(is_relative("../texture.res"));
        assert!(!is_relative("res://texture.res"));
        assert!(!is_relative("/abs/texture.res"));
    }

    #[test]
    fn base_dir_keeps_scheme() {
        assert_eq!(base_dir("res://a/b.res"), "res://a");
        assert_eq!(base_dir("res://b.res"), "res://");
        assert_eq!(base_dir("b.res"), "");
    }

    #[test]
    fn plus_file_joins() {
        assert_eq!(plus_file("res://a", "b.res"), "res://a/b.res");
        assert_eq!(plus_file("res://", "b.res"), "res://b.res");
        assert_eq!(plus_file("", "b.res"), "b.res");
    }

    #[test]
    fn simplify_resolves_dots() {
        assert_eq!(simplify("res://a/./b/../c.res"), "res://a/c.res");
        assert_eq!(simplify("res://a//b.res"), "res://a/b.res");
        assert_eq!(simplify("../a.res"), "../a.res");
    }

    #[test]
    fn path_to_file_walks_up() {
        assert_eq!(
            path_to_file("res://a/b/main.res", "res://a/c/dep.res"),
            "../c/dep.res"
        );
        assert_eq!(
            path_to_file("res://a/main.res", "res://a/dep.res"),
            "dep.res"
        );
        assert_eq!(
            path_to_file("res://main.res", "user://dep.res"),
            "user://dep.res"
        );
    }
}
