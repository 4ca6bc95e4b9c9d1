// Copyright 2020 The Vex Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cmp::Ordering;
use std::fmt::{Debug, Error, Formatter};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{VexError, VexResult};

/// An absolute path inside the repository namespace, e.g. `/repo/src/main.c`.
///
/// Always begins with `/`; never carries a trailing slash except for the
/// root itself. Ordering is component-wise, so a directory sorts before
/// every path underneath it regardless of the byte values around `/`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoPath(String);

impl Debug for RepoPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.write_fmt(format_args!("{:?}", &self.0))
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.write_str(&self.0)
    }
}

impl RepoPath {
    pub fn root() -> Self {
        RepoPath("/".to_string())
    }

    /// Parses a user-supplied repository path. Fails on relative paths,
    /// empty components, `.` and `..`.
    pub fn parse(value: &str) -> VexResult<Self> {
        if !value.starts_with('/') {
            return Err(VexError::argument(format!(
                "repository path {value:?} is not absolute"
            )));
        }
        if value == "/" {
            return Ok(RepoPath::root());
        }
        let trimmed = value.strip_suffix('/').unwrap_or(value);
        for component in trimmed[1..].split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(VexError::argument(format!(
                    "repository path {value:?} has an invalid component"
                )));
            }
        }
        Ok(RepoPath(trimmed.to_string()))
    }

    /// Builds a path from a string already known to be well formed, such as
    /// keys read back from our own stores.
    pub fn from_internal_string(value: &str) -> Self {
        RepoPath::parse(value).expect("stored repository path is well formed")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    pub fn parent(&self) -> Option<RepoPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(RepoPath::root()),
            Some(i) => Some(RepoPath(self.0[..i].to_string())),
            None => None,
        }
    }

    pub fn join(&self, name: &str) -> RepoPath {
        assert!(
            !name.is_empty() && !name.contains('/'),
            "repository path component must be a plain name"
        );
        if self.is_root() {
            RepoPath(format!("/{name}"))
        } else {
            RepoPath(format!("{}/{name}", self.0))
        }
    }

    /// Whether `other` is this path or lies underneath it.
    pub fn contains(&self, other: &RepoPath) -> bool {
        if self.is_root() {
            return true;
        }
        other.0 == self.0
            || (other.0.starts_with(&self.0) && other.0.as_bytes()[self.0.len()] == b'/')
    }

    /// The path of `self` relative to `base`, as filesystem components.
    /// Panics unless `base.contains(self)`.
    pub fn relative_to(&self, base: &RepoPath) -> PathBuf {
        assert!(
            base.contains(self),
            "path {self:?} does not lie under {base:?}"
        );
        let rest = &self.0[base.0.len()..];
        PathBuf::from(rest.trim_start_matches('/'))
    }

    /// Rebases a filesystem path under `dir` back into the repository
    /// namespace below `base`.
    pub fn from_fs_path(base: &RepoPath, dir: &Path, file: &Path) -> VexResult<RepoPath> {
        let relative = file.strip_prefix(dir).map_err(|_| {
            VexError::argument(format!("{} is outside the working copy", file.display()))
        })?;
        let mut path = base.clone();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| {
                        VexError::argument(format!("{} is not valid unicode", file.display()))
                    })?;
                    path = path.join(name);
                }
                Component::CurDir => {}
                _ => {
                    return Err(VexError::argument(format!(
                        "{} is outside the working copy",
                        file.display()
                    )))
                }
            }
        }
        Ok(path)
    }
}

impl Ord for RepoPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components().cmp(other.components())
    }
}

impl PartialOrd for RepoPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(RepoPath::parse("/").unwrap(), RepoPath::root());
        assert_eq!(RepoPath::parse("/a/b").unwrap().as_str(), "/a/b");
        assert_eq!(RepoPath::parse("/a/b/").unwrap().as_str(), "/a/b");
        assert!(RepoPath::parse("a/b").is_err());
        assert!(RepoPath::parse("/a//b").is_err());
        assert!(RepoPath::parse("/a/../b").is_err());
    }

    #[test]
    fn test_parent_and_join() {
        let path = RepoPath::parse("/a/b").unwrap();
        assert_eq!(path.parent().unwrap().as_str(), "/a");
        assert_eq!(path.parent().unwrap().parent().unwrap(), RepoPath::root());
        assert_eq!(RepoPath::root().parent(), None);
        assert_eq!(RepoPath::root().join("x").as_str(), "/x");
        assert_eq!(path.join("c").as_str(), "/a/b/c");
    }

    #[test]
    fn test_contains() {
        let root = RepoPath::root();
        let a = RepoPath::parse("/a").unwrap();
        let ab = RepoPath::parse("/a/b").unwrap();
        let ax = RepoPath::parse("/ax").unwrap();
        assert!(root.contains(&ab));
        assert!(a.contains(&a));
        assert!(a.contains(&ab));
        assert!(!a.contains(&ax));
        assert!(!ab.contains(&a));
    }

    #[test]
    fn test_component_wise_order() {
        // '/' sorts before every other byte in component order even though
        // its byte value does not.
        let ab = RepoPath::parse("/a/b").unwrap();
        let a_plus = RepoPath::parse("/a+c").unwrap();
        assert!(ab < a_plus);
        let a = RepoPath::parse("/a").unwrap();
        assert!(a < ab);
    }

    #[test]
    fn test_relative_to() {
        let base = RepoPath::parse("/repo").unwrap();
        let file = RepoPath::parse("/repo/src/main.c").unwrap();
        assert_eq!(file.relative_to(&base), PathBuf::from("src/main.c"));
        assert_eq!(base.relative_to(&base), PathBuf::from(""));
    }
}
