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

//! Ignore/include pattern matching and the recursive directory walk.
//!
//! A pattern beginning with `/` anchors to an exact repository path;
//! anything else is a basename glob. `**` is reserved.

use std::path::{Path, PathBuf};

use glob::Pattern;
use itertools::Itertools as _;

use crate::errors::{VexError, VexResult};
use crate::repo_path::RepoPath;

#[derive(Debug, Clone)]
enum Rule {
    Anchored(String),
    Basename(Pattern),
}

impl Rule {
    fn parse(rule: &str) -> VexResult<Rule> {
        if rule.contains("**") {
            return Err(VexError::Unfinished("`**` patterns are not supported"));
        }
        if let Some(_anchored) = rule.strip_prefix('/') {
            return Ok(Rule::Anchored(rule.to_string()));
        }
        let pattern = Pattern::new(rule)
            .map_err(|err| VexError::argument(format!("bad pattern {rule:?}: {err}")))?;
        Ok(Rule::Basename(pattern))
    }

    fn matches(&self, path: &RepoPath, name: &str) -> bool {
        match self {
            Rule::Anchored(anchored) => anchored.as_str() == path.as_str(),
            Rule::Basename(pattern) => pattern.matches(name),
        }
    }
}

/// A compiled ignore/include rule set.
#[derive(Debug, Clone)]
pub struct PatternSet {
    ignore: Vec<Rule>,
    include: Vec<Rule>,
}

impl PatternSet {
    pub fn new(ignore: &[String], include: &[String]) -> VexResult<Self> {
        Ok(PatternSet {
            ignore: ignore.iter().map(|r| Rule::parse(r)).try_collect()?,
            include: include.iter().map(|r| Rule::parse(r)).try_collect()?,
        })
    }

    /// Whether a path may be tracked: not ignored, and matched by the
    /// include rules (an empty include set admits everything).
    pub fn allows(&self, path: &RepoPath, name: &str) -> bool {
        if self.ignore.iter().any(|rule| rule.matches(path, name)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|rule| rule.matches(path, name))
    }
}

/// Recursively lists files and directories under `dir`, mapping each hit
/// back into the repository namespace below `base`. `skip` names a child
/// directory to leave out entirely (the repository's own metadata).
pub fn list_dir(
    dir: &Path,
    base: &RepoPath,
    patterns: &PatternSet,
    skip: Option<&Path>,
) -> VexResult<Vec<(PathBuf, RepoPath)>> {
    let mut output = vec![];
    let mut scan = vec![(dir.to_path_buf(), base.clone())];
    while let Some((fs_dir, repo_dir)) = scan.pop() {
        for entry in std::fs::read_dir(&fs_dir)? {
            let entry = entry?;
            let fs_path = entry.path();
            if Some(fs_path.as_path()) == skip {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let repo_path = repo_dir.join(&name);
            if !patterns.allows(&repo_path, &name) {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                output.push((fs_path.clone(), repo_path.clone()));
                scan.push((fs_path, repo_path));
            } else if file_type.is_file() {
                output.push((fs_path, repo_path));
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn path(s: &str) -> RepoPath {
        RepoPath::parse(s).unwrap()
    }

    #[test]
    fn test_basename_globs() {
        let patterns = PatternSet::new(&["*.o".to_string()], &[]).unwrap();
        assert!(!patterns.allows(&path("/src/main.o"), "main.o"));
        assert!(patterns.allows(&path("/src/main.c"), "main.c"));
    }

    #[test]
    fn test_anchored_rules() {
        let patterns = PatternSet::new(&["/build".to_string()], &[]).unwrap();
        assert!(!patterns.allows(&path("/build"), "build"));
        // anchored rules match the exact path, not a basename elsewhere
        assert!(patterns.allows(&path("/src/build"), "build"));
    }

    #[test]
    fn test_include_narrowing() {
        let patterns = PatternSet::new(&[], &["*.rs".to_string()]).unwrap();
        assert!(patterns.allows(&path("/lib.rs"), "lib.rs"));
        assert!(!patterns.allows(&path("/notes.txt"), "notes.txt"));
        // ignore wins over include
        let both = PatternSet::new(&["lib.rs".to_string()], &["*.rs".to_string()]).unwrap();
        assert!(!both.allows(&path("/lib.rs"), "lib.rs"));
    }

    #[test]
    fn test_doublestar_is_reserved() {
        assert_matches!(
            PatternSet::new(&["**/*.o".to_string()], &[]),
            Err(VexError::Unfinished(_))
        );
        assert_matches!(
            PatternSet::new(&[], &["a/**".to_string()]),
            Err(VexError::Unfinished(_))
        );
    }

    #[test]
    fn test_list_dir_recurses_and_skips() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir(root.join("src")).unwrap();
        std::fs::create_dir(root.join(".vex")).unwrap();
        std::fs::write(root.join("src/main.c"), b"x").unwrap();
        std::fs::write(root.join("src/main.o"), b"x").unwrap();
        std::fs::write(root.join(".vex/state"), b"x").unwrap();

        let patterns = PatternSet::new(&["*.o".to_string()], &[]).unwrap();
        let skip = root.join(".vex");
        let mut listed = list_dir(root, &RepoPath::root(), &patterns, Some(skip.as_path())).unwrap();
        listed.sort_by(|a, b| a.1.cmp(&b.1));
        let repo_paths: Vec<_> = listed.iter().map(|(_, p)| p.as_str().to_string()).collect();
        assert_eq!(repo_paths, vec!["/src", "/src/main.c"]);
    }
}
