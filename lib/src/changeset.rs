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

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::object_id::Addr;
use crate::repo_path::RepoPath;
use crate::tree::Properties;

/// One typed change to a single repository path.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum Change {
    AddFile { addr: Addr, properties: Properties },
    /// A file replacing a directory of the same name.
    NewFile { addr: Addr, properties: Properties },
    ChangeFile { addr: Addr, properties: Properties },
    DeleteFile,
    AddDir { properties: Properties },
    /// A directory replacing a file of the same name.
    NewDir { properties: Properties },
    ChangeDir { properties: Properties },
    DeleteDir,
    IgnorePath,
}

impl Change {
    pub fn addr(&self) -> Option<&Addr> {
        match self {
            Change::AddFile { addr, .. }
            | Change::NewFile { addr, .. }
            | Change::ChangeFile { addr, .. } => Some(addr),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Change::AddFile { .. } => "added file",
            Change::NewFile { .. } => "replaced with file",
            Change::ChangeFile { .. } => "changed file",
            Change::DeleteFile => "deleted file",
            Change::AddDir { .. } => "added directory",
            Change::NewDir { .. } => "replaced with directory",
            Change::ChangeDir { .. } => "changed directory",
            Change::DeleteDir => "deleted directory",
            Change::IgnorePath => "ignored path",
        }
    }
}

/// The delta recorded with a commit: an ordered mapping from repository
/// path to the changes applied there, oldest first. Insertion order is
/// preserved and significant; appending and prepending another changeset
/// keep the later-entry-wins reading at every consumer.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Changeset {
    pub author: Option<String>,
    pub message: Option<String>,
    pub entries: IndexMap<RepoPath, Vec<Change>>,
}

impl Changeset {
    pub fn new() -> Self {
        Changeset {
            author: None,
            message: None,
            entries: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, path: RepoPath, change: Change) {
        self.entries.entry(path).or_default().push(change);
    }

    /// Adds `other`'s changes after any already recorded for the same path.
    pub fn append_changes(&mut self, other: &Changeset) {
        for (path, changes) in &other.entries {
            self.entries
                .entry(path.clone())
                .or_default()
                .extend(changes.iter().cloned());
        }
    }

    /// Adds `other`'s changes before any already recorded for the same
    /// path, used when folding an older prepare commit underneath newer
    /// ones.
    pub fn prepend_changes(&mut self, other: &Changeset) {
        for (path, changes) in &other.entries {
            let entry = self.entries.entry(path.clone()).or_default();
            for (i, change) in changes.iter().enumerate() {
                entry.insert(i, change.clone());
            }
        }
    }
}

impl Default for Changeset {
    fn default() -> Self {
        Changeset::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> RepoPath {
        RepoPath::parse(s).unwrap()
    }

    #[test]
    fn test_append_and_prepend_preserve_order() {
        let mut base = Changeset::new();
        base.insert(path("/a"), Change::DeleteFile);

        let mut newer = Changeset::new();
        newer.insert(
            path("/a"),
            Change::AddDir {
                properties: Properties::new(),
            },
        );
        base.append_changes(&newer);
        assert_eq!(
            base.entries[&path("/a")],
            vec![
                Change::DeleteFile,
                Change::AddDir {
                    properties: Properties::new()
                }
            ]
        );

        let mut older = Changeset::new();
        older.insert(
            path("/a"),
            Change::AddFile {
                addr: crate::object_id::Addr::from_digest(&[1; 20]),
                properties: Properties::new(),
            },
        );
        older.insert(path("/b"), Change::DeleteDir);
        base.prepend_changes(&older);
        let changes = &base.entries[&path("/a")];
        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[0], Change::AddFile { .. }));
        assert_eq!(base.entries[&path("/b")], vec![Change::DeleteDir]);
    }
}
