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

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::branch::{Branch, BranchState};
use crate::commit::Timestamp;
use crate::object_id::Addr;
use crate::repo_path::RepoPath;
use crate::session::{Session, SessionState};
use crate::settings::Setting;

/// Which side of the recorded old/new pairs to apply: `New` when doing or
/// redoing, `Old` when undoing.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    Old,
    New,
}

impl Direction {
    pub fn inverse(self) -> Direction {
        match self {
            Direction::Old => Direction::New,
            Direction::New => Direction::Old,
        }
    }
}

/// A before/after pair. The two sides fully describe the transition, so the
/// inverse application is just reading the other side.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pair<T> {
    pub old: T,
    pub new: T,
}

impl<T> Pair<T> {
    pub fn select(&self, direction: Direction) -> &T {
        match direction {
            Direction::Old => &self.old,
            Direction::New => &self.new,
        }
    }
}

/// Old/new values of every record a session transaction touched, keyed by
/// uuid, name or state key. `None` means the key did not / will not exist.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionChanges {
    pub branches: Pair<BTreeMap<String, Option<Branch>>>,
    pub names: Pair<BTreeMap<String, Option<String>>>,
    pub sessions: Pair<BTreeMap<String, Option<Session>>>,
    pub settings: Pair<BTreeMap<String, Option<Setting>>>,
    pub states: Pair<BTreeMap<String, Option<String>>>,
}

impl<T> Default for Pair<BTreeMap<String, T>> {
    fn default() -> Self {
        Pair {
            old: BTreeMap::new(),
            new: BTreeMap::new(),
        }
    }
}

impl SessionChanges {
    pub fn is_empty(&self) -> bool {
        self.branches.new.is_empty()
            && self.names.new.is_empty()
            && self.sessions.new.is_empty()
            && self.settings.new.is_empty()
            && self.states.new.is_empty()
    }
}

/// Addresses a transaction added to the scratch store, grouped by the
/// permanent store they get promoted into.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Blobs {
    pub commits: BTreeSet<Addr>,
    pub manifests: BTreeSet<Addr>,
    pub files: BTreeSet<Addr>,
}

impl Blobs {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty() && self.manifests.is_empty() && self.files.is_empty()
    }
}

/// What a working-copy path held (or will hold): file content stashed in
/// scratch, or a bare directory. `None` means the path is absent.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum WorkingValue {
    File(Addr),
    Dir,
}

pub type WorkingMap = BTreeMap<RepoPath, Option<WorkingValue>>;

/// A blob-producing history entry: everything needed to apply, undo or
/// redo one session transaction.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionAction {
    pub time: Timestamp,
    pub command: String,
    pub changes: Option<SessionChanges>,
    pub blobs: Option<Blobs>,
    pub working: Option<Pair<WorkingMap>>,
}

/// A prefix/session switch history entry. Carries no blobs; the working
/// copy is re-materialised from the stores at apply time.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchAction {
    pub time: Timestamp,
    pub command: String,
    pub prefix: Option<Pair<RepoPath>>,
    pub active: Option<Pair<String>>,
    pub session_states: Pair<BTreeMap<String, SessionState>>,
    pub branch_states: Pair<BTreeMap<String, BranchState>>,
    pub names: Pair<BTreeMap<String, Option<String>>>,
    pub states: Pair<BTreeMap<String, Option<String>>>,
}

/// One entry in the history log.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Action {
    Session(SessionAction),
    Switch(SwitchAction),
}

impl Action {
    pub fn command(&self) -> &str {
        match self {
            Action::Session(action) => &action.command,
            Action::Switch(action) => &action.command,
        }
    }

    pub fn time(&self) -> &Timestamp {
        match self {
            Action::Session(action) => &action.time,
            Action::Switch(action) => &action.time,
        }
    }
}
