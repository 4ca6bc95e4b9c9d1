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

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::commit::MillisSinceEpoch;
use crate::errors::VexResult;
use crate::object_id::Addr;
use crate::repo_path::RepoPath;
use crate::tree::{Properties, EXECUTABLE_PROPERTY};
use crate::working_copy::{self, FileState};

// A freshly observed mtime too close to the current time may alias a write
// that is still in progress, so it is not recorded until it has aged past
// this window. FAT-style filesystems with coarse timestamps need more.
pub const MTIME_GRACE_MILLIS: i64 = 500;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Attached,
    Detached,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedKind {
    File,
    Dir,
    Ignore,
    GitFile,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedState {
    Tracked,
    Added,
    Modified,
    Deleted,
    Replaced,
}

/// Per-file record inside a session: kind and state classification plus the
/// stat fingerprint used to detect modifications cheaply.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tracked {
    pub kind: TrackedKind,
    pub state: TrackedState,
    /// Whether the path is materialised under the current prefix.
    pub working: bool,
    pub addr: Option<Addr>,
    /// Scratch address holding uncommitted content while the session is
    /// suspended by a switch.
    pub stash: Option<Addr>,
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub mtime: Option<MillisSinceEpoch>,
    pub properties: Properties,
    /// The original kind when a directory was replaced by a file or vice
    /// versa, so deletion can restore the right classification.
    pub replace: Option<TrackedKind>,
}

impl Tracked {
    pub fn new(kind: TrackedKind, state: TrackedState) -> Self {
        Tracked {
            kind,
            state,
            working: false,
            addr: None,
            stash: None,
            size: None,
            mode: None,
            mtime: None,
            properties: Properties::new(),
            replace: None,
        }
    }

    pub fn with_working(mut self, working: bool) -> Self {
        self.working = working;
        self
    }

    pub fn with_addr(mut self, addr: Option<Addr>) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_replace(mut self, replace: Option<TrackedKind>) -> Self {
        self.replace = replace;
        self
    }

    pub fn is_changed(&self) -> bool {
        self.state != TrackedState::Tracked
    }

    pub fn set_property(&mut self, name: String, value: serde_json::Value) {
        self.properties.insert(name, value);
        if self.state == TrackedState::Tracked {
            self.state = TrackedState::Modified;
        }
    }

    fn record_fingerprint(&mut self, state: &FileState) {
        self.mode = Some(state.mode);
        self.size = Some(state.size);
        if state.aged_past(MTIME_GRACE_MILLIS) {
            self.mtime = Some(state.mtime);
        } else {
            self.mtime = None;
        }
        if state.executable() {
            self.properties
                .insert(EXECUTABLE_PROPERTY.to_string(), serde_json::Value::Bool(true));
        } else {
            self.properties.remove(EXECUTABLE_PROPERTY);
        }
    }

    /// Re-classifies this entry against the path on disk. `hasher` computes
    /// a content address and is only consulted when the stat fingerprint is
    /// incomplete.
    pub fn refresh(
        &mut self,
        path: &Path,
        hasher: impl Fn(&Path) -> VexResult<Addr>,
    ) -> VexResult<()> {
        if matches!(self.kind, TrackedKind::Ignore | TrackedKind::GitFile) || !self.working {
            return Ok(());
        }
        if self.state == TrackedState::Deleted {
            return Ok(());
        }
        let Some(st) = working_copy::file_state(path)? else {
            self.state = TrackedState::Deleted;
            self.kind = self.replace.take().unwrap_or(self.kind);
            self.addr = None;
            self.properties.clear();
            return Ok(());
        };
        match self.kind {
            TrackedKind::File => {
                if st.is_dir {
                    if self.replace.is_none() {
                        self.replace = Some(self.kind);
                    }
                    self.state = TrackedState::Replaced;
                    self.kind = TrackedKind::Dir;
                } else if self.state == TrackedState::Tracked {
                    let mut modified = false;
                    if let Some(mtime) = self.mtime {
                        if mtime < st.mtime {
                            modified = true;
                        }
                    }
                    if !modified {
                        if let Some(size) = self.size {
                            if size != st.size {
                                modified = true;
                            }
                        }
                    }
                    if !modified {
                        if let Some(mode) = self.mode {
                            if mode != st.mode {
                                modified = true;
                            }
                        }
                    }
                    if !modified
                        && (self.mtime.is_none() || self.mode.is_none() || self.size.is_none())
                    {
                        let new_addr = hasher(path)?;
                        if Some(&new_addr) != self.addr.as_ref() {
                            modified = true;
                        } else {
                            self.record_fingerprint(&st);
                        }
                    }
                    if modified {
                        self.state = TrackedState::Modified;
                        self.record_fingerprint(&st);
                    }
                } else {
                    // added/modified/replaced: just refresh the fingerprint
                    self.record_fingerprint(&st);
                }
            }
            TrackedKind::Dir => {
                if !st.is_dir {
                    self.state = TrackedState::Replaced;
                    if self.replace.is_none() {
                        self.replace = Some(self.kind);
                    }
                    self.kind = TrackedKind::File;
                    self.properties.clear();
                    self.addr = None;
                }
            }
            TrackedKind::Ignore | TrackedKind::GitFile => {}
        }
        Ok(())
    }
}

/// A working-copy view onto a branch: the tracked-file table plus the
/// prepare pointer that floats above the last real commit.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Session {
    pub uuid: String,
    pub branch: String,
    pub state: SessionState,
    pub prefix: RepoPath,
    /// Top of the prepare chain; equals `commit` when nothing is prepared.
    pub prepare: Addr,
    /// Last non-prepare ancestor.
    pub commit: Addr,
    pub files: BTreeMap<RepoPath, Tracked>,
    pub message: String,
    pub activity: Option<String>,
}

impl Session {
    pub fn update_files(
        &mut self,
        added: BTreeMap<RepoPath, Tracked>,
        removed: impl IntoIterator<Item = RepoPath>,
    ) {
        for path in removed {
            self.files.remove(&path);
        }
        self.files.extend(added);
    }
}
