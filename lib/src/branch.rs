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

use serde::{Deserialize, Serialize};

use crate::object_id::Addr;
use crate::repo_path::RepoPath;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchState {
    Created,
    Active,
    Inactive,
    Merged,
    Closed,
}

/// A named, stateful pointer into the commit graph.
///
/// `head` is the latest commit reachable on the branch, `base` the fork
/// point on the upstream branch (`None` for the primary branch), and
/// `init` the repository's first commit, kept for fork detection.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Branch {
    pub uuid: String,
    pub name: String,
    pub state: BranchState,
    pub prefix: RepoPath,
    pub head: Addr,
    pub base: Option<Addr>,
    pub init: Addr,
    pub upstream: Option<String>,
    pub sessions: Vec<String>,
}
