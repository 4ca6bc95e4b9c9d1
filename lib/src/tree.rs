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

use serde::{Deserialize, Serialize};

use crate::object_id::Addr;

/// Free-form per-entry properties, e.g. `vex:executable`. Keys are emitted
/// in sorted order so identical property sets serialise identically.
pub type Properties = BTreeMap<String, serde_json::Value>;

pub const EXECUTABLE_PROPERTY: &str = "vex:executable";

pub fn is_executable(properties: &Properties) -> bool {
    properties
        .get(EXECUTABLE_PROPERTY)
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

/// One name inside a directory manifest.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum TreeEntry {
    File {
        addr: Addr,
        properties: Properties,
    },
    /// `addr` is `None` for an empty directory.
    Dir {
        addr: Option<Addr>,
        properties: Properties,
    },
    Ignored,
    GitFile {
        addr: Addr,
        properties: Properties,
    },
}

/// The top-level directory manifest. Unlike inner trees it carries its own
/// properties.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Root {
    pub entries: BTreeMap<String, TreeEntry>,
    pub properties: Properties,
}

/// Any non-root directory manifest.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tree {
    pub entries: BTreeMap<String, TreeEntry>,
}
