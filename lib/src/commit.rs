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

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MillisSinceEpoch(pub i64);

#[derive(Debug, PartialEq, Eq, Clone, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timestamp {
    pub timestamp: MillisSinceEpoch,
    // time zone offset in minutes
    pub tz_offset: i32,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(chrono::offset::Local::now())
    }

    pub fn from_datetime<Tz: chrono::TimeZone<Offset = chrono::offset::FixedOffset>>(
        datetime: chrono::DateTime<Tz>,
    ) -> Self {
        Self {
            timestamp: MillisSinceEpoch(datetime.timestamp_millis()),
            tz_offset: datetime.offset().local_minus_utc() / 60,
        }
    }

    /// RFC 3339 rendering for log output.
    pub fn format(&self) -> String {
        match chrono::DateTime::from_timestamp_millis(self.timestamp.0) {
            Some(utc) => utc.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            None => "invalid timestamp".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    Init,
    Prepare,
    Commit,
    Amend,
    Apply,
    Purge,
    Truncate,
}

impl CommitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitKind::Init => "init",
            CommitKind::Prepare => "prepare",
            CommitKind::Commit => "commit",
            CommitKind::Amend => "amend",
            CommitKind::Apply => "apply",
            CommitKind::Purge => "purge",
            CommitKind::Truncate => "truncate",
        }
    }
}

/// A node in history.
///
/// Real commits (`commit`/`amend`) reference a root manifest; `prepare`
/// nodes have no root and chain above the last real commit; `init` has no
/// previous commit.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Commit {
    pub kind: CommitKind,
    pub timestamp: Timestamp,
    pub previous: Option<Addr>,
    /// Named ancestry links beyond `previous`, e.g. `prepared` for the top
    /// of the prepare chain folded into a commit, `applied` for replayed
    /// commits.
    pub ancestors: BTreeMap<String, Addr>,
    pub root: Option<Addr>,
    pub changeset: Addr,
}

impl Commit {
    pub fn is_prepare(&self) -> bool {
        self.kind == CommitKind::Prepare
    }
}
