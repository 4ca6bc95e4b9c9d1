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

use std::path::PathBuf;

use thiserror::Error;

/// Recoverable failures of user-level operations.
///
/// Engine invariant violations are not represented here: those are bugs and
/// panic with a message naming the broken invariant.
#[derive(Debug, Error)]
pub enum VexError {
    #[error("Another process holds the repository lock at {}", .0.display())]
    Lock(PathBuf),
    #[error("Repository state is corrupt: {0}")]
    Corrupt(String),
    #[error("No repository found")]
    NoProject,
    #[error("Repository has no history")]
    NoHistory,
    #[error("Repository has an unfinished transaction; undo or recover first")]
    Unclean,
    #[error("{0}")]
    Argument(String),
    #[error("Not implemented: {0}")]
    Unfinished(&'static str),
    /// Internal control flow: a transaction body asked for the whole
    /// operation to be abandoned. Filtered out by the project facade and
    /// never surfaced to callers.
    #[error("Transaction cancelled")]
    Cancel,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Could not decode stored record: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type VexResult<T> = std::result::Result<T, VexError>;

impl VexError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        VexError::Corrupt(msg.into())
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        VexError::Argument(msg.into())
    }
}
