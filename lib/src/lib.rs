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

//! Library for Vex: a local version-control engine where every command
//! that mutates the repository can be undone and redone.

#![deny(unused_must_use)]

pub mod action;
pub mod blob_store;
pub mod branch;
pub mod changeset;
pub mod codec;
pub mod commit;
pub mod errors;
pub mod file_store;
pub mod file_util;
pub mod history;
pub mod lock;
pub mod matchers;
pub mod object_id;
pub mod project;
pub mod repo;
pub mod repo_path;
pub mod session;
pub mod settings;
pub mod transaction;
pub mod tree;
pub mod working_copy;
