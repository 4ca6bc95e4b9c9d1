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

//! Canonical serialisation and content addressing.
//!
//! Every persisted blob is a [`Record`]: an externally tagged value whose
//! tag set enumerates the entity variants the stores accept. Decoding an
//! unknown tag or an unknown field fails closed. The byte form is
//! deterministic because unordered maps are `BTreeMap` (sorted emission)
//! and ordered maps are `IndexMap` (insertion order is part of the value),
//! so equal values always hash to equal addresses.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use blake2::Blake2b;
use digest::consts::U20;
use digest::Digest;
use serde::{Deserialize, Serialize};

use crate::changeset::Changeset;
use crate::commit::Commit;
use crate::errors::VexResult;
use crate::object_id::Addr;
use crate::tree::{Root, Tree};

/// The 20-byte content digest behind every address.
type ContentDigest = Blake2b<U20>;

/// The tagged top level of every stored blob.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Record {
    Commit(Commit),
    Root(Root),
    Tree(Tree),
    Changeset(Changeset),
}

/// The canonical byte form of a record.
pub fn to_canonical_bytes(record: &Record) -> Vec<u8> {
    serde_json::to_vec(record).expect("record serialisation cannot fail")
}

pub fn from_bytes(buf: &[u8]) -> VexResult<Record> {
    Ok(serde_json::from_slice(buf)?)
}

pub fn addr_for_buf(buf: &[u8]) -> Addr {
    let mut hasher = ContentDigest::new();
    hasher.update(buf);
    Addr::from_digest(&hasher.finalize())
}

pub fn addr_for_record(record: &Record) -> (Addr, Vec<u8>) {
    let buf = to_canonical_bytes(record);
    (addr_for_buf(&buf), buf)
}

/// Streams a file's raw bytes through the digest.
pub fn addr_for_file(path: &Path) -> VexResult<Addr> {
    let mut file = File::open(path)?;
    let mut hasher = ContentDigest::new();
    let mut buf = [0u8; 1 << 14];
    loop {
        let bytes_read = file.read(&mut buf)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buf[..bytes_read]);
    }
    Ok(Addr::from_digest(&hasher.finalize()))
}
