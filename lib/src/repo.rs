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

use std::path::{Path, PathBuf};

use crate::blob_store::BlobStore;
use crate::changeset::Changeset;
use crate::codec::Record;
use crate::commit::Commit;
use crate::errors::{VexError, VexResult};
use crate::object_id::Addr;

/// The four content-addressed stores behind a repository: immutable
/// commits, manifests and file bytes, plus the scratch store transactions
/// stage into before promotion.
#[derive(Debug)]
pub struct Repo {
    pub commits: BlobStore,
    pub manifests: BlobStore,
    pub files: BlobStore,
    pub scratch: BlobStore,
}

fn objects_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("objects")
}

impl Repo {
    pub fn init(config_dir: &Path) -> VexResult<Self> {
        let objects = objects_dir(config_dir);
        Ok(Repo {
            commits: BlobStore::init(objects.join("commits"))?,
            manifests: BlobStore::init(objects.join("manifests"))?,
            files: BlobStore::init(objects.join("files"))?,
            scratch: BlobStore::init(objects.join("scratch"))?,
        })
    }

    pub fn load(config_dir: &Path) -> Self {
        let objects = objects_dir(config_dir);
        Repo {
            commits: BlobStore::load(objects.join("commits")),
            manifests: BlobStore::load(objects.join("manifests")),
            files: BlobStore::load(objects.join("files")),
            scratch: BlobStore::load(objects.join("scratch")),
        }
    }

    pub fn addr_for_file(&self, path: &Path) -> VexResult<Addr> {
        crate::codec::addr_for_file(path)
    }

    fn expect_commit(addr: &Addr, record: Record) -> VexResult<Commit> {
        match record {
            Record::Commit(commit) => Ok(commit),
            other => Err(VexError::corrupt(format!(
                "{addr} is not a commit: {other:?}"
            ))),
        }
    }

    pub fn get_commit(&self, addr: &Addr) -> VexResult<Commit> {
        Self::expect_commit(addr, self.commits.get_record(addr)?)
    }

    pub fn get_scratch_commit(&self, addr: &Addr) -> VexResult<Commit> {
        Self::expect_commit(addr, self.scratch.get_record(addr)?)
    }

    pub fn get_manifest(&self, addr: &Addr) -> VexResult<Record> {
        self.manifests.get_record(addr)
    }

    pub fn get_scratch_manifest(&self, addr: &Addr) -> VexResult<Record> {
        self.scratch.get_record(addr)
    }

    /// The on-disk location of a committed file's bytes.
    pub fn get_file_path(&self, addr: &Addr) -> VexResult<PathBuf> {
        self.files.get_file(addr)
    }

    pub fn put_scratch_commit(&self, commit: &Commit) -> VexResult<Addr> {
        self.scratch.put_record(&Record::Commit(commit.clone()))
    }

    pub fn put_scratch_manifest(&self, record: &Record) -> VexResult<Addr> {
        match record {
            Record::Root(_) | Record::Tree(_) | Record::Changeset(_) => {}
            Record::Commit(_) => panic!("commits do not belong in the manifests store"),
        }
        self.scratch.put_record(record)
    }

    pub fn put_scratch_file(&self, path: &Path) -> VexResult<Addr> {
        self.scratch.put_file(path)
    }

    pub fn add_commit_from_scratch(&self, addr: &Addr) -> VexResult<()> {
        self.commits.copy_from(&self.scratch, addr)
    }

    pub fn add_manifest_from_scratch(&self, addr: &Addr) -> VexResult<()> {
        self.manifests.copy_from(&self.scratch, addr)
    }

    pub fn add_file_from_scratch(&self, addr: &Addr) -> VexResult<()> {
        self.files.copy_from(&self.scratch, addr)
    }

    pub fn copy_from_scratch(&self, addr: &Addr, dest: &Path) -> VexResult<()> {
        self.scratch.make_copy(addr, dest)
    }

    pub fn copy_from_file(&self, addr: &Addr, dest: &Path) -> VexResult<()> {
        self.files.make_copy(addr, dest)
    }

    /// Copies out of the permanent files store when possible, falling back
    /// to scratch for content that was never promoted.
    pub fn copy_from_any(&self, addr: &Addr, dest: &Path) -> VexResult<()> {
        if self.files.exists(addr) {
            return self.files.make_copy(addr, dest);
        }
        self.scratch.make_copy(addr, dest)
    }
}

/// Coerces a manifest record into the changeset it must be.
pub fn changeset_of(addr: &Addr, record: Record) -> VexResult<Changeset> {
    match record {
        Record::Changeset(changeset) => Ok(changeset),
        other => Err(VexError::corrupt(format!(
            "{addr} is not a changeset: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_promotion_makes_commit_readable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = Repo::init(temp_dir.path()).unwrap();
        let changeset_addr = repo
            .put_scratch_manifest(&Record::Changeset(Changeset::new()))
            .unwrap();
        let commit = Commit {
            kind: crate::commit::CommitKind::Init,
            timestamp: crate::commit::Timestamp {
                timestamp: crate::commit::MillisSinceEpoch(0),
                tz_offset: 0,
            },
            previous: None,
            ancestors: Default::default(),
            root: None,
            changeset: changeset_addr.clone(),
        };
        let commit_addr = repo.put_scratch_commit(&commit).unwrap();
        assert!(repo.get_commit(&commit_addr).is_err());
        assert_eq!(repo.get_scratch_commit(&commit_addr).unwrap(), commit);

        repo.add_commit_from_scratch(&commit_addr).unwrap();
        repo.add_manifest_from_scratch(&changeset_addr).unwrap();
        assert_eq!(repo.get_commit(&commit_addr).unwrap(), commit);
        assert_eq!(
            changeset_of(&changeset_addr, repo.get_manifest(&changeset_addr).unwrap()).unwrap(),
            Changeset::new()
        );
    }
}
