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

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use crate::codec::{self, Record};
use crate::errors::{VexError, VexResult};
use crate::file_util::persist_content_addressed_temp_file;
use crate::object_id::Addr;

/// A content-addressed, immutable store over a directory tree.
///
/// Blobs live under `<root>/<first two hex chars>/<rest>` to bound
/// directory width. Every write is create-if-absent; a duplicate put is a
/// silent success, and promotion from another store is idempotent.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn init(dir: PathBuf) -> VexResult<Self> {
        fs::create_dir_all(&dir)?;
        Ok(BlobStore { dir })
    }

    pub fn load(dir: PathBuf) -> Self {
        BlobStore { dir }
    }

    pub fn blob_path(&self, addr: &Addr) -> PathBuf {
        let hex = addr.hex();
        self.dir.join(&hex[..2]).join(&hex[2..])
    }

    pub fn exists(&self, addr: &Addr) -> bool {
        self.blob_path(addr).exists()
    }

    fn write_blob(&self, addr: &Addr, contents: &[u8]) -> VexResult<()> {
        let path = self.blob_path(addr);
        fs::create_dir_all(path.parent().expect("blob path has a fan-out directory"))?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(contents)?;
        persist_content_addressed_temp_file(temp_file, path).map_err(|err| err.error)?;
        Ok(())
    }

    /// Copies a working-copy file into the store, returning its address.
    pub fn put_file(&self, file: &std::path::Path) -> VexResult<Addr> {
        let addr = codec::addr_for_file(file)?;
        if !self.exists(&addr) {
            let path = self.blob_path(&addr);
            fs::create_dir_all(path.parent().expect("blob path has a fan-out directory"))?;
            let temp_file = NamedTempFile::new_in(&self.dir)?;
            fs::copy(file, temp_file.path())?;
            persist_content_addressed_temp_file(temp_file, path).map_err(|err| err.error)?;
        }
        Ok(addr)
    }

    pub fn put_buf(&self, buf: &[u8]) -> VexResult<Addr> {
        let addr = codec::addr_for_buf(buf);
        if !self.exists(&addr) {
            self.write_blob(&addr, buf)?;
        }
        Ok(addr)
    }

    pub fn put_record(&self, record: &Record) -> VexResult<Addr> {
        let (addr, buf) = codec::addr_for_record(record);
        if !self.exists(&addr) {
            self.write_blob(&addr, &buf)?;
        }
        Ok(addr)
    }

    pub fn get_record(&self, addr: &Addr) -> VexResult<Record> {
        let buf = fs::read(self.blob_path(addr))
            .map_err(|_| VexError::corrupt(format!("missing blob {addr}")))?;
        codec::from_bytes(&buf)
    }

    /// The on-disk location of a blob's raw bytes.
    pub fn get_file(&self, addr: &Addr) -> VexResult<PathBuf> {
        let path = self.blob_path(addr);
        if !path.exists() {
            return Err(VexError::corrupt(format!("missing blob {addr}")));
        }
        Ok(path)
    }

    /// Promotes a blob from `other`. A blob already present here is left
    /// alone; a blob present in neither store is corruption.
    pub fn copy_from(&self, other: &BlobStore, addr: &Addr) -> VexResult<()> {
        if other.exists(addr) && !self.exists(addr) {
            let dest = self.blob_path(addr);
            fs::create_dir_all(dest.parent().expect("blob path has a fan-out directory"))?;
            fs::copy(other.blob_path(addr), dest)?;
        } else if !self.exists(addr) {
            return Err(VexError::corrupt(format!(
                "missing blob {addr} in {}",
                other.dir.display()
            )));
        }
        Ok(())
    }

    /// Like [`BlobStore::copy_from`] but moves the underlying file.
    pub fn move_from(&self, other: &BlobStore, addr: &Addr) -> VexResult<()> {
        if other.exists(addr) && !self.exists(addr) {
            let dest = self.blob_path(addr);
            fs::create_dir_all(dest.parent().expect("blob path has a fan-out directory"))?;
            fs::rename(other.blob_path(addr), dest)?;
        } else if !self.exists(addr) {
            return Err(VexError::corrupt(format!(
                "missing blob {addr} in {}",
                other.dir.display()
            )));
        }
        Ok(())
    }

    /// Copies a blob's bytes out to a working-copy path.
    pub fn make_copy(&self, addr: &Addr, dest: &std::path::Path) -> VexResult<()> {
        fs::copy(self.get_file(addr)?, dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_store(temp_dir: &tempfile::TempDir, name: &str) -> BlobStore {
        BlobStore::init(temp_dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_put_buf_layout_and_duplicates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = new_store(&temp_dir, "files");
        let addr = store.put_buf(b"hello\n").unwrap();
        // duplicate put is a silent success
        assert_eq!(store.put_buf(b"hello\n").unwrap(), addr);
        let path = store.blob_path(&addr);
        assert!(path.exists());
        assert_eq!(
            path.parent().unwrap().file_name().unwrap().to_str().unwrap(),
            &addr.hex()[..2]
        );
        assert_eq!(std::fs::read(path).unwrap(), b"hello\n");
    }

    #[test]
    fn test_put_file_matches_put_buf() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = new_store(&temp_dir, "files");
        let file = temp_dir.path().join("input");
        std::fs::write(&file, b"contents").unwrap();
        assert_eq!(
            store.put_file(&file).unwrap(),
            store.put_buf(b"contents").unwrap()
        );
    }

    #[test]
    fn test_copy_and_move_promotion() {
        let temp_dir = tempfile::tempdir().unwrap();
        let scratch = new_store(&temp_dir, "scratch");
        let files = new_store(&temp_dir, "files");
        let addr = scratch.put_buf(b"promote me").unwrap();

        files.copy_from(&scratch, &addr).unwrap();
        assert!(files.exists(&addr));
        // idempotent
        files.copy_from(&scratch, &addr).unwrap();

        let addr2 = scratch.put_buf(b"move me").unwrap();
        files.move_from(&scratch, &addr2).unwrap();
        assert!(files.exists(&addr2));
        assert!(!scratch.exists(&addr2));
        // destination already present: no-op even though the source is gone
        files.move_from(&scratch, &addr2).unwrap();

        let missing = crate::codec::addr_for_buf(b"never stored");
        assert!(files.copy_from(&scratch, &missing).is_err());
    }

    #[test]
    fn test_record_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = new_store(&temp_dir, "manifests");
        let record = Record::Changeset(crate::changeset::Changeset::new());
        let addr = store.put_record(&record).unwrap();
        assert_eq!(store.get_record(&addr).unwrap(), record);
    }
}
