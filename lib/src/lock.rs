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

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::errors::{VexError, VexResult};

/// The process-exclusive advisory lock over the whole repository.
///
/// Acquisition never blocks: a lock held elsewhere surfaces immediately as
/// [`VexError::Lock`] so the caller can report and exit.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn new(path: PathBuf) -> Self {
        LockFile { path }
    }

    /// Creates the lock file at repository init time.
    pub fn create(&self) -> VexResult<()> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&self.path)?;
        writeln!(file, "# created by {}", std::process::id())?;
        Ok(())
    }

    /// Takes the exclusive lock, recording the command that holds it.
    pub fn lock(&self, command: &str) -> VexResult<FileLock> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|_| VexError::Lock(self.path.clone()))?;
        #[cfg(unix)]
        rustix::fs::flock(&file, rustix::fs::FlockOperation::NonBlockingLockExclusive)
            .map_err(|_| VexError::Lock(self.path.clone()))?;
        file.set_len(0)?;
        writeln!(file, "# locked by {}", std::process::id())?;
        writeln!(file, "{command}")?;
        file.flush()?;
        Ok(FileLock { _file: file })
    }
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_lock_basic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let lock_file = LockFile::new(temp_dir.path().join("lock"));
        lock_file.create().unwrap();
        let guard = lock_file.lock("commit").unwrap();
        drop(guard);
        // released: can be taken again
        lock_file.lock("status").unwrap();
    }

    #[test]
    fn test_lock_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let lock_file = LockFile::new(temp_dir.path().join("lock"));
        assert_matches!(lock_file.lock("commit"), Err(VexError::Lock(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_excludes_second_holder() {
        let temp_dir = tempfile::tempdir().unwrap();
        let lock_file = LockFile::new(temp_dir.path().join("lock"));
        lock_file.create().unwrap();
        let _guard = lock_file.lock("commit").unwrap();
        let second = LockFile::new(temp_dir.path().join("lock"));
        assert_matches!(second.lock("status"), Err(VexError::Lock(_)));
    }
}
