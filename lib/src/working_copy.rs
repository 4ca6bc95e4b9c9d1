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

//! Low-level working-copy plumbing: stat fingerprints and file
//! materialisation with the executable bit mapped onto `vex:executable`.

use std::fs;
use std::io::ErrorKind;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::commit::MillisSinceEpoch;
use crate::errors::VexResult;

/// What `stat` said about a working-copy path, in the engine's units.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FileState {
    pub is_dir: bool,
    pub mtime: MillisSinceEpoch,
    pub size: u64,
    pub mode: u32,
    observed: MillisSinceEpoch,
}

impl FileState {
    pub fn executable(&self) -> bool {
        self.mode & 0o111 != 0
    }

    /// Whether the mtime is old enough, relative to the moment of the
    /// stat, to record without risking aliasing a write in progress.
    pub fn aged_past(&self, grace_millis: i64) -> bool {
        self.observed.0 - self.mtime.0 >= grace_millis
    }
}

/// Stats `path`. Returns `None` when the path does not exist.
pub fn file_state(path: &Path) -> VexResult<Option<FileState>> {
    let metadata = match path.symlink_metadata() {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| MillisSinceEpoch(d.as_millis() as i64))
        .unwrap_or(MillisSinceEpoch(0));
    #[cfg(unix)]
    let mode = metadata.permissions().mode();
    #[cfg(not(unix))]
    let mode = 0;
    let observed = std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| MillisSinceEpoch(d.as_millis() as i64))
        .unwrap_or(MillisSinceEpoch(0));
    Ok(Some(FileState {
        is_dir: metadata.is_dir(),
        mtime,
        size: metadata.len(),
        mode,
        observed,
    }))
}

pub fn create_parent_dirs(disk_path: &Path) -> VexResult<()> {
    if let Some(parent) = disk_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn set_executable(disk_path: &Path, executable: bool) -> VexResult<()> {
    #[cfg(unix)]
    {
        let mode = if executable { 0o755 } else { 0o644 };
        fs::set_permissions(disk_path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (disk_path, executable);
    }
    Ok(())
}

/// Marks an already-written file executable without touching the other
/// permission bits.
pub fn mark_executable(disk_path: &Path) -> VexResult<()> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(disk_path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        fs::set_permissions(disk_path, permissions)?;
    }
    #[cfg(not(unix))]
    {
        let _ = disk_path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_state_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(file_state(&temp_dir.path().join("gone")).unwrap(), None);
    }

    #[test]
    fn test_file_state_kinds() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("f");
        std::fs::write(&file, b"contents").unwrap();
        let state = file_state(&file).unwrap().unwrap();
        assert!(!state.is_dir);
        assert_eq!(state.size, 8);
        assert!(file_state(temp_dir.path()).unwrap().unwrap().is_dir);
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("f");
        std::fs::write(&file, b"#!/bin/sh\n").unwrap();
        set_executable(&file, true).unwrap();
        assert!(file_state(&file).unwrap().unwrap().executable());
        set_executable(&file, false).unwrap();
        assert!(!file_state(&file).unwrap().unwrap().executable());
        mark_executable(&file).unwrap();
        assert!(file_state(&file).unwrap().unwrap().executable());
    }
}
