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
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{VexError, VexResult};
use crate::file_util::write_file_atomically;

/// A small name-keyed mutable store: one file per key, JSON-encoded.
///
/// Keys listed in `raw_keys` are stored as bare text instead, so the user
/// can edit them in place (e.g. the pending commit message). A key set to
/// `None` leaves a `null` tombstone rather than deleting the file, which
/// keeps old/new pairs in the history log trivially invertible.
#[derive(Clone)]
pub struct FileStore<T> {
    dir: PathBuf,
    raw_keys: &'static [&'static str],
    _record: PhantomData<fn() -> T>,
}

impl<T> Debug for FileStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("dir", &self.dir).finish()
    }
}

impl<T: Serialize + DeserializeOwned> FileStore<T> {
    pub fn init(dir: PathBuf) -> VexResult<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self::load(dir))
    }

    pub fn load(dir: PathBuf) -> Self {
        FileStore {
            dir,
            raw_keys: &[],
            _record: PhantomData,
        }
    }

    pub fn with_raw_keys(mut self, raw_keys: &'static [&'static str]) -> Self {
        self.raw_keys = raw_keys;
        self
    }

    pub fn filename(&self, name: &str) -> PathBuf {
        assert!(
            !name.is_empty() && !name.contains(['/', '\\']),
            "store key must be a plain file name"
        );
        self.dir.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.filename(name).exists()
    }

    pub fn list(&self) -> VexResult<Vec<String>> {
        let mut names = vec![];
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn get(&self, name: &str) -> VexResult<Option<T>> {
        let buf = match fs::read(self.filename(name)) {
            Ok(buf) => buf,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if self.raw_keys.contains(&name) {
            let text = String::from_utf8(buf)
                .map_err(|_| VexError::corrupt(format!("store key {name} is not utf-8")))?;
            let value = T::deserialize(serde_json::Value::String(text))?;
            return Ok(Some(value));
        }
        Ok(serde_json::from_slice(&buf)?)
    }

    pub fn set(&self, name: &str, value: &T) -> VexResult<()> {
        self.set_opt(name, Some(value))
    }

    pub fn set_opt(&self, name: &str, value: Option<&T>) -> VexResult<()> {
        let buf = if self.raw_keys.contains(&name) {
            match value {
                Some(value) => match serde_json::to_value(value)? {
                    serde_json::Value::String(text) => text.into_bytes(),
                    _ => panic!("raw store key {name} must hold text"),
                },
                None => vec![],
            }
        } else {
            serde_json::to_vec(&value)?
        };
        write_file_atomically(&self.filename(name), &buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store: FileStore<Vec<String>> =
            FileStore::init(temp_dir.path().join("settings")).unwrap();
        assert_eq!(store.get("ignore").unwrap(), None);
        store
            .set("ignore", &vec!["*.o".to_string(), ".vex".to_string()])
            .unwrap();
        assert_eq!(
            store.get("ignore").unwrap().unwrap(),
            vec!["*.o".to_string(), ".vex".to_string()]
        );
    }

    #[test]
    fn test_tombstone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store: FileStore<String> = FileStore::init(temp_dir.path().join("state")).unwrap();
        store.set("active", &"u-1".to_string()).unwrap();
        store.set_opt("active", None).unwrap();
        assert!(store.exists("active"));
        assert_eq!(store.get("active").unwrap(), None);
    }

    #[test]
    fn test_raw_keys_stored_as_bare_text() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store: FileStore<String> = FileStore::init(temp_dir.path().join("state"))
            .unwrap()
            .with_raw_keys(&["message"]);
        store.set("message", &"fix the frobnicator\n".to_string()).unwrap();
        assert_eq!(
            std::fs::read(store.filename("message")).unwrap(),
            b"fix the frobnicator\n"
        );
        assert_eq!(
            store.get("message").unwrap().unwrap(),
            "fix the frobnicator\n"
        );
    }

    #[test]
    fn test_list_skips_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store: FileStore<String> = FileStore::init(temp_dir.path().join("branches")).unwrap();
        fs::create_dir(temp_dir.path().join("branches/names")).unwrap();
        store.set("u-2", &"b".to_string()).unwrap();
        store.set("u-1", &"a".to_string()).unwrap();
        assert_eq!(store.list().unwrap(), vec!["u-1", "u-2"]);
    }
}
