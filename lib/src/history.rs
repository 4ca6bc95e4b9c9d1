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

//! The reversible command journal.
//!
//! [`HistoryStore`] persists four tables under `history/`: the singleton
//! `current` and `next` pointers, the append-only `dos` entries and the
//! per-state `redos` stacks. [`History`] layers the do/undo/redo/recovery
//! protocol on top: `next` is always written *before* an operation's
//! physical effects and cleared *after* them, so a crash in between leaves
//! a state that rollback or restart can reconcile.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::errors::{VexError, VexResult};
use crate::file_util::write_file_atomically;

/// Sentinel for the empty history.
pub const START: &str = "init";

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextMode {
    Init,
    Do,
    Undo,
    Redo,
    Quiet,
    Rollback,
    Restart,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NextRecord {
    pub mode: NextMode,
    pub value: String,
    pub current: Option<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DoRecord {
    prev: String,
    action: Action,
}

fn new_entry_id() -> String {
    hex::encode(rand::random::<[u8; 4]>())
}

#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn load(dir: PathBuf) -> Self {
        HistoryStore { dir }
    }

    pub fn init(&self) -> VexResult<()> {
        fs::create_dir_all(self.dir.join("dos"))?;
        fs::create_dir_all(self.dir.join("redos"))?;
        self.set_current(START)?;
        self.set_next(NextMode::Init, START, None)?;
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.dir.join("current").exists()
    }

    pub fn current(&self) -> VexResult<String> {
        let buf = fs::read(self.dir.join("current"))
            .map_err(|_| VexError::corrupt("history has no current pointer"))?;
        Ok(serde_json::from_slice(&buf)?)
    }

    pub fn set_current(&self, value: &str) -> VexResult<()> {
        assert!(!value.is_empty(), "current pointer must name a state");
        write_file_atomically(&self.dir.join("current"), &serde_json::to_vec(&value)?)?;
        Ok(())
    }

    pub fn next(&self) -> VexResult<NextRecord> {
        let buf = fs::read(self.dir.join("next"))
            .map_err(|_| VexError::corrupt("history has no next pointer"))?;
        Ok(serde_json::from_slice(&buf)?)
    }

    pub fn set_next(&self, mode: NextMode, value: &str, current: Option<&str>) -> VexResult<()> {
        let record = NextRecord {
            mode,
            value: value.to_string(),
            current: current.map(|c| c.to_string()),
        };
        write_file_atomically(&self.dir.join("next"), &serde_json::to_vec(&record)?)?;
        Ok(())
    }

    pub fn get_entry(&self, addr: &str) -> VexResult<(String, Action)> {
        let buf = fs::read(self.dir.join("dos").join(addr))
            .map_err(|_| VexError::corrupt(format!("history entry {addr} is missing")))?;
        let record: DoRecord = serde_json::from_slice(&buf)?;
        Ok((record.prev, record.action))
    }

    pub fn put_entry(&self, prev: &str, action: &Action) -> VexResult<String> {
        let addr = new_entry_id();
        let record = DoRecord {
            prev: prev.to_string(),
            action: action.clone(),
        };
        write_file_atomically(
            &self.dir.join("dos").join(&addr),
            &serde_json::to_vec(&record)?,
        )?;
        Ok(addr)
    }

    pub fn get_redos(&self, addr: &str) -> VexResult<Vec<String>> {
        match fs::read(self.dir.join("redos").join(addr)) {
            Ok(buf) => Ok(serde_json::from_slice(&buf)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
            Err(err) => Err(err.into()),
        }
    }

    pub fn set_redos(&self, addr: &str, redos: &[String]) -> VexResult<()> {
        write_file_atomically(
            &self.dir.join("redos").join(addr),
            &serde_json::to_vec(&redos)?,
        )?;
        Ok(())
    }
}

/// The do/undo/redo protocol over the store.
#[derive(Debug)]
pub struct History {
    store: HistoryStore,
}

impl History {
    pub fn load(dir: PathBuf) -> Self {
        History {
            store: HistoryStore::load(dir),
        }
    }

    pub fn init(&self) -> VexResult<()> {
        self.store.init()
    }

    pub fn exists(&self) -> bool {
        self.store.exists()
    }

    pub fn is_empty(&self) -> VexResult<bool> {
        if !self.store.exists() {
            return Ok(true);
        }
        Ok(self.store.current()? == START)
    }

    pub fn clean_state(&self) -> VexResult<bool> {
        if !self.store.exists() {
            return Ok(false);
        }
        Ok(self.store.current()? == self.store.next()?.value)
    }

    fn require_clean(&self) -> VexResult<()> {
        if !self.clean_state()? {
            return Err(VexError::Unclean);
        }
        Ok(())
    }

    /// Appends `action` as the next state and runs `effects` between the
    /// two pointer writes.
    pub fn do_action<R>(
        &self,
        action: &Action,
        effects: impl FnOnce(&Action) -> VexResult<R>,
    ) -> VexResult<R> {
        self.require_clean()?;
        let current = self.store.current()?;
        let addr = self.store.put_entry(&current, action)?;
        self.store.set_next(NextMode::Do, &addr, Some(&current))?;
        let result = effects(action)?;
        self.store.set_current(&addr)?;
        Ok(result)
    }

    /// Records `action` for replay visibility without advancing `current`,
    /// so it is invisible to undo/redo.
    pub fn do_without_undo<R>(
        &self,
        action: &Action,
        effects: impl FnOnce(&Action) -> VexResult<R>,
    ) -> VexResult<R> {
        self.require_clean()?;
        let current = self.store.current()?;
        let addr = self.store.put_entry(&current, action)?;
        self.store.set_next(NextMode::Quiet, &addr, Some(&current))?;
        let result = effects(action)?;
        self.store.set_next(NextMode::Do, &current, Some(&current))?;
        Ok(result)
    }

    /// Steps `current` back one entry, running `effects` with the action
    /// being reverted. Yields `None` at the start of history.
    pub fn undo(&self, effects: impl FnOnce(&Action) -> VexResult<()>) -> VexResult<Option<Action>> {
        self.require_clean()?;
        let current = self.store.current()?;
        if current == START {
            return Ok(None);
        }
        let (prev, action) = self.store.get_entry(&current)?;
        let mut redos = vec![current.clone()];
        redos.extend(self.store.get_redos(&prev)?);
        self.store.set_next(NextMode::Undo, &prev, Some(&current))?;
        effects(&action)?;
        self.store.set_redos(&prev, &redos)?;
        self.store.set_current(&prev)?;
        Ok(Some(action))
    }

    /// Re-applies the `n`th redo choice recorded against the current state.
    pub fn redo(
        &self,
        n: usize,
        effects: impl FnOnce(&Action) -> VexResult<()>,
    ) -> VexResult<Option<Action>> {
        self.require_clean()?;
        let current = self.store.current()?;
        let mut redos = self.store.get_redos(&current)?;
        if redos.is_empty() {
            return Ok(None);
        }
        if n >= redos.len() {
            return Err(VexError::argument(format!(
                "no such redo choice: {n} of {}",
                redos.len()
            )));
        }
        let target = redos.remove(n);
        let (_prev, action) = self.store.get_entry(&target)?;
        self.store.set_next(NextMode::Redo, &target, Some(&current))?;
        effects(&action)?;
        self.store.set_redos(&current, &redos)?;
        self.store.set_current(&target)?;
        Ok(Some(action))
    }

    fn interrupted(&self) -> VexResult<Option<(NextMode, Action)>> {
        if self.clean_state()? {
            return Ok(None);
        }
        let next = self.store.next()?;
        let Some(old_current) = next.current else {
            panic!("interrupted transaction recorded no prior state");
        };
        let current = self.store.current()?;
        if current != old_current {
            return Err(VexError::corrupt(
                "interrupted transaction did not come after the current state",
            ));
        }
        let (_prev, action) = self.store.get_entry(&next.value)?;
        Ok(Some((next.mode, action)))
    }

    /// Reverts an interrupted transaction's partial effects via `effects`
    /// and clears the `next` pointer. No-op when the state is clean.
    pub fn rollback_new(
        &self,
        effects: impl FnOnce(NextMode, &Action) -> VexResult<()>,
    ) -> VexResult<Option<Action>> {
        let Some((mode, action)) = self.interrupted()? else {
            return Ok(None);
        };
        effects(mode, &action)?;
        let current = self.store.current()?;
        self.store.set_next(NextMode::Rollback, &current, None)?;
        Ok(Some(action))
    }

    /// Forward recovery: re-applies the interrupted transaction's effects
    /// and advances `current` to it. A quiet entry only clears `next`.
    pub fn restart_new(
        &self,
        effects: impl FnOnce(NextMode, &Action) -> VexResult<()>,
    ) -> VexResult<Option<Action>> {
        let Some((mode, action)) = self.interrupted()? else {
            return Ok(None);
        };
        effects(mode, &action)?;
        if mode == NextMode::Quiet {
            let current = self.store.current()?;
            self.store.set_next(NextMode::Restart, &current, None)?;
        } else {
            let value = self.store.next()?.value;
            self.store.set_current(&value)?;
            self.store.set_next(NextMode::Restart, &value, None)?;
        }
        Ok(Some(action))
    }

    /// Every applied action from newest to oldest, each with the actions
    /// that were undone away from its state.
    pub fn entries(&self) -> VexResult<Vec<(Action, Vec<Action>)>> {
        let mut current = self.store.current()?;
        let mut out = vec![];
        while current != START {
            let (prev, action) = self.store.get_entry(&current)?;
            let mut redos = vec![];
            for addr in self.store.get_redos(&current)? {
                redos.push(self.store.get_entry(&addr)?.1);
            }
            out.push((action, redos));
            current = prev;
        }
        Ok(out)
    }

    pub fn redo_choices(&self) -> VexResult<Vec<Action>> {
        let current = self.store.current()?;
        let mut out = vec![];
        for addr in self.store.get_redos(&current)? {
            out.push(self.store.get_entry(&addr)?.1);
        }
        Ok(out)
    }

    /// Test-only access to the underlying tables.
    pub fn store(&self) -> &HistoryStore {
        &self.store
    }
}
