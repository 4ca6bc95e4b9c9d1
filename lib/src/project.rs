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

//! The project facade: every user-level operation follows the same
//! skeleton. Acquire the repository lock, open a transaction, mutate
//! through it, then hand the resulting action to the history engine and
//! apply its physical effects between the engine's two pointer writes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools as _;
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::action::{Action, Blobs, Direction, Pair, SessionChanges, WorkingMap, WorkingValue};
use crate::branch::{Branch, BranchState};
use crate::changeset::{Change, Changeset};
use crate::codec::Record;
use crate::commit::{Commit, CommitKind};
use crate::errors::{VexError, VexResult};
use crate::file_store::FileStore;
use crate::history::{History, NextMode};
use crate::lock::{FileLock, LockFile};
use crate::matchers::PatternSet;
use crate::object_id::{random_uuid, Addr};
use crate::repo::Repo;
use crate::repo_path::RepoPath;
use crate::session::{Session, SessionState, Tracked, TrackedKind, TrackedState};
use crate::settings::{Setting, UserSettings};
use crate::transaction::{SessionTransaction, SwitchTransaction, Transaction};
use crate::tree::is_executable;

/// The repository path under which the engine's own settings files are
/// tracked. It materialises into `<config>/settings`.
pub const VEX_DIR: &str = "/.vex";

pub fn vex_dir() -> RepoPath {
    RepoPath::from_internal_string(VEX_DIR)
}

/// Whether a tracked path materialises under the given checkout prefix.
/// The settings directory always does; the root prefix checks out no
/// subtree, so switching to `/` hides every file.
pub fn materialises(prefix: &RepoPath, name: &RepoPath) -> bool {
    vex_dir().contains(name) || (!prefix.is_root() && prefix.contains(name))
}

/// Default name of the repository metadata directory.
pub const CONFIG_DIR_NAME: &str = ".vex";

/// Everything behind one repository: the object stores, the name-keyed
/// record stores, the history log and the lock.
#[derive(Debug)]
pub struct Project {
    pub working_dir: PathBuf,
    pub config_dir: PathBuf,
    /// Dry-run mode: operations stage their transaction, then log what
    /// they would apply instead of touching history or the stores.
    pub fake: bool,
    pub(crate) repo: Repo,
    pub(crate) branches: FileStore<Branch>,
    pub(crate) names: FileStore<String>,
    pub(crate) sessions: FileStore<Session>,
    pub(crate) state: FileStore<String>,
    pub(crate) settings: FileStore<Setting>,
    pub(crate) history: History,
    lockfile: LockFile,
    user: UserSettings,
}

impl Project {
    pub fn new(working_dir: PathBuf, user: UserSettings) -> Self {
        let config_dir = working_dir.join(CONFIG_DIR_NAME);
        Project {
            repo: Repo::load(&config_dir),
            branches: FileStore::load(config_dir.join("branches")),
            names: FileStore::load(config_dir.join("branches").join("names")),
            sessions: FileStore::load(config_dir.join("branches").join("sessions")),
            state: FileStore::load(config_dir.join("state")).with_raw_keys(&["message"]),
            settings: FileStore::load(config_dir.join("settings")).with_raw_keys(&["template"]),
            history: History::load(config_dir.join("history")),
            lockfile: LockFile::new(config_dir.join("lock")),
            working_dir,
            config_dir,
            fake: false,
            user,
        }
    }

    /// Walks upward from `dir` looking for a repository.
    pub fn locate(dir: &Path) -> VexResult<Project> {
        let mut cursor = Some(dir.to_path_buf());
        while let Some(dir) = cursor {
            if dir.join(CONFIG_DIR_NAME).is_dir() {
                let user = UserSettings::for_user()
                    .map_err(|err| VexError::argument(format!("bad configuration: {err}")))?;
                return Ok(Project::new(dir, user));
            }
            cursor = dir.parent().map(|p| p.to_path_buf());
        }
        Err(VexError::NoProject)
    }

    pub fn exists(&self) -> bool {
        self.config_dir.exists()
    }

    pub fn settings_dir(&self) -> PathBuf {
        self.config_dir.join("settings")
    }

    fn makedirs(&self) -> VexResult<()> {
        fs::create_dir_all(&self.config_dir)?;
        Repo::init(&self.config_dir)?;
        FileStore::<Branch>::init(self.config_dir.join("branches"))?;
        FileStore::<String>::init(self.config_dir.join("branches").join("names"))?;
        FileStore::<Session>::init(self.config_dir.join("branches").join("sessions"))?;
        FileStore::<String>::init(self.config_dir.join("state"))?;
        FileStore::<Setting>::init(self.config_dir.join("settings"))?;
        self.history.init()?;
        self.lockfile.create()?;
        Ok(())
    }

    pub fn clean_state(&self) -> VexResult<bool> {
        self.history.clean_state()
    }

    pub fn history_is_empty(&self) -> VexResult<bool> {
        self.history.is_empty()
    }

    pub fn prefix(&self) -> VexResult<Option<RepoPath>> {
        Ok(self
            .state
            .get("prefix")?
            .map(|p| RepoPath::from_internal_string(&p)))
    }

    pub fn active(&self) -> VexResult<Option<Session>> {
        match self.state.get("active")? {
            Some(uuid) => self.sessions.get(&uuid),
            None => Ok(None),
        }
    }

    fn require_active(&self) -> VexResult<Session> {
        self.active()?.ok_or(VexError::NoProject)
    }

    pub fn get_branch(&self, uuid: &str) -> VexResult<Option<Branch>> {
        self.branches.get(uuid)
    }

    pub fn get_branch_uuid(&self, name: &str) -> VexResult<Option<String>> {
        self.names.get(name)
    }

    pub fn get_session(&self, uuid: &str) -> VexResult<Option<Session>> {
        self.sessions.get(uuid)
    }

    pub fn get_commit(&self, addr: &Addr) -> VexResult<Commit> {
        self.repo.get_commit(addr)
    }

    pub fn get_manifest(&self, addr: &Addr) -> VexResult<Record> {
        self.repo.get_manifest(addr)
    }

    // -- path mapping ------------------------------------------------------

    /// Maps a repository path to its working-copy location. Paths under
    /// the settings prefix land in the metadata directory instead.
    pub fn repo_to_full_path(&self, prefix: &RepoPath, name: &RepoPath) -> PathBuf {
        if vex_dir().contains(name) {
            self.settings_dir().join(name.relative_to(&vex_dir()))
        } else {
            assert!(
                prefix.contains(name),
                "path {name} is not materialised under {prefix}"
            );
            self.working_dir.join(name.relative_to(prefix))
        }
    }

    /// Maps a working-copy location back into the repository namespace.
    pub fn full_to_repo_path(&self, prefix: &RepoPath, file: &Path) -> VexResult<RepoPath> {
        if file.starts_with(self.settings_dir()) {
            return RepoPath::from_fs_path(&vex_dir(), &self.settings_dir(), file);
        }
        if file.starts_with(&self.config_dir) {
            return Err(VexError::argument(format!(
                "{} is inside the repository metadata",
                file.display()
            )));
        }
        RepoPath::from_fs_path(prefix, &self.working_dir, file)
    }

    /// Validates user-supplied working-copy paths: relative paths are
    /// anchored at the working directory, and nothing may escape it.
    pub fn check_files(&self, files: &[PathBuf]) -> VexResult<Vec<PathBuf>> {
        let mut output = vec![];
        for file in files {
            let file = if file.is_absolute() {
                file.clone()
            } else {
                self.working_dir.join(file)
            };
            if !file.starts_with(&self.working_dir) {
                return Err(VexError::argument(format!(
                    "{} is outside the project",
                    file.display()
                )));
            }
            if file == self.config_dir {
                continue;
            }
            output.push(file);
        }
        Ok(output)
    }

    // -- transaction wrappers ---------------------------------------------

    fn with_do<T>(
        &self,
        command: &str,
        body: impl FnOnce(&mut SessionTransaction) -> VexResult<T>,
    ) -> VexResult<Option<T>> {
        let _lock = self.lockfile.lock(command)?;
        if !self.history.clean_state()? {
            return Err(VexError::Unclean);
        }
        let mut txn = SessionTransaction::new(self, command);
        let result = match body(&mut txn) {
            Ok(result) => result,
            Err(VexError::Cancel) => return Ok(None),
            Err(err) => return Err(err),
        };
        let action = txn.build_action();
        if self.fake {
            info!(command, "fake mode: not recording {:?}", action.command());
            return Ok(Some(result));
        }
        self.history.do_action(&action, |action| {
            let Action::Session(action) = action else {
                panic!("session transaction produced a switch action");
            };
            if let Some(blobs) = &action.blobs {
                self.copy_blobs(blobs)?;
            }
            if let Some(working) = &action.working {
                self.apply_working_changes(Direction::New, working)?;
            }
            if let Some(changes) = &action.changes {
                self.apply_physical_changes(Direction::New, changes)?;
            }
            Ok(())
        })?;
        Ok(Some(result))
    }

    fn with_do_without_undo<T>(
        &self,
        command: &str,
        body: impl FnOnce(&mut SessionTransaction) -> VexResult<T>,
    ) -> VexResult<Option<T>> {
        let _lock = self.lockfile.lock(command)?;
        if !self.history.clean_state()? {
            return Err(VexError::Unclean);
        }
        let mut txn = SessionTransaction::new(self, command);
        let result = match body(&mut txn) {
            Ok(result) => result,
            Err(VexError::Cancel) => return Ok(None),
            Err(err) => return Err(err),
        };
        let action = txn.build_action();
        if self.fake {
            info!(command, "fake mode: not recording {:?}", action.command());
            return Ok(Some(result));
        }
        self.history.do_without_undo(&action, |action| {
            let Action::Session(action) = action else {
                panic!("session transaction produced a switch action");
            };
            assert!(
                action.blobs.is_none(),
                "a quiet action may not produce blobs"
            );
            if let Some(changes) = &action.changes {
                self.apply_physical_changes(Direction::New, changes)?;
            }
            Ok(())
        })?;
        Ok(Some(result))
    }

    fn with_do_switch<T>(
        &self,
        command: &str,
        body: impl FnOnce(&mut SwitchTransaction) -> VexResult<T>,
    ) -> VexResult<Option<T>> {
        let _lock = self.lockfile.lock(command)?;
        if !self.history.clean_state()? {
            return Err(VexError::Unclean);
        }
        let mut txn = SwitchTransaction::new(self, command);
        let result = match body(&mut txn) {
            Ok(result) => result,
            Err(VexError::Cancel) => return Ok(None),
            Err(err) => return Err(err),
        };
        let action = txn.build_action();
        if self.fake {
            info!(command, "fake mode: not recording {:?}", action.command());
            return Ok(Some(result));
        }
        self.history.do_action(&action, |action| {
            let Action::Switch(action) = action else {
                panic!("switch transaction produced a session action");
            };
            self.apply_switch(Direction::New, &action.prefix, &action.active, &_lock)?;
            self.apply_logical_changes(Direction::New, action)?;
            Ok(())
        })?;
        Ok(Some(result))
    }

    // -- undo / redo / recovery -------------------------------------------

    pub fn undo(&self) -> VexResult<Option<Action>> {
        let _lock = self.lockfile.lock("undo")?;
        self.history.undo(|action| match action {
            Action::Session(action) => {
                if let Some(changes) = &action.changes {
                    self.apply_physical_changes(Direction::Old, changes)?;
                }
                if let Some(working) = &action.working {
                    self.apply_working_changes(Direction::Old, working)?;
                }
                Ok(())
            }
            Action::Switch(action) => {
                self.apply_switch(Direction::Old, &action.prefix, &action.active, &_lock)?;
                self.apply_logical_changes(Direction::Old, action)
            }
        })
    }

    pub fn redo(&self, choice: usize) -> VexResult<Option<Action>> {
        let _lock = self.lockfile.lock("redo")?;
        self.history.redo(choice, |action| match action {
            Action::Session(action) => {
                if let Some(changes) = &action.changes {
                    self.apply_physical_changes(Direction::New, changes)?;
                }
                if let Some(working) = &action.working {
                    self.apply_working_changes(Direction::New, working)?;
                }
                Ok(())
            }
            Action::Switch(action) => {
                self.apply_switch(Direction::New, &action.prefix, &action.active, &_lock)?;
                self.apply_logical_changes(Direction::New, action)
            }
        })
    }

    pub fn redo_choices(&self) -> VexResult<Vec<Action>> {
        let _lock = self.lockfile.lock("redo:list")?;
        self.history.redo_choices()
    }

    /// Every recorded action, newest first, with its redo alternatives.
    pub fn list_undos(&self) -> VexResult<Vec<(Action, Vec<Action>)>> {
        let _lock = self.lockfile.lock("undo:list")?;
        self.history.entries()
    }

    /// Reverts the partial effects of an interrupted transaction.
    pub fn rollback_new_action(&self) -> VexResult<Option<Action>> {
        let _lock = self.lockfile.lock("rollback")?;
        self.history.rollback_new(|mode, action| {
            match action {
                Action::Session(action) => {
                    let direction = if mode == NextMode::Undo {
                        // an interrupted undo is reverted by re-applying
                        Direction::New
                    } else {
                        Direction::Old
                    };
                    if let Some(changes) = &action.changes {
                        self.apply_physical_changes(direction, changes)?;
                    }
                }
                Action::Switch(_) => {
                    // the switch materialisation is idempotent and will be
                    // reconciled by the next switch
                }
            }
            Ok(())
        })
    }

    /// Completes an interrupted transaction instead of reverting it.
    pub fn restart_new_action(&self) -> VexResult<Option<Action>> {
        let _lock = self.lockfile.lock("restart")?;
        self.history.restart_new(|mode, action| {
            match action {
                Action::Session(action) => {
                    if mode != NextMode::Quiet {
                        if let Some(blobs) = &action.blobs {
                            self.copy_blobs(blobs)?;
                        }
                    }
                    let direction = if mode == NextMode::Undo {
                        // an interrupted undo completes by finishing the
                        // old-side application
                        Direction::Old
                    } else {
                        Direction::New
                    };
                    if let Some(changes) = &action.changes {
                        self.apply_physical_changes(direction, changes)?;
                    }
                }
                Action::Switch(_) => {}
            }
            Ok(())
        })
    }

    // -- applying actions --------------------------------------------------

    /// Promotes every scratch blob named by the action into its permanent
    /// store. Promotion is idempotent, so replaying after a crash is safe.
    fn copy_blobs(&self, blobs: &Blobs) -> VexResult<()> {
        for addr in &blobs.commits {
            self.repo.add_commit_from_scratch(addr)?;
        }
        for addr in &blobs.manifests {
            self.repo.add_manifest_from_scratch(addr)?;
        }
        for addr in &blobs.files {
            self.repo.add_file_from_scratch(addr)?;
        }
        Ok(())
    }

    fn apply_physical_changes(
        &self,
        direction: Direction,
        changes: &SessionChanges,
    ) -> VexResult<()> {
        for (uuid, value) in changes.branches.select(direction) {
            self.branches.set_opt(uuid, value.as_ref())?;
        }
        for (name, value) in changes.names.select(direction) {
            self.names.set_opt(name, value.as_ref())?;
        }
        for (uuid, value) in changes.sessions.select(direction) {
            self.sessions.set_opt(uuid, value.as_ref())?;
        }
        for (name, value) in changes.settings.select(direction) {
            self.settings.set_opt(name, value.as_ref())?;
        }
        for (name, value) in changes.states.select(direction) {
            self.state.set_opt(name, value.as_ref())?;
        }
        Ok(())
    }

    fn apply_logical_changes(
        &self,
        direction: Direction,
        action: &crate::action::SwitchAction,
    ) -> VexResult<()> {
        for (uuid, state) in action.session_states.select(direction) {
            let mut session = self
                .sessions
                .get(uuid)?
                .ok_or_else(|| VexError::corrupt(format!("unknown session {uuid}")))?;
            session.state = *state;
            self.sessions.set(uuid, &session)?;
        }
        for (uuid, state) in action.branch_states.select(direction) {
            let mut branch = self
                .branches
                .get(uuid)?
                .ok_or_else(|| VexError::corrupt(format!("unknown branch {uuid}")))?;
            branch.state = *state;
            self.branches.set(uuid, &branch)?;
        }
        for (name, value) in action.names.select(direction) {
            self.names.set_opt(name, value.as_ref())?;
        }
        for (name, value) in action.states.select(direction) {
            self.state.set_opt(name, value.as_ref())?;
        }
        Ok(())
    }

    /// Overwrites working-copy paths with the selected side of the
    /// recorded content, but only where the on-disk bytes still match the
    /// other side; anything that drifted is logged and left alone.
    fn apply_working_changes(
        &self,
        direction: Direction,
        working: &Pair<WorkingMap>,
    ) -> VexResult<()> {
        let active = self.require_active()?;
        let target = working.select(direction);
        let recorded = working.select(direction.inverse());
        let mut dirs = vec![];
        for (name, value) in target {
            let path = self.repo_to_full_path(&active.prefix, name);
            let recorded_old = recorded.get(name).cloned().flatten();
            match recorded_old {
                None if !path.exists() => match value {
                    Some(WorkingValue::Dir) => fs::create_dir_all(&path)?,
                    Some(WorkingValue::File(addr)) => {
                        crate::working_copy::create_parent_dirs(&path)?;
                        self.repo.copy_from_any(addr, &path)?;
                    }
                    None => {}
                },
                Some(WorkingValue::File(old_addr))
                    if path.is_file() && self.repo.addr_for_file(&path)? == old_addr =>
                {
                    fs::remove_file(&path)?;
                    match value {
                        Some(WorkingValue::File(addr)) => self.repo.copy_from_any(addr, &path)?,
                        Some(WorkingValue::Dir) => fs::create_dir(&path)?,
                        None => {}
                    }
                }
                Some(WorkingValue::Dir) if path.is_dir() => {
                    if value.is_none() {
                        dirs.push(path);
                    }
                }
                _ => {
                    warn!("skipping {}: content changed on disk", path.display());
                }
            }
        }
        dirs.sort();
        for dir in dirs.into_iter().rev() {
            if let Err(err) = fs::remove_dir(&dir) {
                warn!("could not remove {}: {err}", dir.display());
            }
        }
        Ok(())
    }

    // -- switch materialisation -------------------------------------------

    fn apply_switch(
        &self,
        direction: Direction,
        prefix: &Option<Pair<RepoPath>>,
        session: &Option<Pair<String>>,
        lock: &FileLock,
    ) -> VexResult<()> {
        let active_prefix = self
            .prefix()?
            .unwrap_or_else(|| panic!("repository has no checked-out prefix"));
        let mut new_prefix = active_prefix.clone();
        if let Some(pair) = prefix {
            if pair.select(direction.inverse()) != &active_prefix {
                return Err(VexError::corrupt("switch out of sync with prefix"));
            }
            new_prefix = pair.select(direction).clone();
        }

        let active_session = self
            .state
            .get("active")?
            .unwrap_or_else(|| panic!("repository has no active session"));
        let mut new_session = active_session.clone();
        if let Some(pair) = session {
            if pair.select(direction.inverse()) != &active_session {
                return Err(VexError::corrupt("switch out of sync with session"));
            }
            new_session = pair.select(direction).clone();
            new_prefix = self
                .sessions
                .get(&new_session)?
                .ok_or_else(|| VexError::corrupt(format!("unknown session {new_session}")))?
                .prefix;
        }

        let active = self
            .sessions
            .get(&active_session)?
            .ok_or_else(|| VexError::corrupt(format!("unknown session {active_session}")))?;
        self.clear_session(&active_prefix, active, lock)?;
        // read back after the stash, the target may be the same session
        let target = self
            .sessions
            .get(&new_session)?
            .ok_or_else(|| VexError::corrupt(format!("unknown session {new_session}")))?;
        self.restore_session(&new_prefix, target, lock)?;
        Ok(())
    }

    /// Phase one of a switch: stash modified content into scratch, then
    /// take every materialised file out of the working copy, removing
    /// directories bottom-up when they end up empty.
    fn clear_session(
        &self,
        prefix: &RepoPath,
        mut session: Session,
        _lock: &FileLock,
    ) -> VexResult<()> {
        assert!(
            Some(prefix) == self.prefix()?.as_ref()
                && Some(&session.uuid) == self.state.get("active")?.as_ref(),
            "clearing a session that is not checked out"
        );
        let mut work: Vec<(RepoPath, PathBuf, &mut Tracked)> = vec![];
        for (name, entry) in session.files.iter_mut() {
            if !entry.working
                || matches!(entry.kind, TrackedKind::Ignore | TrackedKind::GitFile)
            {
                continue;
            }
            let path = self.repo_to_full_path(prefix, name);
            work.push((name.clone(), path, entry));
        }
        let repo = &self.repo;
        let working_dir = self.working_dir.clone();
        let removable: Vec<Option<PathBuf>> = rayon::ThreadPoolBuilder::new()
            .num_threads(crate::transaction::MAX_SCAN_WORKERS)
            .build()
            .expect("scan worker pool")
            .install(|| {
                work.into_par_iter()
                    .map(|(name, path, entry)| {
                        entry.refresh(&path, crate::codec::addr_for_file)?;
                        let mut removable = None;
                        match entry.kind {
                            TrackedKind::File => {
                                assert!(
                                    path.starts_with(&working_dir)
                                        || vex_dir().contains(&name),
                                    "tracked file escapes the working copy: {name}"
                                );
                                if entry.state != TrackedState::Deleted {
                                    assert!(path.is_file(), "working copy out of sync: {name}");
                                    if matches!(
                                        entry.state,
                                        TrackedState::Added
                                            | TrackedState::Replaced
                                            | TrackedState::Modified
                                    ) {
                                        entry.stash = Some(repo.put_scratch_file(&path)?);
                                    }
                                    fs::remove_file(&path)?;
                                }
                            }
                            TrackedKind::Dir => {
                                if entry.state != TrackedState::Deleted
                                    && !name.is_root()
                                    && name != vex_dir()
                                {
                                    assert!(path.is_dir(), "working copy out of sync: {name}");
                                    removable = Some(path);
                                }
                            }
                            TrackedKind::Ignore | TrackedKind::GitFile => {}
                        }
                        entry.working = false;
                        entry.mtime = None;
                        entry.mode = None;
                        entry.size = None;
                        Ok(removable)
                    })
                    .collect::<VexResult<_>>()
            })?;

        let mut dirs: Vec<PathBuf> = removable.into_iter().flatten().collect();
        dirs.sort();
        for dir in dirs.into_iter().rev() {
            if dir == self.working_dir || dir == self.settings_dir() {
                continue;
            }
            assert!(dir.is_dir(), "working copy out of sync: {}", dir.display());
            if fs::read_dir(&dir)?.next().is_none() {
                fs::remove_dir(&dir)?;
            } else {
                warn!("leaving non-empty directory {}", dir.display());
            }
        }
        self.state.set_opt("prefix", None)?;
        self.state.set_opt("active", None)?;
        session.message = self.state.get("message")?.unwrap_or_default();
        self.state.set_opt("message", None)?;
        self.sessions.set(&session.uuid, &session)?;
        Ok(())
    }

    /// Phase two of a switch: mark everything under the target prefix as
    /// materialised and copy its bytes back out of the stash or the files
    /// store. Both phases are idempotent.
    fn restore_session(
        &self,
        prefix: &RepoPath,
        mut session: Session,
        _lock: &FileLock,
    ) -> VexResult<()> {
        session.prefix = prefix.clone();
        let mut files: Vec<(PathBuf, &mut Tracked)> = vec![];
        for (name, entry) in session.files.iter_mut() {
            entry.mtime = None;
            entry.mode = None;
            entry.size = None;
            if !materialises(prefix, name) {
                entry.working = false;
                continue;
            }
            if matches!(entry.kind, TrackedKind::Ignore | TrackedKind::GitFile) {
                entry.working = false;
                continue;
            }
            entry.working = true;
            let path = if vex_dir().contains(name) {
                self.settings_dir().join(name.relative_to(&vex_dir()))
            } else {
                self.working_dir.join(name.relative_to(prefix))
            };
            if entry.kind == TrackedKind::Dir {
                if !name.is_root() && name != &vex_dir() && name != prefix {
                    fs::create_dir_all(&path)?;
                }
            } else {
                files.push((path, entry));
            }
        }

        let repo = &self.repo;
        rayon::ThreadPoolBuilder::new()
            .num_threads(crate::transaction::MAX_SCAN_WORKERS)
            .build()
            .expect("scan worker pool")
            .install(|| {
                files.into_par_iter().try_for_each(|(path, entry)| {
                    if entry.state == TrackedState::Deleted {
                        return Ok::<(), VexError>(());
                    }
                    if let Some(stash) = entry.stash.take() {
                        assert!(
                            entry.kind == TrackedKind::File,
                            "only files can carry a stash"
                        );
                        repo.copy_from_scratch(&stash, &path)?;
                    } else if entry.kind == TrackedKind::File {
                        let addr = entry
                            .addr
                            .as_ref()
                            .unwrap_or_else(|| panic!("tracked file has no address"));
                        repo.copy_from_file(addr, &path)?;
                    } else {
                        panic!("restoring an entry that is neither stash nor file");
                    }
                    if is_executable(&entry.properties) {
                        crate::working_copy::mark_executable(&path)?;
                    }
                    Ok(())
                })
            })?;

        self.state.set("prefix", &prefix.as_str().to_string())?;
        self.state.set("active", &session.uuid)?;
        self.state.set("message", &session.message)?;
        self.sessions.set(&session.uuid, &session)?;
        Ok(())
    }

    // -- user-level operations --------------------------------------------

    /// Creates the repository: author identity, the primary branch
    /// `latest`, an attached session, and the `init` commit whose root
    /// declares the chosen prefix and the engine's settings directory.
    #[instrument(skip(self, include, ignore))]
    pub fn init(&self, prefix: &str, include: Vec<String>, ignore: Vec<String>) -> VexResult<()> {
        let prefix = RepoPath::parse(prefix)?;
        // patterns must compile before anything is recorded
        PatternSet::new(&ignore, &include)?;
        if !self.exists() {
            self.makedirs()?;
        }
        if !self.history_is_empty()? {
            return Err(VexError::argument("project already initialised"));
        }
        let author_uuid = random_uuid();
        let account = self.user.account();

        self.with_do_without_undo("init", |txn| {
            txn.set_setting("ignore", Setting::Patterns(ignore.clone()))?;
            txn.set_setting("include", Setting::Patterns(include.clone()))?;
            txn.set_setting("template", Setting::Text(String::new()))?;
            txn.set_setting(
                "authors",
                Setting::Authors(BTreeMap::from([(author_uuid.clone(), account.clone())])),
            )?;
            txn.set_state("message", Some(String::new()))?;
            Ok(())
        })?;

        self.with_do("init", |txn| {
            let branch_uuid = random_uuid();
            let session_uuid = random_uuid();

            let ignore_addr = txn.put_file(&self.settings.filename("ignore"))?;
            let include_addr = txn.put_file(&self.settings.filename("include"))?;
            let template_addr = txn.put_file(&self.settings.filename("template"))?;

            let mut changeset = Changeset::new();
            changeset.author = Some(author_uuid.clone());
            changeset.message = Some(String::new());
            changeset.insert(
                RepoPath::root(),
                Change::AddDir {
                    properties: Default::default(),
                },
            );
            changeset.insert(
                vex_dir(),
                Change::AddDir {
                    properties: Default::default(),
                },
            );
            for (name, addr) in [
                ("ignore", ignore_addr),
                ("include", include_addr),
                ("template", template_addr),
            ] {
                changeset.insert(
                    vex_dir().join(name),
                    Change::AddFile {
                        addr,
                        properties: Default::default(),
                    },
                );
            }
            if !prefix.is_root() {
                changeset.insert(
                    prefix.clone(),
                    Change::AddDir {
                        properties: Default::default(),
                    },
                );
            }

            let root = txn.new_root_with_changeset(None, &changeset)?;
            let changeset_addr = txn.put_manifest(&Record::Changeset(changeset))?;
            let commit = Commit {
                kind: CommitKind::Init,
                timestamp: txn.now.clone(),
                previous: None,
                ancestors: Default::default(),
                root,
                changeset: changeset_addr,
            };
            let commit_addr = txn.put_commit(&commit)?;

            let branch = Branch {
                uuid: branch_uuid.clone(),
                name: "latest".to_string(),
                state: BranchState::Active,
                prefix: prefix.clone(),
                head: commit_addr.clone(),
                base: None,
                init: commit_addr.clone(),
                upstream: None,
                sessions: vec![session_uuid.clone()],
            };
            txn.put_branch(branch)?;
            txn.set_branch_uuid("latest", Some(branch_uuid.clone()))?;

            let mut files = txn.build_files(&commit_addr)?;
            for (name, entry) in files.iter_mut() {
                entry.working = materialises(&prefix, name);
            }
            let session = Session {
                uuid: session_uuid.clone(),
                branch: branch_uuid,
                state: SessionState::Attached,
                prefix: prefix.clone(),
                prepare: commit_addr.clone(),
                commit: commit_addr,
                files,
                message: String::new(),
                activity: None,
            };
            txn.put_session(session)?;

            txn.set_state("author", Some(author_uuid.clone()))?;
            txn.set_state("active", Some(session_uuid))?;
            txn.set_state("prefix", Some(prefix.as_str().to_string()))?;
            Ok(())
        })?;
        Ok(())
    }

    /// Refreshes the active session and returns its tracked-file table.
    pub fn status(&self) -> VexResult<BTreeMap<RepoPath, Tracked>> {
        let files = self.with_do_without_undo("status", |txn| {
            Ok(txn.refresh_active()?.files)
        })?;
        Ok(files.expect("status does not cancel"))
    }

    /// Formatted history of the active session: the prepare chain above
    /// the last commit, then ancestors down to the branch base.
    pub fn log(&self, all: bool, count: usize) -> VexResult<Vec<String>> {
        let _lock = self.lockfile.lock("log")?;
        let session = self.require_active()?;
        let branch = self
            .branches
            .get(&session.branch)?
            .ok_or_else(|| VexError::corrupt(format!("unknown branch {}", session.branch)))?;

        let message_of = |commit: &Commit| -> VexResult<String> {
            let changeset =
                crate::repo::changeset_of(&commit.changeset, self.repo.get_manifest(&commit.changeset)?)?;
            Ok(changeset.message.unwrap_or_default())
        };

        let mut out = vec![];
        let mut cursor = Some(session.prepare.clone());
        while cursor != Some(session.commit.clone()) {
            let addr = cursor.expect("prepare chain reaches the session commit");
            let commit = self.repo.get_commit(&addr)?;
            out.push(format!(
                " 0 {} 0x{} {}: {}",
                commit.timestamp.format(),
                addr.short(),
                commit.kind.as_str(),
                message_of(&commit)?
            ));
            cursor = commit.previous;
        }

        let mut n: i64 = -1;
        let mut cursor = Some(session.commit.clone());
        while let Some(addr) = cursor {
            if !all && Some(&addr) == branch.base.as_ref() {
                break;
            }
            let commit = self.repo.get_commit(&addr)?;
            out.push(format!(
                "{n} {} 0x{} {}: {}",
                commit.timestamp.format(),
                addr.short(),
                commit.kind.as_str(),
                message_of(&commit)?
            ));
            cursor = commit.previous;
            if (-n) as usize > count {
                break;
            }
            n -= 1;
        }
        Ok(out)
    }

    /// Files under the given paths that could be added but are not yet
    /// tracked.
    pub fn untracked(&self, files: &[PathBuf]) -> VexResult<Vec<PathBuf>> {
        let files = self.check_files(files)?;
        let found = self.with_do_without_undo("untracked", |txn| {
            let session = txn.active()?;
            let patterns = self.tracked_patterns(txn)?;
            let (_dirs, names) = txn.find_new_files(&session, &files, &patterns)?;
            Ok(names.into_values().collect_vec())
        })?;
        Ok(found.expect("untracked does not cancel"))
    }

    fn tracked_patterns(&self, txn: &SessionTransaction) -> VexResult<PatternSet> {
        let ignore = txn
            .get_setting("ignore")?
            .and_then(|s| s.as_patterns().map(|p| p.to_vec()))
            .unwrap_or_default();
        let include = txn
            .get_setting("include")?
            .and_then(|s| s.as_patterns().map(|p| p.to_vec()))
            .unwrap_or_default();
        PatternSet::new(&ignore, &include)
    }

    /// Starts tracking every untracked file or directory under the given
    /// paths, filtered by the ignore/include globs.
    #[instrument(skip(self))]
    pub fn add(
        &self,
        files: &[PathBuf],
        include: Option<Vec<String>>,
        ignore: Option<Vec<String>>,
    ) -> VexResult<std::collections::BTreeSet<PathBuf>> {
        let files = self.check_files(files)?;
        let added = self.with_do("add", |txn| {
            txn.refresh_active()?;
            let ignore = match &ignore {
                Some(ignore) => ignore.clone(),
                None => txn
                    .get_setting("ignore")?
                    .and_then(|s| s.as_patterns().map(|p| p.to_vec()))
                    .unwrap_or_default(),
            };
            let include = match &include {
                Some(include) => include.clone(),
                None => txn
                    .get_setting("include")?
                    .and_then(|s| s.as_patterns().map(|p| p.to_vec()))
                    .unwrap_or_default(),
            };
            let patterns = PatternSet::new(&ignore, &include)?;
            txn.add_files_to_active(&files, &patterns)
        })?;
        Ok(added.unwrap_or_default())
    }

    /// Stops tracking paths without touching the working copy.
    #[instrument(skip(self))]
    pub fn forget(&self, files: &[PathBuf]) -> VexResult<BTreeMap<RepoPath, PathBuf>> {
        let files = self.check_files(files)?;
        let changed = self.with_do("forget", |txn| {
            txn.refresh_active()?;
            txn.forget_files_from_active(&files)
        })?;
        Ok(changed.unwrap_or_default())
    }

    /// Forget plus delete from the working copy, reversibly.
    #[instrument(skip(self))]
    pub fn remove(&self, files: &[PathBuf]) -> VexResult<BTreeMap<RepoPath, PathBuf>> {
        let files = self.check_files(files)?;
        let changed = self.with_do("remove", |txn| {
            txn.refresh_active()?;
            txn.remove_files_from_active(&files)
        })?;
        Ok(changed.unwrap_or_default())
    }

    /// Puts the committed content back under the given paths, stashing
    /// whatever was there.
    #[instrument(skip(self))]
    pub fn restore(&self, files: &[PathBuf]) -> VexResult<BTreeMap<RepoPath, PathBuf>> {
        let files = self.check_files(files)?;
        let changed = self.with_do("restore", |txn| {
            txn.refresh_active()?;
            txn.restore_files_to_active(&files)
        })?;
        Ok(changed.unwrap_or_default())
    }

    /// Stages the pending changes as a `prepare` commit above the current
    /// prepare point without touching the branch head.
    #[instrument(skip(self))]
    pub fn prepare(&self, files: Option<&[PathBuf]>) -> VexResult<Option<Changeset>> {
        let files = files.map(|f| self.check_files(f)).transpose()?;
        self.with_do("prepare", |txn| {
            let session = txn.refresh_active()?;
            let repo_files = files
                .as_ref()
                .map(|files| {
                    files
                        .iter()
                        .map(|f| self.full_to_repo_path(&session.prefix, f))
                        .collect::<VexResult<Vec<_>>>()
                })
                .transpose()?;

            let mut changeset = txn.active_changeset(repo_files.as_deref())?;
            if changeset.is_empty() {
                return txn.cancel();
            }
            let previous = session.prepare.clone();

            txn.store_changeset_files(&changeset)?;
            txn.update_active_from_changeset(&changeset)?;

            changeset.author = txn.get_state("author")?;
            changeset.message = txn.get_state("message")?;
            let changeset_addr = txn.put_manifest(&Record::Changeset(changeset.clone()))?;
            let commit = Commit {
                kind: CommitKind::Prepare,
                timestamp: txn.now.clone(),
                previous: Some(previous),
                ancestors: Default::default(),
                root: None,
                changeset: changeset_addr,
            };
            let prepare_addr = txn.put_commit(&commit)?;
            txn.set_active_prepare(prepare_addr)?;
            Ok(changeset)
        })
    }

    /// Commits the prepare chain plus any still-pending changes.
    #[instrument(skip(self))]
    pub fn commit(&self, files: Option<&[PathBuf]>) -> VexResult<Option<Changeset>> {
        self.commit_active(files, CommitKind::Commit, "commit")
    }

    /// Like commit, but records the ancestry as an amendment so history
    /// stays linear.
    #[instrument(skip(self))]
    pub fn amend(&self, files: Option<&[PathBuf]>) -> VexResult<Option<Changeset>> {
        self.commit_active(files, CommitKind::Amend, "amend")
    }

    fn commit_active(
        &self,
        files: Option<&[PathBuf]>,
        kind: CommitKind,
        command: &str,
    ) -> VexResult<Option<Changeset>> {
        let files = files.map(|f| self.check_files(f)).transpose()?;
        let outcome = self.with_do(command, |txn| {
            let session = txn.refresh_active()?;
            let repo_files = files
                .as_ref()
                .map(|files| {
                    files
                        .iter()
                        .map(|f| self.full_to_repo_path(&session.prefix, f))
                        .collect::<VexResult<Vec<_>>>()
                })
                .transpose()?;

            let (old_addr, old, mut changeset) = txn.prepared_changeset(&session.prepare)?;
            changeset.append_changes(&txn.active_changeset(repo_files.as_deref())?);
            if changeset.is_empty() {
                return txn.cancel();
            }

            let root = txn.new_root_with_changeset(old.root.as_ref(), &changeset)?;
            if root == old.root {
                // nothing actually changed; roll the session table forward
                txn.update_active_from_changeset(&changeset)?;
                return Ok(None);
            }

            txn.store_changeset_files(&changeset)?;
            txn.update_active_from_changeset(&changeset)?;

            changeset.author = txn.get_state("author")?;
            changeset.message = txn.get_state("message")?;
            let changeset_addr = txn.put_manifest(&Record::Changeset(changeset.clone()))?;
            let commit = Commit {
                kind,
                timestamp: txn.now.clone(),
                previous: Some(old_addr),
                ancestors: BTreeMap::from([("prepared".to_string(), session.prepare.clone())]),
                root,
                changeset: changeset_addr,
            };
            let commit_addr = txn.put_commit(&commit)?;
            txn.set_active_commit(commit_addr)?;

            let template = txn
                .get_setting("template")?
                .and_then(|s| s.as_text().map(str::to_string))
                .unwrap_or_default();
            txn.set_state("message", Some(template))?;
            Ok(Some(changeset))
        })?;
        Ok(outcome.flatten())
    }

    /// Commits exactly what was prepared, ignoring fresh working-copy
    /// changes.
    #[instrument(skip(self))]
    pub fn commit_prepared(&self) -> VexResult<Option<Changeset>> {
        let outcome = self.with_do("commit:prepared", |txn| {
            let session = txn.active()?;
            let (old_addr, old, mut changeset) = txn.prepared_changeset(&session.prepare)?;
            if changeset.is_empty() {
                return txn.cancel();
            }
            let root = txn.new_root_with_changeset(old.root.as_ref(), &changeset)?;
            if root == old.root {
                txn.update_active_from_changeset(&changeset)?;
                return Ok(None);
            }
            txn.store_changeset_files(&changeset)?;
            txn.update_active_from_changeset(&changeset)?;

            changeset.author = txn.get_state("author")?;
            changeset.message = txn.get_state("message")?;
            let changeset_addr = txn.put_manifest(&Record::Changeset(changeset.clone()))?;
            let commit = Commit {
                kind: CommitKind::Commit,
                timestamp: txn.now.clone(),
                previous: Some(old_addr),
                ancestors: BTreeMap::from([("prepared".to_string(), session.prepare.clone())]),
                root,
                changeset: changeset_addr,
            };
            let commit_addr = txn.put_commit(&commit)?;
            txn.set_active_commit(commit_addr)?;
            let template = txn
                .get_setting("template")?
                .and_then(|s| s.as_text().map(str::to_string))
                .unwrap_or_default();
            txn.set_state("message", Some(template))?;
            Ok(Some(changeset))
        })?;
        Ok(outcome.flatten())
    }

    /// Materialises a different subtree of the repository into the working
    /// directory, stashing local modifications.
    #[instrument(skip(self))]
    pub fn switch(&self, new_prefix: &str) -> VexResult<()> {
        let new_prefix = RepoPath::parse(new_prefix)?;
        if vex_dir().contains(&new_prefix) {
            return Err(VexError::argument("cannot check out the settings directory"));
        }
        let active = self.require_active()?;
        if !new_prefix.is_root() && !active.files.contains_key(&new_prefix) {
            return Err(VexError::argument(format!(
                "{new_prefix} is not a directory in this session"
            )));
        }
        self.with_do_switch("switch", |txn| txn.switch_prefix(new_prefix.clone()))?;
        Ok(())
    }

    /// Switches to the named branch, creating it (and an attached session)
    /// if asked to.
    #[instrument(skip(self))]
    pub fn open_branch(&self, name: &str, create: bool) -> VexResult<()> {
        let session_uuid = self.with_do_without_undo("branch:open", |txn| {
            let branch = match txn.get_branch_uuid(name)? {
                Some(uuid) => txn.get_branch(&uuid)?,
                None => {
                    if !create {
                        return Err(VexError::argument(format!("{name} does not exist")));
                    }
                    let active = txn.active()?;
                    txn.create_branch(
                        name,
                        active.prefix.clone(),
                        active.commit.clone(),
                        &active.branch,
                        false,
                    )?
                }
            };
            let mut attached = vec![];
            for uuid in &branch.sessions {
                let session = txn.get_session(uuid)?;
                if session.state == SessionState::Attached {
                    attached.push(session.uuid);
                }
            }
            match attached.len() {
                0 => {
                    let session =
                        txn.create_session(&branch.uuid, SessionState::Attached, branch.head.clone())?;
                    Ok(session.uuid)
                }
                1 => Ok(attached.remove(0)),
                _ => Err(VexError::argument(format!(
                    "branch {name} has more than one attached session"
                ))),
            }
        })?;
        let Some(session_uuid) = session_uuid else {
            return Ok(());
        };
        self.with_do_switch(&format!("branch:open {name}"), |txn| {
            txn.switch_session(session_uuid.clone())
        })?;
        Ok(())
    }

    /// Creates a branch at the current commit and switches to it. A fork
    /// severs the upstream link.
    #[instrument(skip(self))]
    pub fn new_branch(&self, name: &str, fork: bool) -> VexResult<()> {
        let created = self.with_do_without_undo("branch:new", |txn| {
            if txn.get_branch_uuid(name)?.is_some() {
                return Err(VexError::argument(format!("branch {name} already exists")));
            }
            let active = txn.active()?;
            let branch = txn.create_branch(
                name,
                active.prefix.clone(),
                active.commit.clone(),
                &active.branch,
                fork,
            )?;
            let session =
                txn.create_session(&branch.uuid, SessionState::Attached, branch.head.clone())?;
            Ok((branch.uuid, session.uuid))
        })?;
        let Some((branch_uuid, session_uuid)) = created else {
            return Ok(());
        };
        self.with_do_switch(&format!("branch:new {name}"), |txn| {
            txn.set_branch_state(&branch_uuid, BranchState::Active)?;
            txn.switch_session(session_uuid.clone())?;
            txn.set_branch_uuid(name, Some(branch_uuid.clone()))
        })?;
        Ok(())
    }

    /// Re-parents the active session onto a freshly allocated branch at
    /// the current head.
    #[instrument(skip(self))]
    pub fn save_as(&self, name: &str) -> VexResult<()> {
        self.with_do("branch:saveas", |txn| {
            let mut active = txn.active()?;
            let mut old = txn.get_branch(&active.branch)?;
            old.sessions.retain(|uuid| uuid != &active.uuid);
            let branch = Branch {
                uuid: random_uuid(),
                name: name.to_string(),
                state: BranchState::Active,
                prefix: txn.prefix()?,
                head: old.head.clone(),
                base: old.base.clone(),
                init: old.init.clone(),
                upstream: Some(old.uuid.clone()),
                sessions: vec![active.uuid.clone()],
            };
            active.branch = branch.uuid.clone();
            txn.set_branch_uuid(name, Some(branch.uuid.clone()))?;
            txn.put_session(active)?;
            txn.put_branch(branch)?;
            txn.put_branch(old)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Renames the active branch, undoably.
    #[instrument(skip(self))]
    pub fn rename_branch(&self, name: &str) -> VexResult<()> {
        self.with_do("branch:rename", |txn| {
            let active = txn.active()?;
            let mut old = txn.get_branch(&active.branch)?;
            txn.set_branch_uuid(&old.name.clone(), None)?;
            old.name = name.to_string();
            txn.set_branch_uuid(name, Some(old.uuid.clone()))?;
            txn.put_branch(old)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Exchanges names with another branch.
    #[instrument(skip(self))]
    pub fn swap_branch(&self, name: &str) -> VexResult<()> {
        self.with_do("branch:swap", |txn| {
            let active = txn.active()?;
            let mut me = txn.get_branch(&active.branch)?;
            let other_uuid = txn
                .get_branch_uuid(name)?
                .ok_or_else(|| VexError::argument(format!("{name} does not exist")))?;
            let mut other = txn.get_branch(&other_uuid)?;
            let old_name = me.name.clone();
            txn.set_branch_uuid(&old_name, Some(other_uuid.clone()))?;
            txn.set_branch_uuid(name, Some(me.uuid.clone()))?;
            other.name = old_name;
            me.name = name.to_string();
            txn.put_branch(me)?;
            txn.put_branch(other)?;
            Ok(())
        })?;
        Ok(())
    }

    /// All branches: named ones first, then anonymous ones.
    pub fn list_branches(&self) -> VexResult<Vec<(Option<String>, Branch)>> {
        let _lock = self.lockfile.lock("branch:list")?;
        let mut seen = std::collections::BTreeSet::new();
        let mut branches = vec![];
        for name in self.names.list()? {
            if let Some(uuid) = self.names.get(&name)? {
                if let Some(branch) = self.branches.get(&uuid)? {
                    seen.insert(uuid);
                    branches.push((Some(name), branch));
                }
            }
        }
        for uuid in self.branches.list()? {
            if seen.contains(&uuid) {
                continue;
            }
            if let Some(branch) = self.branches.get(&uuid)? {
                branches.push((None, branch));
            }
        }
        Ok(branches)
    }

    /// The sessions of the active branch.
    pub fn list_sessions(&self) -> VexResult<Vec<Session>> {
        let _lock = self.lockfile.lock("session:list")?;
        let active = self.require_active()?;
        let branch = self
            .branches
            .get(&active.branch)?
            .ok_or_else(|| VexError::corrupt(format!("unknown branch {}", active.branch)))?;
        let mut out = vec![];
        for uuid in &branch.sessions {
            if let Some(session) = self.sessions.get(uuid)? {
                out.push(session);
            }
        }
        Ok(out)
    }

    /// The pending commit message.
    pub fn get_message(&self) -> VexResult<String> {
        Ok(self.state.get("message")?.unwrap_or_default())
    }

    pub fn set_message(&self, message: &str) -> VexResult<()> {
        let _lock = self.lockfile.lock("message:set")?;
        self.state.set("message", &message.to_string())
    }

    /// The properties recorded against one tracked file.
    pub fn get_fileprops(&self, file: &Path) -> VexResult<crate::tree::Properties> {
        let file = self.check_files(std::slice::from_ref(&file.to_path_buf()))?;
        if file.is_empty() {
            return Err(VexError::argument("no file named"));
        }
        let props = self.with_do_without_undo("fileprops:get", |txn| {
            let active = txn.active()?;
            let name = self.full_to_repo_path(&active.prefix, &file[0])?;
            let tracked = active
                .files
                .get(&name)
                .ok_or_else(|| VexError::argument(format!("{name} is not tracked")))?;
            Ok(tracked.properties.clone())
        })?;
        Ok(props.expect("fileprops does not cancel"))
    }

    /// Sets a property on a tracked file; a `tracked` entry becomes
    /// `modified` so the next commit records it.
    #[instrument(skip(self, value))]
    pub fn set_fileprop(
        &self,
        file: &Path,
        name: &str,
        value: serde_json::Value,
    ) -> VexResult<()> {
        let file = self.check_files(std::slice::from_ref(&file.to_path_buf()))?;
        if file.is_empty() {
            return Err(VexError::argument("no file named"));
        }
        self.with_do("fileprops:set", |txn| {
            let mut active = txn.active()?;
            let repo_name = self.full_to_repo_path(&active.prefix, &file[0])?;
            let tracked = active
                .files
                .get_mut(&repo_name)
                .ok_or_else(|| VexError::argument(format!("{repo_name} is not tracked")))?;
            tracked.set_property(name.to_string(), value.clone());
            txn.put_session(active)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Applying another branch's changes is a merge, which this engine
    /// does not implement.
    pub fn apply_changes_from_branch(&self, _name: &str) -> VexResult<()> {
        Err(VexError::Unfinished("merging changes from another branch"))
    }

    /// Replaying another branch's changes is a merge, which this engine
    /// does not implement.
    pub fn replay_changes_from_branch(&self, _name: &str) -> VexResult<()> {
        Err(VexError::Unfinished("replaying changes from another branch"))
    }
}
