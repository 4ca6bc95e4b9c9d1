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

//! Transactions gather proposed changes without touching the real stores.
//!
//! Reads go through the transaction and see staged values; writes stage an
//! old/new pair in an overlay, and blobs go only into the scratch store.
//! [`Transaction::build_action`] turns the overlay into the reversible
//! [`Action`] the history log records. Nothing is applied here; the
//! project facade promotes blobs and writes the new values after the
//! history engine has accepted the action.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::action::{
    Action, Blobs, Pair, SessionAction, SessionChanges, SwitchAction, WorkingMap, WorkingValue,
};
use crate::branch::{Branch, BranchState};
use crate::changeset::{Change, Changeset};
use crate::codec::Record;
use crate::commit::{Commit, Timestamp};
use crate::errors::{VexError, VexResult};
use crate::matchers::{list_dir, PatternSet};
use crate::object_id::{random_uuid, Addr};
use crate::project::Project;
use crate::repo::changeset_of;
use crate::repo_path::RepoPath;
use crate::session::{Session, SessionState, Tracked, TrackedKind, TrackedState};
use crate::settings::Setting;
use crate::tree::{Properties, Root, Tree, TreeEntry};

/// Upper bound on the scan worker pool used by refresh and restore.
pub const MAX_SCAN_WORKERS: usize = 8;

fn scan_pool() -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(MAX_SCAN_WORKERS)
        .build()
        .expect("scan worker pool")
}

/// The contract both transaction kinds share: accumulate old/new pairs,
/// then emit the action that captures every staged pair.
pub trait Transaction {
    fn command(&self) -> &str;
    fn build_action(&self) -> Action;
}

/// Scratch-pad for one blob-producing operation.
pub struct SessionTransaction<'a> {
    project: &'a Project,
    command: String,
    pub now: Timestamp,
    old_branches: BTreeMap<String, Option<Branch>>,
    new_branches: BTreeMap<String, Option<Branch>>,
    old_names: BTreeMap<String, Option<String>>,
    new_names: BTreeMap<String, Option<String>>,
    old_sessions: BTreeMap<String, Option<Session>>,
    new_sessions: BTreeMap<String, Option<Session>>,
    old_settings: BTreeMap<String, Option<Setting>>,
    new_settings: BTreeMap<String, Option<Setting>>,
    old_states: BTreeMap<String, Option<String>>,
    new_states: BTreeMap<String, Option<String>>,
    new_commits: BTreeSet<Addr>,
    new_manifests: BTreeSet<Addr>,
    new_files: BTreeSet<Addr>,
    old_working: WorkingMap,
    new_working: WorkingMap,
}

impl<'a> SessionTransaction<'a> {
    pub fn new(project: &'a Project, command: &str) -> Self {
        SessionTransaction {
            project,
            command: command.to_string(),
            now: Timestamp::now(),
            old_branches: BTreeMap::new(),
            new_branches: BTreeMap::new(),
            old_names: BTreeMap::new(),
            new_names: BTreeMap::new(),
            old_sessions: BTreeMap::new(),
            new_sessions: BTreeMap::new(),
            old_settings: BTreeMap::new(),
            new_settings: BTreeMap::new(),
            old_states: BTreeMap::new(),
            new_states: BTreeMap::new(),
            new_commits: BTreeSet::new(),
            new_manifests: BTreeSet::new(),
            new_files: BTreeSet::new(),
            old_working: WorkingMap::new(),
            new_working: WorkingMap::new(),
        }
    }

    /// Abandons the whole operation; the facade discards the transaction
    /// and its scratch additions without recording an action.
    pub fn cancel<T>(&self) -> VexResult<T> {
        Err(VexError::Cancel)
    }

    // -- reads and staged writes ------------------------------------------

    pub fn active(&self) -> VexResult<Session> {
        let uuid = self
            .get_state("active")?
            .unwrap_or_else(|| panic!("repository has no active session"));
        self.get_session(&uuid)
    }

    pub fn prefix(&self) -> VexResult<RepoPath> {
        Ok(self.active()?.prefix)
    }

    pub fn get_file(&self, addr: &Addr) -> VexResult<PathBuf> {
        if self.new_files.contains(addr) {
            return self.project.repo.scratch.get_file(addr);
        }
        self.project.repo.get_file_path(addr)
    }

    pub fn put_file(&mut self, file: &Path) -> VexResult<Addr> {
        let addr = self.project.repo.put_scratch_file(file)?;
        self.new_files.insert(addr.clone());
        Ok(addr)
    }

    pub fn get_manifest(&self, addr: &Addr) -> VexResult<Record> {
        if self.new_manifests.contains(addr) {
            return self.project.repo.get_scratch_manifest(addr);
        }
        self.project.repo.get_manifest(addr)
    }

    pub fn get_changeset(&self, addr: &Addr) -> VexResult<Changeset> {
        changeset_of(addr, self.get_manifest(addr)?)
    }

    pub fn put_manifest(&mut self, record: &Record) -> VexResult<Addr> {
        let addr = self.project.repo.put_scratch_manifest(record)?;
        self.new_manifests.insert(addr.clone());
        Ok(addr)
    }

    pub fn get_commit(&self, addr: &Addr) -> VexResult<Commit> {
        if self.new_commits.contains(addr) {
            return self.project.repo.get_scratch_commit(addr);
        }
        self.project.repo.get_commit(addr)
    }

    pub fn put_commit(&mut self, commit: &Commit) -> VexResult<Addr> {
        let addr = self.project.repo.put_scratch_commit(commit)?;
        self.new_commits.insert(addr.clone());
        Ok(addr)
    }

    pub fn get_session(&self, uuid: &str) -> VexResult<Session> {
        if let Some(staged) = self.new_sessions.get(uuid) {
            return staged
                .clone()
                .ok_or_else(|| VexError::corrupt(format!("session {uuid} was deleted")));
        }
        self.project
            .sessions
            .get(uuid)?
            .ok_or_else(|| VexError::corrupt(format!("unknown session {uuid}")))
    }

    pub fn put_session(&mut self, session: Session) -> VexResult<()> {
        if !self.old_sessions.contains_key(&session.uuid) {
            self.old_sessions
                .insert(session.uuid.clone(), self.project.sessions.get(&session.uuid)?);
        }
        self.new_sessions.insert(session.uuid.clone(), Some(session));
        Ok(())
    }

    pub fn get_branch(&self, uuid: &str) -> VexResult<Branch> {
        if let Some(staged) = self.new_branches.get(uuid) {
            return staged
                .clone()
                .ok_or_else(|| VexError::corrupt(format!("branch {uuid} was deleted")));
        }
        self.project
            .branches
            .get(uuid)?
            .ok_or_else(|| VexError::corrupt(format!("unknown branch {uuid}")))
    }

    pub fn put_branch(&mut self, branch: Branch) -> VexResult<()> {
        if !self.old_branches.contains_key(&branch.uuid) {
            self.old_branches
                .insert(branch.uuid.clone(), self.project.branches.get(&branch.uuid)?);
        }
        self.new_branches.insert(branch.uuid.clone(), Some(branch));
        Ok(())
    }

    pub fn get_branch_uuid(&self, name: &str) -> VexResult<Option<String>> {
        if let Some(staged) = self.new_names.get(name) {
            return Ok(staged.clone());
        }
        self.project.names.get(name)
    }

    pub fn set_branch_uuid(&mut self, name: &str, uuid: Option<String>) -> VexResult<()> {
        if !self.old_names.contains_key(name) {
            self.old_names
                .insert(name.to_string(), self.project.names.get(name)?);
        }
        self.new_names.insert(name.to_string(), uuid);
        Ok(())
    }

    pub fn get_state(&self, name: &str) -> VexResult<Option<String>> {
        if let Some(staged) = self.new_states.get(name) {
            return Ok(staged.clone());
        }
        self.project.state.get(name)
    }

    pub fn set_state(&mut self, name: &str, value: Option<String>) -> VexResult<()> {
        if !self.old_states.contains_key(name) {
            self.old_states
                .insert(name.to_string(), self.project.state.get(name)?);
        }
        self.new_states.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get_setting(&self, name: &str) -> VexResult<Option<Setting>> {
        if let Some(staged) = self.new_settings.get(name) {
            return Ok(staged.clone());
        }
        self.project.settings.get(name)
    }

    pub fn set_setting(&mut self, name: &str, value: Setting) -> VexResult<()> {
        if !self.old_settings.contains_key(name) {
            self.old_settings
                .insert(name.to_string(), self.project.settings.get(name)?);
        }
        self.new_settings.insert(name.to_string(), Some(value));
        Ok(())
    }

    // -- branch and session lifecycle -------------------------------------

    pub fn create_branch(
        &mut self,
        name: &str,
        prefix: RepoPath,
        from_commit: Addr,
        from_branch: &str,
        fork: bool,
    ) -> VexResult<Branch> {
        let origin = self.get_branch(from_branch)?;
        let branch = Branch {
            uuid: random_uuid(),
            name: name.to_string(),
            state: BranchState::Created,
            prefix,
            head: from_commit.clone(),
            base: Some(from_commit),
            init: origin.init,
            upstream: (!fork).then(|| from_branch.to_string()),
            sessions: vec![],
        };
        self.put_branch(branch.clone())?;
        Ok(branch)
    }

    pub fn create_session(
        &mut self,
        branch_uuid: &str,
        state: SessionState,
        commit: Addr,
    ) -> VexResult<Session> {
        let mut branch = self.get_branch(branch_uuid)?;
        let files = self.build_files(&commit)?;
        let session = Session {
            uuid: random_uuid(),
            branch: branch_uuid.to_string(),
            state,
            prefix: branch.prefix.clone(),
            prepare: commit.clone(),
            commit,
            files,
            message: String::new(),
            activity: None,
        };
        branch.sessions.push(session.uuid.clone());
        self.put_branch(branch)?;
        self.put_session(session.clone())?;
        Ok(session)
    }

    pub fn update_active_files(
        &mut self,
        added: BTreeMap<RepoPath, Tracked>,
        removed: impl IntoIterator<Item = RepoPath>,
    ) -> VexResult<()> {
        let mut active = self.active()?;
        active.update_files(added, removed);
        self.put_session(active)
    }

    pub fn set_active_prepare(&mut self, prepare: Addr) -> VexResult<()> {
        let mut active = self.active()?;
        active.prepare = prepare;
        self.put_session(active)
    }

    /// Advances the active session to a freshly committed address. The
    /// branch head follows when the session is attached and the head still
    /// matches; a head that moved elsewhere detaches the session instead.
    pub fn set_active_commit(&mut self, commit: Addr) -> VexResult<()> {
        let mut session = self.active()?;
        let mut branch = self.get_branch(&session.branch)?;
        if session.state == SessionState::Attached && branch.head == session.commit {
            branch.head = commit.clone();
            self.put_branch(branch)?;
        } else if session.state == SessionState::Attached {
            session.state = SessionState::Detached;
        }
        session.prepare = commit.clone();
        session.commit = commit;
        self.put_session(session)
    }

    // -- refresh -----------------------------------------------------------

    /// Re-stats every materialised tracked file and reclassifies its state,
    /// with a bounded worker pool doing the scanning. Returns the refreshed
    /// session after staging it.
    pub fn refresh_active(&mut self) -> VexResult<Session> {
        let mut active = self.active()?;
        let prefix = active.prefix.clone();
        let mut work: Vec<(PathBuf, &mut Tracked)> = vec![];
        for (name, entry) in active.files.iter_mut() {
            if !entry.working || entry.state == TrackedState::Deleted {
                continue;
            }
            let path = self.project.repo_to_full_path(&prefix, name);
            work.push((path, entry));
        }
        scan_pool().install(|| {
            work.into_par_iter().try_for_each(|(path, entry)| {
                entry.refresh(&path, crate::codec::addr_for_file)
            })
        })?;
        self.put_session(active.clone())?;
        Ok(active)
    }

    // -- changesets --------------------------------------------------------

    /// Folds the prepare chain above `addr` into one changeset, oldest
    /// first, and returns the first real commit underneath it.
    pub fn prepared_changeset(&self, addr: &Addr) -> VexResult<(Addr, Commit, Changeset)> {
        let mut changes = Changeset::new();
        let mut addr = addr.clone();
        let mut commit = self.get_commit(&addr)?;
        while commit.is_prepare() {
            changes.prepend_changes(&self.get_changeset(&commit.changeset)?);
            addr = commit
                .previous
                .clone()
                .unwrap_or_else(|| panic!("prepare commit has no previous commit"));
            commit = self.get_commit(&addr)?;
        }
        Ok((addr, commit, changes))
    }

    /// Translates the tracked-file table into a changeset. With a file
    /// filter, ancestor directories are implicitly included and names
    /// absent from the session are skipped.
    pub fn active_changeset(&self, files: Option<&[RepoPath]>) -> VexResult<Changeset> {
        let active = self.active()?;
        let files_to_check: BTreeSet<RepoPath> = match files {
            None => active.files.keys().cloned().collect(),
            Some(files) => {
                let mut set = BTreeSet::new();
                for file in files {
                    let mut cursor = Some(file.clone());
                    while let Some(path) = cursor {
                        if path.is_root() {
                            break;
                        }
                        cursor = path.parent();
                        set.insert(path);
                    }
                }
                set
            }
        };

        let mut out = Changeset::new();
        for repo_name in files_to_check {
            let Some(entry) = active.files.get(&repo_name) else {
                continue;
            };
            let change = match entry.kind {
                TrackedKind::File => match entry.state {
                    TrackedState::Added | TrackedState::Replaced | TrackedState::Modified => {
                        let filename = self
                            .project
                            .repo_to_full_path(&active.prefix, &repo_name);
                        let addr = self.project.repo.addr_for_file(&filename)?;
                        let properties = entry.properties.clone();
                        Some(match entry.state {
                            TrackedState::Added => Change::AddFile { addr, properties },
                            TrackedState::Replaced => Change::NewFile { addr, properties },
                            _ => Change::ChangeFile { addr, properties },
                        })
                    }
                    TrackedState::Deleted => Some(if entry.replace == Some(TrackedKind::Dir) {
                        Change::DeleteDir
                    } else {
                        Change::DeleteFile
                    }),
                    TrackedState::Tracked => None,
                },
                TrackedKind::Dir => match entry.state {
                    TrackedState::Added => Some(Change::AddDir {
                        properties: entry.properties.clone(),
                    }),
                    TrackedState::Replaced => Some(Change::NewDir {
                        properties: entry.properties.clone(),
                    }),
                    TrackedState::Modified => Some(Change::ChangeDir {
                        properties: entry.properties.clone(),
                    }),
                    TrackedState::Deleted => Some(if entry.replace == Some(TrackedKind::File) {
                        Change::DeleteFile
                    } else {
                        Change::DeleteDir
                    }),
                    TrackedState::Tracked => None,
                },
                TrackedKind::Ignore | TrackedKind::GitFile => None,
            };
            if let Some(change) = change {
                out.insert(repo_name, change);
            }
        }
        Ok(out)
    }

    /// Rolls the tracked-file table forward to what it will look like once
    /// `changeset` has been committed.
    pub fn update_active_from_changeset(&mut self, changeset: &Changeset) -> VexResult<()> {
        let mut active = self.active()?;
        for (name, changes) in &changeset.entries {
            let change = changes.last().expect("changeset entry has at least one change");
            let Some(entry) = active.files.get(name) else {
                if !matches!(change, Change::DeleteFile | Change::DeleteDir) {
                    panic!("changeset out of sync with session: {name} is untracked");
                }
                continue;
            };
            match change {
                Change::DeleteFile | Change::DeleteDir => {
                    active.files.remove(name);
                }
                Change::IgnorePath => {}
                change => {
                    let working = entry.working;
                    let mut fingerprint = None;
                    if working {
                        let path = self.project.repo_to_full_path(&active.prefix, name);
                        fingerprint = crate::working_copy::file_state(&path)?;
                    }
                    let (kind, addr, properties) = match change {
                        Change::AddFile { addr, properties }
                        | Change::NewFile { addr, properties }
                        | Change::ChangeFile { addr, properties } => {
                            (TrackedKind::File, Some(addr.clone()), properties.clone())
                        }
                        Change::AddDir { properties }
                        | Change::NewDir { properties }
                        | Change::ChangeDir { properties } => {
                            (TrackedKind::Dir, None, properties.clone())
                        }
                        _ => unreachable!("delete and ignore changes are handled above"),
                    };
                    let mut tracked = Tracked::new(kind, TrackedState::Tracked)
                        .with_working(working)
                        .with_addr(addr)
                        .with_properties(properties);
                    if let Some(st) = fingerprint {
                        tracked.mode = Some(st.mode);
                        tracked.size = Some(st.size);
                        if st.aged_past(crate::session::MTIME_GRACE_MILLIS) {
                            tracked.mtime = Some(st.mtime);
                        }
                    }
                    active.files.insert(name.clone(), tracked);
                }
            }
        }
        self.put_session(active)
    }

    /// Makes sure the bytes behind every address-carrying change exist in
    /// the scratch store, from the working copy or a suspended stash.
    pub fn store_changeset_files(&mut self, changeset: &Changeset) -> VexResult<()> {
        let active = self.active()?;
        for (name, changes) in &changeset.entries {
            let change = changes.last().expect("changeset entry has at least one change");
            let Some(entry) = active.files.get(name) else {
                if !matches!(change, Change::DeleteFile | Change::DeleteDir) {
                    panic!("changeset out of sync with session: {name} is untracked");
                }
                continue;
            };
            if entry.kind != TrackedKind::File {
                continue;
            }
            if entry.working {
                let filename = self.project.repo_to_full_path(&active.prefix, name);
                if filename.is_file() && change.addr().is_some() {
                    let stored = self.put_file(&filename)?;
                    if Some(&stored) != change.addr() {
                        return Err(VexError::corrupt(format!(
                            "{name} changed while being stored"
                        )));
                    }
                }
            } else if let Some(stash) = &entry.stash {
                self.new_files.insert(stash.clone());
            } else {
                panic!("tracked file {name} has neither working copy nor stash");
            }
        }
        Ok(())
    }

    // -- manifests ---------------------------------------------------------

    /// Rebuilds the manifest tree bottom-up under `changeset`, sharing
    /// every directory whose contents did not change. Returns the new root
    /// address, or the old one when nothing changed at all.
    pub fn new_root_with_changeset(
        &mut self,
        old: Option<&Addr>,
        changeset: &Changeset,
    ) -> VexResult<Option<Addr>> {
        let mut dir_changes: BTreeMap<RepoPath, BTreeMap<String, Vec<Change>>> = BTreeMap::new();
        for (path, changes) in &changeset.entries {
            let (prefix, name) = match path.parent() {
                None => (RepoPath::root(), ".".to_string()),
                Some(parent) => (
                    parent,
                    path.file_name().expect("non-root path has a file name").to_string(),
                ),
            };
            dir_changes
                .entry(prefix)
                .or_default()
                .insert(name, changes.clone());
        }
        self.apply_dir_changes(&RepoPath::root(), old, &mut dir_changes, true)
    }

    fn apply_dir_changes(
        &mut self,
        prefix: &RepoPath,
        addr: Option<&Addr>,
        dir_changes: &mut BTreeMap<RepoPath, BTreeMap<String, Vec<Change>>>,
        root: bool,
    ) -> VexResult<Option<Addr>> {
        let mut old_entries: BTreeMap<String, TreeEntry> = BTreeMap::new();
        let mut properties = Properties::new();
        if let Some(addr) = addr {
            match self.get_manifest(addr)? {
                Record::Root(old) => {
                    if root {
                        properties = old.properties;
                    }
                    old_entries = old.entries;
                }
                Record::Tree(old) => {
                    old_entries = old.entries;
                }
                other => panic!("manifest {addr} is not a directory: {other:?}"),
            }
        }
        let mut changes = dir_changes.remove(prefix);
        let mut changed = changes.is_some();

        let mut names: BTreeSet<String> = old_entries.keys().cloned().collect();
        if let Some(changes) = &changes {
            names.extend(changes.keys().cloned());
        }

        let mut entries: BTreeMap<String, TreeEntry> = BTreeMap::new();
        for name in names {
            if name == "." {
                assert!(root, "directory self-change outside the root");
                for change in changes
                    .as_mut()
                    .and_then(|c| c.remove("."))
                    .expect("dot entry only appears with changes")
                {
                    match change {
                        Change::ChangeDir { properties: props } => properties = props,
                        Change::AddDir { properties: props } if addr.is_none() => {
                            properties = props;
                        }
                        change => panic!("bad change for the root directory: {change:?}"),
                    }
                }
                continue;
            }

            let mut entry = old_entries.remove(&name);
            if let Some(entry_changes) = changes.as_mut().and_then(|c| c.remove(&name)) {
                for change in entry_changes {
                    entry = match change {
                        Change::IgnorePath => Some(TreeEntry::Ignored),
                        Change::NewFile { addr, properties } => {
                            assert!(
                                matches!(entry, Some(TreeEntry::Dir { .. })),
                                "file can only replace a directory: {prefix}/{name}"
                            );
                            Some(TreeEntry::File { addr, properties })
                        }
                        Change::NewDir { properties } => {
                            assert!(
                                matches!(entry, Some(TreeEntry::File { .. })),
                                "directory can only replace a file: {prefix}/{name}"
                            );
                            Some(TreeEntry::Dir {
                                addr: None,
                                properties,
                            })
                        }
                        Change::DeleteFile => {
                            assert!(
                                matches!(entry, Some(TreeEntry::File { .. })),
                                "cannot delete a file not in the repository: {prefix}/{name}"
                            );
                            None
                        }
                        Change::DeleteDir => {
                            assert!(
                                matches!(entry, Some(TreeEntry::Dir { .. })),
                                "cannot delete a directory not in the repository: {prefix}/{name}"
                            );
                            None
                        }
                        Change::ChangeFile { addr, properties } => {
                            assert!(
                                matches!(entry, Some(TreeEntry::File { .. })),
                                "change of an untracked file: {prefix}/{name}"
                            );
                            Some(TreeEntry::File { addr, properties })
                        }
                        Change::ChangeDir { properties } => match entry {
                            Some(TreeEntry::Dir { addr, .. }) => {
                                Some(TreeEntry::Dir { addr, properties })
                            }
                            _ => panic!("change of an untracked directory: {prefix}/{name}"),
                        },
                        Change::AddDir { properties } => {
                            assert!(entry.is_none(), "added directory already exists: {prefix}/{name}");
                            Some(TreeEntry::Dir {
                                addr: None,
                                properties,
                            })
                        }
                        Change::AddFile { addr, properties } => {
                            assert!(entry.is_none(), "added file already exists: {prefix}/{name}");
                            Some(TreeEntry::File { addr, properties })
                        }
                    };
                }
            }

            if let Some(TreeEntry::Dir {
                addr: dir_addr,
                properties: dir_properties,
            }) = entry.clone()
            {
                let path = prefix.join(&name);
                let new_addr =
                    self.apply_dir_changes(&path, dir_addr.as_ref(), dir_changes, false)?;
                if new_addr != dir_addr {
                    changed = true;
                    entry = Some(TreeEntry::Dir {
                        addr: new_addr,
                        properties: dir_properties,
                    });
                }
            }

            if let Some(entry) = entry {
                entries.insert(name, entry);
            }
        }

        if entries.is_empty() {
            Ok(None)
        } else if changed {
            let record = if root {
                Record::Root(Root {
                    entries,
                    properties,
                })
            } else {
                Record::Tree(Tree { entries })
            };
            Ok(Some(self.put_manifest(&record)?))
        } else {
            Ok(addr.cloned())
        }
    }

    /// The authoritative tracked-file table for `commit`: its root walked
    /// recursively, then every changeset in the prepare chain above it.
    pub fn build_files(&self, commit: &Addr) -> VexResult<BTreeMap<RepoPath, Tracked>> {
        let mut output = BTreeMap::new();
        let (_base_addr, base, changes) = self.prepared_changeset(commit)?;
        match &base.root {
            Some(root) => self.walk_manifest(&RepoPath::root(), root, true, &mut output)?,
            None => {
                output.insert(
                    RepoPath::root(),
                    Tracked::new(TrackedKind::Dir, TrackedState::Tracked),
                );
            }
        }
        for (path, path_changes) in &changes.entries {
            for change in path_changes {
                match change {
                    Change::AddFile { addr, properties }
                    | Change::NewFile { addr, properties }
                    | Change::ChangeFile { addr, properties } => {
                        output.insert(
                            path.clone(),
                            Tracked::new(TrackedKind::File, TrackedState::Tracked)
                                .with_addr(Some(addr.clone()))
                                .with_properties(properties.clone()),
                        );
                    }
                    Change::AddDir { properties }
                    | Change::NewDir { properties }
                    | Change::ChangeDir { properties } => {
                        output.insert(
                            path.clone(),
                            Tracked::new(TrackedKind::Dir, TrackedState::Tracked)
                                .with_properties(properties.clone()),
                        );
                    }
                    Change::DeleteFile | Change::DeleteDir => {
                        output.remove(path);
                    }
                    Change::IgnorePath => {
                        output.insert(
                            path.clone(),
                            Tracked::new(TrackedKind::Ignore, TrackedState::Tracked),
                        );
                    }
                }
            }
        }
        Ok(output)
    }

    fn walk_manifest(
        &self,
        prefix: &RepoPath,
        addr: &Addr,
        root: bool,
        output: &mut BTreeMap<RepoPath, Tracked>,
    ) -> VexResult<()> {
        let (entries, properties) = match self.get_manifest(addr)? {
            Record::Root(manifest) => (manifest.entries, manifest.properties),
            Record::Tree(manifest) => (manifest.entries, Properties::new()),
            other => panic!("manifest {addr} is not a directory: {other:?}"),
        };
        if root {
            output.insert(
                prefix.clone(),
                Tracked::new(TrackedKind::Dir, TrackedState::Tracked).with_properties(properties),
            );
        }
        for (name, entry) in entries {
            let path = prefix.join(&name);
            match entry {
                TreeEntry::Dir { addr, properties } => {
                    output.insert(
                        path.clone(),
                        Tracked::new(TrackedKind::Dir, TrackedState::Tracked)
                            .with_properties(properties),
                    );
                    if let Some(addr) = addr {
                        self.walk_manifest(&path, &addr, false, output)?;
                    }
                }
                TreeEntry::File { addr, properties } => {
                    output.insert(
                        path,
                        Tracked::new(TrackedKind::File, TrackedState::Tracked)
                            .with_addr(Some(addr))
                            .with_properties(properties),
                    );
                }
                TreeEntry::Ignored => {
                    output.insert(path, Tracked::new(TrackedKind::Ignore, TrackedState::Tracked));
                }
                TreeEntry::GitFile { addr, properties } => {
                    output.insert(
                        path,
                        Tracked::new(TrackedKind::GitFile, TrackedState::Tracked)
                            .with_addr(Some(addr))
                            .with_properties(properties),
                    );
                }
            }
        }
        Ok(())
    }

    // -- add / forget / remove / restore ----------------------------------

    /// Finds untracked files and directories under the given working-copy
    /// paths, honouring the ignore/include rules, including every ancestor
    /// directory that is not yet tracked as a directory.
    pub fn find_new_files(
        &self,
        active: &Session,
        files: &[PathBuf],
        patterns: &PatternSet,
    ) -> VexResult<(BTreeMap<RepoPath, PathBuf>, BTreeMap<RepoPath, PathBuf>)> {
        let mut to_scan: BTreeSet<PathBuf> = BTreeSet::new();
        let mut names: BTreeMap<RepoPath, PathBuf> = BTreeMap::new();
        let mut dirs: BTreeMap<RepoPath, PathBuf> = BTreeMap::new();

        let classify = |name: RepoPath,
                            filename: &Path,
                            names: &mut BTreeMap<RepoPath, PathBuf>,
                            dirs: &mut BTreeMap<RepoPath, PathBuf>,
                            to_scan: Option<&mut BTreeSet<PathBuf>>| {
            let entry = active.files.get(&name);
            if filename.is_file() {
                if entry.map_or(true, |e| e.kind != TrackedKind::File) {
                    names.insert(name, filename.to_path_buf());
                }
            } else if filename.is_dir() {
                if entry.map_or(true, |e| e.kind != TrackedKind::Dir) {
                    dirs.insert(name, filename.to_path_buf());
                }
                if let Some(to_scan) = to_scan {
                    to_scan.insert(filename.to_path_buf());
                }
            }
        };

        for filename in files {
            let name = self.project.full_to_repo_path(&active.prefix, filename)?;
            classify(name.clone(), filename, &mut names, &mut dirs, Some(&mut to_scan));
            // ancestors up to the root become directories to add
            let mut name = name.parent();
            let mut filename = filename.parent().map(|p| p.to_path_buf());
            while let (Some(repo_name), Some(fs_name)) = (name, filename) {
                if repo_name.is_root() || fs_name == self.project.config_dir {
                    break;
                }
                match active.files.get(&repo_name) {
                    Some(entry) if entry.kind != TrackedKind::Dir => break,
                    Some(_) | None => {
                        dirs.insert(repo_name.clone(), fs_name.clone());
                    }
                }
                name = repo_name.parent();
                filename = fs_name.parent().map(|p| p.to_path_buf());
            }
        }

        for dir in to_scan {
            let base = self.project.full_to_repo_path(&active.prefix, &dir)?;
            for (filename, name) in list_dir(
                &dir,
                &base,
                patterns,
                Some(self.project.config_dir.as_path()),
            )? {
                classify(name, &filename, &mut names, &mut dirs, None);
            }
        }
        Ok((dirs, names))
    }

    /// Marks new paths `added` (or `replaced` when a path of a different
    /// kind is already tracked there). Returns the working-copy paths that
    /// were picked up.
    pub fn add_files_to_active(
        &mut self,
        files: &[PathBuf],
        patterns: &PatternSet,
    ) -> VexResult<BTreeSet<PathBuf>> {
        let active = self.active()?;
        let (dirs, names) = self.find_new_files(&active, files, patterns)?;

        let mut added = BTreeSet::new();
        let mut new_files: BTreeMap<RepoPath, Tracked> = BTreeMap::new();
        for (kind, found) in [(TrackedKind::Dir, dirs), (TrackedKind::File, names)] {
            for (name, filename) in found {
                match active.files.get(&name) {
                    Some(entry) => {
                        if entry.kind != kind {
                            let replace = entry.replace.or(Some(entry.kind));
                            new_files.insert(
                                name,
                                Tracked::new(kind, TrackedState::Replaced)
                                    .with_working(true)
                                    .with_replace(replace),
                            );
                            added.insert(filename);
                        }
                    }
                    None => {
                        new_files.insert(
                            name,
                            Tracked::new(kind, TrackedState::Added).with_working(true),
                        );
                        added.insert(filename);
                    }
                }
            }
        }
        self.update_active_files(new_files, [])?;
        Ok(added)
    }

    /// Marks tracked paths `deleted` without touching the filesystem.
    /// Paths that were only `added` are simply dropped from the session.
    /// Returns every affected path with its working-copy location.
    pub fn forget_files_from_active(
        &mut self,
        files: &[PathBuf],
    ) -> VexResult<BTreeMap<RepoPath, PathBuf>> {
        let session = self.active()?;
        let mut names: BTreeMap<RepoPath, Tracked> = BTreeMap::new();
        let mut changed: BTreeMap<RepoPath, PathBuf> = BTreeMap::new();
        for filename in files {
            let name = self.project.full_to_repo_path(&session.prefix, filename)?;
            let Some(entry) = session.files.get(&name) else {
                continue;
            };
            changed.insert(name.clone(), filename.clone());
            if !entry.working {
                continue;
            }
            names.insert(name.clone(), entry.clone());
            if entry.kind == TrackedKind::Dir {
                for (child, child_entry) in &session.files {
                    if name.contains(child) && child != &name {
                        names.insert(child.clone(), child_entry.clone());
                        changed.insert(
                            child.clone(),
                            self.project.repo_to_full_path(&session.prefix, child),
                        );
                    }
                }
            }
        }

        let mut new_files: BTreeMap<RepoPath, Tracked> = BTreeMap::new();
        let mut gone_files: Vec<RepoPath> = vec![];
        for (name, entry) in names {
            if entry.state == TrackedState::Added {
                gone_files.push(name);
            } else {
                let kind = entry.replace.unwrap_or(entry.kind);
                new_files.insert(
                    name,
                    Tracked::new(kind, TrackedState::Deleted).with_working(true),
                );
            }
        }
        self.update_active_files(new_files, gone_files)?;
        Ok(changed)
    }

    /// Forget, plus stash the on-disk content into scratch and record a
    /// working change deleting it, so undo can put the bytes back.
    pub fn remove_files_from_active(
        &mut self,
        files: &[PathBuf],
    ) -> VexResult<BTreeMap<RepoPath, PathBuf>> {
        let changed = self.forget_files_from_active(files)?;
        for (path, file) in changed.iter().rev() {
            if file.is_file() {
                let addr = self.project.repo.put_scratch_file(file)?;
                self.old_working
                    .insert(path.clone(), Some(WorkingValue::File(addr)));
                self.new_working.insert(path.clone(), None);
            } else if file.is_dir() {
                self.old_working.insert(path.clone(), Some(WorkingValue::Dir));
                self.new_working.insert(path.clone(), None);
            }
        }
        Ok(changed)
    }

    /// Overwrites working-copy paths with their content at the current
    /// prepare point, stashing whatever was on disk so undo can roll back.
    pub fn restore_files_to_active(
        &mut self,
        files: &[PathBuf],
    ) -> VexResult<BTreeMap<RepoPath, PathBuf>> {
        let active = self.active()?;
        let old_files = self.build_files(&active.prepare)?;
        let mut new_files: BTreeMap<RepoPath, Tracked> = BTreeMap::new();
        let mut changed: BTreeMap<RepoPath, PathBuf> = BTreeMap::new();

        let mut paths: Vec<RepoPath> = files
            .iter()
            .map(|file| self.project.full_to_repo_path(&active.prefix, file))
            .collect::<VexResult<_>>()?;

        while let Some(path) = paths.pop() {
            let Some(entry) = old_files.get(&path) else {
                continue;
            };
            let file = self.project.repo_to_full_path(&active.prefix, &path);
            match entry.kind {
                TrackedKind::File => {
                    let addr = entry
                        .addr
                        .clone()
                        .unwrap_or_else(|| panic!("committed file {path} has no address"));
                    if file.exists() {
                        if !file.is_file() {
                            continue;
                        }
                        let stashed = self.project.repo.put_scratch_file(&file)?;
                        self.old_working
                            .insert(path.clone(), Some(WorkingValue::File(stashed)));
                    } else {
                        self.old_working.insert(path.clone(), None);
                    }
                    self.new_working
                        .insert(path.clone(), Some(WorkingValue::File(addr)));
                }
                TrackedKind::Dir => {
                    for name in old_files.keys() {
                        if path.contains(name) && name != &path {
                            paths.push(name.clone());
                        }
                    }
                    if file.exists() {
                        continue;
                    }
                    self.old_working.insert(path.clone(), None);
                    self.new_working.insert(path.clone(), Some(WorkingValue::Dir));
                }
                TrackedKind::Ignore | TrackedKind::GitFile => {}
            }
            let mut entry = entry.clone();
            entry.working = true;
            new_files.insert(path.clone(), entry);
            changed.insert(path, file);
        }

        self.update_active_files(new_files, [])?;
        Ok(changed)
    }
}

impl Transaction for SessionTransaction<'_> {
    fn command(&self) -> &str {
        &self.command
    }

    fn build_action(&self) -> Action {
        let changes = SessionChanges {
            branches: Pair {
                old: self.old_branches.clone(),
                new: self.new_branches.clone(),
            },
            names: Pair {
                old: self.old_names.clone(),
                new: self.new_names.clone(),
            },
            sessions: Pair {
                old: self.old_sessions.clone(),
                new: self.new_sessions.clone(),
            },
            settings: Pair {
                old: self.old_settings.clone(),
                new: self.new_settings.clone(),
            },
            states: Pair {
                old: self.old_states.clone(),
                new: self.new_states.clone(),
            },
        };
        let blobs = Blobs {
            commits: self.new_commits.clone(),
            manifests: self.new_manifests.clone(),
            files: self.new_files.clone(),
        };
        Action::Session(SessionAction {
            time: self.now.clone(),
            command: self.command.clone(),
            changes: (!changes.is_empty()).then_some(changes),
            blobs: (!blobs.is_empty()).then_some(blobs),
            working: (!self.new_working.is_empty()).then(|| Pair {
                old: self.old_working.clone(),
                new: self.new_working.clone(),
            }),
        })
    }
}

/// Scratch-pad for a prefix/session switch. No blobs are staged; the
/// physical materialisation runs when the action is applied.
pub struct SwitchTransaction<'a> {
    project: &'a Project,
    command: String,
    pub now: Timestamp,
    prefix: Option<Pair<RepoPath>>,
    active_session: Option<Pair<String>>,
    old_branch_states: BTreeMap<String, BranchState>,
    new_branch_states: BTreeMap<String, BranchState>,
    old_session_states: BTreeMap<String, SessionState>,
    new_session_states: BTreeMap<String, SessionState>,
    old_names: BTreeMap<String, Option<String>>,
    new_names: BTreeMap<String, Option<String>>,
    old_states: BTreeMap<String, Option<String>>,
    new_states: BTreeMap<String, Option<String>>,
}

impl<'a> SwitchTransaction<'a> {
    pub fn new(project: &'a Project, command: &str) -> Self {
        SwitchTransaction {
            project,
            command: command.to_string(),
            now: Timestamp::now(),
            prefix: None,
            active_session: None,
            old_branch_states: BTreeMap::new(),
            new_branch_states: BTreeMap::new(),
            old_session_states: BTreeMap::new(),
            new_session_states: BTreeMap::new(),
            old_names: BTreeMap::new(),
            new_names: BTreeMap::new(),
            old_states: BTreeMap::new(),
            new_states: BTreeMap::new(),
        }
    }

    pub fn cancel<T>(&self) -> VexResult<T> {
        Err(VexError::Cancel)
    }

    pub fn switch_prefix(&mut self, new_prefix: RepoPath) -> VexResult<()> {
        let old = self
            .project
            .prefix()?
            .unwrap_or_else(|| panic!("repository has no checked-out prefix"));
        self.prefix = Some(Pair {
            old,
            new: new_prefix,
        });
        Ok(())
    }

    pub fn switch_session(&mut self, new_session: String) -> VexResult<()> {
        let old = self
            .project
            .state
            .get("active")?
            .unwrap_or_else(|| panic!("repository has no active session"));
        self.active_session = Some(Pair {
            old,
            new: new_session,
        });
        Ok(())
    }

    pub fn set_branch_state(&mut self, uuid: &str, state: BranchState) -> VexResult<()> {
        if !self.old_branch_states.contains_key(uuid) {
            let old = self
                .project
                .branches
                .get(uuid)?
                .ok_or_else(|| VexError::corrupt(format!("unknown branch {uuid}")))?;
            self.old_branch_states.insert(uuid.to_string(), old.state);
        }
        self.new_branch_states.insert(uuid.to_string(), state);
        Ok(())
    }

    pub fn set_session_state(&mut self, uuid: &str, state: SessionState) -> VexResult<()> {
        if !self.old_session_states.contains_key(uuid) {
            let old = self
                .project
                .sessions
                .get(uuid)?
                .ok_or_else(|| VexError::corrupt(format!("unknown session {uuid}")))?;
            self.old_session_states.insert(uuid.to_string(), old.state);
        }
        self.new_session_states.insert(uuid.to_string(), state);
        Ok(())
    }

    pub fn get_branch_uuid(&self, name: &str) -> VexResult<Option<String>> {
        if let Some(staged) = self.new_names.get(name) {
            return Ok(staged.clone());
        }
        self.project.names.get(name)
    }

    pub fn set_branch_uuid(&mut self, name: &str, uuid: Option<String>) -> VexResult<()> {
        if !self.old_names.contains_key(name) {
            self.old_names
                .insert(name.to_string(), self.project.names.get(name)?);
        }
        self.new_names.insert(name.to_string(), uuid);
        Ok(())
    }

    pub fn get_state(&self, name: &str) -> VexResult<Option<String>> {
        if let Some(staged) = self.new_states.get(name) {
            return Ok(staged.clone());
        }
        self.project.state.get(name)
    }

    pub fn set_state(&mut self, name: &str, value: Option<String>) -> VexResult<()> {
        if !self.old_states.contains_key(name) {
            self.old_states
                .insert(name.to_string(), self.project.state.get(name)?);
        }
        self.new_states.insert(name.to_string(), value);
        Ok(())
    }
}

impl Transaction for SwitchTransaction<'_> {
    fn command(&self) -> &str {
        &self.command
    }

    fn build_action(&self) -> Action {
        Action::Switch(SwitchAction {
            time: self.now.clone(),
            command: self.command.clone(),
            prefix: self.prefix.clone(),
            active: self.active_session.clone(),
            session_states: Pair {
                old: self.old_session_states.clone(),
                new: self.new_session_states.clone(),
            },
            branch_states: Pair {
                old: self.old_branch_states.clone(),
                new: self.new_branch_states.clone(),
            },
            names: Pair {
                old: self.old_names.clone(),
                new: self.new_names.clone(),
            },
            states: Pair {
                old: self.old_states.clone(),
                new: self.new_states.clone(),
            },
        })
    }
}
