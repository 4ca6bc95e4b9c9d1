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

use pretty_assertions::assert_eq;
use testutils::{repo_path, TestProject};
use vex_lib::commit::CommitKind;
use vex_lib::object_id::Addr;
use vex_lib::project::Project;
use vex_lib::session::TrackedState;

fn head_of(project: &Project) -> Addr {
    let uuid = project.get_branch_uuid("latest").unwrap().unwrap();
    project.get_branch(&uuid).unwrap().unwrap().head
}

#[test]
fn test_add_and_commit_round_trip() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    let init_head = head_of(project);

    test.write_file("a", b"hello\n");
    let added = project.add(&[test.file_path("a")], None, None).unwrap();
    assert_eq!(added.len(), 1);

    let status = project.status().unwrap();
    assert_eq!(
        status.get(&repo_path("/repo/a")).unwrap().state,
        TrackedState::Added
    );

    let changeset = project.commit(None).unwrap().unwrap();
    assert!(changeset.entries.contains_key(&repo_path("/repo/a")));

    let status = project.status().unwrap();
    assert_eq!(
        status.get(&repo_path("/repo/a")).unwrap().state,
        TrackedState::Tracked
    );

    let head = head_of(project);
    assert_ne!(head, init_head);
    let commit = project.get_commit(&head).unwrap();
    assert_eq!(commit.kind, CommitKind::Commit);
    assert_eq!(commit.previous.as_ref(), Some(&init_head));

    let log = project.log(true, 50).unwrap();
    assert_eq!(log.len(), 2);
}

#[test]
fn test_commit_with_nothing_pending_cancels() {
    let test = TestProject::init("/repo");
    assert_eq!(test.project.commit(None).unwrap(), None);
}

#[test]
fn test_modify_and_commit() {
    let test = TestProject::init("/repo");
    let project = &test.project;

    test.write_file("a", b"one\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();
    let first_head = head_of(project);

    test.write_file("a", b"two two\n");
    let status = project.status().unwrap();
    assert_eq!(
        status.get(&repo_path("/repo/a")).unwrap().state,
        TrackedState::Modified
    );

    project.commit(None).unwrap().unwrap();
    assert_ne!(head_of(project), first_head);

    // committing the same content again is a no-op
    assert_eq!(project.commit(None).unwrap(), None);
}

#[test]
fn test_prepare_then_commit_matches_direct_commit() {
    // Build the same two files once through prepare+commit and once
    // through a single commit; the resulting roots must be identical.
    let prepared = TestProject::init("/repo");
    prepared.write_file("b", b"x");
    prepared
        .project
        .add(&[prepared.file_path("b")], None, None)
        .unwrap();
    prepared.project.prepare(None).unwrap().unwrap();
    prepared.write_file("c", b"y");
    prepared
        .project
        .add(&[prepared.file_path("c")], None, None)
        .unwrap();
    prepared.project.commit(None).unwrap().unwrap();

    let direct = TestProject::init("/repo");
    direct.write_file("b", b"x");
    direct.write_file("c", b"y");
    direct
        .project
        .add(&[direct.file_path("b"), direct.file_path("c")], None, None)
        .unwrap();
    direct.project.commit(None).unwrap().unwrap();

    let prepared_root = prepared
        .project
        .get_commit(&head_of(&prepared.project))
        .unwrap()
        .root;
    let direct_root = direct
        .project
        .get_commit(&head_of(&direct.project))
        .unwrap()
        .root;
    assert_eq!(prepared_root, direct_root);
}

#[test]
fn test_prepare_does_not_move_the_head() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    let init_head = head_of(project);

    test.write_file("a", b"pending\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.prepare(None).unwrap().unwrap();

    assert_eq!(head_of(project), init_head);
    let session = project.active().unwrap().unwrap();
    assert_ne!(session.prepare, session.commit);
    let prepare = project.get_commit(&session.prepare).unwrap();
    assert_eq!(prepare.kind, CommitKind::Prepare);
    assert_eq!(prepare.root, None);

    // prepared changes land with the next commit
    project.commit(None).unwrap().unwrap();
    let session = project.active().unwrap().unwrap();
    assert_eq!(session.prepare, session.commit);
    let commit = project.get_commit(&session.commit).unwrap();
    assert_eq!(commit.kind, CommitKind::Commit);
    assert!(commit.ancestors.contains_key("prepared"));
}

#[test]
fn test_commit_prepared_ignores_fresh_changes() {
    let test = TestProject::init("/repo");
    let project = &test.project;

    test.write_file("b", b"staged\n");
    project.add(&[test.file_path("b")], None, None).unwrap();
    project.prepare(None).unwrap().unwrap();
    test.write_file("late", b"not yet\n");
    project.add(&[test.file_path("late")], None, None).unwrap();

    project.commit_prepared().unwrap().unwrap();
    let status = project.status().unwrap();
    assert_eq!(
        status.get(&repo_path("/repo/b")).unwrap().state,
        TrackedState::Tracked
    );
    assert_eq!(
        status.get(&repo_path("/repo/late")).unwrap().state,
        TrackedState::Added
    );
}

#[test]
fn test_amend_records_amend_kind() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("a", b"v1\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();

    test.write_file("a", b"v2\n");
    project.amend(None).unwrap().unwrap();
    let commit = project.get_commit(&head_of(project)).unwrap();
    assert_eq!(commit.kind, CommitKind::Amend);
}

#[test]
fn test_commit_message_consumed_from_state() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    project.set_message("add the alphabet\n").unwrap();
    test.write_file("a", b"abc\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    let changeset = project.commit(None).unwrap().unwrap();
    assert_eq!(changeset.message.as_deref(), Some("add the alphabet\n"));
    // consumed and reset to the (empty) template
    assert_eq!(project.get_message().unwrap(), "");
}
