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

use testutils::{repo_path, TestProject};
use vex_lib::object_id::Addr;
use vex_lib::project::Project;
use vex_lib::session::TrackedState;

fn head_of(project: &Project) -> Addr {
    let uuid = project.get_branch_uuid("latest").unwrap().unwrap();
    project.get_branch(&uuid).unwrap().unwrap().head
}

#[test]
fn test_undo_restores_prior_head() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    let init_head = head_of(project);

    test.write_file("a", b"hello\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();
    assert_ne!(head_of(project), init_head);

    let undone = project.undo().unwrap().unwrap();
    assert_eq!(undone.command(), "commit");

    assert_eq!(head_of(project), init_head);
    let status = project.status().unwrap();
    assert_eq!(
        status.get(&repo_path("/repo/a")).unwrap().state,
        TrackedState::Added
    );
    assert_eq!(project.redo_choices().unwrap().len(), 1);
}

#[test]
fn test_undo_then_redo_restores_the_commit() {
    let test = TestProject::init("/repo");
    let project = &test.project;

    test.write_file("a", b"hello\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();
    let committed_head = head_of(project);
    let committed_session = project.active().unwrap().unwrap();

    project.undo().unwrap().unwrap();
    let redone = project.redo(0).unwrap().unwrap();
    assert_eq!(redone.command(), "commit");

    assert_eq!(head_of(project), committed_head);
    assert_eq!(project.active().unwrap().unwrap(), committed_session);
    assert_eq!(project.redo_choices().unwrap().len(), 0);
    assert!(project.clean_state().unwrap());
}

#[test]
fn test_undo_undo_walks_back_through_add() {
    let test = TestProject::init("/repo");
    let project = &test.project;

    test.write_file("a", b"hello\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();

    project.undo().unwrap().unwrap();
    let undone = project.undo().unwrap().unwrap();
    assert_eq!(undone.command(), "add");
    let status = project.status().unwrap();
    assert!(!status.contains_key(&repo_path("/repo/a")));
    // the file itself is untouched
    assert_eq!(test.read_file("a"), b"hello\n");
}

#[test]
fn test_redo_choices_after_divergence() {
    let test = TestProject::init("/repo");
    let project = &test.project;

    test.write_file("a", b"first\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.undo().unwrap().unwrap();

    test.write_file("b", b"second\n");
    project.add(&[test.file_path("b")], None, None).unwrap();
    project.undo().unwrap().unwrap();

    // both adds are redoable from the initial state, newest first
    let choices = project.redo_choices().unwrap();
    assert_eq!(choices.len(), 2);
    project.redo(1).unwrap().unwrap();
    let status = project.status().unwrap();
    assert!(status.contains_key(&repo_path("/repo/a")));
    assert!(!status.contains_key(&repo_path("/repo/b")));
}

#[test]
fn test_quiet_operations_are_not_undone() {
    let test = TestProject::init("/repo");
    let project = &test.project;

    test.write_file("a", b"hello\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    // status is recorded quietly and must not become the undo target
    project.status().unwrap();
    let undone = project.undo().unwrap().unwrap();
    assert_eq!(undone.command(), "add");
}

#[test]
fn test_list_undos_is_linear() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("a", b"hello\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();

    let entries = project.list_undos().unwrap();
    let commands: Vec<_> = entries
        .iter()
        .map(|(action, _)| action.command().to_string())
        .collect();
    assert_eq!(commands, vec!["commit", "add", "init"]);
}
