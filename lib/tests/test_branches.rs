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

use assert_matches::assert_matches;
use testutils::TestProject;
use vex_lib::errors::VexError;
use vex_lib::project::Project;
use vex_lib::session::SessionState;

fn head_of(project: &Project, name: &str) -> vex_lib::object_id::Addr {
    let uuid = project.get_branch_uuid(name).unwrap().unwrap();
    project.get_branch(&uuid).unwrap().unwrap().head
}

#[test]
fn test_new_branch_forks_the_session() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    let latest_session = project.active().unwrap().unwrap();

    project.new_branch("feature", false).unwrap();
    let session = project.active().unwrap().unwrap();
    assert_ne!(session.uuid, latest_session.uuid);
    assert_eq!(session.state, SessionState::Attached);

    let feature_uuid = project.get_branch_uuid("feature").unwrap().unwrap();
    let feature = project.get_branch(&feature_uuid).unwrap().unwrap();
    assert_eq!(session.branch, feature_uuid);
    assert_eq!(feature.upstream.as_deref(), Some(latest_session.branch.as_str()));
    assert_eq!(feature.base, Some(latest_session.commit.clone()));

    // committing on the branch moves only its own head
    test.write_file("f", b"feature work\n");
    project.add(&[test.file_path("f")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();
    assert_ne!(head_of(project, "feature"), head_of(project, "latest"));
}

#[test]
fn test_fork_severs_the_upstream_link() {
    let test = TestProject::init("/repo");
    test.project.new_branch("spinoff", true).unwrap();
    let uuid = test.project.get_branch_uuid("spinoff").unwrap().unwrap();
    let branch = test.project.get_branch(&uuid).unwrap().unwrap();
    assert_eq!(branch.upstream, None);
}

#[test]
fn test_new_branch_rejects_duplicate_names() {
    let test = TestProject::init("/repo");
    test.project.new_branch("feature", false).unwrap();
    assert_matches!(
        test.project.new_branch("feature", false),
        Err(VexError::Argument(_))
    );
}

#[test]
fn test_open_branch_switches_back() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    let latest_session = project.active().unwrap().unwrap();

    project.new_branch("feature", false).unwrap();
    project.open_branch("latest", false).unwrap();
    assert_eq!(project.active().unwrap().unwrap().uuid, latest_session.uuid);

    assert_matches!(
        project.open_branch("nothere", false),
        Err(VexError::Argument(_))
    );
}

#[test]
fn test_open_branch_creates_on_request() {
    let test = TestProject::init("/repo");
    test.project.open_branch("wip", true).unwrap();
    let session = test.project.active().unwrap().unwrap();
    let wip_uuid = test.project.get_branch_uuid("wip").unwrap().unwrap();
    assert_eq!(session.branch, wip_uuid);
}

#[test]
fn test_list_branches_names_come_first() {
    let test = TestProject::init("/repo");
    test.project.new_branch("feature", false).unwrap();
    let branches = test.project.list_branches().unwrap();
    let names: Vec<_> = branches.iter().map(|(name, _)| name.clone()).collect();
    assert_eq!(
        names,
        vec![Some("feature".to_string()), Some("latest".to_string())]
    );
}

#[test]
fn test_list_sessions_covers_the_active_branch() {
    let test = TestProject::init("/repo");
    let sessions = test.project.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(
        sessions[0].uuid,
        test.project.active().unwrap().unwrap().uuid
    );
}

#[test]
fn test_save_as_reparents_the_session() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    let old_branch = project.active().unwrap().unwrap().branch;

    project.save_as("kept").unwrap();
    let session = project.active().unwrap().unwrap();
    let kept_uuid = project.get_branch_uuid("kept").unwrap().unwrap();
    assert_eq!(session.branch, kept_uuid);
    let kept = project.get_branch(&kept_uuid).unwrap().unwrap();
    assert_eq!(kept.upstream.as_deref(), Some(old_branch.as_str()));
    assert_eq!(kept.sessions, vec![session.uuid.clone()]);
    // the old branch no longer owns the session
    let old = project.get_branch(&old_branch).unwrap().unwrap();
    assert!(!old.sessions.contains(&session.uuid));
}

#[test]
fn test_rename_branch_is_undoable() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    project.rename_branch("main").unwrap();
    assert!(project.get_branch_uuid("latest").unwrap().is_none());
    assert!(project.get_branch_uuid("main").unwrap().is_some());

    project.undo().unwrap().unwrap();
    assert!(project.get_branch_uuid("latest").unwrap().is_some());
    assert!(project.get_branch_uuid("main").unwrap().is_none());
}

#[test]
fn test_swap_branch_exchanges_names() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    project.new_branch("feature", false).unwrap();
    // active branch is now "feature"; swap names with "latest"
    project.swap_branch("latest").unwrap();
    let active = project.active().unwrap().unwrap();
    assert_eq!(
        project.get_branch_uuid("latest").unwrap().unwrap(),
        active.branch
    );
}

#[test]
fn test_merge_operations_are_unfinished() {
    let test = TestProject::init("/repo");
    assert_matches!(
        test.project.apply_changes_from_branch("latest"),
        Err(VexError::Unfinished(_))
    );
    assert_matches!(
        test.project.replay_changes_from_branch("latest"),
        Err(VexError::Unfinished(_))
    );
}
