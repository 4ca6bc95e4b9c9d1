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
use vex_lib::session::{TrackedKind, TrackedState};

#[test]
fn test_add_scans_recursively_and_honours_ignores() {
    let test = TestProject::init_with_patterns("/repo", vec![], vec!["*.o".to_string()]);
    let project = &test.project;
    test.write_file("src/main.c", b"int main;\n");
    test.write_file("src/main.o", b"\x7fELF");

    project
        .add(&[test.working_dir().to_path_buf()], None, None)
        .unwrap();
    let status = project.status().unwrap();
    assert_eq!(
        status.get(&repo_path("/repo/src")).unwrap().kind,
        TrackedKind::Dir
    );
    assert_eq!(
        status.get(&repo_path("/repo/src/main.c")).unwrap().state,
        TrackedState::Added
    );
    assert!(!status.contains_key(&repo_path("/repo/src/main.o")));
}

#[test]
fn test_add_tracks_ancestor_directories() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("deep/ly/nested", b"x\n");
    project
        .add(&[test.file_path("deep/ly/nested")], None, None)
        .unwrap();
    let status = project.status().unwrap();
    for path in ["/repo/deep", "/repo/deep/ly"] {
        assert_eq!(
            status.get(&repo_path(path)).unwrap().kind,
            TrackedKind::Dir
        );
    }
    assert_eq!(
        status.get(&repo_path("/repo/deep/ly/nested")).unwrap().state,
        TrackedState::Added
    );
}

#[test]
fn test_forget_drops_added_files_entirely() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("a", b"hello\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.forget(&[test.file_path("a")]).unwrap();

    let status = project.status().unwrap();
    assert!(!status.contains_key(&repo_path("/repo/a")));
    // the file stays on disk
    assert_eq!(test.read_file("a"), b"hello\n");
}

#[test]
fn test_forget_marks_committed_files_deleted() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("a", b"hello\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();

    project.forget(&[test.file_path("a")]).unwrap();
    let status = project.status().unwrap();
    assert_eq!(
        status.get(&repo_path("/repo/a")).unwrap().state,
        TrackedState::Deleted
    );
    assert_eq!(test.read_file("a"), b"hello\n");

    // the next commit records the deletion
    project.commit(None).unwrap().unwrap();
    let status = project.status().unwrap();
    assert!(!status.contains_key(&repo_path("/repo/a")));
}

#[test]
fn test_remove_deletes_and_undo_restores_bytes() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("a", b"precious bytes\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();

    project.remove(&[test.file_path("a")]).unwrap();
    assert!(!test.file_path("a").exists());

    project.undo().unwrap().unwrap();
    assert_eq!(test.read_file("a"), b"precious bytes\n");
    let status = project.status().unwrap();
    assert_eq!(
        status.get(&repo_path("/repo/a")).unwrap().state,
        TrackedState::Tracked
    );
}

#[test]
fn test_restore_rolls_back_working_changes() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("a", b"committed\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();

    test.write_file("a", b"scribbled over\n");
    project.restore(&[test.file_path("a")]).unwrap();
    assert_eq!(test.read_file("a"), b"committed\n");

    // undo brings the scribbles back
    project.undo().unwrap().unwrap();
    assert_eq!(test.read_file("a"), b"scribbled over\n");
}

#[test]
fn test_restore_recreates_deleted_files() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("a", b"committed\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();

    std::fs::remove_file(test.file_path("a")).unwrap();
    project.restore(&[test.file_path("a")]).unwrap();
    assert_eq!(test.read_file("a"), b"committed\n");
}

#[test]
fn test_repeated_status_is_stable() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("a", b"committed\n");
    project.add(&[test.file_path("a")], None, None).unwrap();
    project.commit(None).unwrap().unwrap();
    test.write_file("a", b"changed since\n");

    // refreshing twice classifies every entry the same way; only the stat
    // fingerprint may warm up between runs
    let first = project.status().unwrap();
    let second = project.status().unwrap();
    assert_eq!(first.len(), second.len());
    for (name, entry) in &first {
        let again = second.get(name).unwrap();
        assert_eq!(entry.state, again.state, "{name}");
        assert_eq!(entry.kind, again.kind, "{name}");
        assert_eq!(entry.addr, again.addr, "{name}");
    }
    assert_eq!(
        first.get(&repo_path("/repo/a")).unwrap().state,
        TrackedState::Modified
    );
}

#[test]
fn test_untracked_lists_candidate_files() {
    let test = TestProject::init("/repo");
    let project = &test.project;
    test.write_file("new", b"x\n");
    test.write_file("old", b"y\n");
    project.add(&[test.file_path("old")], None, None).unwrap();

    let untracked = project
        .untracked(&[test.working_dir().to_path_buf()])
        .unwrap();
    assert_eq!(untracked, vec![test.file_path("new")]);
}
