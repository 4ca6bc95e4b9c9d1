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
use vex_lib::action::{Action, SessionAction, SessionChanges};
use vex_lib::commit::{MillisSinceEpoch, Timestamp};
use vex_lib::errors::VexError;
use vex_lib::history::{History, NextMode};

/// An action that flips the pending message, with old/new sides matching
/// the repository so either direction applies cleanly.
fn message_action(old: &str, new: &str) -> Action {
    let mut changes = SessionChanges::default();
    changes.states.old.insert(
        "message".to_string(),
        Some(old.to_string()),
    );
    changes.states.new.insert(
        "message".to_string(),
        Some(new.to_string()),
    );
    Action::Session(SessionAction {
        time: Timestamp {
            timestamp: MillisSinceEpoch(0),
            tz_offset: 0,
        },
        command: "message:set".to_string(),
        changes: Some(changes),
        blobs: None,
        working: None,
    })
}

/// Simulates a crash after `next` was written but before `current`
/// advanced: the action's entry exists and `next` points at it.
fn inject_interrupted_do(test: &TestProject, action: &Action) {
    let history = History::load(test.working_dir().join(".vex/history"));
    let current = history.store().current().unwrap();
    let addr = history.store().put_entry(&current, action).unwrap();
    history
        .store()
        .set_next(NextMode::Do, &addr, Some(&current))
        .unwrap();
}

#[test]
fn test_unclean_state_blocks_operations() {
    let test = TestProject::init("/repo");
    inject_interrupted_do(&test, &message_action("", "crashed\n"));

    assert!(!test.project.clean_state().unwrap());
    assert_matches!(test.project.status(), Err(VexError::Unclean));
    assert_matches!(test.project.commit(None), Err(VexError::Unclean));
    assert_matches!(test.project.undo(), Err(VexError::Unclean));
}

#[test]
fn test_rollback_reverts_the_interrupted_action() {
    let test = TestProject::init("/repo");
    test.project.set_message("crashed\n").unwrap();
    inject_interrupted_do(&test, &message_action("", "crashed\n"));

    let rolled_back = test.project.rollback_new_action().unwrap().unwrap();
    assert_eq!(rolled_back.command(), "message:set");
    assert!(test.project.clean_state().unwrap());
    // the partial effect was undone
    assert_eq!(test.project.get_message().unwrap(), "");
    // operations work again
    test.project.status().unwrap();
}

#[test]
fn test_restart_completes_the_interrupted_action() {
    let test = TestProject::init("/repo");
    inject_interrupted_do(&test, &message_action("", "crashed\n"));

    let restarted = test.project.restart_new_action().unwrap().unwrap();
    assert_eq!(restarted.command(), "message:set");
    assert!(test.project.clean_state().unwrap());
    // the action's effects were applied and it is now current
    assert_eq!(test.project.get_message().unwrap(), "crashed\n");
    let undone = test.project.undo().unwrap().unwrap();
    assert_eq!(undone.command(), "message:set");
    assert_eq!(test.project.get_message().unwrap(), "");
}

#[test]
fn test_recovery_is_a_no_op_when_clean() {
    let test = TestProject::init("/repo");
    assert_eq!(test.project.rollback_new_action().unwrap(), None);
    assert_eq!(test.project.restart_new_action().unwrap(), None);
}
