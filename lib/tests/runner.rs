use std::path::PathBuf;

#[test]
fn test_no_forgotten_test_files() {
    let test_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests");
    testutils::assert_no_forgotten_test_files(&test_dir);
}

mod test_add_remove_restore;
mod test_branches;
mod test_commit;
mod test_recovery;
mod test_undo_redo;
