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

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vex_lib::project::Project;
use vex_lib::repo_path::RepoPath;
use vex_lib::settings::UserSettings;

pub fn new_temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("vex-test-")
        .tempdir()
        .unwrap()
}

pub fn base_config() -> config::ConfigBuilder<config::builder::DefaultState> {
    config::Config::builder().add_source(config::File::from_str(
        r#"
            user.name = "Test User"
            user.email = "test.user@example.com"
        "#,
        config::FileFormat::Toml,
    ))
}

pub fn user_settings() -> UserSettings {
    let config = base_config().build().unwrap();
    UserSettings::from_config(config)
}

pub fn repo_path(value: &str) -> RepoPath {
    RepoPath::parse(value).unwrap()
}

/// A repository in a temp directory, initialised and ready to mutate.
pub struct TestProject {
    _temp_dir: TempDir,
    pub project: Project,
}

impl TestProject {
    /// Initialises a repository with the given checkout prefix and no
    /// ignore/include rules.
    pub fn init(prefix: &str) -> TestProject {
        Self::init_with_patterns(prefix, vec![], vec![])
    }

    pub fn init_with_patterns(
        prefix: &str,
        include: Vec<String>,
        ignore: Vec<String>,
    ) -> TestProject {
        let temp_dir = new_temp_dir();
        let working_dir = temp_dir.path().join("repo");
        fs::create_dir(&working_dir).unwrap();
        let project = Project::new(working_dir, user_settings());
        project.init(prefix, include, ignore).unwrap();
        TestProject {
            _temp_dir: temp_dir,
            project,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.project.working_dir
    }

    pub fn file_path(&self, relative: &str) -> PathBuf {
        self.working_dir().join(relative)
    }

    /// Writes a working-copy file, creating parent directories.
    pub fn write_file(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.file_path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn read_file(&self, relative: &str) -> Vec<u8> {
        fs::read(self.file_path(relative)).unwrap()
    }
}

pub fn assert_no_forgotten_test_files(test_dir: &Path) {
    let runner_path = test_dir.join("runner.rs");
    let runner = fs::read_to_string(&runner_path).unwrap();
    let entries = fs::read_dir(test_dir).unwrap();
    for entry in entries {
        let path = entry.unwrap().path();
        if let Some(ext) = path.extension() {
            let name = path.file_stem().unwrap();
            if ext == "rs" && name != "runner" {
                let search = format!("mod {};", name.to_str().unwrap());
                assert!(
                    runner.contains(&search),
                    "missing `{search}` declaration in {}",
                    runner_path.display()
                );
            }
        }
    }
}
