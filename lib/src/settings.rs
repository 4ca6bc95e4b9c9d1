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

use std::collections::BTreeMap;
use std::env;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::commit::Timestamp;

/// A named user in the authors ledger.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Account {
    pub name: String,
    pub email: String,
}

/// A value in the repository settings store. The shapes are disjoint, so
/// the stored form needs no tag: a string is text (`template`), an array is
/// a pattern list (`ignore`/`include`), an object is the authors ledger.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setting {
    Text(String),
    Patterns(Vec<String>),
    Authors(BTreeMap<String, Account>),
}

impl Setting {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Setting::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_patterns(&self) -> Option<&[String]> {
        match self {
            Setting::Patterns(patterns) => Some(patterns),
            _ => None,
        }
    }

    pub fn as_authors(&self) -> Option<&BTreeMap<String, Account>> {
        match self {
            Setting::Authors(authors) => Some(authors),
            _ => None,
        }
    }
}

/// Per-user configuration, layered from config files and environment.
#[derive(Debug, Clone, Default)]
pub struct UserSettings {
    config: config::Config,
    timestamp: Option<Timestamp>,
}

impl UserSettings {
    pub fn from_config(config: config::Config) -> Self {
        let timestamp = match config.get_string("user.timestamp") {
            Ok(timestamp_str) => DateTime::parse_from_rfc3339(&timestamp_str)
                .ok()
                .map(Timestamp::from_datetime),
            Err(_) => None,
        };
        UserSettings { config, timestamp }
    }

    pub fn for_user() -> Result<Self, config::ConfigError> {
        let mut config_builder = config::Config::builder();

        if let Some(config_dir) = dirs::config_dir() {
            config_builder = config_builder.add_source(
                config::File::from(config_dir.join("vex/config.toml"))
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }
        if let Some(home_dir) = dirs::home_dir() {
            config_builder = config_builder.add_source(
                config::File::from(home_dir.join(".vexconfig"))
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        if let Ok(value) = env::var("VEX_AUTHOR") {
            config_builder = config_builder.set_override("user.name", value)?;
        }
        if let Ok(value) = env::var("VEX_EMAIL") {
            config_builder = config_builder.set_override("user.email", value)?;
        }
        if let Ok(value) = env::var("VEX_TIMESTAMP") {
            config_builder = config_builder.set_override("user.timestamp", value)?;
        }

        let config = config_builder.build()?;
        Ok(Self::from_config(config))
    }

    pub fn user_name(&self) -> String {
        self.config
            .get_string("user.name")
            .unwrap_or_else(|_| whoami::username())
    }

    pub fn user_email(&self) -> String {
        self.config.get_string("user.email").unwrap_or_else(|_| {
            format!(
                "{}@{}",
                whoami::username(),
                whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string())
            )
        })
    }

    pub fn account(&self) -> Account {
        Account {
            name: self.user_name(),
            email: self.user_email(),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp.clone().unwrap_or_else(Timestamp::now)
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }
}
