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

use std::fmt::{Debug, Error, Formatter};

use serde::{Deserialize, Serialize};

/// The namespace prefix of addresses minted by the local store.
pub const ADDR_PREFIX: &str = "vex:";

/// A content address: a namespace prefix followed by the hex digest of the
/// blob's canonical serialisation. Addresses are opaque; equal addresses
/// imply equal content.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Serialize, Deserialize)]
pub struct Addr(String);

impl Debug for Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_tuple("Addr").field(&self.0).finish()
    }
}

impl Addr {
    pub fn from_digest(digest: &[u8]) -> Self {
        Addr(format!("{ADDR_PREFIX}{}", hex::encode(digest)))
    }

    pub fn from_string(value: String) -> Self {
        Addr(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest with the namespace prefix stripped. Panics if the
    /// address carries a foreign prefix; callers must only hand local
    /// addresses to the local store.
    pub fn hex(&self) -> &str {
        self.0
            .strip_prefix(ADDR_PREFIX)
            .unwrap_or_else(|| panic!("address {:?} is not in the local namespace", self.0))
    }

    /// Abbreviated form for log output.
    pub fn short(&self) -> &str {
        let hex = self.hex();
        &hex[..hex.len().min(8)]
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.write_str(&self.0)
    }
}

/// Mints a random identifier for branches, sessions and authors. These are
/// name-keyed records, not content-addressed ones, so the id carries no
/// namespace prefix.
pub fn random_uuid() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_round_trip() {
        let addr = Addr::from_digest(&[0xab; 20]);
        assert_eq!(addr.as_str(), format!("vex:{}", "ab".repeat(20)));
        assert_eq!(addr.hex(), "ab".repeat(20));
        assert_eq!(addr.short(), "abababab");
    }

    #[test]
    #[should_panic(expected = "not in the local namespace")]
    fn test_foreign_prefix_panics() {
        Addr::from_string("git:abcd".to_string()).hex();
    }
}
