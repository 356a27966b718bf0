// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known authentication token fields
pub const TOKEN_UID: &str = "uid";
pub const TOKEN_USER_DN: &str = "userdn";
pub const TOKEN_AUTH_MANAGER: &str = "authManagerInstName";

/// Contents of the authentication token presented with a request.
///
/// Stored on the request as a flat string map, so only string-valued
/// credentials survive persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    values: BTreeMap<String, String>,
}

impl AuthToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn uid(&self) -> Option<&str> {
        self.get(TOKEN_UID)
    }

    pub fn user_dn(&self) -> Option<&str> {
        self.get(TOKEN_USER_DN)
    }

    pub fn auth_manager(&self) -> Option<&str> {
        self.get(TOKEN_AUTH_MANAGER)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl From<BTreeMap<String, String>> for AuthToken {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}
