//! Primary authentication: the password check that precedes ticket issuance.

use crate::config::UserCredential;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

/// Compared against when the user is unknown, so both paths do the same work.
const DUMMY_PASSWORD: &[u8] = b"mole-unknown-user-placeholder";

/// In-memory user/password table.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    users: HashMap<String, String>,
}

impl Credentials {
    /// Build the table; later entries for the same name replace earlier ones.
    pub fn new(users: &[UserCredential]) -> Self {
        Self {
            users: users
                .iter()
                .map(|u| (u.name.clone(), u.password.clone()))
                .collect(),
        }
    }

    /// Number of configured users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check a name/password pair.
    pub fn check(&self, name: &str, password: &str) -> bool {
        let (expected, known) = match self.users.get(name) {
            Some(p) => (p.as_bytes(), true),
            None => (DUMMY_PASSWORD, false),
        };
        let matches: bool = expected.ct_eq(password.as_bytes()).into();
        known && matches
    }
}

/// Constant-time comparison for API keys.
pub fn key_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
