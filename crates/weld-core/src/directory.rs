//! Per-project user directory.
//!
//! Built once from the project's membership list and immutable for the
//! rest of the run; membership changes mid-run are not observed.

use crate::record::Membership;
use std::collections::HashMap;

/// Bidirectional map between numeric user ids (as strings) and display
/// names, scoped to one project's current memberships.
///
/// Blank maps to blank in both directions — inserted explicitly at
/// build time so lookups on unassigned fields resolve to "no user"
/// instead of failing. A name with no entry is unresolved, which the
/// reconciliation engine decides how to treat.
#[derive(Debug, Default)]
pub struct UserDirectory {
    id_to_name: HashMap<String, String>,
    name_to_id: HashMap<String, String>,
}

impl UserDirectory {
    #[must_use]
    pub fn build(memberships: &[Membership]) -> Self {
        let mut directory = Self::default();
        for membership in memberships {
            // Group memberships carry no user.
            let Some(user) = membership.user.as_ref() else {
                continue;
            };
            let id = user.id.to_string();
            directory.id_to_name.insert(id.clone(), user.name.clone());
            directory.name_to_id.insert(user.name.clone(), id);
        }
        directory.id_to_name.insert(String::new(), String::new());
        directory.name_to_id.insert(String::new(), String::new());
        directory
    }

    /// Resolve a display name to a user id. `None` means unresolved.
    #[must_use]
    pub fn name_to_id(&self, name: &str) -> Option<&str> {
        self.name_to_id.get(name).map(String::as_str)
    }

    /// Resolve a user id to a display name. `None` means unresolved.
    #[must_use]
    pub fn id_to_name(&self, id: &str) -> Option<&str> {
        self.id_to_name.get(id).map(String::as_str)
    }

    /// Human-facing form of a token: the display name when the token is
    /// a known user id, the token itself otherwise.
    #[must_use]
    pub fn display<'a>(&'a self, token: &'a str) -> &'a str {
        self.id_to_name(token).unwrap_or(token)
    }

    /// Number of real users indexed (the blank fallback excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_to_name.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
