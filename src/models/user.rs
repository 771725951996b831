//! Roster models

use serde::{Deserialize, Serialize};

/// Roster entry returned by the history service.
///
/// Created server-side; the client never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UserRow")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
}

/// Wire shape of a roster row. Document stores may send `_id`, `id` or both.
#[derive(Deserialize)]
struct UserRow {
    #[serde(rename = "_id")]
    underscore_id: Option<String>,
    id: Option<String>,
    username: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.underscore_id.or(row.id).unwrap_or_default(),
            username: row.username,
        }
    }
}
