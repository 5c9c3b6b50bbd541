use super::identity::{Actor, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of an entity's transition history. Entries are only ever
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange<S> {
    pub from: S,
    pub to: S,
    pub by: UserId,
    pub role: Role,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl<S> StatusChange<S> {
    pub fn new(from: S, to: S, actor: &Actor, at: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            by: actor.id.clone(),
            role: actor.role,
            at,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
