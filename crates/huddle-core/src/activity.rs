use serde::{Deserialize, Serialize};

use crate::UnknownValue;

/// Audited mutation kinds. One immutable activity-log row is written per
/// occurrence, inside the mutation's own transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    TaskCreated,
    StatusChanged,
    CommentAdded,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::TaskCreated => "TASK_CREATED",
            ActionKind::StatusChanged => "STATUS_CHANGED",
            ActionKind::CommentAdded => "COMMENT_ADDED",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK_CREATED" => Ok(ActionKind::TaskCreated),
            "STATUS_CHANGED" => Ok(ActionKind::StatusChanged),
            "COMMENT_ADDED" => Ok(ActionKind::CommentAdded),
            other => Err(UnknownValue::new("action kind", other)),
        }
    }
}

/// Feed activity vocabulary. Superset of [`ActionKind`]: mentions surface on
/// the social timeline but are not a separate audited mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    TaskCreated,
    StatusChanged,
    CommentAdded,
    UserMentioned,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::TaskCreated => "TASK_CREATED",
            ActivityType::StatusChanged => "STATUS_CHANGED",
            ActivityType::CommentAdded => "COMMENT_ADDED",
            ActivityType::UserMentioned => "USER_MENTIONED",
        }
    }
}

impl From<ActionKind> for ActivityType {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::TaskCreated => ActivityType::TaskCreated,
            ActionKind::StatusChanged => ActivityType::StatusChanged,
            ActionKind::CommentAdded => ActivityType::CommentAdded,
        }
    }
}

impl std::str::FromStr for ActivityType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK_CREATED" => Ok(ActivityType::TaskCreated),
            "STATUS_CHANGED" => Ok(ActivityType::StatusChanged),
            "COMMENT_ADDED" => Ok(ActivityType::CommentAdded),
            "USER_MENTIONED" => Ok(ActivityType::UserMentioned),
            other => Err(UnknownValue::new("activity type", other)),
        }
    }
}
