use std::fmt;

pub mod activity;
pub mod frames;
pub mod mentions;
pub mod rooms;
pub mod status;

pub use activity::{ActionKind, ActivityType};
pub use rooms::RoomId;
pub use status::{TaskPriority, TaskStatus};

/// A stored enum string did not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownValue {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownValue {}
