use std::fmt;

use uuid::Uuid;

/// A logical fan-out room.
///
/// The `Display` form is the wire contract and must stay stable for any
/// external bridge that addresses rooms by string key:
/// `notifications_<user_id>`, `task_<task_id>`, `feed_org_<organization_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Per-user notification channel; exactly one per authenticated user.
    Notifications(Uuid),
    /// Watchers of a single task.
    Task(Uuid),
    /// Organization-wide live feed.
    OrgFeed(Uuid),
}

impl RoomId {
    pub fn notifications(user_id: Uuid) -> Self {
        RoomId::Notifications(user_id)
    }

    pub fn task(task_id: Uuid) -> Self {
        RoomId::Task(task_id)
    }

    pub fn org_feed(organization_id: Uuid) -> Self {
        RoomId::OrgFeed(organization_id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Notifications(user_id) => write!(f, "notifications_{user_id}"),
            RoomId::Task(task_id) => write!(f, "task_{task_id}"),
            RoomId::OrgFeed(org_id) => write!(f, "feed_org_{org_id}"),
        }
    }
}
