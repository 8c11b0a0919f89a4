use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames accepted from clients. Anything unrecognized deserializes to
/// `Unknown` and is dropped without closing the connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    Typing,
    #[serde(other)]
    Unknown,
}

/// Frames pushed to clients on task and feed sockets.
///
/// The serialized `type` tag is the wire vocabulary; payload-carrying events
/// wrap their body in `data`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Pong,
    ConnectionEstablished {
        message: String,
        /// Present on the feed socket only: ids of the organizations whose
        /// rooms were joined at connect time.
        #[serde(skip_serializing_if = "Option::is_none")]
        organizations: Option<Vec<Uuid>>,
    },
    TaskUpdated {
        data: serde_json::Value,
    },
    CommentAdded {
        data: serde_json::Value,
    },
    StatusChanged {
        data: serde_json::Value,
    },
    FeedUpdate {
        data: serde_json::Value,
    },
    UserJoined {
        user_id: Uuid,
        user_email: String,
    },
    UserLeft {
        user_id: Uuid,
        user_email: String,
    },
    Typing {
        user_id: Uuid,
        user_email: String,
    },
}

/// Payload delivered on the notifications socket.
///
/// Deliberately not `type`-tagged: clients receive the bare
/// `{"notification_type": …, "data": …}` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFrame {
    pub notification_type: String,
    pub data: serde_json::Value,
}

impl NotificationFrame {
    pub fn new(notification_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            notification_type: notification_type.into(),
            data,
        }
    }
}
