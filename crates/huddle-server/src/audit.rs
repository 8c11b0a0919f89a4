use huddle_core::activity::ActionKind;
use huddle_db::entities::activity_logs;
use sea_orm::prelude::Uuid;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, Set};

use crate::resolve::EntityRefs;

/// Appends one immutable audit row.
///
/// Callers pass the connection (usually the open transaction) their primary
/// write ran on, so a rolled-back mutation never leaves an audit row behind.
/// A failed insert propagates; the caller owns the rollback decision.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    actor_id: Option<Uuid>,
    action: ActionKind,
    description: impl Into<String>,
    refs: EntityRefs,
    metadata: serde_json::Value,
) -> Result<activity_logs::Model, DbErr> {
    activity_logs::ActiveModel {
        id: Set(Uuid::new_v4()),
        actor_id: Set(actor_id),
        action: Set(action.as_str().to_string()),
        description: Set(description.into()),
        task_id: Set(refs.task_id),
        project_id: Set(refs.project_id),
        comment_id: Set(refs.comment_id),
        metadata: Set(metadata),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(conn)
    .await
}
