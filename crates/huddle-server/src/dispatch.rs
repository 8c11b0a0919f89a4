//! Fan-out that runs after a mutation commits: cache invalidation, room
//! broadcasts and job enqueues, in that order. Everything here is
//! best-effort; the database write already happened.

use std::time::Duration;

use huddle_core::frames::{NotificationFrame, ServerFrame};
use huddle_core::rooms::RoomId;
use huddle_core::status::TaskStatus;
use huddle_db::entities::{comments, feed_items, tasks};
use sea_orm::prelude::Uuid;
use serde_json::json;

use crate::auth::AuthUser;
use crate::feed::{self, FeedEntrySummary};
use crate::jobs::{JobRequest, names};
use crate::state::AppState;

pub async fn after_task_created(
    state: AppState,
    actor: AuthUser,
    task: tasks::Model,
    entry: feed_items::Model,
) -> anyhow::Result<()> {
    feed::invalidate_after(&state.db, state.cache.as_ref(), &entry).await;
    broadcast_feed_update(&state, entry).await?;

    if let Some(assignee_id) = task.assignee_id {
        if assignee_id != actor.user_id {
            notify_assignment(&state, &actor, &task, assignee_id).await?;
        }
    }
    Ok(())
}

pub async fn after_status_changed(
    state: AppState,
    actor: AuthUser,
    task: tasks::Model,
    old_status: TaskStatus,
    entry: feed_items::Model,
) -> anyhow::Result<()> {
    feed::invalidate_after(&state.db, state.cache.as_ref(), &entry).await;

    let room = RoomId::task(task.id);
    let frame = ServerFrame::StatusChanged {
        data: json!({
            "task_id": task.id,
            "status": task.status,
            "old_status": old_status.as_str(),
            "changed_by": actor.email,
        }),
    };
    let delivered = state.hub.broadcast(&room, &frame).await;
    tracing::debug!(%room, delivered, "status change broadcast");

    broadcast_feed_update(&state, entry).await?;

    if let Some(assignee_id) = task.assignee_id {
        if assignee_id != actor.user_id {
            let mut data = task_summary(&task);
            data["old_status"] = json!(old_status.as_str());
            data["changed_by"] = json!(actor.email);
            state
                .hub
                .broadcast(
                    &RoomId::notifications(assignee_id),
                    &NotificationFrame::new("task_status_changed", data),
                )
                .await;
        }
    }
    Ok(())
}

pub async fn after_comment_added(
    state: AppState,
    actor: AuthUser,
    task: tasks::Model,
    comment: comments::Model,
    mentioned: Vec<Uuid>,
    entry: feed_items::Model,
) -> anyhow::Result<()> {
    feed::invalidate_after(&state.db, state.cache.as_ref(), &entry).await;

    let room = RoomId::task(task.id);
    let frame = ServerFrame::CommentAdded {
        data: comment_summary(&comment, &actor.email),
    };
    let delivered = state.hub.broadcast(&room, &frame).await;
    tracing::debug!(%room, delivered, "comment broadcast");

    broadcast_feed_update(&state, entry).await?;

    for user_id in &mentioned {
        let data = json!({
            "comment_id": comment.id,
            "task_id": task.id,
            "task_title": task.title,
            "author_email": actor.email,
        });
        state
            .hub
            .broadcast(
                &RoomId::notifications(*user_id),
                &NotificationFrame::new("mentioned_in_comment", data),
            )
            .await;
    }

    if !mentioned.is_empty() {
        let ids: Vec<String> = mentioned.iter().map(Uuid::to_string).collect();
        state
            .jobs
            .enqueue(
                JobRequest::new(names::COMMENT_NOTIFICATION)
                    .arg(json!(comment.id))
                    .arg(json!(ids))
                    .with_retries(3, Duration::from_secs(60)),
            )
            .await?;
    }
    Ok(())
}

/// Field edits do not produce a feed entry, so there is no invalidation
/// here; the task room still learns about the change, and a reassignment
/// notifies the new assignee.
pub async fn after_task_updated(
    state: AppState,
    actor: AuthUser,
    task: tasks::Model,
    newly_assigned: Option<Uuid>,
) -> anyhow::Result<()> {
    let room = RoomId::task(task.id);
    let frame = ServerFrame::TaskUpdated {
        data: task_summary(&task),
    };
    state.hub.broadcast(&room, &frame).await;

    if let Some(assignee_id) = newly_assigned {
        if assignee_id != actor.user_id {
            notify_assignment(&state, &actor, &task, assignee_id).await?;
        }
    }
    Ok(())
}

async fn notify_assignment(
    state: &AppState,
    actor: &AuthUser,
    task: &tasks::Model,
    assignee_id: Uuid,
) -> anyhow::Result<()> {
    let mut data = task_summary(task);
    data["assigned_by"] = json!(actor.email);
    state
        .hub
        .broadcast(
            &RoomId::notifications(assignee_id),
            &NotificationFrame::new("task_assigned", data),
        )
        .await;

    state
        .jobs
        .enqueue(
            JobRequest::new(names::TASK_ASSIGNMENT_EMAIL)
                .arg(json!(task.id))
                .arg(json!(assignee_id))
                .with_retries(3, Duration::from_secs(60)),
        )
        .await?;
    Ok(())
}

async fn broadcast_feed_update(state: &AppState, entry: feed_items::Model) -> anyhow::Result<()> {
    let room = RoomId::org_feed(entry.organization_id);
    let data = serde_json::to_value(FeedEntrySummary::from(entry))?;
    let delivered = state
        .hub
        .broadcast(&room, &ServerFrame::FeedUpdate { data })
        .await;
    tracing::debug!(%room, delivered, "feed update broadcast");
    Ok(())
}

fn task_summary(task: &tasks::Model) -> serde_json::Value {
    json!({
        "id": task.id,
        "title": task.title,
        "status": task.status,
        "priority": task.priority,
        "project_id": task.project_id,
        "assignee_id": task.assignee_id,
        "due_date": task.due_date,
    })
}

fn comment_summary(comment: &comments::Model, author_email: &str) -> serde_json::Value {
    json!({
        "id": comment.id,
        "task_id": comment.task_id,
        "author_id": comment.author_id,
        "author_email": author_email,
        "body": comment.body,
        "created_at": comment.created_at,
    })
}
