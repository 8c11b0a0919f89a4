//! Task and comment writes. Each mutation follows the same shape: validate,
//! then one transaction holding the row write, its audit record and its feed
//! entry, then post-commit fan-out through [`crate::dispatch`].

use chrono::NaiveDate;
use huddle_core::UnknownValue;
use huddle_core::activity::ActionKind;
use huddle_core::mentions::extract_mention_emails;
use huddle_core::status::{TaskPriority, TaskStatus};
use huddle_db::entities::{comment_mentions, comments, memberships, projects, tasks, users};
use sea_orm::prelude::{DateTimeWithTimeZone, Uuid};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde_json::json;

use crate::audit;
use crate::auth::AuthUser;
use crate::dispatch;
use crate::feed::{self, NewFeedEntry, PublishError};
use crate::hooks::PostCommit;
use crate::resolve::EntityRefs;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("task not found")]
    TaskNotFound,
    #[error("project not found")]
    ProjectNotFound,
    #[error("assignee is not a member of the project's organization")]
    AssigneeNotMember,
    #[error("cannot move task from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("feed entry has no resolvable organization")]
    MissingOrganization,
    #[error(transparent)]
    CorruptRow(#[from] UnknownValue),
    #[error(transparent)]
    Db(#[from] DbErr),
}

impl From<PublishError> for MutationError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::MissingOrganization => Self::MissingOrganization,
            PublishError::Db(err) => Self::Db(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateTask {
    pub title: String,
    pub description: String,
    pub project_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
}

/// Partial update; `None` leaves a field alone. The doubled options on
/// `assignee_id` and `due_date` distinguish "leave it" from "clear it".
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<Option<Uuid>>,
    pub due_date: Option<Option<NaiveDate>>,
}

pub async fn create_task(
    state: &AppState,
    actor: &AuthUser,
    input: CreateTask,
) -> Result<tasks::Model, MutationError> {
    let db = state.db.as_ref();
    let project = projects::Entity::find_by_id(input.project_id)
        .one(db)
        .await?
        .ok_or(MutationError::ProjectNotFound)?;
    if let Some(assignee_id) = input.assignee_id {
        if !org_member(db, assignee_id, project.organization_id).await? {
            return Err(MutationError::AssigneeNotMember);
        }
    }

    let now: DateTimeWithTimeZone = chrono::Utc::now().into();
    let txn = db.begin().await?;
    let task = tasks::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(input.title),
        description: Set(input.description),
        project_id: Set(project.id),
        assignee_id: Set(input.assignee_id),
        reporter_id: Set(Some(actor.user_id)),
        status: Set(TaskStatus::Todo.as_str().to_string()),
        priority: Set(input.priority.as_str().to_string()),
        due_date: Set(input.due_date),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let line = format!("{} created task '{}'", actor.email, task.title);
    let refs = EntityRefs::task(task.id).with_project(project.id);
    audit::record(&txn, Some(actor.user_id), ActionKind::TaskCreated, &line, refs, json!({}))
        .await?;
    let entry = feed::publish(
        &txn,
        NewFeedEntry {
            actor_id: Some(actor.user_id),
            activity_type: ActionKind::TaskCreated.into(),
            title: task.title.clone(),
            description: line,
            refs,
            organization_id: Some(project.organization_id),
            metadata: json!({}),
        },
    )
    .await?;
    txn.commit().await?;

    let mut hooks = PostCommit::new();
    hooks.push(
        "task_created_fanout",
        dispatch::after_task_created(state.clone(), actor.clone(), task.clone(), entry),
    );
    hooks.run().await;

    Ok(task)
}

/// Moves a task along the TODO <-> IN_PROGRESS <-> DONE workflow. Setting
/// the status it already has succeeds without writing anything.
pub async fn update_task_status(
    state: &AppState,
    actor: &AuthUser,
    task_id: Uuid,
    next: TaskStatus,
) -> Result<tasks::Model, MutationError> {
    let db = state.db.as_ref();
    let task = tasks::Entity::find_by_id(task_id)
        .one(db)
        .await?
        .ok_or(MutationError::TaskNotFound)?;
    let old: TaskStatus = task.status.parse()?;

    if old == next {
        return Ok(task);
    }
    if !old.can_transition_to(next) {
        return Err(MutationError::InvalidTransition { from: old, to: next });
    }

    let txn = db.begin().await?;
    let mut am: tasks::ActiveModel = task.clone().into();
    am.status = Set(next.as_str().to_string());
    am.updated_at = Set(chrono::Utc::now().into());
    let updated = am.update(&txn).await?;

    let line = format!(
        "{} moved '{}' from {} to {}",
        actor.email, updated.title, old, next
    );
    let refs = EntityRefs::task(updated.id).with_project(updated.project_id);
    audit::record(
        &txn,
        Some(actor.user_id),
        ActionKind::StatusChanged,
        &line,
        refs,
        json!({"from": old.as_str(), "to": next.as_str()}),
    )
    .await?;
    let entry = feed::publish(
        &txn,
        NewFeedEntry {
            actor_id: Some(actor.user_id),
            activity_type: ActionKind::StatusChanged.into(),
            title: updated.title.clone(),
            description: line,
            refs,
            organization_id: None,
            metadata: json!({"from": old.as_str(), "to": next.as_str()}),
        },
    )
    .await?;
    txn.commit().await?;

    let mut hooks = PostCommit::new();
    hooks.push(
        "status_changed_fanout",
        dispatch::after_status_changed(state.clone(), actor.clone(), updated.clone(), old, entry),
    );
    hooks.run().await;

    Ok(updated)
}

/// Edits task fields in place. Field edits are not audited and produce no
/// feed entry; they only ripple to the task room, plus an assignment
/// notification when the assignee actually changes.
pub async fn update_task(
    state: &AppState,
    actor: &AuthUser,
    task_id: Uuid,
    input: UpdateTask,
) -> Result<tasks::Model, MutationError> {
    let db = state.db.as_ref();
    let task = tasks::Entity::find_by_id(task_id)
        .one(db)
        .await?
        .ok_or(MutationError::TaskNotFound)?;

    let newly_assigned = match input.assignee_id {
        Some(Some(id)) if task.assignee_id != Some(id) => Some(id),
        _ => None,
    };
    if let Some(assignee_id) = newly_assigned {
        let project = projects::Entity::find_by_id(task.project_id)
            .one(db)
            .await?
            .ok_or(MutationError::ProjectNotFound)?;
        if !org_member(db, assignee_id, project.organization_id).await? {
            return Err(MutationError::AssigneeNotMember);
        }
    }

    let mut am: tasks::ActiveModel = task.into();
    if let Some(title) = input.title {
        am.title = Set(title);
    }
    if let Some(description) = input.description {
        am.description = Set(description);
    }
    if let Some(priority) = input.priority {
        am.priority = Set(priority.as_str().to_string());
    }
    if let Some(assignee_id) = input.assignee_id {
        am.assignee_id = Set(assignee_id);
    }
    if let Some(due_date) = input.due_date {
        am.due_date = Set(due_date);
    }
    am.updated_at = Set(chrono::Utc::now().into());
    let updated = am.update(db).await?;

    let mut hooks = PostCommit::new();
    hooks.push(
        "task_updated_fanout",
        dispatch::after_task_updated(state.clone(), actor.clone(), updated.clone(), newly_assigned),
    );
    hooks.run().await;

    Ok(updated)
}

pub async fn add_comment(
    state: &AppState,
    actor: &AuthUser,
    task_id: Uuid,
    body: String,
) -> Result<comments::Model, MutationError> {
    let db = state.db.as_ref();
    let task = tasks::Entity::find_by_id(task_id)
        .one(db)
        .await?
        .ok_or(MutationError::TaskNotFound)?;
    let project = projects::Entity::find_by_id(task.project_id)
        .one(db)
        .await?
        .ok_or(MutationError::ProjectNotFound)?;

    // Mentions resolve to users who are members of the task's organization;
    // anything else in the text is ignored. Authors never mention themselves.
    let mut mentioned: Vec<Uuid> = Vec::new();
    let emails = extract_mention_emails(&body);
    if !emails.is_empty() {
        let candidates = users::Entity::find()
            .filter(users::Column::Email.is_in(emails))
            .all(db)
            .await?;
        for user in candidates {
            if user.id == actor.user_id {
                continue;
            }
            if org_member(db, user.id, project.organization_id).await? {
                mentioned.push(user.id);
            }
        }
    }

    let txn = db.begin().await?;
    let comment = comments::ActiveModel {
        id: Set(Uuid::new_v4()),
        task_id: Set(task.id),
        author_id: Set(actor.user_id),
        body: Set(body),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(&txn)
    .await?;

    for user_id in &mentioned {
        comment_mentions::ActiveModel {
            id: Set(Uuid::new_v4()),
            comment_id: Set(comment.id),
            user_id: Set(*user_id),
        }
        .insert(&txn)
        .await?;
    }

    let line = format!("{} commented on '{}'", actor.email, task.title);
    let refs = EntityRefs::task(task.id)
        .with_project(project.id)
        .with_comment(comment.id);
    audit::record(
        &txn,
        Some(actor.user_id),
        ActionKind::CommentAdded,
        &line,
        refs,
        json!({"mention_count": mentioned.len()}),
    )
    .await?;
    let entry = feed::publish(
        &txn,
        NewFeedEntry {
            actor_id: Some(actor.user_id),
            activity_type: ActionKind::CommentAdded.into(),
            title: task.title.clone(),
            description: line,
            refs,
            organization_id: Some(project.organization_id),
            metadata: json!({}),
        },
    )
    .await?;
    txn.commit().await?;

    let mut hooks = PostCommit::new();
    hooks.push(
        "comment_added_fanout",
        dispatch::after_comment_added(
            state.clone(),
            actor.clone(),
            task,
            comment.clone(),
            mentioned,
            entry,
        ),
    );
    hooks.run().await;

    Ok(comment)
}

async fn org_member<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    organization_id: Uuid,
) -> Result<bool, DbErr> {
    Ok(memberships::Entity::find()
        .filter(memberships::Column::UserId.eq(user_id))
        .filter(memberships::Column::OrganizationId.eq(organization_id))
        .one(conn)
        .await?
        .is_some())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::ws::Message;
    use huddle_core::rooms::RoomId;
    use huddle_db::entities::{activity_logs, feed_items};
    use tokio::sync::mpsc;

    use super::*;
    use crate::jobs::names;
    use crate::testkit;

    async fn next_json(rx: &mut mpsc::Receiver<Message>) -> serde_json::Value {
        match rx.recv().await.expect("expected a frame") {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    fn new_task(project_id: Uuid) -> CreateTask {
        CreateTask {
            title: "ship the widget".into(),
            description: "all of it".into(),
            project_id,
            assignee_id: None,
            priority: TaskPriority::High,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn create_task_writes_one_audit_row_and_one_feed_entry() {
        let (state, _jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;

        let task = create_task(&state, &testkit::auth(&owner), new_task(project.id))
            .await
            .unwrap();
        assert_eq!(task.status, "TODO");
        assert_eq!(task.priority, "HIGH");
        assert_eq!(task.reporter_id, Some(owner.id));

        let logs = activity_logs::Entity::find().all(&*state.db).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "TASK_CREATED");
        assert_eq!(logs[0].actor_id, Some(owner.id));
        assert_eq!(logs[0].task_id, Some(task.id));
        assert!(logs[0].description.contains("owner@example.com"));

        let feed = feed_items::Entity::find().all(&*state.db).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].organization_id, org.id);
        assert_eq!(feed[0].activity_type, "TASK_CREATED");
        assert_eq!(feed[0].task_id, Some(task.id));
    }

    #[tokio::test]
    async fn create_task_rejects_an_assignee_outside_the_organization() {
        let (state, jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;
        let outsider = testkit::seed_user(&state.db, "outsider@example.com").await;

        let mut input = new_task(project.id);
        input.assignee_id = Some(outsider.id);
        let err = create_task(&state, &testkit::auth(&owner), input)
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::AssigneeNotMember));

        assert!(tasks::Entity::find().all(&*state.db).await.unwrap().is_empty());
        assert!(activity_logs::Entity::find().all(&*state.db).await.unwrap().is_empty());
        assert!(jobs.jobs().is_empty());
    }

    #[tokio::test]
    async fn assignment_notifies_and_emails_the_assignee() {
        let (state, jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let bob = testkit::seed_user(&state.db, "bob@example.com").await;
        testkit::seed_member(&state.db, &bob, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;

        let (tx, mut rx) = mpsc::channel(8);
        state
            .hub
            .join(RoomId::notifications(bob.id), Uuid::new_v4(), tx)
            .await;

        let mut input = new_task(project.id);
        input.assignee_id = Some(bob.id);
        let task = create_task(&state, &testkit::auth(&owner), input)
            .await
            .unwrap();

        let frame = next_json(&mut rx).await;
        assert_eq!(frame["notification_type"], "task_assigned");
        assert_eq!(frame["data"]["id"], json!(task.id));
        assert_eq!(frame["data"]["assigned_by"], "owner@example.com");

        let queued = jobs.jobs();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].name, names::TASK_ASSIGNMENT_EMAIL);
        assert_eq!(
            queued[0].args,
            vec![json!(task.id.to_string()), json!(bob.id.to_string())]
        );
        assert_eq!(queued[0].max_retries, 3);
        assert_eq!(queued[0].retry_delay, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn self_assignment_stays_silent() {
        let (state, jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;

        let (tx, mut rx) = mpsc::channel(8);
        state
            .hub
            .join(RoomId::notifications(owner.id), Uuid::new_v4(), tx)
            .await;

        let mut input = new_task(project.id);
        input.assignee_id = Some(owner.id);
        create_task(&state, &testkit::auth(&owner), input)
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert!(jobs.jobs().is_empty());
    }

    #[tokio::test]
    async fn status_change_fans_out_to_every_surface() {
        let (state, jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let bob = testkit::seed_user(&state.db, "bob@example.com").await;
        testkit::seed_member(&state.db, &bob, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;

        let mut input = new_task(project.id);
        input.assignee_id = Some(bob.id);
        let task = create_task(&state, &testkit::auth(&owner), input)
            .await
            .unwrap();

        let (task_tx, mut task_rx) = mpsc::channel(8);
        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        let (feed_tx, mut feed_rx) = mpsc::channel(8);
        state
            .hub
            .join(RoomId::task(task.id), Uuid::new_v4(), task_tx)
            .await;
        state
            .hub
            .join(RoomId::notifications(bob.id), Uuid::new_v4(), bob_tx)
            .await;
        state
            .hub
            .join(RoomId::org_feed(org.id), Uuid::new_v4(), feed_tx)
            .await;

        let updated =
            update_task_status(&state, &testkit::auth(&owner), task.id, TaskStatus::InProgress)
                .await
                .unwrap();
        assert_eq!(updated.status, "IN_PROGRESS");

        let room_frame = next_json(&mut task_rx).await;
        assert_eq!(room_frame["type"], "status_changed");
        assert_eq!(room_frame["data"]["task_id"], json!(task.id));
        assert_eq!(room_frame["data"]["old_status"], "TODO");
        assert_eq!(room_frame["data"]["status"], "IN_PROGRESS");
        assert_eq!(room_frame["data"]["changed_by"], "owner@example.com");

        let feed_frame = next_json(&mut feed_rx).await;
        assert_eq!(feed_frame["type"], "feed_update");
        assert_eq!(feed_frame["data"]["activity_type"], "STATUS_CHANGED");

        let bob_frame = next_json(&mut bob_rx).await;
        assert_eq!(bob_frame["notification_type"], "task_status_changed");
        assert_eq!(bob_frame["data"]["old_status"], "TODO");

        let log = activity_logs::Entity::find()
            .filter(activity_logs::Column::Action.eq("STATUS_CHANGED"))
            .one(&*state.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.metadata["from"], "TODO");
        assert_eq!(log.metadata["to"], "IN_PROGRESS");

        // The status change itself queues no email.
        assert_eq!(jobs.jobs().len(), 1);
    }

    #[tokio::test]
    async fn setting_the_current_status_writes_nothing() {
        let (state, _jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;
        let task = create_task(&state, &testkit::auth(&owner), new_task(project.id))
            .await
            .unwrap();

        let unchanged = update_task_status(&state, &testkit::auth(&owner), task.id, TaskStatus::Todo)
            .await
            .unwrap();
        assert_eq!(unchanged.id, task.id);
        assert_eq!(unchanged.status, "TODO");

        assert_eq!(
            activity_logs::Entity::find().all(&*state.db).await.unwrap().len(),
            1
        );
        assert_eq!(feed_items::Entity::find().all(&*state.db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skipping_a_workflow_state_is_rejected() {
        let (state, _jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;
        let task = create_task(&state, &testkit::auth(&owner), new_task(project.id))
            .await
            .unwrap();

        let err = update_task_status(&state, &testkit::auth(&owner), task.id, TaskStatus::Done)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MutationError::InvalidTransition {
                from: TaskStatus::Todo,
                to: TaskStatus::Done
            }
        ));

        let missing =
            update_task_status(&state, &testkit::auth(&owner), Uuid::new_v4(), TaskStatus::Todo)
                .await
                .unwrap_err();
        assert!(matches!(missing, MutationError::TaskNotFound));
    }

    #[tokio::test]
    async fn comment_mentions_fan_out_to_member_mentions_only() {
        let (state, jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let alice = testkit::seed_user(&state.db, "alice@example.com").await;
        let bob = testkit::seed_user(&state.db, "bob@example.com").await;
        let carol = testkit::seed_user(&state.db, "carol@example.com").await;
        testkit::seed_member(&state.db, &alice, &org).await;
        testkit::seed_member(&state.db, &bob, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;
        let task = create_task(&state, &testkit::auth(&owner), new_task(project.id))
            .await
            .unwrap();

        let (task_tx, mut task_rx) = mpsc::channel(8);
        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        let (carol_tx, mut carol_rx) = mpsc::channel(8);
        let (feed_tx, mut feed_rx) = mpsc::channel(8);
        state
            .hub
            .join(RoomId::task(task.id), Uuid::new_v4(), task_tx)
            .await;
        state
            .hub
            .join(RoomId::notifications(bob.id), Uuid::new_v4(), bob_tx)
            .await;
        state
            .hub
            .join(RoomId::notifications(carol.id), Uuid::new_v4(), carol_tx)
            .await;
        state
            .hub
            .join(RoomId::org_feed(org.id), Uuid::new_v4(), feed_tx)
            .await;

        let body = "Looping in @bob@example.com and @carol@example.com".to_string();
        let comment = add_comment(&state, &testkit::auth(&alice), task.id, body.clone())
            .await
            .unwrap();

        // Only the org member lands in the mention table.
        let rows = comment_mentions::Entity::find().all(&*state.db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].comment_id, comment.id);
        assert_eq!(rows[0].user_id, bob.id);

        let room_frame = next_json(&mut task_rx).await;
        assert_eq!(room_frame["type"], "comment_added");
        assert_eq!(room_frame["data"]["author_email"], "alice@example.com");
        assert_eq!(room_frame["data"]["body"], body);

        let bob_frame = next_json(&mut bob_rx).await;
        assert_eq!(bob_frame["notification_type"], "mentioned_in_comment");
        assert_eq!(bob_frame["data"]["task_title"], task.title);
        assert_eq!(bob_frame["data"]["author_email"], "alice@example.com");
        assert!(carol_rx.try_recv().is_err());

        let feed_frame = next_json(&mut feed_rx).await;
        assert_eq!(feed_frame["type"], "feed_update");
        assert_eq!(feed_frame["data"]["activity_type"], "COMMENT_ADDED");

        // One batched job carries the whole mention list.
        let mention_jobs: Vec<_> = jobs
            .jobs()
            .into_iter()
            .filter(|j| j.name == names::COMMENT_NOTIFICATION)
            .collect();
        assert_eq!(mention_jobs.len(), 1);
        assert_eq!(mention_jobs[0].args[0], json!(comment.id.to_string()));
        assert_eq!(mention_jobs[0].args[1], json!([bob.id.to_string()]));
        assert_eq!(mention_jobs[0].max_retries, 3);

        let log = activity_logs::Entity::find()
            .filter(activity_logs::Column::Action.eq("COMMENT_ADDED"))
            .one(&*state.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.metadata["mention_count"], 1);
        assert_eq!(log.comment_id, Some(comment.id));
    }

    #[tokio::test]
    async fn authors_never_mention_themselves() {
        let (state, jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let alice = testkit::seed_user(&state.db, "alice@example.com").await;
        testkit::seed_member(&state.db, &alice, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;
        let task = create_task(&state, &testkit::auth(&owner), new_task(project.id))
            .await
            .unwrap();

        add_comment(
            &state,
            &testkit::auth(&alice),
            task.id,
            "note to self @alice@example.com".to_string(),
        )
        .await
        .unwrap();

        assert!(comment_mentions::Entity::find().all(&*state.db).await.unwrap().is_empty());
        assert!(
            jobs.jobs()
                .iter()
                .all(|j| j.name != names::COMMENT_NOTIFICATION)
        );
    }

    #[tokio::test]
    async fn field_edits_touch_the_room_but_not_the_feed() {
        let (state, jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let bob = testkit::seed_user(&state.db, "bob@example.com").await;
        testkit::seed_member(&state.db, &bob, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;
        let mut input = new_task(project.id);
        input.due_date = Some(chrono::Utc::now().date_naive());
        let task = create_task(&state, &testkit::auth(&owner), input)
            .await
            .unwrap();

        let (task_tx, mut task_rx) = mpsc::channel(8);
        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        state
            .hub
            .join(RoomId::task(task.id), Uuid::new_v4(), task_tx)
            .await;
        state
            .hub
            .join(RoomId::notifications(bob.id), Uuid::new_v4(), bob_tx)
            .await;

        let updated = update_task(
            &state,
            &testkit::auth(&owner),
            task.id,
            UpdateTask {
                title: Some("sharper title".into()),
                assignee_id: Some(Some(bob.id)),
                due_date: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "sharper title");
        assert_eq!(updated.assignee_id, Some(bob.id));
        assert_eq!(updated.due_date, None);

        let room_frame = next_json(&mut task_rx).await;
        assert_eq!(room_frame["type"], "task_updated");
        assert_eq!(room_frame["data"]["title"], "sharper title");

        let bob_frame = next_json(&mut bob_rx).await;
        assert_eq!(bob_frame["notification_type"], "task_assigned");
        assert!(
            jobs.jobs()
                .iter()
                .any(|j| j.name == names::TASK_ASSIGNMENT_EMAIL)
        );

        // No audit row and no feed entry beyond the ones from creation.
        assert_eq!(
            activity_logs::Entity::find().all(&*state.db).await.unwrap().len(),
            1
        );
        assert_eq!(feed_items::Entity::find().all(&*state.db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reassignment_requires_membership() {
        let (state, _jobs) = testkit::test_state().await;
        let owner = testkit::seed_user(&state.db, "owner@example.com").await;
        let org = testkit::seed_org(&state.db, &owner, "acme").await;
        testkit::seed_member(&state.db, &owner, &org).await;
        let project = testkit::seed_project(&state.db, &org).await;
        let outsider = testkit::seed_user(&state.db, "outsider@example.com").await;
        let task = create_task(&state, &testkit::auth(&owner), new_task(project.id))
            .await
            .unwrap();

        let err = update_task(
            &state,
            &testkit::auth(&owner),
            task.id,
            UpdateTask {
                assignee_id: Some(Some(outsider.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MutationError::AssigneeNotMember));

        let reloaded = tasks::Entity::find_by_id(task.id)
            .one(&*state.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.assignee_id, None);
    }
}
