//! Handlers for the email jobs. Bodies are plain text assembled inline;
//! anything fancier belongs behind the [`Mailer`] seam.

use std::sync::Arc;

use anyhow::Context;
use huddle_core::status::TaskStatus;
use huddle_db::entities::{activity_logs, comments, tasks, users};
use sea_orm::prelude::{DateTimeWithTimeZone, Uuid};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

use crate::jobs::{JobRunner, names};
use crate::mailer::{Mailer, OutboundEmail};

/// Wires every email job into the runner. The handlers share one database
/// handle and one mailer for the life of the process.
pub fn register_handlers(
    runner: &mut JobRunner,
    db: Arc<DatabaseConnection>,
    mailer: Arc<dyn Mailer>,
) {
    let (d, m) = (db.clone(), mailer.clone());
    runner.register(names::TASK_ASSIGNMENT_EMAIL, move |args| {
        let (d, m) = (d.clone(), m.clone());
        async move { send_task_assignment_email(&d, m.as_ref(), &args).await }
    });

    let (d, m) = (db.clone(), mailer.clone());
    runner.register(names::COMMENT_NOTIFICATION, move |args| {
        let (d, m) = (d.clone(), m.clone());
        async move { send_comment_notification(&d, m.as_ref(), &args).await }
    });

    let (d, m) = (db.clone(), mailer.clone());
    runner.register(names::WEEKLY_SUMMARY, move |args| {
        let (d, m) = (d.clone(), m.clone());
        async move { send_weekly_summary(&d, m.as_ref(), &args).await }
    });

    let (d, m) = (db, mailer);
    runner.register(names::DUE_DATE_REMINDERS, move |args| {
        let (d, m) = (d.clone(), m.clone());
        async move { send_due_date_reminders(&d, m.as_ref(), &args).await }
    });
}

/// Args: `[task_id, assignee_id]`. A missing row is an error, not a skip;
/// the job retries and may catch a row that lands later.
pub async fn send_task_assignment_email(
    db: &DatabaseConnection,
    mailer: &dyn Mailer,
    args: &[serde_json::Value],
) -> anyhow::Result<()> {
    let task_id = uuid_arg(args, 0)?;
    let assignee_id = uuid_arg(args, 1)?;

    let task = tasks::Entity::find_by_id(task_id)
        .one(db)
        .await?
        .with_context(|| format!("task {task_id} not found"))?;
    let assignee = users::Entity::find_by_id(assignee_id)
        .one(db)
        .await?
        .with_context(|| format!("user {assignee_id} not found"))?;

    mailer
        .send(OutboundEmail {
            to: assignee.email,
            subject: format!("New Task Assigned: {}", task.title),
            body: format!(
                "Hi {},\n\nYou have been assigned a new task: {}.\n\n{}\n",
                assignee.full_name, task.title, task.description
            ),
        })
        .await
}

/// Args: `[comment_id, [user_id, ...]]`. One job covers every user the
/// comment mentioned; a failed send retries the whole batch.
pub async fn send_comment_notification(
    db: &DatabaseConnection,
    mailer: &dyn Mailer,
    args: &[serde_json::Value],
) -> anyhow::Result<()> {
    let comment_id = uuid_arg(args, 0)?;
    let mentioned = uuid_list_arg(args, 1)?;

    let comment = comments::Entity::find_by_id(comment_id)
        .one(db)
        .await?
        .with_context(|| format!("comment {comment_id} not found"))?;
    let task = tasks::Entity::find_by_id(comment.task_id)
        .one(db)
        .await?
        .with_context(|| format!("task {} not found", comment.task_id))?;
    let author = users::Entity::find_by_id(comment.author_id)
        .one(db)
        .await?
        .with_context(|| format!("user {} not found", comment.author_id))?;

    for user_id in mentioned {
        let Some(user) = users::Entity::find_by_id(user_id).one(db).await? else {
            tracing::warn!(%user_id, "mentioned user no longer exists, skipping");
            continue;
        };
        mailer
            .send(OutboundEmail {
                to: user.email,
                subject: "You were mentioned in a comment".to_string(),
                body: format!(
                    "Hi {},\n\n{} mentioned you on '{}':\n\n{}\n",
                    user.full_name, author.email, task.title, comment.body
                ),
            })
            .await?;
    }
    Ok(())
}

/// Digest of the past week, one email per active user.
pub async fn send_weekly_summary(
    db: &DatabaseConnection,
    mailer: &dyn Mailer,
    _args: &[serde_json::Value],
) -> anyhow::Result<()> {
    let week_ago: DateTimeWithTimeZone = (chrono::Utc::now() - chrono::Duration::days(7)).into();
    let recipients = users::Entity::find()
        .filter(users::Column::IsActive.eq(true))
        .all(db)
        .await?;

    for user in recipients {
        let created = tasks::Entity::find()
            .filter(tasks::Column::ReporterId.eq(user.id))
            .filter(tasks::Column::CreatedAt.gte(week_ago))
            .count(db)
            .await?;
        let completed = tasks::Entity::find()
            .filter(tasks::Column::AssigneeId.eq(user.id))
            .filter(tasks::Column::Status.eq(TaskStatus::Done.as_str()))
            .filter(tasks::Column::UpdatedAt.gte(week_ago))
            .count(db)
            .await?;
        let pending = tasks::Entity::find()
            .filter(tasks::Column::AssigneeId.eq(user.id))
            .filter(tasks::Column::Status.is_in([
                TaskStatus::Todo.as_str(),
                TaskStatus::InProgress.as_str(),
            ]))
            .count(db)
            .await?;
        let actions = activity_logs::Entity::find()
            .filter(activity_logs::Column::ActorId.eq(user.id))
            .filter(activity_logs::Column::CreatedAt.gte(week_ago))
            .count(db)
            .await?;

        mailer
            .send(OutboundEmail {
                to: user.email,
                subject: "Your Weekly Summary".to_string(),
                body: format!(
                    "Hi {},\n\nHere is your activity for the past week:\n\n\
                     Tasks created: {created}\nTasks completed: {completed}\n\
                     Tasks pending: {pending}\nActions recorded: {actions}\n",
                    user.full_name
                ),
            })
            .await?;
    }
    Ok(())
}

/// Reminds assignees about open tasks due tomorrow.
pub async fn send_due_date_reminders(
    db: &DatabaseConnection,
    mailer: &dyn Mailer,
    _args: &[serde_json::Value],
) -> anyhow::Result<()> {
    let tomorrow = (chrono::Utc::now() + chrono::Duration::days(1)).date_naive();
    let due = tasks::Entity::find()
        .filter(tasks::Column::DueDate.eq(tomorrow))
        .filter(tasks::Column::Status.is_in([
            TaskStatus::Todo.as_str(),
            TaskStatus::InProgress.as_str(),
        ]))
        .filter(tasks::Column::AssigneeId.is_not_null())
        .all(db)
        .await?;

    for task in due {
        let Some(assignee_id) = task.assignee_id else {
            continue;
        };
        let Some(assignee) = users::Entity::find_by_id(assignee_id).one(db).await? else {
            continue;
        };
        mailer
            .send(OutboundEmail {
                to: assignee.email,
                subject: format!("Task Due Tomorrow: {}", task.title),
                body: format!(
                    "Hi {},\n\nYour task '{}' is due on {}.\n",
                    assignee.full_name, task.title, tomorrow
                ),
            })
            .await?;
    }
    Ok(())
}

fn uuid_arg(args: &[serde_json::Value], index: usize) -> anyhow::Result<Uuid> {
    let raw = args
        .get(index)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("argument {index} is not a string"))?;
    Ok(Uuid::parse_str(raw)?)
}

fn uuid_list_arg(args: &[serde_json::Value], index: usize) -> anyhow::Result<Vec<Uuid>> {
    let raw = args
        .get(index)
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("argument {index} is not a list"))?;
    raw.iter()
        .map(|v| {
            let s = v
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("argument {index} holds a non-string id"))?;
            Ok(Uuid::parse_str(s)?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use sea_orm::{ActiveModelTrait, Set};
    use serde_json::json;

    use super::*;
    use crate::testkit::{self, RecordingMailer};

    #[tokio::test]
    async fn assignment_email_names_the_task() {
        let db = testkit::test_db().await;
        let owner = testkit::seed_user(&db, "owner@example.com").await;
        let org = testkit::seed_org(&db, &owner, "acme").await;
        let project = testkit::seed_project(&db, &org).await;
        let assignee = testkit::seed_user(&db, "dev@example.com").await;
        let task = testkit::seed_task(&db, &project, Some(&assignee)).await;

        let mailer = RecordingMailer::default();
        send_task_assignment_email(
            &db,
            &mailer,
            &[json!(task.id.to_string()), json!(assignee.id.to_string())],
        )
        .await
        .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "dev@example.com");
        assert!(sent[0].subject.contains(&task.title));
    }

    #[tokio::test]
    async fn assignment_email_for_a_missing_task_fails() {
        let db = testkit::test_db().await;
        let mailer = RecordingMailer::default();
        let err = send_task_assignment_email(
            &db,
            &mailer,
            &[
                json!(Uuid::new_v4().to_string()),
                json!(Uuid::new_v4().to_string()),
            ],
        )
        .await;
        assert!(err.is_err());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn mention_notification_reaches_every_listed_user() {
        let db = testkit::test_db().await;
        let owner = testkit::seed_user(&db, "owner@example.com").await;
        let org = testkit::seed_org(&db, &owner, "acme").await;
        let project = testkit::seed_project(&db, &org).await;
        let task = testkit::seed_task(&db, &project, None).await;
        let author = testkit::seed_user(&db, "author@example.com").await;
        let alice = testkit::seed_user(&db, "alice@example.com").await;
        let bob = testkit::seed_user(&db, "bob@example.com").await;
        let comment = testkit::seed_comment(&db, &task, &author, "ping @alice @bob").await;

        let mailer = RecordingMailer::default();
        send_comment_notification(
            &db,
            &mailer,
            &[
                json!(comment.id.to_string()),
                json!([alice.id.to_string(), bob.id.to_string()]),
            ],
        )
        .await
        .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        let recipients: Vec<&str> = sent.iter().map(|e| e.to.as_str()).collect();
        assert!(recipients.contains(&"alice@example.com"));
        assert!(recipients.contains(&"bob@example.com"));
        assert!(sent[0].body.contains("author@example.com"));
        assert!(sent[0].body.contains(&task.title));
    }

    #[tokio::test]
    async fn weekly_summary_skips_inactive_users_and_counts_activity() {
        let db = testkit::test_db().await;
        let owner = testkit::seed_user(&db, "owner@example.com").await;
        let org = testkit::seed_org(&db, &owner, "acme").await;
        let project = testkit::seed_project(&db, &org).await;

        // Owner reported one task this week; a deactivated user gets nothing.
        let task = testkit::seed_task(&db, &project, None).await;
        let mut reported: tasks::ActiveModel = task.into();
        reported.reporter_id = Set(Some(owner.id));
        reported.update(&db).await.unwrap();

        let ghost = testkit::seed_user(&db, "ghost@example.com").await;
        let mut inactive: users::ActiveModel = ghost.into();
        inactive.is_active = Set(false);
        inactive.update(&db).await.unwrap();

        let mailer = RecordingMailer::default();
        send_weekly_summary(&db, &mailer, &[]).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
        assert_eq!(sent[0].subject, "Your Weekly Summary");
        assert!(sent[0].body.contains("Tasks created: 1"));
        assert!(sent[0].body.contains("Tasks completed: 0"));
    }

    #[tokio::test]
    async fn reminders_cover_open_tasks_due_tomorrow_only() {
        let db = testkit::test_db().await;
        let owner = testkit::seed_user(&db, "owner@example.com").await;
        let org = testkit::seed_org(&db, &owner, "acme").await;
        let project = testkit::seed_project(&db, &org).await;
        let dev = testkit::seed_user(&db, "dev@example.com").await;
        let tomorrow = (chrono::Utc::now() + chrono::Duration::days(1)).date_naive();

        let due = testkit::seed_task(&db, &project, Some(&dev)).await;
        let due_title = due.title.clone();
        let mut am: tasks::ActiveModel = due.into();
        am.due_date = Set(Some(tomorrow));
        am.update(&db).await.unwrap();

        // Due tomorrow but already finished.
        let done = testkit::seed_task(&db, &project, Some(&dev)).await;
        let mut am: tasks::ActiveModel = done.into();
        am.due_date = Set(Some(tomorrow));
        am.status = Set(TaskStatus::Done.as_str().to_string());
        am.update(&db).await.unwrap();

        // Due further out.
        let later = testkit::seed_task(&db, &project, Some(&dev)).await;
        let mut am: tasks::ActiveModel = later.into();
        am.due_date = Set(Some(tomorrow + chrono::Duration::days(3)));
        am.update(&db).await.unwrap();

        // Due tomorrow with nobody assigned.
        let unowned = testkit::seed_task(&db, &project, None).await;
        let mut am: tasks::ActiveModel = unowned.into();
        am.due_date = Set(Some(tomorrow));
        am.update(&db).await.unwrap();

        let mailer = RecordingMailer::default();
        send_due_date_reminders(&db, &mailer, &[]).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "dev@example.com");
        assert!(sent[0].subject.contains(&due_title));
    }
}
