//! Shared fixtures for the test modules: an in-memory database with the
//! full schema applied, seed helpers, and recording fakes for the queue,
//! the mailer and the cache.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use huddle_db::entities::{comments, memberships, organizations, projects, tasks, users};
use sea_orm::prelude::Uuid;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;

use crate::auth::AuthUser;
use crate::cache::{Cache, CacheError, MemoryCache};
use crate::hub::Hub;
use crate::jobs::{EnqueueError, JobQueue, JobRequest};
use crate::mailer::{Mailer, OutboundEmail};
use crate::state::AppState;

static SEQ: AtomicU32 = AtomicU32::new(0);

fn next_seq() -> u32 {
    SEQ.fetch_add(1, Ordering::Relaxed)
}

pub(crate) async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    huddle_migration::Migrator::up(&db, None)
        .await
        .expect("migrations apply");
    db
}

pub(crate) async fn test_state() -> (AppState, Arc<RecordingQueue>) {
    let db = test_db().await;
    let queue = Arc::new(RecordingQueue::default());
    let state = AppState {
        db: Arc::new(db),
        hub: Hub::default(),
        cache: Arc::new(MemoryCache::new()),
        jobs: queue.clone(),
    };
    (state, queue)
}

pub(crate) fn auth(user: &users::Model) -> AuthUser {
    AuthUser {
        user_id: user.id,
        email: user.email.clone(),
    }
}

pub(crate) async fn seed_user(db: &DatabaseConnection, email: &str) -> users::Model {
    let full_name = email.split('@').next().unwrap_or("user").to_string();
    users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        full_name: Set(full_name),
        is_active: Set(true),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("seed user")
}

pub(crate) async fn seed_org(
    db: &DatabaseConnection,
    owner: &users::Model,
    name: &str,
) -> organizations::Model {
    let now = chrono::Utc::now().into();
    organizations::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(String::new()),
        owner_id: Set(owner.id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed organization")
}

pub(crate) async fn seed_member(
    db: &DatabaseConnection,
    user: &users::Model,
    org: &organizations::Model,
) -> memberships::Model {
    memberships::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        organization_id: Set(org.id),
        team_id: Set(None),
        role: Set("MEMBER".to_string()),
        joined_at: Set(chrono::Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("seed membership")
}

pub(crate) async fn seed_project(
    db: &DatabaseConnection,
    org: &organizations::Model,
) -> projects::Model {
    let now = chrono::Utc::now().into();
    projects::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("project-{}", next_seq())),
        description: Set(String::new()),
        organization_id: Set(org.id),
        owner_id: Set(None),
        status: Set("ACTIVE".to_string()),
        start_date: Set(None),
        end_date: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed project")
}

pub(crate) async fn seed_task(
    db: &DatabaseConnection,
    project: &projects::Model,
    assignee: Option<&users::Model>,
) -> tasks::Model {
    let now = chrono::Utc::now().into();
    tasks::ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(format!("task-{}", next_seq())),
        description: Set(String::new()),
        project_id: Set(project.id),
        assignee_id: Set(assignee.map(|u| u.id)),
        reporter_id: Set(None),
        status: Set("TODO".to_string()),
        priority: Set("MEDIUM".to_string()),
        due_date: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed task")
}

pub(crate) async fn seed_comment(
    db: &DatabaseConnection,
    task: &tasks::Model,
    author: &users::Model,
    body: &str,
) -> comments::Model {
    comments::ActiveModel {
        id: Set(Uuid::new_v4()),
        task_id: Set(task.id),
        author_id: Set(author.id),
        body: Set(body.to_string()),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(db)
    .await
    .expect("seed comment")
}

/// Captures enqueued jobs instead of running them.
#[derive(Default)]
pub(crate) struct RecordingQueue {
    jobs: Mutex<Vec<JobRequest>>,
}

impl RecordingQueue {
    pub(crate) fn jobs(&self) -> Vec<JobRequest> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: JobRequest) -> Result<(), EnqueueError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Captures outbound email instead of sending it.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl RecordingMailer {
    pub(crate) fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Cache whose deletes fail for keys containing a chosen substring, for
/// exercising the isolation of per-key invalidation failures.
pub(crate) struct FlakyCache {
    inner: MemoryCache,
    failing_substring: &'static str,
    delete_failures: AtomicU32,
}

impl FlakyCache {
    pub(crate) fn failing_on(substring: &'static str) -> Self {
        Self {
            inner: MemoryCache::new(),
            failing_substring: substring,
            delete_failures: AtomicU32::new(0),
        }
    }

    pub(crate) fn delete_failures(&self) -> u32 {
        self.delete_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Cache for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if key.contains(self.failing_substring) {
            self.delete_failures.fetch_add(1, Ordering::SeqCst);
            return Err(CacheError::Backend("simulated outage".to_string()));
        }
        self.inner.delete(key).await
    }
}
