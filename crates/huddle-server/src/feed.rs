use std::time::Duration;

use huddle_core::activity::ActivityType;
use huddle_db::entities::{feed_items, memberships, projects, users};
use sea_orm::prelude::{DateTimeWithTimeZone, Uuid};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, keys};
use crate::resolve::{self, EntityRefs};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Nothing in the entry (explicit argument, task, or project) resolved
    /// to an organization. Feed entries are always organization-scoped, so
    /// this aborts the publish.
    #[error("feed entry has no resolvable organization")]
    MissingOrganization,
    #[error(transparent)]
    Db(#[from] DbErr),
}

#[derive(Debug, thiserror::Error)]
pub enum FeedReadError {
    #[error("not a member of this organization")]
    NotMember,
    #[error("project not found")]
    ProjectNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// Input for [`publish`].
#[derive(Debug, Clone)]
pub struct NewFeedEntry {
    pub actor_id: Option<Uuid>,
    pub activity_type: ActivityType,
    pub title: String,
    pub description: String,
    pub refs: EntityRefs,
    /// Explicit scope; when `None` the organization is resolved from the
    /// referenced task or project.
    pub organization_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

/// Denormalized feed row as served to clients and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntrySummary {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub activity_type: String,
    pub title: String,
    pub description: String,
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub organization_id: Uuid,
    pub metadata: serde_json::Value,
    pub created_at: DateTimeWithTimeZone,
}

impl From<feed_items::Model> for FeedEntrySummary {
    fn from(row: feed_items::Model) -> Self {
        Self {
            id: row.id,
            actor_id: row.actor_id,
            activity_type: row.activity_type,
            title: row.title,
            description: row.description,
            task_id: row.task_id,
            project_id: row.project_id,
            comment_id: row.comment_id,
            organization_id: row.organization_id,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub page: u64,
    pub items: Vec<FeedEntrySummary>,
}

/// Inserts one organization-scoped feed row.
///
/// Runs on the caller's connection so it shares the mutation's transaction;
/// cache invalidation happens separately after commit, see
/// [`invalidate_after`].
pub async fn publish<C: ConnectionTrait>(
    conn: &C,
    entry: NewFeedEntry,
) -> Result<feed_items::Model, PublishError> {
    let organization_id = resolve::organization_for(conn, entry.organization_id, &entry.refs)
        .await?
        .ok_or(PublishError::MissingOrganization)?;

    let row = feed_items::ActiveModel {
        id: Set(Uuid::new_v4()),
        actor_id: Set(entry.actor_id),
        activity_type: Set(entry.activity_type.as_str().to_string()),
        title: Set(entry.title),
        description: Set(entry.description),
        task_id: Set(entry.refs.task_id),
        project_id: Set(entry.refs.project_id),
        comment_id: Set(entry.refs.comment_id),
        organization_id: Set(organization_id),
        metadata: Set(entry.metadata),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(conn)
    .await?;

    Ok(row)
}

/// Drops every cache key a new feed row could have gone stale behind: the
/// actor's aggregate views, and for each member of the target organization
/// the listing, org-feed and (when present) project-feed keys.
///
/// Each delete is attempted independently; one failing key is logged and
/// never stops the rest. This path runs after the row is durable and must
/// not fail the mutation that triggered it.
pub async fn invalidate_after(
    db: &DatabaseConnection,
    cache: &dyn Cache,
    entry: &feed_items::Model,
) {
    let mut stale: Vec<String> = Vec::new();

    if let Some(actor_id) = entry.actor_id {
        stale.push(keys::visible_orgs(actor_id));
        stale.push(keys::my_feed(actor_id));
    }

    match member_ids(db, entry.organization_id).await {
        Ok(members) => {
            for user_id in members {
                stale.push(keys::visible_orgs(user_id));
                stale.push(keys::feed_list_page1(user_id));
                stale.push(keys::org_feed(entry.organization_id, user_id));
                if let Some(project_id) = entry.project_id {
                    stale.push(keys::project_feed(project_id, user_id));
                }
            }
        }
        Err(err) => {
            tracing::warn!(%err, organization_id = %entry.organization_id,
                "could not list members for cache invalidation");
        }
    }

    for key in stale {
        if let Err(err) = cache.delete(&key).await {
            tracing::warn!(%err, key, "cache invalidation failed for key");
        }
    }
}

pub async fn member_ids<C: ConnectionTrait>(
    conn: &C,
    organization_id: Uuid,
) -> Result<Vec<Uuid>, DbErr> {
    Ok(memberships::Entity::find()
        .filter(memberships::Column::OrganizationId.eq(organization_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| m.user_id)
        .collect())
}

pub async fn member_orgs<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<Vec<Uuid>, DbErr> {
    Ok(memberships::Entity::find()
        .filter(memberships::Column::UserId.eq(user_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| m.organization_id)
        .collect())
}

/// Organization ids whose activity the user may read, cached under
/// `feed_queryset_user_<id>` because every feed query starts from this set.
pub async fn visible_org_ids(
    db: &DatabaseConnection,
    cache: &dyn Cache,
    user_id: Uuid,
) -> Result<Vec<Uuid>, DbErr> {
    let key = keys::visible_orgs(user_id);
    if let Some(hit) = cache_fetch::<Vec<Uuid>>(cache, &key).await {
        return Ok(hit);
    }
    let ids = member_orgs(db, user_id).await?;
    cache_store(cache, &key, &ids).await;
    Ok(ids)
}

/// Recent activity across every organization the user belongs to.
pub async fn my_feed(
    db: &DatabaseConnection,
    cache: &dyn Cache,
    user_id: Uuid,
) -> Result<Vec<FeedEntrySummary>, DbErr> {
    let key = keys::my_feed(user_id);
    if let Some(hit) = cache_fetch(cache, &key).await {
        return Ok(hit);
    }

    let org_ids = visible_org_ids(db, cache, user_id).await?;
    let items: Vec<FeedEntrySummary> = feed_items::Entity::find()
        .filter(feed_items::Column::OrganizationId.is_in(org_ids))
        .order_by_desc(feed_items::Column::CreatedAt)
        .limit(feed_page_size())
        .all(db)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    cache_store(cache, &key, &items).await;
    Ok(items)
}

/// Paginated feed listing. Only the first page is cached, under a single
/// key per user.
pub async fn list_feed(
    db: &DatabaseConnection,
    cache: &dyn Cache,
    user_id: Uuid,
    page: u64,
) -> Result<FeedPage, DbErr> {
    let page = page.max(1);
    let page_size = feed_page_size();
    let cache_key = (page == 1).then(|| keys::feed_list_page1(user_id));

    if let Some(key) = &cache_key {
        if let Some(hit) = cache_fetch(cache, key).await {
            return Ok(hit);
        }
    }

    let org_ids = visible_org_ids(db, cache, user_id).await?;
    let items: Vec<FeedEntrySummary> = feed_items::Entity::find()
        .filter(feed_items::Column::OrganizationId.is_in(org_ids))
        .order_by_desc(feed_items::Column::CreatedAt)
        .limit(page_size)
        .offset((page - 1) * page_size)
        .all(db)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let result = FeedPage { page, items };
    if let Some(key) = &cache_key {
        cache_store(cache, key, &result).await;
    }
    Ok(result)
}

/// Feed for one organization. Visibility is membership-scoped, which is why
/// the cache key carries both ids.
pub async fn org_feed(
    db: &DatabaseConnection,
    cache: &dyn Cache,
    organization_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<FeedEntrySummary>, FeedReadError> {
    if !is_member(db, user_id, organization_id).await? {
        return Err(FeedReadError::NotMember);
    }

    let key = keys::org_feed(organization_id, user_id);
    if let Some(hit) = cache_fetch(cache, &key).await {
        return Ok(hit);
    }

    let items: Vec<FeedEntrySummary> = feed_items::Entity::find()
        .filter(feed_items::Column::OrganizationId.eq(organization_id))
        .order_by_desc(feed_items::Column::CreatedAt)
        .limit(feed_page_size())
        .all(db)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    cache_store(cache, &key, &items).await;
    Ok(items)
}

/// Feed filtered to a single project, visibility checked against the
/// project's organization.
pub async fn project_feed(
    db: &DatabaseConnection,
    cache: &dyn Cache,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<FeedEntrySummary>, FeedReadError> {
    let project = projects::Entity::find_by_id(project_id)
        .one(db)
        .await?
        .ok_or(FeedReadError::ProjectNotFound)?;
    if !is_member(db, user_id, project.organization_id).await? {
        return Err(FeedReadError::NotMember);
    }

    let key = keys::project_feed(project_id, user_id);
    if let Some(hit) = cache_fetch(cache, &key).await {
        return Ok(hit);
    }

    let items: Vec<FeedEntrySummary> = feed_items::Entity::find()
        .filter(feed_items::Column::ProjectId.eq(project_id))
        .order_by_desc(feed_items::Column::CreatedAt)
        .limit(feed_page_size())
        .all(db)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    cache_store(cache, &key, &items).await;
    Ok(items)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
    pub organization_ids: Vec<Uuid>,
}

pub async fn user_profile(
    db: &DatabaseConnection,
    cache: &dyn Cache,
    user_id: Uuid,
) -> Result<UserProfile, FeedReadError> {
    let key = keys::user_profile(user_id);
    if let Some(hit) = cache_fetch(cache, &key).await {
        return Ok(hit);
    }

    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(FeedReadError::UserNotFound)?;
    let profile = UserProfile {
        id: user.id,
        email: user.email,
        full_name: user.full_name,
        is_active: user.is_active,
        organization_ids: member_orgs(db, user_id).await?,
    };

    cache_store(cache, &key, &profile).await;
    Ok(profile)
}

async fn is_member(
    db: &DatabaseConnection,
    user_id: Uuid,
    organization_id: Uuid,
) -> Result<bool, DbErr> {
    Ok(memberships::Entity::find()
        .filter(memberships::Column::UserId.eq(user_id))
        .filter(memberships::Column::OrganizationId.eq(organization_id))
        .one(db)
        .await?
        .is_some())
}

/// Cache read that can never fail a request: backend errors and undecodable
/// entries both degrade to a miss.
async fn cache_fetch<T: serde::de::DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%err, key, "dropping undecodable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(%err, key, "cache read failed, serving from database");
            None
        }
    }
}

async fn cache_store<T: Serialize>(cache: &dyn Cache, key: &str, value: &T) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(%err, key, "could not encode cache entry");
            return;
        }
    };
    if let Err(err) = cache.set(key, raw, feed_cache_ttl()).await {
        tracing::warn!(%err, key, "cache write failed");
    }
}

fn feed_cache_ttl() -> Duration {
    let secs = std::env::var("HUDDLE_FEED_CACHE_TTL_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(300);
    Duration::from_secs(secs)
}

fn feed_page_size() -> u64 {
    std::env::var("HUDDLE_FEED_PAGE_SIZE")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|v| v.clamp(1, 100))
        .unwrap_or(20)
}
