use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::NaiveDate;
use huddle_core::status::{TaskPriority, TaskStatus};
use huddle_db::entities::{comments, tasks};
use sea_orm::prelude::{DateTimeWithTimeZone, Uuid};
use serde::{Deserialize, Deserializer, Serialize};

use crate::auth::{self, AuthUser};
use crate::feed::{self, FeedReadError};
use crate::mutations::{self, CreateTask, MutationError, UpdateTask};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(ErrorBody { message: message.into() })).into_response()
}

fn mutation_error(err: MutationError) -> Response {
    match err {
        MutationError::TaskNotFound | MutationError::ProjectNotFound => {
            json_error(StatusCode::NOT_FOUND, err.to_string())
        }
        MutationError::AssigneeNotMember | MutationError::InvalidTransition { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        MutationError::MissingOrganization | MutationError::CorruptRow(_) | MutationError::Db(_) => {
            tracing::error!(%err, "mutation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn feed_error(err: FeedReadError) -> Response {
    match err {
        FeedReadError::NotMember => json_error(StatusCode::FORBIDDEN, err.to_string()),
        FeedReadError::ProjectNotFound | FeedReadError::UserNotFound => {
            json_error(StatusCode::NOT_FOUND, err.to_string())
        }
        FeedReadError::Db(err) => {
            tracing::error!(%err, "feed read failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Distinguishes an absent field from an explicit `null`, so PATCH bodies
/// can clear `assignee_id` or `due_date` by sending `null`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub project_id: Uuid,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub project_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl From<tasks::Model> for TaskResponse {
    fn from(task: tasks::Model) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            project_id: task.project_id,
            assignee_id: task.assignee_id,
            reporter_id: task.reporter_id,
            status: task.status,
            priority: task.priority,
            due_date: task.due_date,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTimeWithTimeZone,
}

impl From<comments::Model> for CommentResponse {
    fn from(comment: comments::Model) -> Self {
        Self {
            id: comment.id,
            task_id: comment.task_id,
            author_id: comment.author_id,
            body: comment.body,
            created_at: comment.created_at,
        }
    }
}

fn parse_priority(raw: Option<&str>) -> Result<TaskPriority, Response> {
    match raw {
        Some(raw) => raw
            .parse::<TaskPriority>()
            .map_err(|err| json_error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())),
        None => Ok(TaskPriority::default()),
    }
}

async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTaskRequest>,
) -> Response {
    if req.title.trim().is_empty() {
        return json_error(StatusCode::UNPROCESSABLE_ENTITY, "title must not be empty");
    }
    let priority = match parse_priority(req.priority.as_deref()) {
        Ok(priority) => priority,
        Err(resp) => return resp,
    };

    let input = CreateTask {
        title: req.title,
        description: req.description.unwrap_or_default(),
        project_id: req.project_id,
        assignee_id: req.assignee_id,
        priority,
        due_date: req.due_date,
    };
    match mutations::create_task(&state, &user, input).await {
        Ok(task) => (StatusCode::CREATED, Json(TaskResponse::from(task))).into_response(),
        Err(err) => mutation_error(err),
    }
}

async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Response {
    let priority = match req.priority.as_deref() {
        Some(raw) => match raw.parse::<TaskPriority>() {
            Ok(priority) => Some(priority),
            Err(err) => return json_error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        },
        None => None,
    };

    let input = UpdateTask {
        title: req.title,
        description: req.description,
        priority,
        assignee_id: req.assignee_id,
        due_date: req.due_date,
    };
    match mutations::update_task(&state, &user, task_id, input).await {
        Ok(task) => Json(TaskResponse::from(task)).into_response(),
        Err(err) => mutation_error(err),
    }
}

async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let next = match req.status.parse::<TaskStatus>() {
        Ok(status) => status,
        Err(err) => return json_error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    };
    match mutations::update_task_status(&state, &user, task_id, next).await {
        Ok(task) => Json(TaskResponse::from(task)).into_response(),
        Err(err) => mutation_error(err),
    }
}

async fn add_comment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> Response {
    if req.body.trim().is_empty() {
        return json_error(StatusCode::UNPROCESSABLE_ENTITY, "comment body must not be empty");
    }
    match mutations::add_comment(&state, &user, task_id, req.body).await {
        Ok(comment) => (StatusCode::CREATED, Json(CommentResponse::from(comment))).into_response(),
        Err(err) => mutation_error(err),
    }
}

async fn my_feed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    match feed::my_feed(&state.db, state.cache.as_ref(), user.user_id).await {
        Ok(items) => Json(items).into_response(),
        Err(err) => {
            tracing::error!(%err, "feed read failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn feed_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = query.page.unwrap_or(1);
    match feed::list_feed(&state.db, state.cache.as_ref(), user.user_id, page).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => {
            tracing::error!(%err, "feed read failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn org_feed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(organization_id): Path<Uuid>,
) -> Response {
    match feed::org_feed(&state.db, state.cache.as_ref(), organization_id, user.user_id).await {
        Ok(items) => Json(items).into_response(),
        Err(err) => feed_error(err),
    }
}

async fn project_feed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> Response {
    match feed::project_feed(&state.db, state.cache.as_ref(), project_id, user.user_id).await {
        Ok(items) => Json(items).into_response(),
        Err(err) => feed_error(err),
    }
}

async fn user_profile(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Response {
    match feed::user_profile(&state.db, state.cache.as_ref(), user_id).await {
        Ok(profile) => Json(profile).into_response(),
        Err(err) => feed_error(err),
    }
}

/// Authenticated JSON API. Merged into the main router before state is
/// attached; every route here sits behind [`auth::require_user`].
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/:task_id", patch(update_task))
        .route("/api/tasks/:task_id/status", post(update_status))
        .route("/api/tasks/:task_id/comments", post(add_comment))
        .route("/api/feed", get(my_feed))
        .route("/api/feed/list", get(feed_list))
        .route("/api/organizations/:organization_id/feed", get(org_feed))
        .route("/api/projects/:project_id/feed", get(project_feed))
        .route("/api/users/:user_id/profile", get(user_profile))
        .layer(middleware::from_fn(auth::require_user))
}
