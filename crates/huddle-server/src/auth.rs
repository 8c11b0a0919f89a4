use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sea_orm::prelude::Uuid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (code, axum::Json(ErrorBody { message: message.into() })).into_response()
}

/// Identity carried by a verified access token. Handlers receive it through
/// request extensions once [`require_user`] has run.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

fn jwt_secret() -> Vec<u8> {
    std::env::var("HUDDLE_JWT_SECRET")
        .unwrap_or_else(|_| "dev-insecure-change-me".to_string())
        .into_bytes()
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: usize,
    iat: usize,
    iss: String,
    aud: String,
}

pub fn issue_access_jwt(user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (now + chrono::Duration::hours(12)).timestamp() as usize,
        iat: now.timestamp() as usize,
        iss: "huddle".to_string(),
        aud: "huddle-web".to_string(),
    };

    Ok(jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(&jwt_secret()),
    )?)
}

pub fn validate_access_jwt(token: &str) -> anyhow::Result<AuthUser> {
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.set_audience(&["huddle-web"]);
    validation.set_issuer(&["huddle"]);

    let data = jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(&jwt_secret()),
        &validation,
    )?;

    Ok(AuthUser {
        user_id: Uuid::parse_str(&data.claims.sub)?,
        email: data.claims.email,
    })
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Middleware guarding the API routes. Anything without a valid bearer token
/// gets a 401 before the handler runs.
pub async fn require_user(mut req: Request<Body>, next: Next) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "missing access token");
    };
    let user = match validate_access_jwt(token) {
        Ok(user) => user,
        Err(_) => return json_error(StatusCode::UNAUTHORIZED, "invalid access token"),
    };
    req.extensions_mut().insert(user);
    next.run(req).await
}
