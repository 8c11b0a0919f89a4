use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use huddle_core::frames::{ClientFrame, ServerFrame};
use huddle_core::rooms::RoomId;
use sea_orm::prelude::Uuid;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::auth::{self, AuthUser};
use crate::feed;
use crate::state::AppState;

/// Per-connection write buffer. A client that stops reading loses frames
/// once this fills; the hub never blocks on a slow socket.
const CONNECTION_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// arrive as a query parameter instead of a bearer header.
fn socket_user(headers: &HeaderMap, query: &WsAuthQuery) -> Option<AuthUser> {
    if let Some(token) = query.token.as_deref() {
        if let Ok(user) = auth::validate_access_jwt(token) {
            return Some(user);
        }
    }
    auth::bearer_token(headers).and_then(|token| auth::validate_access_jwt(token).ok())
}

pub async fn notifications_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
) -> impl IntoResponse {
    let Some(user) = socket_user(&headers, &query) else {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    };

    let rooms = vec![RoomId::notifications(user.user_id)];
    let banner = ServerFrame::ConnectionEstablished {
        message: "Connected to notifications".to_string(),
        organizations: None,
    };
    ws.on_upgrade(move |socket| drive_socket(state, socket, user, rooms, None, banner))
        .into_response()
}

pub async fn task_ws(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
) -> impl IntoResponse {
    let Some(user) = socket_user(&headers, &query) else {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    };

    let room = RoomId::task(task_id);
    let banner = ServerFrame::ConnectionEstablished {
        message: "Connected to task updates".to_string(),
        organizations: None,
    };
    ws.on_upgrade(move |socket| drive_socket(state, socket, user, vec![room], Some(room), banner))
        .into_response()
}

pub async fn feed_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
) -> impl IntoResponse {
    let Some(user) = socket_user(&headers, &query) else {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    };

    // Room membership is fixed at connect time from the user's organizations.
    let orgs = match feed::member_orgs(state.db.as_ref(), user.user_id).await {
        Ok(orgs) => orgs,
        Err(err) => {
            tracing::error!(%err, "could not resolve feed rooms");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
        }
    };

    let rooms: Vec<RoomId> = orgs.iter().copied().map(RoomId::org_feed).collect();
    let banner = ServerFrame::ConnectionEstablished {
        message: "Connected to live feed".to_string(),
        organizations: Some(orgs),
    };
    ws.on_upgrade(move |socket| drive_socket(state, socket, user, rooms, None, banner))
        .into_response()
}

async fn drive_socket(
    state: AppState,
    socket: WebSocket,
    user: AuthUser,
    rooms: Vec<RoomId>,
    presence: Option<RoomId>,
    banner: ServerFrame,
) {
    let span = tracing::info_span!("client_ws", user = %user.email);
    async move {
        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(CONNECTION_BUFFER);
        let conn_id = Uuid::new_v4();

        // The banner enters the write queue before any room join, so no
        // broadcast can reach this client ahead of it.
        match serde_json::to_string(&banner) {
            Ok(text) => {
                let _ = tx.send(Message::Text(text)).await;
            }
            Err(err) => {
                tracing::error!(%err, "could not encode connection banner");
                return;
            }
        }

        for room in &rooms {
            state.hub.join(*room, conn_id, tx.clone()).await;
        }
        if let Some(room) = &presence {
            state
                .hub
                .broadcast_except(
                    room,
                    conn_id,
                    &ServerFrame::UserJoined {
                        user_id: user.user_id,
                        user_email: user.email.clone(),
                    },
                )
                .await;
        }
        tracing::info!(rooms = rooms.len(), "client connected");

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
        });

        while let Some(msg) = receiver.next().await {
            let Ok(msg) = msg else { break };
            match msg {
                Message::Text(text) => {
                    let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) else {
                        continue;
                    };
                    match frame {
                        ClientFrame::Ping => {
                            if !send_frame(&tx, &ServerFrame::Pong).await {
                                break;
                            }
                        }
                        ClientFrame::Typing => {
                            if let Some(room) = &presence {
                                state
                                    .hub
                                    .broadcast_except(
                                        room,
                                        conn_id,
                                        &ServerFrame::Typing {
                                            user_id: user.user_id,
                                            user_email: user.email.clone(),
                                        },
                                    )
                                    .await;
                            }
                        }
                        ClientFrame::Unknown => {}
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        for room in &rooms {
            state.hub.leave(room, conn_id).await;
        }
        if let Some(room) = &presence {
            state
                .hub
                .broadcast(
                    room,
                    &ServerFrame::UserLeft {
                        user_id: user.user_id,
                        user_email: user.email.clone(),
                    },
                )
                .await;
        }
        tracing::info!("client disconnected");

        writer.abort();
    }
    .instrument(span)
    .await
}

async fn send_frame(tx: &mpsc::Sender<Message>, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => tx.send(Message::Text(text)).await.is_ok(),
        Err(err) => {
            tracing::warn!(%err, "could not encode frame");
            true
        }
    }
}
