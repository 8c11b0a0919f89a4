use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Message;
use huddle_core::rooms::RoomId;
use sea_orm::prelude::Uuid;
use tokio::sync::{RwLock, mpsc};

/// In-process room registry.
///
/// A room is a named set of live connections; rooms appear on first join and
/// are discarded when their last member leaves. Nothing here is persisted,
/// membership is rebuilt entirely from the connections that currently exist.
#[derive(Clone, Default)]
pub struct Hub {
    rooms: Arc<RwLock<HashMap<RoomId, HashMap<Uuid, mpsc::Sender<Message>>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's outbound queue under a room. Joining a room
    /// the connection is already in replaces the stored sender, so the call
    /// is idempotent.
    pub async fn join(&self, room: RoomId, conn_id: Uuid, tx: mpsc::Sender<Message>) {
        self.rooms
            .write()
            .await
            .entry(room)
            .or_default()
            .insert(conn_id, tx);
    }

    /// Removes a connection from a room. The last member leaving discards
    /// the room; leaving a room that was never joined is a no-op.
    pub async fn leave(&self, room: &RoomId, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    pub async fn member_count(&self, room: &RoomId) -> usize {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Number of live rooms, i.e. rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Queues `frame` to every connection currently in `room`. Returns how
    /// many connections the frame was handed to; a room with no members is
    /// not an error, it simply delivers to nobody.
    pub async fn broadcast<F: serde::Serialize>(&self, room: &RoomId, frame: &F) -> usize {
        self.broadcast_filtered(room, None, frame).await
    }

    /// Like [`Hub::broadcast`], but skips one connection so a joiner or
    /// typist never receives its own presence frame back.
    pub async fn broadcast_except<F: serde::Serialize>(
        &self,
        room: &RoomId,
        skip: Uuid,
        frame: &F,
    ) -> usize {
        self.broadcast_filtered(room, Some(skip), frame).await
    }

    async fn broadcast_filtered<F: serde::Serialize>(
        &self,
        room: &RoomId,
        skip: Option<Uuid>,
        frame: &F,
    ) -> usize {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%err, %room, "failed to serialize outbound frame");
                return 0;
            }
        };

        // Snapshot the membership under the read lock, deliver outside it,
        // so slow sockets never hold up concurrent joins and leaves.
        let members: Vec<(Uuid, mpsc::Sender<Message>)> = {
            let rooms = self.rooms.read().await;
            match rooms.get(room) {
                Some(members) => members
                    .iter()
                    .filter(|(conn_id, _)| Some(**conn_id) != skip)
                    .map(|(conn_id, tx)| (*conn_id, tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (conn_id, tx) in members {
            if tx.try_send(Message::Text(text.clone())).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(%room, %conn_id, "dropping frame for slow or closed connection");
            }
        }
        delivered
    }
}
