//! Room connection.
//!
//! The client maintains:
//! - A join handshake (`JoinOrCreate` -> `Joined` / `JoinError`)
//! - A reader task forwarding state changes into a channel
//! - A writer task draining outbound room messages
//!
//! Neither direction blocks the frame loop: sends are channel pushes and
//! received changes are drained without waiting.

use std::net::SocketAddr;

use anyhow::{bail, Context};
use async_trait::async_trait;
use netplay_shared::net::{
    ClientMsg, FrameReader, FrameWriter, JoinOptions, ReliableConn, ServerMsg, SessionId,
    StateChange,
};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Opens sessions to named rooms.
#[async_trait]
pub trait RoomConnector: Send + Sync {
    async fn join_or_create(&self, room_name: &str, options: JoinOptions) -> anyhow::Result<Room>;
}

/// Connects to a room host over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    server_addr: String,
}

impl TcpConnector {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
        }
    }
}

#[async_trait]
impl RoomConnector for TcpConnector {
    async fn join_or_create(&self, room_name: &str, options: JoinOptions) -> anyhow::Result<Room> {
        let addr: SocketAddr = self.server_addr.parse().context("parse server_addr")?;
        info!(server = %addr, room = %room_name, "Joining room");

        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&ClientMsg::JoinOrCreate {
            room: room_name.to_string(),
            options,
        })
        .await?;

        let (room_id, session_id) = match conn.recv::<ServerMsg>().await? {
            ServerMsg::Joined {
                room_id,
                session_id,
            } => (room_id, session_id),
            ServerMsg::JoinError { reason } => bail!("join refused: {reason}"),
            other => bail!("expected Joined, got {other:?}"),
        };

        info!(room_id = %room_id, session_id = %session_id, "Joined room");

        let (reader, writer) = conn.into_split();
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let mut room = Room::from_channels(room_id, session_id, outbound_tx, changes_rx);
        room.tasks.push(tokio::spawn(read_changes(reader, changes_tx)));
        room.tasks.push(tokio::spawn(write_messages(writer, outbound_rx)));
        Ok(room)
    }
}

async fn read_changes(mut reader: FrameReader, changes: mpsc::UnboundedSender<StateChange>) {
    loop {
        match reader.recv::<ServerMsg>().await {
            Ok(ServerMsg::State(change)) => {
                if changes.send(change).is_err() {
                    break;
                }
            }
            Ok(other) => debug!(?other, "Unexpected room message"),
            Err(e) => {
                warn!(error = %e, "Room connection closed");
                break;
            }
        }
    }
}

async fn write_messages(mut writer: FrameWriter, mut outbound: mpsc::UnboundedReceiver<ClientMsg>) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = writer.send(&msg).await {
            warn!(error = %e, "Room send failed");
            break;
        }
    }
}

/// A joined room session.
#[derive(Debug)]
pub struct Room {
    room_id: String,
    session_id: SessionId,
    outbound: mpsc::UnboundedSender<ClientMsg>,
    changes: mpsc::UnboundedReceiver<StateChange>,
    tasks: Vec<JoinHandle<()>>,
}

impl Room {
    /// Builds a room over existing channels, with no I/O tasks attached.
    pub fn from_channels(
        room_id: impl Into<String>,
        session_id: SessionId,
        outbound: mpsc::UnboundedSender<ClientMsg>,
        changes: mpsc::UnboundedReceiver<StateChange>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            session_id,
            outbound,
            changes,
            tasks: Vec::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Queues a tagged message for the room host.
    pub fn send<T: Serialize>(&self, type_tag: u8, body: &T) -> anyhow::Result<()> {
        let msg = ClientMsg::message(type_tag, body)?;
        self.outbound
            .send(msg)
            .map_err(|_| anyhow::anyhow!("room connection closed"))
    }

    /// Takes every change received so far, oldest first.
    pub fn drain_changes(&mut self) -> Vec<StateChange> {
        let mut out = Vec::new();
        while let Ok(change) = self.changes.try_recv() {
            out.push(change);
        }
        out
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
