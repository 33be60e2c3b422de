//! Scripted room host for integration tests.
//!
//! Speaks the client's wire protocol but holds no game state of its own:
//! each test decides which joins to accept and which notifications to send.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{bail, Context};
use netplay_shared::net::{
    ClientMsg, InputSnapshot, JoinOptions, PlayerState, ReliableConn, ReliableListener,
    ServerMsg, SessionId, StateChange, INPUT_MESSAGE,
};
use tracing::info;

/// What a client asked for when it joined.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    pub room: String,
    pub options: JoinOptions,
}

pub struct ScriptedRoomHost {
    listener: ReliableListener,
    room_id: String,
}

impl ScriptedRoomHost {
    /// Binds to an ephemeral localhost port.
    pub async fn bind() -> anyhow::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = ReliableListener::bind(addr).await?;
        Ok(Self {
            listener,
            room_id: "room-1".to_string(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn read_join(&self) -> anyhow::Result<(ReliableConn, JoinRequest)> {
        let (mut conn, peer) = self.listener.accept().await?;
        match conn.recv::<ClientMsg>().await? {
            ClientMsg::JoinOrCreate { room, options } => {
                info!(%peer, room = %room, "Join request");
                Ok((conn, JoinRequest { room, options }))
            }
            other => bail!("expected JoinOrCreate, got {other:?}"),
        }
    }

    /// Accepts the next join and assigns it `session_id`.
    pub async fn accept_join(&self, session_id: &str) -> anyhow::Result<HostSession> {
        let (mut conn, request) = self.read_join().await?;
        let session_id = SessionId::new(session_id);
        conn.send(&ServerMsg::Joined {
            room_id: self.room_id.clone(),
            session_id: session_id.clone(),
        })
        .await?;
        Ok(HostSession {
            conn,
            request,
            session_id,
        })
    }

    /// Refuses the next join with `reason`.
    pub async fn refuse_join(&self, reason: &str) -> anyhow::Result<JoinRequest> {
        let (mut conn, request) = self.read_join().await?;
        conn.send(&ServerMsg::JoinError {
            reason: reason.to_string(),
        })
        .await?;
        Ok(request)
    }
}

/// One accepted client.
pub struct HostSession {
    conn: ReliableConn,
    pub request: JoinRequest,
    pub session_id: SessionId,
}

impl HostSession {
    pub async fn push(&mut self, change: StateChange) -> anyhow::Result<()> {
        self.conn.send(&ServerMsg::State(change)).await
    }

    pub async fn add_player(&mut self, id: &str, x: f32, y: f32) -> anyhow::Result<()> {
        self.push(StateChange::PlayerAdded {
            session_id: SessionId::new(id),
            player: PlayerState { x, y },
        })
        .await
    }

    pub async fn move_player(&mut self, id: &str, x: f32, y: f32) -> anyhow::Result<()> {
        self.push(StateChange::PlayerChanged {
            session_id: SessionId::new(id),
            player: PlayerState { x, y },
        })
        .await
    }

    pub async fn remove_player(&mut self, id: &str) -> anyhow::Result<()> {
        self.push(StateChange::PlayerRemoved {
            session_id: SessionId::new(id),
        })
        .await
    }

    /// Waits for the next input message from the client.
    pub async fn recv_input(&mut self) -> anyhow::Result<InputSnapshot> {
        let msg: ClientMsg = self.conn.recv().await?;
        msg.decode_body(INPUT_MESSAGE).context("decode input")
    }
}

/// An address nothing is listening on.
pub async fn unreachable_addr() -> anyhow::Result<SocketAddr> {
    let listener =
        ReliableListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
    listener.local_addr()
}
