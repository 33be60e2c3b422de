//! Networking primitives.
//!
//! Goals:
//! - Provide a reliable (TCP) length-prefixed channel to a room host.
//! - Provide the join, input and state-change message types.
//! - Keep serialization explicit and versionable.
//!
//! The room host owns the authoritative state; this module only carries its
//! notifications to the client and the client's messages back.

use std::{fmt, net::SocketAddr};

use anyhow::{bail, Context};
use bytes::{BufMut, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::math::Vec2;

/// Message type tag for [`InputSnapshot`] messages.
pub const INPUT_MESSAGE: u8 = 0;

/// Frames above this size are treated as a protocol violation.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Identifier the room host assigns to a client when it joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options sent once when joining a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOptions {
    pub screen_width: u32,
    pub screen_height: u32,
}

/// Replicated state of one player, as the room host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
}

impl PlayerState {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Held directions for one fixed tick, sent with tag [`INPUT_MESSAGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InputSnapshot {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub tick: u32,
}

/// Client -> room host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMsg {
    /// Join the named room, creating it if it does not exist.
    JoinOrCreate { room: String, options: JoinOptions },
    /// Room message with a numeric type tag.
    Message {
        type_tag: u8,
        body: serde_json::Value,
    },
}

impl ClientMsg {
    /// Builds a tagged room message from any serializable body.
    pub fn message<T: Serialize>(type_tag: u8, body: &T) -> anyhow::Result<Self> {
        let body = serde_json::to_value(body).context("serialize message body")?;
        Ok(ClientMsg::Message { type_tag, body })
    }

    /// Decodes the body of a tagged message.
    pub fn decode_body<T: DeserializeOwned>(&self, expected_tag: u8) -> anyhow::Result<T> {
        match self {
            ClientMsg::Message { type_tag, body } if *type_tag == expected_tag => {
                serde_json::from_value(body.clone()).context("deserialize message body")
            }
            other => bail!("expected message with tag {expected_tag}, got {other:?}"),
        }
    }
}

/// Room host -> client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMsg {
    /// Join accepted.
    Joined {
        room_id: String,
        session_id: SessionId,
    },
    /// Join refused.
    JoinError { reason: String },
    /// Change to the replicated player collection.
    State(StateChange),
}

/// Change notification for the keyed player collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StateChange {
    PlayerAdded {
        session_id: SessionId,
        player: PlayerState,
    },
    PlayerChanged {
        session_id: SessionId,
        player: PlayerState,
    },
    PlayerRemoved { session_id: SessionId },
}

impl StateChange {
    pub fn session_id(&self) -> &SessionId {
        match self {
            StateChange::PlayerAdded { session_id, .. }
            | StateChange::PlayerChanged { session_id, .. }
            | StateChange::PlayerRemoved { session_id } => session_id,
        }
    }

    /// Routes the notification to the listener handler for its kind.
    pub fn dispatch<L: StateListener + ?Sized>(self, listener: &mut L) {
        match self {
            StateChange::PlayerAdded { session_id, player } => {
                listener.on_player_added(session_id, player)
            }
            StateChange::PlayerChanged { session_id, player } => {
                listener.on_player_changed(&session_id, player)
            }
            StateChange::PlayerRemoved { session_id } => listener.on_player_removed(&session_id),
        }
    }
}

/// Handlers for player collection notifications.
pub trait StateListener {
    fn on_player_added(&mut self, session_id: SessionId, player: PlayerState);
    fn on_player_changed(&mut self, session_id: &SessionId, player: PlayerState);
    fn on_player_removed(&mut self, session_id: &SessionId);
}

async fn write_frame<W, M>(writer: &mut W, msg: &M) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    if payload.len() > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds limit", payload.len());
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    writer.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

async fn read_frame<R, M>(reader: &mut R) -> anyhow::Result<M>
where
    R: AsyncRead + Unpin,
    M: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame of {len} bytes exceeds limit");
    }
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    serde_json::from_slice(&payload).context("deserialize msg")
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Ok(Self::new(stream))
    }

    pub async fn send<M: Serialize>(&mut self, msg: &M) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv<M: DeserializeOwned>(&mut self) -> anyhow::Result<M> {
        read_frame(&mut self.stream).await
    }

    /// Splits into halves that can be driven from separate tasks.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (FrameReader { read }, FrameWriter { write })
    }
}

/// Read half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameReader {
    read: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv<M: DeserializeOwned>(&mut self) -> anyhow::Result<M> {
        read_frame(&mut self.read).await
    }
}

/// Write half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameWriter {
    write: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send<M: Serialize>(&mut self, msg: &M) -> anyhow::Result<()> {
        write_frame(&mut self.write, msg).await
    }
}

/// TCP listener handing out framed connections.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
