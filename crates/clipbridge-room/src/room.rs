//! Room actor: an isolated Tokio task that owns one room's membership.
//!
//! Every mutation of a room (join, leave, broadcast, touch, expiry check)
//! is a command on the actor's channel, so they are serialized per room
//! without any lock shared between rooms. Broadcast iterates the member
//! map inside the actor, so a join or leave can never interleave with an
//! in-flight fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clipbridge_protocol::RoomCode;
use clipbridge_transport::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::{RelayConfig, RoomError};

/// One payload on its way to a member's connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The member that sent it; `None` for the snapshot replayed on join.
    pub from: Option<ConnectionId>,
    /// The clipboard text. Shared between all recipients of a broadcast.
    pub payload: Arc<str>,
}

/// Bounded channel sender for delivering payloads to one member.
pub type MemberSender = mpsc::Sender<Delivery>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        conn_id: ConnectionId,
        sender: MemberSender,
        reply: oneshot::Sender<Result<RoomInfo, RoomError>>,
    },
    Leave {
        conn_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        sender: ConnectionId,
        payload: Arc<str>,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },
    Touch,
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
    /// Stop the actor if the room is empty and idle past its TTL.
    TryExpire {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// A snapshot of room metadata.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    /// The room's code.
    pub code: RoomCode,
    /// Number of connections currently attached.
    pub members: usize,
    /// Last join, leave, touch, or relayed payload.
    pub last_activity: Instant,
    /// Length in bytes of the last relayed payload (0 if none yet).
    pub last_payload_len: usize,
    /// `true` if the room is empty and idle past its TTL.
    pub expired: bool,
}

impl RoomInfo {
    /// Time since the last activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Per-room settings taken from [`RelayConfig`].
#[derive(Debug, Clone)]
pub(crate) struct RoomSettings {
    pub(crate) ttl: Duration,
    pub(crate) max_members: Option<usize>,
    pub(crate) replay_last_payload: bool,
}

impl From<&RelayConfig> for RoomSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            ttl: config.room_ttl,
            max_members: config.max_members,
            replay_last_payload: config.replay_last_payload,
        }
    }
}

/// Handle to a running room actor.
///
/// Cheap to clone. Once the actor has stopped (expired or closed) every
/// method fails with [`RoomError::NotFound`].
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("code", &self.code)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl RoomHandle {
    /// Returns the room's code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Returns `true` if both handles address the same actor.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    fn gone(&self) -> RoomError {
        RoomError::NotFound(self.code.clone())
    }

    async fn request<T>(
        &self,
        command: RoomCommand,
        reply: oneshot::Receiver<T>,
    ) -> Result<T, RoomError> {
        self.sender.send(command).await.map_err(|_| self.gone())?;
        reply.await.map_err(|_| self.gone())
    }

    /// Adds a connection to the room. Payloads for it go to `sender`.
    pub async fn join(
        &self,
        conn_id: ConnectionId,
        sender: MemberSender,
    ) -> Result<RoomInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::Join {
                conn_id,
                sender,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Removes a connection. Returns `false` if it was not a member.
    pub async fn leave(&self, conn_id: ConnectionId) -> Result<bool, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Leave { conn_id, reply }, rx).await
    }

    /// Relays `payload` to every member except `sender`. Returns how many
    /// members it was queued for.
    pub async fn broadcast(
        &self,
        sender: ConnectionId,
        payload: Arc<str>,
    ) -> Result<usize, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::Broadcast {
                sender,
                payload,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Refreshes the room's activity clock.
    pub async fn touch(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Touch)
            .await
            .map_err(|_| self.gone())
    }

    /// Requests the current room info.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::GetInfo { reply }, rx).await
    }

    /// Asks the actor to stop if it is empty and idle past its TTL.
    /// Returns `true` if it stopped.
    pub async fn try_expire(&self) -> Result<bool, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::TryExpire { reply }, rx).await
    }

    /// Tells the room to shut down, dropping every member's channel.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| self.gone())
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    code: RoomCode,
    settings: RoomSettings,
    members: HashMap<ConnectionId, MemberSender>,
    created_at: Instant,
    last_activity: Instant,
    last_payload: Option<Arc<str>>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until shutdown or expiry.
    async fn run(mut self) {
        tracing::debug!(room = %self.code, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    conn_id,
                    sender,
                    reply,
                } => {
                    if self.is_expired() {
                        let _ = reply.send(Err(RoomError::NotFound(
                            self.code.clone(),
                        )));
                        tracing::info!(room = %self.code, "join on expired room, stopping");
                        break;
                    }
                    let result = self.handle_join(conn_id, sender);
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { conn_id, reply } => {
                    let _ = reply.send(self.handle_leave(conn_id));
                }
                RoomCommand::Broadcast {
                    sender,
                    payload,
                    reply,
                } => {
                    let _ = reply.send(self.handle_broadcast(sender, payload));
                }
                RoomCommand::Touch => self.touch(),
                RoomCommand::GetInfo { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::TryExpire { reply } => {
                    let expired = self.is_expired();
                    let _ = reply.send(expired);
                    if expired {
                        tracing::info!(
                            room = %self.code,
                            idle_secs = self.last_activity.elapsed().as_secs(),
                            "room expired"
                        );
                        break;
                    }
                }
                RoomCommand::Shutdown => {
                    tracing::info!(
                        room = %self.code,
                        members = self.members.len(),
                        "room closing"
                    );
                    self.members.clear();
                    break;
                }
            }
        }

        tracing::debug!(
            room = %self.code,
            age_secs = self.created_at.elapsed().as_secs(),
            "room actor stopped"
        );
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn is_expired(&self) -> bool {
        self.members.is_empty() && self.last_activity.elapsed() >= self.settings.ttl
    }

    fn handle_join(
        &mut self,
        conn_id: ConnectionId,
        sender: MemberSender,
    ) -> Result<RoomInfo, RoomError> {
        if self.members.contains_key(&conn_id) {
            return Err(RoomError::AlreadyJoined(conn_id, self.code.clone()));
        }
        if let Some(max) = self.settings.max_members {
            if self.members.len() >= max {
                return Err(RoomError::RoomFull(self.code.clone()));
            }
        }

        self.members.insert(conn_id, sender);
        self.touch();
        tracing::info!(
            room = %self.code,
            %conn_id,
            members = self.members.len(),
            "member joined"
        );

        if self.settings.replay_last_payload {
            // An empty clipboard is not worth overwriting the joiner's with.
            if let Some(payload) = self.last_payload.clone().filter(|p| !p.is_empty()) {
                let snapshot = Delivery {
                    from: None,
                    payload,
                };
                if !self.deliver(conn_id, snapshot) {
                    self.members.remove(&conn_id);
                }
            }
        }

        Ok(self.info())
    }

    fn handle_leave(&mut self, conn_id: ConnectionId) -> bool {
        let removed = self.members.remove(&conn_id).is_some();
        if removed {
            self.touch();
            tracing::info!(
                room = %self.code,
                %conn_id,
                members = self.members.len(),
                "member left"
            );
        }
        removed
    }

    fn handle_broadcast(
        &mut self,
        sender: ConnectionId,
        payload: Arc<str>,
    ) -> Result<usize, RoomError> {
        if !self.members.contains_key(&sender) {
            return Err(RoomError::NotMember(sender, self.code.clone()));
        }
        self.touch();
        self.last_payload = Some(Arc::clone(&payload));

        let recipients: Vec<ConnectionId> = self
            .members
            .keys()
            .copied()
            .filter(|id| *id != sender)
            .collect();

        let mut delivered = 0;
        let mut unreachable = Vec::new();
        for conn_id in recipients {
            let delivery = Delivery {
                from: Some(sender),
                payload: Arc::clone(&payload),
            };
            if self.deliver(conn_id, delivery) {
                delivered += 1;
            } else {
                unreachable.push(conn_id);
            }
        }

        for conn_id in &unreachable {
            self.members.remove(conn_id);
        }
        tracing::debug!(
            room = %self.code,
            %sender,
            bytes = payload.len(),
            delivered,
            dropped = unreachable.len(),
            "payload relayed"
        );

        Ok(delivered)
    }

    /// Queues a delivery for one member without waiting. Returns `false`
    /// if the member's queue is full or its connection is gone; the caller
    /// removes it.
    fn deliver(&self, conn_id: ConnectionId, delivery: Delivery) -> bool {
        let Some(sender) = self.members.get(&conn_id) else {
            return false;
        };
        match sender.try_send(delivery) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    room = %self.code,
                    %conn_id,
                    "outbound queue full, dropping slow member"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(
                    room = %self.code,
                    %conn_id,
                    "member channel closed, removing"
                );
                false
            }
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            code: self.code.clone(),
            members: self.members.len(),
            last_activity: self.last_activity,
            last_payload_len: self.last_payload.as_ref().map_or(0, |p| p.len()),
            expired: self.is_expired(),
        }
    }
}

/// Spawns a new room actor task and returns a handle to it.
///
/// `channel_size` bounds the command queue; callers wait when it is full,
/// which is what keeps one sender's payloads in order.
pub(crate) fn spawn_room(
    code: RoomCode,
    settings: RoomSettings,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let now = Instant::now();

    let actor = RoomActor {
        code: code.clone(),
        settings,
        members: HashMap::new(),
        created_at: now,
        last_activity: now,
        last_payload: None,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
