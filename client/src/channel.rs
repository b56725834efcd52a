//! Realtime channel manager.
//!
//! One WebSocket per [Scope]. Each channel runs a background task that joins
//! its room on every (re)connect, forwards server events to a [Subscription],
//! and sends queued client events. Leaving a scope sends the room's leave
//! event (if any) before closing the socket.

use crate::{
    client::{connect_socket, Socket, TIMEOUT},
    events::{decode_frame, ChannelEvent, Frame, Subscription},
    Client, Error, Result,
};
use futures_util::{SinkExt, StreamExt};
use std::{collections::HashMap, collections::VecDeque, time::Duration};
use sweeps_types::{realtime::ClientEvent, ChatUser, UserId};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

/// Lifetime a realtime connection is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Balance pushes for the authenticated user.
    User(UserId),
    /// Chat of one game page.
    GameRoom { slug: String, user: ChatUser },
    /// Community chat.
    GlobalChat,
}

impl Scope {
    /// Name the manager tracks this scope under.
    pub fn key(&self) -> String {
        match self {
            Scope::User(id) => format!("user:{id}"),
            Scope::GameRoom { slug, .. } => format!("game:{slug}"),
            Scope::GlobalChat => "global".to_string(),
        }
    }

    pub fn join_event(&self) -> ClientEvent {
        match self {
            Scope::User(id) => ClientEvent::JoinUserRoom(*id),
            Scope::GameRoom { slug, user } => ClientEvent::JoinGameRoom {
                game_slug: slug.clone(),
                user: user.clone(),
            },
            Scope::GlobalChat => ClientEvent::JoinGlobalChat,
        }
    }

    pub fn leave_event(&self) -> Option<ClientEvent> {
        match self {
            Scope::GameRoom { slug, .. } => Some(ClientEvent::LeaveGameRoom {
                game_slug: slug.clone(),
            }),
            _ => None,
        }
    }
}

/// Connection settings shared by every channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Delay before reconnecting after the socket drops.
    pub reconnect_delay: Duration,
    /// Upper bound on a single dial attempt.
    pub dial_timeout: Duration,
    /// Subscription buffer size (`0` uses the default).
    pub capacity: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            dial_timeout: TIMEOUT,
            capacity: 0,
        }
    }
}

enum Command {
    Send(ClientEvent),
    Leave,
}

/// Handle to one scope's connection task.
pub struct Channel {
    scope: Scope,
    commands: mpsc::UnboundedSender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl Channel {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Queue an event for the server. Events queued while disconnected are
    /// sent after the next join.
    pub fn send(&self, event: ClientEvent) -> Result<()> {
        self.commands
            .send(Command::Send(event))
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn leave(mut self) {
        let _ = self.commands.send(Command::Leave);
        if let Some(handle) = self.handle.take() {
            if timeout(Duration::from_secs(5), handle).await.is_err() {
                warn!(scope = %self.scope.key(), "channel task did not stop in time");
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Owns every open channel, keyed by [Scope::key].
pub struct ChannelManager {
    ws_url: Url,
    options: ChannelOptions,
    channels: HashMap<String, Channel>,
}

impl ChannelManager {
    pub fn new(client: &Client, options: ChannelOptions) -> Result<Self> {
        Ok(Self::with_url(client.ws_url.join("socket")?, options))
    }

    pub fn with_url(ws_url: Url, options: ChannelOptions) -> Self {
        Self {
            ws_url,
            options,
            channels: HashMap::new(),
        }
    }

    /// Open a channel for `scope`. Joining a scope that is already open
    /// leaves the previous connection first.
    pub async fn join(&mut self, scope: Scope) -> Subscription {
        let key = scope.key();
        if let Some(previous) = self.channels.remove(&key) {
            debug!(scope = %key, "replacing existing channel");
            previous.leave().await;
        }
        let (events, subscription) = Subscription::channel(self.options.capacity);
        let (commands, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(
            self.ws_url.clone(),
            scope.clone(),
            self.options,
            receiver,
            events,
        ));
        info!(scope = %key, "joined channel");
        let channel = Channel {
            scope,
            commands,
            handle: Some(handle),
        };
        self.channels.insert(key, channel);
        subscription
    }

    /// Leave a scope: send its leave event, close the socket and stop the task.
    pub async fn leave(&mut self, key: &str) -> Result<()> {
        let channel = self
            .channels
            .remove(key)
            .ok_or_else(|| Error::NotJoined(key.to_string()))?;
        channel.leave().await;
        info!(scope = %key, "left channel");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Channel> {
        self.channels.get(key)
    }

    pub fn is_joined(&self, key: &str) -> bool {
        self.channels.contains_key(key)
    }

    pub fn send(&self, key: &str, event: ClientEvent) -> Result<()> {
        self.channels
            .get(key)
            .ok_or_else(|| Error::NotJoined(key.to_string()))?
            .send(event)
    }

    /// Leave every open scope.
    pub async fn close_all(&mut self) {
        let keys: Vec<String> = self.channels.keys().cloned().collect();
        for key in keys {
            if let Some(channel) = self.channels.remove(&key) {
                channel.leave().await;
            }
        }
    }
}

async fn send_event(socket: &mut Socket, event: &ClientEvent) -> Result<()> {
    let text = serde_json::to_string(event)?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}

enum Exit {
    Leave,
    Dropped,
}

async fn run(
    ws_url: Url,
    scope: Scope,
    options: ChannelOptions,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ChannelEvent>,
) {
    let key = scope.key();
    let mut pending: VecDeque<ClientEvent> = VecDeque::new();
    loop {
        match connect_socket(&ws_url, options.dial_timeout).await {
            Ok(mut socket) => {
                match serve(&mut socket, &scope, &mut pending, &mut commands, &events).await {
                    Exit::Leave => {
                        if let Some(leave) = scope.leave_event() {
                            if let Err(err) = send_event(&mut socket, &leave).await {
                                warn!(scope = %key, ?err, "failed to send leave event");
                            }
                        }
                        let _ = socket.close(None).await;
                        return;
                    }
                    Exit::Dropped => {
                        info!(scope = %key, "connection dropped");
                        if events.send(ChannelEvent::Disconnected).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => warn!(scope = %key, ?err, "connect failed"),
        }

        // Wait out the reconnect delay while still honouring a leave
        let delay = sleep(options.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => break,
                command = commands.recv() => match command {
                    Some(Command::Send(event)) => pending.push_back(event),
                    Some(Command::Leave) | None => return,
                },
            }
        }
    }
}

async fn serve(
    socket: &mut Socket,
    scope: &Scope,
    pending: &mut VecDeque<ClientEvent>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<ChannelEvent>,
) -> Exit {
    // Room membership does not survive a reconnect; join every time
    if let Err(err) = send_event(socket, &scope.join_event()).await {
        warn!(scope = %scope.key(), ?err, "failed to join room");
        return Exit::Dropped;
    }
    while let Some(event) = pending.front() {
        if send_event(socket, event).await.is_err() {
            return Exit::Dropped;
        }
        pending.pop_front();
    }
    if events.send(ChannelEvent::Connected).await.is_err() {
        return Exit::Leave;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(event)) => {
                    if let Err(err) = send_event(socket, &event).await {
                        warn!(scope = %scope.key(), ?err, "send failed");
                        pending.push_back(event);
                        return Exit::Dropped;
                    }
                }
                Some(Command::Leave) | None => return Exit::Leave,
            },
            message = socket.next() => match message {
                Some(Ok(message)) => match decode_frame(message) {
                    Frame::Event(event) => {
                        if events.send(ChannelEvent::Event(event)).await.is_err() {
                            // Subscriber gone, treat as unmount
                            return Exit::Leave;
                        }
                    }
                    Frame::Closed => return Exit::Dropped,
                    Frame::Skip => {}
                },
                Some(Err(err)) => {
                    warn!(scope = %scope.key(), ?err, "WebSocket error");
                    return Exit::Dropped;
                }
                None => return Exit::Dropped,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> ChatUser {
        ChatUser {
            id: 7,
            username: "ada".to_string(),
            avatar_url: None,
        }
    }

    #[test]
    fn test_scope_keys_and_events() {
        assert_eq!(Scope::User(7).key(), "user:7");
        assert_eq!(Scope::GlobalChat.key(), "global");

        let room = Scope::GameRoom {
            slug: "slots".to_string(),
            user: player(),
        };
        assert_eq!(room.key(), "game:slots");
        assert_eq!(
            room.leave_event(),
            Some(ClientEvent::LeaveGameRoom {
                game_slug: "slots".to_string()
            })
        );
        assert_eq!(Scope::User(7).join_event(), ClientEvent::JoinUserRoom(7));
        assert!(Scope::User(7).leave_event().is_none());
        assert!(Scope::GlobalChat.leave_event().is_none());
    }

    #[tokio::test]
    async fn test_leave_unknown_scope() {
        let url = Url::parse("ws://127.0.0.1:9/socket").unwrap();
        let mut manager = ChannelManager::with_url(url, ChannelOptions::default());
        assert!(matches!(
            manager.leave("global").await,
            Err(Error::NotJoined(_))
        ));
        assert!(matches!(
            manager.send("global", ClientEvent::JoinGlobalChat),
            Err(Error::NotJoined(_))
        ));
    }
}
