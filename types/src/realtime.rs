//! Realtime channel envelopes.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

use crate::casino::{BalanceUpdate, ChatMessage, ChatUser, UserId};
use serde::{Deserialize, Serialize};

/// Events sent from a client to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinUserRoom(UserId),
    #[serde(rename_all = "camelCase")]
    JoinGameRoom {
        game_slug: String,
        user: ChatUser,
    },
    #[serde(rename_all = "camelCase")]
    LeaveGameRoom {
        game_slug: String,
    },
    JoinGlobalChat,
    #[serde(rename_all = "camelCase")]
    SendGlobalMessage {
        user_id: UserId,
        message: String,
    },
}

/// Events pushed from the server to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    BalanceUpdate(BalanceUpdate),
    ChatMessage(ChatMessage),
    NewGlobalMessage(ChatMessage),
    ModerationAction { error: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BalanceUpdate(_) => "balance-update",
            ServerEvent::ChatMessage(_) => "chat-message",
            ServerEvent::NewGlobalMessage(_) => "new-global-message",
            ServerEvent::ModerationAction { .. } => "moderation-action",
        }
    }
}
