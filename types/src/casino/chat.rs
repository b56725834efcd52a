use serde::{Deserialize, Serialize};

use super::UserId;

/// A chat line as broadcast to a room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// Identity presented when joining a game room.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}
