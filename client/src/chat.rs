//! Client-side chat history.
//!
//! Messages are kept in arrival order with no reordering or deduplication.
//! The global room keeps a trailing window; a game room keeps everything
//! until the player moves to another room.

use std::collections::VecDeque;
use sweeps_types::{ChatMessage, GLOBAL_CHAT_WINDOW};
use tracing::debug;

/// Moderation warnings kept for display.
const MAX_WARNINGS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Room {
    Global,
    Game(String),
}

#[derive(Clone, Debug)]
pub struct ChatLog {
    global: VecDeque<ChatMessage>,
    global_window: usize,
    game_slug: Option<String>,
    game: Vec<ChatMessage>,
    warnings: VecDeque<String>,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new(GLOBAL_CHAT_WINDOW)
    }
}

impl ChatLog {
    pub fn new(global_window: usize) -> Self {
        Self {
            global: VecDeque::with_capacity(global_window),
            global_window: global_window.max(1),
            game_slug: None,
            game: Vec::new(),
            warnings: VecDeque::new(),
        }
    }

    /// Replace the global backlog with `history`, keeping only the newest
    /// messages that fit the window.
    pub fn load_global(&mut self, history: Vec<ChatMessage>) {
        self.global.clear();
        for message in history {
            self.push_global(message);
        }
    }

    pub fn push_global(&mut self, message: ChatMessage) {
        if self.global.len() == self.global_window {
            self.global.pop_front();
        }
        self.global.push_back(message);
    }

    /// Switch to a game room. Entering a different room drops the previous
    /// room's messages; re-entering the current room keeps them.
    pub fn enter_room(&mut self, slug: &str) {
        if self.game_slug.as_deref() == Some(slug) {
            return;
        }
        debug!(slug, dropped = self.game.len(), "entering chat room");
        self.game_slug = Some(slug.to_string());
        self.game.clear();
    }

    pub fn leave_room(&mut self) {
        self.game_slug = None;
        self.game.clear();
    }

    pub fn room(&self) -> Option<&str> {
        self.game_slug.as_deref()
    }

    /// Prepend the room backlog fetched over HTTP, ahead of anything pushed
    /// since the room was entered.
    pub fn load_room(&mut self, slug: &str, history: Vec<ChatMessage>) {
        self.enter_room(slug);
        let pushed = std::mem::replace(&mut self.game, history);
        self.game.extend(pushed);
    }

    /// Append a pushed game-room message. Dropped when no room is active.
    pub fn push_room(&mut self, message: ChatMessage) -> bool {
        if self.game_slug.is_none() {
            debug!(id = message.id, "room message without an active room");
            return false;
        }
        self.game.push(message);
        true
    }

    pub fn push_warning(&mut self, error: String) {
        if self.warnings.len() == MAX_WARNINGS {
            self.warnings.pop_front();
        }
        self.warnings.push_back(error);
    }

    /// Remove and return pending moderation warnings.
    pub fn take_warnings(&mut self) -> Vec<String> {
        self.warnings.drain(..).collect()
    }

    pub fn messages(&self, room: &Room) -> Vec<&ChatMessage> {
        match room {
            Room::Global => self.global.iter().collect(),
            Room::Game(slug) if self.game_slug.as_deref() == Some(slug.as_str()) => {
                self.game.iter().collect()
            }
            Room::Game(_) => Vec::new(),
        }
    }

    pub fn global(&self) -> impl Iterator<Item = &ChatMessage> {
        self.global.iter()
    }

    pub fn game(&self) -> &[ChatMessage] {
        &self.game
    }

    pub fn warnings(&self) -> impl Iterator<Item = &String> {
        self.warnings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64) -> ChatMessage {
        ChatMessage {
            id,
            user_id: 1,
            username: "bob".to_string(),
            avatar_url: None,
            message: format!("hello {id}"),
            created_at: 1_700_000_000_000 + id,
        }
    }

    #[test]
    fn test_global_window() {
        let mut log = ChatLog::default();
        log.load_global((0..60).map(message).collect());
        let ids: Vec<u64> = log.global().map(|m| m.id).collect();
        assert_eq!(ids.len(), GLOBAL_CHAT_WINDOW);
        assert_eq!(ids.first(), Some(&10));
        assert_eq!(ids.last(), Some(&59));

        log.push_global(message(60));
        assert_eq!(log.global().next().unwrap().id, 11);
        assert_eq!(log.global().count(), GLOBAL_CHAT_WINDOW);
    }

    #[test]
    fn test_game_room_cleared_on_change() {
        let mut log = ChatLog::default();
        assert!(!log.push_room(message(1)));

        log.enter_room("slots");
        for id in 0..200 {
            log.push_room(message(id));
        }
        assert_eq!(log.game().len(), 200);

        log.enter_room("slots");
        assert_eq!(log.game().len(), 200);

        log.enter_room("dice");
        assert!(log.game().is_empty());
        assert!(log.messages(&Room::Game("slots".to_string())).is_empty());
    }

    #[test]
    fn test_backlog_precedes_pushed() {
        let mut log = ChatLog::default();
        log.enter_room("slots");
        log.push_room(message(5));
        log.load_room("slots", vec![message(1), message(2)]);
        let ids: Vec<u64> = log.game().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 5]);
    }

    #[test]
    fn test_warnings_kept_apart() {
        let mut log = ChatLog::default();
        log.push_warning("Message blocked".to_string());
        assert_eq!(log.global().count(), 0);
        assert_eq!(log.take_warnings(), vec!["Message blocked".to_string()]);
        assert_eq!(log.warnings().count(), 0);
    }
}
