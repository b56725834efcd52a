//! Routing of pushed realtime events into local state.

use crate::{chat::ChatLog, session::Session};
use sweeps_types::{realtime::ServerEvent, Balance, ChatMessage};
use tracing::{debug, info};

/// What a dispatched event changed.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Session balance after the merge.
    Balance(Balance),
    RoomMessage(ChatMessage),
    GlobalMessage(ChatMessage),
    /// Server rejected something the user sent. Nothing was appended.
    Moderation(String),
    /// Event had nowhere to go (no session, no active room).
    Ignored,
}

/// Apply one server event. Events from any room may be passed in any order;
/// each only touches the state it owns.
pub fn dispatch(event: ServerEvent, session: &Session, chat: &mut ChatLog) -> Effect {
    match event {
        ServerEvent::BalanceUpdate(update) => match session.apply_balance_update(&update) {
            Some(balance) => {
                debug!(gc = balance.gc_balance, sc = balance.sc_balance, "balance pushed");
                Effect::Balance(balance)
            }
            None => Effect::Ignored,
        },
        ServerEvent::ChatMessage(message) => {
            if chat.push_room(message.clone()) {
                Effect::RoomMessage(message)
            } else {
                Effect::Ignored
            }
        }
        ServerEvent::NewGlobalMessage(message) => {
            chat.push_global(message.clone());
            Effect::GlobalMessage(message)
        }
        ServerEvent::ModerationAction { error } => {
            info!(%error, "message moderated");
            chat.push_warning(error.clone());
            Effect::Moderation(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::profile;
    use sweeps_types::BalanceUpdate;

    fn message(id: u64) -> ChatMessage {
        ChatMessage {
            id,
            user_id: 2,
            username: "cy".to_string(),
            avatar_url: None,
            message: "gl".to_string(),
            created_at: 0,
        }
    }

    #[test]
    fn test_balance_update_merges_into_session() {
        let session = Session::new();
        let mut chat = ChatLog::default();
        let update = ServerEvent::BalanceUpdate(BalanceUpdate {
            gc_balance: Some(42.0),
            sc_balance: None,
        });
        assert_eq!(dispatch(update.clone(), &session, &mut chat), Effect::Ignored);

        session.login(profile(1.0, 2.0));
        let expected = Effect::Balance(Balance {
            gc_balance: 42.0,
            sc_balance: 2.0,
        });
        assert_eq!(dispatch(update.clone(), &session, &mut chat), expected);
        assert_eq!(dispatch(update, &session, &mut chat), expected);
    }

    #[test]
    fn test_moderation_never_appends() {
        let session = Session::new();
        let mut chat = ChatLog::default();
        let effect = dispatch(
            ServerEvent::ModerationAction {
                error: "Message contains prohibited content".to_string(),
            },
            &session,
            &mut chat,
        );
        assert!(matches!(effect, Effect::Moderation(_)));
        assert_eq!(chat.global().count(), 0);
        assert_eq!(chat.warnings().count(), 1);
    }

    #[test]
    fn test_chat_routing() {
        let session = Session::new();
        let mut chat = ChatLog::default();
        assert_eq!(
            dispatch(ServerEvent::ChatMessage(message(1)), &session, &mut chat),
            Effect::Ignored
        );
        chat.enter_room("dice");
        dispatch(ServerEvent::ChatMessage(message(2)), &session, &mut chat);
        dispatch(ServerEvent::NewGlobalMessage(message(3)), &session, &mut chat);
        assert_eq!(chat.game().len(), 1);
        assert_eq!(chat.global().count(), 1);
    }
}
