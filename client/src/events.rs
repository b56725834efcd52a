use crate::{Error, Result};
use futures_util::Stream as FutStream;
use sweeps_types::realtime::ServerEvent;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle and payload notifications of one realtime channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// Socket (re)connected and the room join was sent.
    Connected,
    /// A server event arrived on the room.
    Event(ServerEvent),
    /// Socket dropped; a reconnect follows unless the channel was left.
    Disconnected,
}

/// Stream of events from one realtime channel.
pub struct Subscription {
    receiver: mpsc::Receiver<ChannelEvent>,
}

impl Subscription {
    pub(crate) fn channel(capacity: usize) -> (mpsc::Sender<ChannelEvent>, Self) {
        let capacity = if capacity == 0 {
            DEFAULT_CHANNEL_CAPACITY
        } else {
            capacity
        };
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { receiver: rx })
    }

    /// Receive the next notification from the channel
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.receiver.recv().await
    }

    /// Receive the next server event, skipping lifecycle notifications.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        loop {
            match self.receiver.recv().await? {
                ChannelEvent::Event(event) => return Some(event),
                other => debug!(?other, "skipping lifecycle notification"),
            }
        }
    }

    /// Wait until the channel reports a (re)connection.
    pub async fn connected(&mut self) -> Result<()> {
        loop {
            match self.receiver.recv().await {
                Some(ChannelEvent::Connected) => return Ok(()),
                Some(_) => continue,
                None => return Err(Error::ConnectionClosed),
            }
        }
    }
}

impl FutStream for Subscription {
    type Item = ChannelEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Decoded form of one inbound frame.
pub(crate) enum Frame {
    Event(ServerEvent),
    Closed,
    Skip,
}

pub(crate) fn decode_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
            Ok(event) => {
                debug!(event = event.name(), "received event");
                Frame::Event(event)
            }
            Err(e) => {
                warn!("Failed to decode event: {}", e);
                Frame::Skip
            }
        },
        Message::Close(_) => {
            debug!("WebSocket closed");
            Frame::Closed
        }
        _ => Frame::Skip, // Ignore other message types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeps_types::BalanceUpdate;

    #[test]
    fn test_decode_frame() {
        let text = r#"{"event":"balance-update","data":{"gc_balance":12.5}}"#;
        match decode_frame(Message::Text(text.to_string())) {
            Frame::Event(ServerEvent::BalanceUpdate(update)) => assert_eq!(
                update,
                BalanceUpdate {
                    gc_balance: Some(12.5),
                    sc_balance: None,
                }
            ),
            _ => panic!("expected balance update"),
        }
        assert!(matches!(
            decode_frame(Message::Text("not json".to_string())),
            Frame::Skip
        ));
        assert!(matches!(decode_frame(Message::Close(None)), Frame::Closed));
        assert!(matches!(decode_frame(Message::Ping(vec![1])), Frame::Skip));
    }

    #[tokio::test]
    async fn test_next_event_skips_lifecycle() {
        let (tx, mut subscription) = Subscription::channel(0);
        tx.send(ChannelEvent::Connected).await.unwrap();
        tx.send(ChannelEvent::Event(ServerEvent::ModerationAction {
            error: "blocked".to_string(),
        }))
        .await
        .unwrap();
        drop(tx);
        assert_eq!(
            subscription.next_event().await,
            Some(ServerEvent::ModerationAction {
                error: "blocked".to_string()
            })
        );
        assert_eq!(subscription.next_event().await, None);
    }
}
