//! Admin AI tooling: the game builder conversation and the polled
//! AI-employee chat.

use crate::{Client, Result};
use std::time::Duration;
use sweeps_types::api::{AiBuilderReply, AiBuilderRequest, AiChatMessage, AiRole, AiTurn};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

/// One builder conversation. The server assigns the session id on the first
/// reply; every later message echoes it. Dropping the value abandons the
/// conversation.
#[derive(Clone, Debug, Default)]
pub struct AiBuilderSession {
    session_id: Option<String>,
    transcript: Vec<AiTurn>,
    preview_step: u32,
    variations: Vec<String>,
}

impl AiBuilderSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn transcript(&self) -> &[AiTurn] {
        &self.transcript
    }

    pub fn preview_step(&self) -> u32 {
        self.preview_step
    }

    pub fn variations(&self) -> &[String] {
        &self.variations
    }

    /// Body for the next message.
    pub fn request(&self, message: &str) -> AiBuilderRequest {
        AiBuilderRequest {
            session_id: self.session_id.clone(),
            message: message.to_string(),
        }
    }

    /// Record a completed exchange.
    pub fn apply(&mut self, message: &str, reply: &AiBuilderReply) {
        if self.session_id.is_none() {
            debug!(session = %reply.session_id, "builder session started");
        }
        self.session_id = Some(reply.session_id.clone());
        self.transcript.push(AiTurn {
            role: AiRole::User,
            content: message.to_string(),
        });
        self.transcript.push(AiTurn {
            role: AiRole::Assistant,
            content: reply.reply.clone(),
        });
        self.preview_step = reply.preview_step;
        self.variations = reply.variations.clone();
    }

    /// Send a message and record the reply. A failed send leaves the
    /// transcript untouched.
    pub async fn send(&mut self, client: &Client, message: &str) -> Result<AiBuilderReply> {
        let reply = client.ai_builder_message(&self.request(message)).await?;
        self.apply(message, &reply);
        Ok(reply)
    }
}

/// Polls one AI employee's conversation for messages newer than the last
/// one seen.
pub struct AiChatPoller {
    employee_id: u64,
    last_id: Option<u64>,
    ticker: Interval,
}

impl AiChatPoller {
    pub fn new(employee_id: u64, every: Duration) -> Self {
        let mut ticker = interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            employee_id,
            last_id: None,
            ticker,
        }
    }

    pub fn last_id(&self) -> Option<u64> {
        self.last_id
    }

    /// Fetch messages after the last seen id without waiting.
    pub async fn poll(&mut self, client: &Client) -> Result<Vec<AiChatMessage>> {
        let messages = client
            .ai_employee_messages(self.employee_id, self.last_id)
            .await?;
        if let Some(newest) = messages.iter().map(|m| m.id).max() {
            self.last_id = Some(self.last_id.map_or(newest, |last| last.max(newest)));
        }
        Ok(messages)
    }

    /// Wait for the next tick, then poll. The first call returns immediately.
    pub async fn next(&mut self, client: &Client) -> Result<Vec<AiChatMessage>> {
        self.ticker.tick().await;
        self.poll(client).await
    }
}
