pub mod ai;
pub mod celebration;
pub mod channel;
pub mod chat;
pub mod client;
pub mod config;
pub mod events;
pub mod flow;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod pull_tab;
pub mod reveal;
pub mod scratch;
pub mod session;
pub mod sync;

pub use channel::{ChannelManager, ChannelOptions, Scope};
pub use client::{Client, GameApi, RetryPolicy};
pub use events::{ChannelEvent, Subscription};
pub use flow::{RoundFlow, TicketFlow};
pub use reveal::{Action, Phase, RevealMachine};
pub use session::Session;
use sweeps_types::{OutcomeError, RequestError};
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("outcome unknown, check balance and history before retrying: {0}")]
    UnknownOutcome(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error("invalid outcome: {0}")]
    InvalidOutcome(#[from] OutcomeError),
    #[error("not authenticated")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid data: {0}")]
    InvalidData(#[from] serde_json::Error),
    #[error("another action is in flight")]
    Busy,
    #[error("already revealed")]
    AlreadyRevealed,
    #[error("cannot {action} while {phase}")]
    InvalidTransition { action: Action, phase: Phase },
    #[error("not logged in")]
    NotLoggedIn,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("dial timeout")]
    DialTimeout,
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("no channel joined for {0}")]
    NotJoined(String),
}

impl Error {
    /// Whether the server may have applied the request despite the error.
    pub fn is_indeterminate(&self) -> bool {
        match self {
            Error::Reqwest(_) | Error::InvalidData(_) | Error::UnknownOutcome(_) => true,
            Error::Failed(status) => status.is_server_error(),
            _ => false,
        }
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequest(RequestError::InsufficientFunds { .. })
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ai::{AiBuilderSession, AiChatPoller},
        celebration::{Headline, WinCelebration},
        chat::ChatLog,
        sync::{dispatch, Effect},
    };
    use axum::{
        extract::Request,
        http::StatusCode,
        middleware::{self, Next},
        response::IntoResponse,
        Router,
    };
    use std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };
    use sweeps_simulator::{Api, Calls, Simulator};
    use sweeps_types::{
        api::AiRole, realtime::ClientEvent, Balance, Currency, DiceDirection, GameRoundOutcome,
        GameRoundRequest, TicketStatus, UserProfile,
    };
    use tokio::time::{sleep, timeout, Duration};

    struct TestContext {
        simulator: Arc<Simulator>,
        base_url: String,
        server_handle: tokio::task::JoinHandle<()>,
        profile: UserProfile,
        token: String,
    }

    impl TestContext {
        async fn new() -> Self {
            Self::with_router(|router| router).await
        }

        /// Serve the simulator behind extra layers added by `wrap`.
        async fn with_router(wrap: impl FnOnce(Router) -> Router) -> Self {
            let simulator = Arc::new(Simulator::new(42));
            let (profile, token) = simulator.register_user("ada", 1_000.0, 20.0);
            let api = Api::new(simulator.clone());

            // Start server on random port
            let addr = SocketAddr::from(([127, 0, 0, 1], 0));
            let router = wrap(api.router());
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            let actual_addr = listener.local_addr().unwrap();
            let base_url = format!("http://{actual_addr}");

            let server_handle = tokio::spawn(async move {
                axum::serve(
                    listener,
                    router.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .await
                .unwrap();
            });

            // Give server time to start
            sleep(Duration::from_millis(100)).await;

            Self {
                simulator,
                base_url,
                server_handle,
                profile,
                token,
            }
        }

        fn create_client(&self) -> Client {
            Client::new(&self.base_url)
                .unwrap()
                .with_session_token(self.token.clone())
        }

        async fn logged_in(&self, client: &Client) -> Session {
            let session = Session::new();
            session.refresh(client).await.unwrap();
            session
        }

        fn channel_options(&self) -> ChannelOptions {
            ChannelOptions {
                reconnect_delay: Duration::from_millis(50),
                dial_timeout: Duration::from_secs(2),
                capacity: 0,
            }
        }

        /// Block until the simulator's counters satisfy `done`.
        async fn wait_until(&self, done: impl Fn(Calls) -> bool) {
            timeout(Duration::from_secs(5), async {
                while !done(self.simulator.calls()) {
                    sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();
        }

        /// Block until the server has processed `count` room joins.
        async fn wait_for_joins(&self, count: usize) {
            self.wait_until(|calls| calls.joins >= count).await;
        }
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            self.server_handle.abort();
        }
    }

    async fn next_event(subscription: &mut Subscription) -> sweeps_types::realtime::ServerEvent {
        timeout(Duration::from_secs(5), subscription.next_event())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_slot_spin_big_win() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();
        let session = ctx.logged_in(&client).await;

        let mut forced = GameRoundOutcome::win(500.0);
        forced.reels = Some(vec![6, 6, 6]);
        ctx.simulator.force_outcome(forced);

        let flow = RoundFlow::new(&client, &session, vec![Currency::Gc, Currency::Sc]);
        let request = GameRoundRequest::slots(1, 10.0, Currency::Gc);
        let outcome = flow.play(request.clone()).await.unwrap();

        let reels: Vec<&str> = outcome
            .reels
            .as_ref()
            .unwrap()
            .iter()
            .map(|&r| sweeps_types::slot_symbol(r))
            .collect();
        assert_eq!(reels, vec!["7️⃣", "7️⃣", "7️⃣"]);

        let celebration =
            WinCelebration::for_round(&outcome, &request, session.referral_code()).unwrap();
        assert_eq!(celebration.headline(), Headline::BigWin);
        assert_eq!(celebration.amount_label(), "+500 GC");

        // Balance comes from the refresh, not local arithmetic
        assert_eq!(session.balance().unwrap().gc_balance, 1_490.0);
        assert_eq!(ctx.simulator.calls().me, 2);
    }

    #[tokio::test]
    async fn test_dice_roll_and_validation() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let mut forced = GameRoundOutcome::win(19.8);
        forced.roll = Some(73.4);
        ctx.simulator.force_outcome(forced);
        let request = GameRoundRequest::dice(2, 10.0, Currency::Gc, 50.0, DiceDirection::Over);
        let outcome = client.submit_round(&request).await.unwrap();
        assert_eq!(outcome.roll, Some(73.4));
        assert!(DiceDirection::Over.wins(73.4, 50.0));
        assert!(!DiceDirection::Over.wins(22.1, 50.0));

        // Server-side rejection maps to a validation error
        let hopeless = GameRoundRequest::dice(2, 1.0, Currency::Gc, 0.0, DiceDirection::Under);
        assert!(matches!(
            client.submit_round(&hopeless).await,
            Err(Error::Validation(_))
        ));

        // A payload breaking the win/amount invariant is refused
        ctx.simulator.force_outcome(GameRoundOutcome {
            is_win: true,
            ..GameRoundOutcome::loss()
        });
        assert!(matches!(
            client.submit_round(&request).await,
            Err(Error::InvalidOutcome(_))
        ));
    }

    #[tokio::test]
    async fn test_ticket_purchase_reveal_claim() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();
        let session = ctx.logged_in(&client).await;

        let types = client.ticket_types().await.unwrap();
        let ticket = types.into_iter().find(|t| t.id == 1).unwrap();
        ctx.simulator.force_outcome(GameRoundOutcome::win(5.0));

        let flow = TicketFlow::new(&client, &session, ticket);
        let purchase_id = flow.purchase().await.unwrap();
        assert_eq!(session.balance().unwrap().sc_balance, 19.0);
        flow.reveal().await.unwrap();
        assert_eq!(
            ctx.simulator.purchase_status(purchase_id),
            Some(TicketStatus::Revealed)
        );

        let refreshes = ctx.simulator.calls().me;
        flow.claim().await.unwrap();
        assert_eq!(flow.phase(), Phase::Claimed);
        assert_eq!(ctx.simulator.calls().me, refreshes + 1);
        assert_eq!(session.balance().unwrap().sc_balance, 24.0);
        assert_eq!(
            ctx.simulator.purchase_status(purchase_id),
            Some(TicketStatus::Claimed)
        );

        // The server refuses a second settlement as well
        assert!(matches!(
            client.save_ticket(purchase_id).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            client.reveal_purchase(purchase_id).await,
            Err(Error::Conflict(_))
        ));
        assert_eq!(ctx.simulator.calls().reveals, 1);
        assert_eq!(ctx.simulator.calls().claims, 1);
    }

    #[tokio::test]
    async fn test_balance_push_survives_reconnect() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();
        let session = ctx.logged_in(&client).await;
        let mut chat = ChatLog::default();

        let mut manager = ChannelManager::new(&client, ctx.channel_options()).unwrap();
        let mut subscription = manager.join(Scope::User(ctx.profile.id)).await;
        subscription.connected().await.unwrap();
        ctx.wait_for_joins(1).await;

        let pushed = Balance {
            gc_balance: 777.0,
            sc_balance: 3.0,
        };
        ctx.simulator.set_balance(ctx.profile.id, pushed);
        let event = next_event(&mut subscription).await;
        assert_eq!(dispatch(event.clone(), &session, &mut chat), Effect::Balance(pushed));
        assert_eq!(dispatch(event, &session, &mut chat), Effect::Balance(pushed));

        // Server forgets room membership; the channel must join again
        ctx.simulator.drop_connections();
        timeout(Duration::from_secs(5), async {
            loop {
                match subscription.next().await {
                    Some(ChannelEvent::Disconnected) => break,
                    Some(_) => continue,
                    None => panic!("subscription closed"),
                }
            }
        })
        .await
        .unwrap();
        timeout(Duration::from_secs(5), subscription.connected())
            .await
            .unwrap()
            .unwrap();
        ctx.wait_for_joins(2).await;

        ctx.simulator.set_balance(
            ctx.profile.id,
            Balance {
                gc_balance: 1.0,
                sc_balance: 3.0,
            },
        );
        let event = next_event(&mut subscription).await;
        dispatch(event, &session, &mut chat);
        assert_eq!(session.balance().unwrap().gc_balance, 1.0);

        let key = Scope::User(ctx.profile.id).key();
        manager.leave(&key).await.unwrap();
        assert!(!manager.is_joined(&key));
    }

    #[tokio::test]
    async fn test_global_chat_moderation() {
        let ctx = TestContext::new().await;
        ctx.simulator.set_banned_words(vec!["scam".to_string()]);
        let client = ctx.create_client();
        let session = ctx.logged_in(&client).await;
        let mut chat = ChatLog::default();
        chat.load_global(client.global_chat_history().await.unwrap());

        let mut manager = ChannelManager::new(&client, ctx.channel_options()).unwrap();
        let mut subscription = manager.join(Scope::GlobalChat).await;
        subscription.connected().await.unwrap();
        ctx.wait_for_joins(1).await;

        manager
            .send(
                "global",
                ClientEvent::SendGlobalMessage {
                    user_id: ctx.profile.id,
                    message: "total scam".to_string(),
                },
            )
            .unwrap();
        let event = next_event(&mut subscription).await;
        assert_eq!(
            dispatch(event, &session, &mut chat),
            Effect::Moderation("Message contains prohibited content".to_string())
        );
        assert_eq!(chat.global().count(), 0);

        manager
            .send(
                "global",
                ClientEvent::SendGlobalMessage {
                    user_id: ctx.profile.id,
                    message: "good luck".to_string(),
                },
            )
            .unwrap();
        let event = next_event(&mut subscription).await;
        assert!(matches!(
            dispatch(event, &session, &mut chat),
            Effect::GlobalMessage(_)
        ));
        assert_eq!(chat.global().count(), 1);
        assert_eq!(chat.take_warnings().len(), 1);
        assert_eq!(ctx.simulator.global_history().len(), 1);
        manager.close_all().await;
    }

    #[tokio::test]
    async fn test_game_room_chat() {
        let ctx = TestContext::new().await;
        ctx.simulator.set_banned_words(vec!["scam".to_string()]);
        let client = ctx.create_client();
        let session = ctx.logged_in(&client).await;
        let mut chat = ChatLog::default();

        let scope = Scope::GameRoom {
            slug: "slots".to_string(),
            user: session.chat_user().unwrap(),
        };
        let key = scope.key();
        let mut manager = ChannelManager::new(&client, ctx.channel_options()).unwrap();
        let mut subscription = manager.join(scope).await;
        subscription.connected().await.unwrap();
        ctx.wait_for_joins(1).await;
        chat.load_room("slots", client.game_chat_history("slots").await.unwrap());

        client.post_game_chat("slots", "nice spin").await.unwrap();
        let event = next_event(&mut subscription).await;
        assert!(matches!(
            dispatch(event, &session, &mut chat),
            Effect::RoomMessage(_)
        ));
        assert_eq!(chat.game().len(), 1);
        assert_eq!(chat.game()[0].username, "ada");

        assert!(matches!(
            client.post_game_chat("slots", "scam link").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(client.game_chat_history("slots").await.unwrap().len(), 1);

        manager.leave(&key).await.unwrap();
        assert!(matches!(manager.leave(&key).await, Err(Error::NotJoined(_))));
    }

    #[tokio::test]
    async fn test_rejoin_leaves_previous_room() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();
        let session = ctx.logged_in(&client).await;
        let scope = Scope::GameRoom {
            slug: "dice".to_string(),
            user: session.chat_user().unwrap(),
        };

        let mut manager = ChannelManager::new(&client, ctx.channel_options()).unwrap();
        let mut first = manager.join(scope.clone()).await;
        first.connected().await.unwrap();
        ctx.wait_for_joins(1).await;

        let mut second = manager.join(scope.clone()).await;
        ctx.wait_until(|calls| calls.leaves == 1).await;
        second.connected().await.unwrap();
        ctx.wait_for_joins(2).await;
        assert!(timeout(Duration::from_secs(5), first.next())
            .await
            .unwrap()
            .is_none());

        client.post_game_chat("dice", "hello").await.unwrap();
        let event = next_event(&mut second).await;
        assert!(matches!(
            event,
            sweeps_types::realtime::ServerEvent::ChatMessage(_)
        ));
        manager.close_all().await;
        ctx.wait_until(|calls| calls.leaves == 2).await;
    }

    #[tokio::test]
    async fn test_ai_builder_and_employee_poll() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client();

        let mut builder = AiBuilderSession::new();
        let first = builder.send(&client, "a pirate slot").await.unwrap();
        let second = builder.send(&client, "more gold").await.unwrap();
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(builder.session_id(), Some(first.session_id.as_str()));
        assert_eq!(builder.preview_step(), 2);
        assert_eq!(builder.transcript().len(), 4);
        assert!(!builder.variations().is_empty());

        ctx.simulator
            .post_ai_message(5, AiRole::Assistant, "Daily report ready");
        ctx.simulator.post_ai_message(5, AiRole::User, "Thanks");
        let mut poller = AiChatPoller::new(5, Duration::from_millis(10));
        assert_eq!(poller.next(&client).await.unwrap().len(), 2);
        assert!(poller.next(&client).await.unwrap().is_empty());
        ctx.simulator.post_ai_message(5, AiRole::Assistant, "Anything else?");
        let fresh = poller.next(&client).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].content, "Anything else?");
    }

    #[tokio::test]
    async fn test_auth_errors_and_logout() {
        let ctx = TestContext::new().await;
        let anonymous = Client::new(&ctx.base_url).unwrap();
        assert!(matches!(anonymous.me().await, Err(Error::Unauthorized)));

        let client = ctx.create_client();
        let session = ctx.logged_in(&client).await;
        session.logout(&client).await.unwrap();
        assert!(!session.is_logged_in());
        assert!(matches!(client.me().await, Err(Error::Unauthorized)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unknown_outcome() {
        let client = Client::with_timeout("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let request = GameRoundRequest::slots(1, 1.0, Currency::Gc);
        let err = client.submit_round(&request).await.unwrap_err();
        assert!(matches!(err, Error::UnknownOutcome(_)));
        assert!(err.is_indeterminate());
    }

    #[tokio::test]
    async fn test_retried_submission_carries_idempotency_key() {
        let ctx = TestContext::new().await;
        let client = ctx.create_client().with_retry_policy(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            retry_non_idempotent: true,
        });
        let request = GameRoundRequest::slots(1, 1.0, Currency::Gc);
        client.submit_round(&request).await.unwrap();
        client.submit_round(&request).await.unwrap();
        // Distinct logical requests get distinct keys
        assert_eq!(ctx.simulator.calls().rounds, 2);
        assert_eq!(ctx.simulator.calls().replays, 0);
    }

    #[tokio::test]
    async fn test_retry_after_lost_response_replays_round() {
        // The first wager is applied, but its response is replaced by a 503
        let lost = Arc::new(AtomicBool::new(false));
        let ctx = TestContext::with_router(move |router| {
            router.layer(middleware::from_fn(move |request: Request, next: Next| {
                let lost = lost.clone();
                async move {
                    let wager = request.uri().path().starts_with("/api/games/");
                    let response = next.run(request).await;
                    if wager && !lost.swap(true, Ordering::SeqCst) {
                        return StatusCode::SERVICE_UNAVAILABLE.into_response();
                    }
                    response
                }
            }))
        })
        .await;
        let request = GameRoundRequest::slots(1, 1.0, Currency::Gc);

        let client = ctx.create_client().with_retry_policy(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            retry_non_idempotent: true,
        });
        let outcome = client.submit_round(&request).await.unwrap();
        outcome.check().unwrap();
        assert_eq!(ctx.simulator.calls().rounds, 1);
        assert_eq!(ctx.simulator.calls().replays, 1);

        // Balance moved once
        let expected = 1_000.0 - 1.0 + outcome.win_amount;
        assert_eq!(client.me().await.unwrap().gc_balance, expected);
    }

    #[tokio::test]
    async fn test_lost_response_without_retry_is_unknown_outcome() {
        let lost = Arc::new(AtomicBool::new(false));
        let ctx = TestContext::with_router(move |router| {
            router.layer(middleware::from_fn(move |request: Request, next: Next| {
                let lost = lost.clone();
                async move {
                    let response = next.run(request).await;
                    if !lost.swap(true, Ordering::SeqCst) {
                        return StatusCode::SERVICE_UNAVAILABLE.into_response();
                    }
                    response
                }
            }))
        })
        .await;
        let client = ctx.create_client();
        let request = GameRoundRequest::slots(1, 1.0, Currency::Gc);
        assert!(matches!(
            client.submit_round(&request).await,
            Err(Error::UnknownOutcome(_))
        ));
        assert_eq!(ctx.simulator.calls().rounds, 1);
    }

    #[test]
    fn test_invalid_scheme() {
        assert!(matches!(
            Client::new("ftp://localhost:8080"),
            Err(Error::InvalidScheme(_))
        ));
    }
}
