use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State as AxumState,
    },
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};
use sweeps_types::{
    api::{
        AiBuilderReply, AiBuilderRequest, AiChatMessage, AiRole, ApiError, OkResponse,
        PostChatRequest, PurchaseRef, PurchaseRequest, PurchaseResponse, SettleResponse,
    },
    realtime::{ClientEvent, ServerEvent},
    Balance, ChatMessage, ChatUser, Currency, GameParams, GameRoundOutcome, GameRoundRequest,
    PurchaseId, TicketKind, TicketPurchase, TicketStatus, TicketType, UserId, UserProfile,
    DEFAULT_PULL_TABS, GLOBAL_CHAT_WINDOW, IDEMPOTENCY_KEY_HEADER, MAX_CHAT_MESSAGE_LENGTH,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{Any, CorsLayer};

pub mod games;

/// Realtime room an event is delivered to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Room {
    User(UserId),
    Game(String),
    Global,
}

/// A server event addressed to one room.
#[derive(Clone, Debug)]
pub struct Routed {
    pub room: Room,
    pub event: ServerEvent,
}

/// Requests served per endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub rounds: usize,
    pub purchases: usize,
    pub reveals: usize,
    pub claims: usize,
    pub saves: usize,
    pub me: usize,
    pub logouts: usize,
    pub joins: usize,
    pub leaves: usize,
    pub replays: usize,
}

/// Request rejected with a status and a user-facing message.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{status}: {error}")]
pub struct Reject {
    pub status: StatusCode,
    pub error: String,
}

impl Reject {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Not authenticated")
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, error)
    }

    fn conflict(error: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, error)
    }

    fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }
}

impl IntoResponse for Reject {
    fn into_response(self) -> Response {
        (self.status, Json(ApiError::new(self.error))).into_response()
    }
}

struct Purchase {
    owner: UserId,
    record: TicketPurchase,
    outcome: Option<GameRoundOutcome>,
}

#[derive(Default)]
pub struct State {
    users: HashMap<UserId, UserProfile>,
    tokens: HashMap<String, UserId>,
    next_user_id: UserId,

    ticket_types: Vec<TicketType>,
    purchases: HashMap<PurchaseId, Purchase>,
    next_purchase_id: PurchaseId,

    game_chat: HashMap<String, Vec<ChatMessage>>,
    global_chat: VecDeque<ChatMessage>,
    next_message_id: u64,
    banned_words: Vec<String>,

    ai_sessions: HashMap<String, u32>,
    ai_messages: HashMap<u64, Vec<AiChatMessage>>,

    replies: HashMap<(UserId, String), (StatusCode, serde_json::Value)>,
    forced: VecDeque<GameRoundOutcome>,
    calls: Calls,

    outbox: Vec<Routed>,
}

impl State {
    fn user(&self, id: UserId) -> Result<&UserProfile, Reject> {
        self.users.get(&id).ok_or_else(Reject::unauthorized)
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut UserProfile, Reject> {
        self.users.get_mut(&id).ok_or_else(Reject::unauthorized)
    }

    fn debit(&mut self, id: UserId, currency: Currency, amount: f64) -> Result<(), Reject> {
        let user = self.user_mut(id)?;
        let balance = match currency {
            Currency::Gc => &mut user.gc_balance,
            Currency::Sc => &mut user.sc_balance,
        };
        if amount > *balance {
            return Err(Reject::invalid("Insufficient balance"));
        }
        *balance = games::cents(*balance - amount);
        Ok(())
    }

    fn credit(&mut self, id: UserId, currency: Currency, amount: f64) -> Result<(), Reject> {
        let user = self.user_mut(id)?;
        match currency {
            Currency::Gc => user.gc_balance = games::cents(user.gc_balance + amount),
            Currency::Sc => user.sc_balance = games::cents(user.sc_balance + amount),
        }
        Ok(())
    }

    /// Queue the owner's current balance for their user room.
    fn push_balance(&mut self, id: UserId) {
        if let Some(user) = self.users.get(&id) {
            let balance: Balance = user.balance();
            self.outbox.push(Routed {
                room: Room::User(id),
                event: ServerEvent::BalanceUpdate(balance.into()),
            });
        }
    }

    fn is_flagged(&self, message: &str) -> Option<String> {
        if message.trim().is_empty() {
            return Some("Message cannot be empty".to_string());
        }
        if message.chars().count() > MAX_CHAT_MESSAGE_LENGTH {
            return Some(format!(
                "Message exceeds {MAX_CHAT_MESSAGE_LENGTH} characters"
            ));
        }
        let lowered = message.to_lowercase();
        self.banned_words
            .iter()
            .any(|word| lowered.contains(word.as_str()))
            .then(|| "Message contains prohibited content".to_string())
    }

    fn chat_message(&mut self, user: UserId, message: &str) -> Result<ChatMessage, Reject> {
        let profile = self.user(user)?;
        let username = profile.username.clone();
        let avatar_url = profile.avatar_url.clone();
        self.next_message_id += 1;
        Ok(ChatMessage {
            id: self.next_message_id,
            user_id: user,
            username,
            avatar_url,
            message: message.to_string(),
            created_at: now_millis(),
        })
    }

    fn play_round(
        &mut self,
        rng: &mut StdRng,
        user: UserId,
        slug: &str,
        request: &GameRoundRequest,
    ) -> Result<GameRoundOutcome, Reject> {
        if !request.bet_amount.is_finite() || request.bet_amount <= 0.0 {
            return Err(Reject::invalid("Bet amount must be positive"));
        }
        if request.slug != slug {
            return Err(Reject::invalid(format!(
                "request for {} sent to {slug}",
                request.slug
            )));
        }

        if request.bet_amount > self.user(user)?.balance().get(request.currency) {
            return Err(Reject::invalid("Insufficient balance"));
        }
        let forced = self.forced.pop_front();
        let outcome = match (forced, &request.params) {
            (Some(outcome), _) => outcome,
            (None, GameParams::Slots) => games::spin(rng, request.bet_amount),
            (None, GameParams::Dice { target, direction }) => {
                games::roll(rng, request.bet_amount, *target, *direction)
                    .ok_or_else(|| Reject::invalid("Dice target leaves no chance to win"))?
            }
            (None, GameParams::Custom { .. }) => games::coin(rng, request.bet_amount),
        };

        self.debit(user, request.currency, request.bet_amount)?;
        self.calls.rounds += 1;
        if outcome.is_win {
            self.credit(user, request.currency, outcome.win_amount)?;
        }
        self.push_balance(user);
        tracing::info!(
            user,
            slug,
            bet = request.bet_amount,
            is_win = outcome.is_win,
            win = outcome.win_amount,
            "round played"
        );
        Ok(outcome)
    }

    fn purchase(&mut self, user: UserId, ticket_type_id: u64) -> Result<PurchaseId, Reject> {
        let ticket = self
            .ticket_types
            .iter()
            .find(|t| t.id == ticket_type_id)
            .cloned()
            .ok_or_else(|| Reject::not_found("Unknown ticket type"))?;
        self.debit(user, ticket.currency, ticket.price)?;
        self.calls.purchases += 1;
        self.next_purchase_id += 1;
        let purchase_id = self.next_purchase_id;
        self.purchases.insert(
            purchase_id,
            Purchase {
                owner: user,
                record: TicketPurchase {
                    purchase_id,
                    ticket_type_id,
                    price: ticket.price,
                    currency: ticket.currency,
                    status: TicketStatus::Purchased,
                },
                outcome: None,
            },
        );
        self.push_balance(user);
        tracing::info!(user, purchase_id, ticket = ticket_type_id, "ticket purchased");
        Ok(purchase_id)
    }

    fn owned_purchase(
        &mut self,
        user: UserId,
        purchase_id: PurchaseId,
    ) -> Result<&mut Purchase, Reject> {
        match self.purchases.get_mut(&purchase_id) {
            Some(purchase) if purchase.owner == user => Ok(purchase),
            _ => Err(Reject::not_found("Unknown purchase")),
        }
    }

    fn reveal(
        &mut self,
        rng: &mut StdRng,
        user: UserId,
        purchase_id: PurchaseId,
    ) -> Result<GameRoundOutcome, Reject> {
        let forced = self.forced.front().is_some();
        let purchase = self.owned_purchase(user, purchase_id)?;
        if purchase.record.status != TicketStatus::Purchased {
            return Err(Reject::conflict("Ticket already revealed"));
        }
        let price = purchase.record.price;
        let outcome = if forced {
            self.forced.pop_front().unwrap_or_else(GameRoundOutcome::loss)
        } else {
            games::ticket(rng, price)
        };
        let purchase = self.owned_purchase(user, purchase_id)?;
        purchase.record.status = TicketStatus::Revealed;
        purchase.outcome = Some(outcome.clone());
        self.calls.reveals += 1;
        tracing::info!(user, purchase_id, is_win = outcome.is_win, "ticket revealed");
        Ok(outcome)
    }

    fn settle(
        &mut self,
        user: UserId,
        purchase_id: PurchaseId,
        status: TicketStatus,
    ) -> Result<SettleResponse, Reject> {
        let purchase = self.owned_purchase(user, purchase_id)?;
        let outcome = match (&purchase.record.status, &purchase.outcome) {
            (TicketStatus::Revealed, Some(outcome)) if outcome.is_win => outcome.clone(),
            (TicketStatus::Revealed, _) => return Err(Reject::conflict("Nothing to claim")),
            (TicketStatus::Claimed, _) => return Err(Reject::conflict("Ticket already claimed")),
            (TicketStatus::Saved, _) => return Err(Reject::conflict("Ticket already saved")),
            _ => return Err(Reject::conflict("Ticket not revealed")),
        };
        purchase.record.status = status;
        let currency = purchase.record.currency;
        if status == TicketStatus::Claimed {
            self.calls.claims += 1;
            self.credit(user, currency, outcome.win_amount)?;
            self.push_balance(user);
        } else {
            self.calls.saves += 1;
        }
        tracing::info!(user, purchase_id, ?status, "ticket settled");
        Ok(SettleResponse {
            success: true,
            status,
            message: None,
        })
    }

    fn post_game_chat(&mut self, user: UserId, slug: &str, text: &str) -> Result<(), Reject> {
        if let Some(error) = self.is_flagged(text) {
            return Err(Reject::invalid(error));
        }
        let message = self.chat_message(user, text)?;
        self.game_chat
            .entry(slug.to_string())
            .or_default()
            .push(message.clone());
        self.outbox.push(Routed {
            room: Room::Game(slug.to_string()),
            event: ServerEvent::ChatMessage(message),
        });
        Ok(())
    }

    /// Err carries the moderation message for the sender.
    fn post_global(&mut self, user: UserId, text: &str) -> Result<(), String> {
        if let Some(error) = self.is_flagged(text) {
            return Err(error);
        }
        let message = self.chat_message(user, text).map_err(|reject| reject.error)?;
        if self.global_chat.len() == GLOBAL_CHAT_WINDOW {
            self.global_chat.pop_front();
        }
        self.global_chat.push_back(message.clone());
        self.outbox.push(Routed {
            room: Room::Global,
            event: ServerEvent::NewGlobalMessage(message),
        });
        Ok(())
    }

    fn ai_builder(&mut self, request: &AiBuilderRequest) -> AiBuilderReply {
        let session_id = match &request.session_id {
            Some(id) if self.ai_sessions.contains_key(id) => id.clone(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let step = self.ai_sessions.entry(session_id.clone()).or_insert(0);
        *step += 1;
        let variations = if *step >= 2 {
            ["Classic", "Neon", "Jungle"]
                .iter()
                .map(|theme| format!("{theme}: {}", request.message))
                .collect()
        } else {
            Vec::new()
        };
        AiBuilderReply {
            session_id,
            reply: format!("Step {step}: noted \"{}\"", request.message),
            preview_step: *step,
            variations,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Catalog served when none is configured.
pub fn default_ticket_types() -> Vec<TicketType> {
    vec![
        TicketType {
            id: 1,
            name: "Lucky Scratch".to_string(),
            kind: TicketKind::Scratch,
            price: 1.0,
            currency: Currency::Sc,
            tabs: 0,
        },
        TicketType {
            id: 2,
            name: "Gold Rush".to_string(),
            kind: TicketKind::Scratch,
            price: 100.0,
            currency: Currency::Gc,
            tabs: 0,
        },
        TicketType {
            id: 3,
            name: "Triple Tabs".to_string(),
            kind: TicketKind::PullTab,
            price: 1.0,
            currency: Currency::Sc,
            tabs: DEFAULT_PULL_TABS,
        },
    ]
}

pub struct Simulator {
    state: Mutex<State>,
    rng: Mutex<StdRng>,
    update_tx: broadcast::Sender<Routed>,
    kick_tx: broadcast::Sender<()>,
}

impl Simulator {
    pub fn new(seed: u64) -> Self {
        let (update_tx, _) = broadcast::channel(1024);
        let (kick_tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(State {
                ticket_types: default_ticket_types(),
                ..State::default()
            }),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            update_tx,
            kick_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the state, then publish everything it queued.
    fn with_state<T>(&self, f: impl FnOnce(&mut State, &mut StdRng) -> T) -> T {
        let (result, outbox) = {
            let mut state = self.lock();
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut state, &mut rng);
            (result, std::mem::take(&mut state.outbox))
        };
        for routed in outbox {
            if let Err(e) = self.update_tx.send(routed) {
                tracing::debug!("no realtime subscribers: {}", e);
            }
        }
        result
    }

    /// Create a user and return its profile and bearer token.
    pub fn register_user(
        &self,
        username: &str,
        gc_balance: f64,
        sc_balance: f64,
    ) -> (UserProfile, String) {
        let token = uuid::Uuid::new_v4().to_string();
        let mut state = self.lock();
        state.next_user_id += 1;
        let id = state.next_user_id;
        let profile = UserProfile {
            id,
            username: username.to_string(),
            avatar_url: None,
            gc_balance,
            sc_balance,
            referral_code: format!("{}{id}", username.to_uppercase()),
            kyc_verified: false,
            payout_tag: None,
        };
        state.users.insert(id, profile.clone());
        state.tokens.insert(token.clone(), id);
        tracing::info!(user = id, username, "registered user");
        (profile, token)
    }

    pub fn profile(&self, user: UserId) -> Option<UserProfile> {
        self.lock().users.get(&user).cloned()
    }

    /// Overwrite a user's balances and push them to the user's room.
    pub fn set_balance(&self, user: UserId, balance: Balance) {
        self.with_state(|state, _| {
            if let Some(profile) = state.users.get_mut(&user) {
                profile.gc_balance = balance.gc_balance;
                profile.sc_balance = balance.sc_balance;
                state.push_balance(user);
            }
        })
    }

    /// Serve `outcome` for the next round or reveal instead of drawing one.
    pub fn force_outcome(&self, outcome: GameRoundOutcome) {
        self.lock().forced.push_back(outcome);
    }

    pub fn set_banned_words(&self, words: Vec<String>) {
        self.lock().banned_words = words.into_iter().map(|w| w.to_lowercase()).collect();
    }

    pub fn set_ticket_types(&self, ticket_types: Vec<TicketType>) {
        self.lock().ticket_types = ticket_types;
    }

    pub fn purchase_status(&self, purchase_id: PurchaseId) -> Option<TicketStatus> {
        self.lock()
            .purchases
            .get(&purchase_id)
            .map(|p| p.record.status)
    }

    pub fn global_history(&self) -> Vec<ChatMessage> {
        self.lock().global_chat.iter().cloned().collect()
    }

    pub fn post_ai_message(&self, employee_id: u64, role: AiRole, content: &str) -> AiChatMessage {
        let mut state = self.lock();
        state.next_message_id += 1;
        let message = AiChatMessage {
            id: state.next_message_id,
            role,
            content: content.to_string(),
            created_at: now_millis(),
        };
        state
            .ai_messages
            .entry(employee_id)
            .or_default()
            .push(message.clone());
        message
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    /// Close every open realtime socket. Clients are expected to reconnect.
    pub fn drop_connections(&self) {
        if self.kick_tx.send(()).is_err() {
            tracing::debug!("no realtime connections to drop");
        }
    }

    pub fn update_subscriber(&self) -> broadcast::Receiver<Routed> {
        self.update_tx.subscribe()
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<UserId, Reject> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(Reject::unauthorized)?;
        self.lock()
            .tokens
            .get(token)
            .copied()
            .ok_or_else(Reject::unauthorized)
    }

    /// Run a mutating call once per idempotency key. A repeated key replays
    /// the first response without re-applying the call.
    fn idempotent<T: Serialize>(
        &self,
        user: UserId,
        headers: &HeaderMap,
        f: impl FnOnce(&mut State, &mut StdRng) -> Result<T, Reject>,
    ) -> Response {
        let key = headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| (user, value.to_string()));
        let (status, body) = self.with_state(|state, rng| {
            if let Some(key) = &key {
                if let Some(reply) = state.replies.get(key).cloned() {
                    state.calls.replays += 1;
                    tracing::info!(user, key = %key.1, "replaying idempotent response");
                    return reply;
                }
            }
            let reply = match f(state, rng) {
                Ok(value) => match serde_json::to_value(value) {
                    Ok(body) => (StatusCode::OK, body),
                    Err(e) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        serde_json::json!(ApiError::new(e.to_string())),
                    ),
                },
                Err(reject) => (reject.status, serde_json::json!(ApiError::new(reject.error))),
            };
            if let Some(key) = key {
                state.replies.insert(key, reply.clone());
            }
            reply
        });
        (status, Json(body)).into_response()
    }
}

pub struct Api {
    simulator: Arc<Simulator>,
}

impl Api {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self { simulator }
    }

    pub fn router(&self) -> Router {
        // Configure CORS
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static("idempotency-key"),
            ]);

        let router = Router::new()
            .route("/api/games/:slug/spin", post(play_round))
            .route("/api/games/:slug/roll", post(play_round))
            .route("/api/games/:slug/bet", post(play_round))
            .route("/api/tickets/types", get(ticket_types))
            .route("/api/tickets/purchase", post(purchase))
            .route("/api/tickets/reveal", post(reveal))
            .route("/api/tickets/claim", post(claim))
            .route("/api/tickets/save", post(save))
            .route("/api/chat/:slug", get(game_chat).post(post_game_chat))
            .route("/api/community/chat/history", get(global_chat))
            .route("/api/auth/me", get(me))
            .route("/api/auth/logout", post(logout))
            .route("/api/admin/ai-builder/chat", post(ai_builder))
            .route("/api/admin/ai-employees/:id/messages", get(ai_messages))
            .route("/socket", get(socket))
            .layer(cors)
            .with_state(self.simulator.clone());

        // Local sims are effectively unlimited (~1B req/s with a large burst)
        match GovernorConfigBuilder::default()
            .per_nanosecond(1)
            .burst_size(2_000_000)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
        {
            Some(config) => router.layer(GovernorLayer {
                config: Arc::new(config),
            }),
            None => {
                tracing::warn!("invalid rate limit configuration, serving without limits");
                router
            }
        }
    }
}

async fn play_round(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(request): Json<GameRoundRequest>,
) -> Response {
    let user = match simulator.authenticate(&headers) {
        Ok(user) => user,
        Err(reject) => return reject.into_response(),
    };
    simulator.idempotent(user, &headers, |state, rng| {
        state.play_round(rng, user, &slug, &request)
    })
}

async fn ticket_types(AxumState(simulator): AxumState<Arc<Simulator>>) -> Json<Vec<TicketType>> {
    Json(simulator.lock().ticket_types.clone())
}

async fn purchase(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
    Json(request): Json<PurchaseRequest>,
) -> Response {
    let user = match simulator.authenticate(&headers) {
        Ok(user) => user,
        Err(reject) => return reject.into_response(),
    };
    simulator.idempotent(user, &headers, |state, _| {
        let purchase_id = state.purchase(user, request.ticket_type_id)?;
        Ok(PurchaseResponse { purchase_id })
    })
}

async fn reveal(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
    Json(request): Json<PurchaseRef>,
) -> Response {
    let user = match simulator.authenticate(&headers) {
        Ok(user) => user,
        Err(reject) => return reject.into_response(),
    };
    simulator.idempotent(user, &headers, |state, rng| {
        state.reveal(rng, user, request.purchase_id)
    })
}

async fn claim(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
    Json(request): Json<PurchaseRef>,
) -> Response {
    settle(simulator, headers, request, TicketStatus::Claimed)
}

async fn save(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
    Json(request): Json<PurchaseRef>,
) -> Response {
    settle(simulator, headers, request, TicketStatus::Saved)
}

fn settle(
    simulator: Arc<Simulator>,
    headers: HeaderMap,
    request: PurchaseRef,
    status: TicketStatus,
) -> Response {
    let user = match simulator.authenticate(&headers) {
        Ok(user) => user,
        Err(reject) => return reject.into_response(),
    };
    simulator.idempotent(user, &headers, |state, _| {
        state.settle(user, request.purchase_id, status)
    })
}

async fn game_chat(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(slug): Path<String>,
) -> Json<Vec<ChatMessage>> {
    Json(
        simulator
            .lock()
            .game_chat
            .get(&slug)
            .cloned()
            .unwrap_or_default(),
    )
}

async fn post_game_chat(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PostChatRequest>,
) -> Result<Json<OkResponse>, Reject> {
    let user = simulator.authenticate(&headers)?;
    simulator.with_state(|state, _| state.post_game_chat(user, &slug, &request.message))?;
    Ok(Json(OkResponse { ok: true }))
}

async fn global_chat(AxumState(simulator): AxumState<Arc<Simulator>>) -> Json<Vec<ChatMessage>> {
    Json(simulator.global_history())
}

async fn me(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, Reject> {
    let user = simulator.authenticate(&headers)?;
    let mut state = simulator.lock();
    state.calls.me += 1;
    Ok(Json(state.user(user)?.clone()))
}

async fn logout(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>, Reject> {
    let user = simulator.authenticate(&headers)?;
    let mut state = simulator.lock();
    state.tokens.retain(|_, id| *id != user);
    state.calls.logouts += 1;
    tracing::info!(user, "logged out");
    Ok(Json(OkResponse { ok: true }))
}

async fn ai_builder(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    headers: HeaderMap,
    Json(request): Json<AiBuilderRequest>,
) -> Result<Json<AiBuilderReply>, Reject> {
    simulator.authenticate(&headers)?;
    if request.message.trim().is_empty() {
        return Err(Reject::invalid("Message cannot be empty"));
    }
    Ok(Json(simulator.lock().ai_builder(&request)))
}

#[derive(Debug, Deserialize)]
struct AfterQuery {
    after: Option<u64>,
}

async fn ai_messages(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    Path(employee_id): Path<u64>,
    Query(query): Query<AfterQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<AiChatMessage>>, Reject> {
    simulator.authenticate(&headers)?;
    let state = simulator.lock();
    let messages = state
        .ai_messages
        .get(&employee_id)
        .map(|messages| {
            messages
                .iter()
                .filter(|m| query.after.map_or(true, |after| m.id > after))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Ok(Json(messages))
}

async fn socket(
    AxumState(simulator): AxumState<Arc<Simulator>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, simulator))
}

async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}

/// Membership changes and replies caused by one client frame.
fn apply_client_event(
    simulator: &Simulator,
    rooms: &mut HashSet<Room>,
    event: ClientEvent,
) -> Option<ServerEvent> {
    match event {
        ClientEvent::JoinUserRoom(user) => {
            rooms.insert(Room::User(user));
        }
        ClientEvent::JoinGameRoom {
            game_slug,
            user: ChatUser { id, .. },
        } => {
            tracing::debug!(user = id, slug = %game_slug, "joined game room");
            rooms.insert(Room::Game(game_slug));
        }
        ClientEvent::LeaveGameRoom { game_slug } => {
            rooms.remove(&Room::Game(game_slug));
            simulator.lock().calls.leaves += 1;
            return None;
        }
        ClientEvent::JoinGlobalChat => {
            rooms.insert(Room::Global);
        }
        ClientEvent::SendGlobalMessage { user_id, message } => {
            return simulator
                .with_state(|state, _| state.post_global(user_id, &message))
                .err()
                .map(|error| {
                    tracing::info!(user = user_id, %error, "global message moderated");
                    ServerEvent::ModerationAction { error }
                });
        }
    }
    simulator.lock().calls.joins += 1;
    None
}

async fn handle_socket(socket: WebSocket, simulator: Arc<Simulator>) {
    tracing::info!("Realtime WebSocket connected");
    let (mut sender, mut receiver) = socket.split();
    let mut updates = simulator.update_subscriber();
    let mut kick = simulator.kick_tx.subscribe();
    let mut rooms: HashSet<Room> = HashSet::new();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::warn!("Failed to decode client event: {}", e);
                                continue;
                            }
                        };
                        if let Some(reply) = apply_client_event(&simulator, &mut rooms, event) {
                            if !send_event(&mut sender, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            tracing::warn!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Client closed WebSocket connection");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {:?}", e);
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                    _ => {} // Ignore other message types
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(routed) => {
                        if !rooms.contains(&routed.room) {
                            continue;
                        }
                        if !send_event(&mut sender, &routed.event).await {
                            tracing::warn!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "WebSocket client lagged behind, skipped {} events",
                            skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Broadcast channel closed");
                        break;
                    }
                }
            }
            _ = kick.recv() => {
                tracing::info!("Dropping WebSocket connection");
                break;
            }
        }
    }
    tracing::info!("Realtime WebSocket handler exiting");
    let _ = sender.close().await;
}
