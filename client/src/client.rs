use crate::{Error, Result};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::{future::Future, time::Duration};
use sweeps_types::{
    api::{
        AiBuilderReply, AiBuilderRequest, AiChatMessage, ApiError, OkResponse, PostChatRequest,
        PurchaseRef, PurchaseRequest, PurchaseResponse, SettleResponse,
    },
    ChatMessage, GameParams, GameRoundOutcome, GameRoundRequest, PurchaseId, TicketType,
    UserProfile, IDEMPOTENCY_KEY_HEADER,
};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for connections and requests
pub const TIMEOUT: Duration = Duration::from_secs(30);

/// Path of the realtime endpoint relative to the base URL.
const SOCKET_PATH: &str = "socket";

pub type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Retry policy for transient HTTP failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request (including the first attempt).
    pub max_attempts: usize,
    /// Initial backoff delay after the first retryable failure.
    pub initial_backoff: Duration,
    /// Maximum backoff delay between attempts.
    pub max_backoff: Duration,
    /// Whether non-idempotent requests (spins, reveals, claims) may be retried.
    ///
    /// When enabled, each such request carries an idempotency key that is
    /// reused across its retries so the server applies it at most once.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            retry_non_idempotent: false,
        }
    }
}

/// Sweeps API client
#[derive(Clone)]
pub struct Client {
    pub base_url: Url,
    pub ws_url: Url,
    pub http_client: HttpClient,

    session_token: Option<String>,
    retry_policy: RetryPolicy,
    dial_timeout: Duration,
}

impl Client {
    /// Create a new client
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, TIMEOUT)
    }

    /// Create a new client whose requests give up after `request_timeout`.
    pub fn with_timeout(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;

        // Convert http(s) to ws(s) for WebSocket URL
        let ws_scheme = match base_url.scheme() {
            "http" => "ws",
            "https" => "wss",
            scheme => {
                return Err(Error::InvalidScheme(scheme.to_string()));
            }
        };

        let mut ws_url = base_url.clone();
        ws_url
            .set_scheme(ws_scheme)
            .map_err(|_| Error::InvalidScheme(ws_scheme.to_string()))?;

        let http_client = HttpClient::builder()
            .timeout(request_timeout)
            .pool_idle_timeout(Duration::from_secs(60)) // Keep connections alive
            .tcp_keepalive(Duration::from_secs(30)) // TCP keepalive
            .build()?;

        Ok(Self {
            base_url,
            ws_url,
            http_client,
            session_token: None,
            retry_policy: RetryPolicy::default(),
            dial_timeout: TIMEOUT,
        })
    }

    /// Returns a new client authenticating with the provided session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token;
    }

    /// Returns a copy of the current retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Sets the retry policy for subsequent HTTP requests.
    pub fn set_retry_policy(&mut self, retry_policy: RetryPolicy) {
        self.retry_policy = retry_policy;
    }

    /// Returns a new client with the provided retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns a new client with the provided WebSocket dial timeout.
    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.session_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_with_retry(
        &self,
        method: Method,
        make_request: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let max_attempts = if method == Method::GET || self.retry_policy.retry_non_idempotent {
            self.retry_policy.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0usize;
        let mut backoff = self.retry_policy.initial_backoff;
        loop {
            attempt += 1;
            let result = make_request().send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) || attempt >= max_attempts {
                        return Ok(response);
                    }
                    warn!(%status, attempt, "retrying request");
                }
                Err(err) => {
                    if attempt >= max_attempts || !is_retryable_error(&err) {
                        return Err(Error::Reqwest(err));
                    }
                    warn!(?err, attempt, "retrying request");
                }
            }

            if backoff > Duration::ZERO {
                sleep(backoff).await;
                backoff = std::cmp::min(backoff.saturating_mul(2), self.retry_policy.max_backoff);
            }
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path)?;
        debug!(%url, "GET");
        let response = self
            .send_with_retry(Method::GET, || self.request(Method::GET, url.clone()))
            .await?;
        read_json(response).await
    }

    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.base_url.join(path)?;
        debug!(%url, "POST");

        // One key per logical request, shared by every retry of it
        let idempotency_key = self
            .retry_policy
            .retry_non_idempotent
            .then(|| uuid::Uuid::new_v4().to_string());
        let response = self
            .send_with_retry(Method::POST, || {
                let builder = self.request(Method::POST, url.clone()).json(body);
                match &idempotency_key {
                    Some(key) => builder.header(IDEMPOTENCY_KEY_HEADER, key),
                    None => builder,
                }
            })
            .await?;
        read_json(response).await
    }

    /// POST a call whose server-side effect cannot be observed on failure.
    async fn submit<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.post_json(path, body).await.map_err(|err| {
            if err.is_indeterminate() {
                warn!(?err, path, "submission outcome unknown");
                Error::UnknownOutcome(err.to_string())
            } else {
                err
            }
        })
    }

    /// Submit a wager and return its server-confirmed outcome.
    ///
    /// Never retried unless the retry policy allows non-idempotent requests.
    pub async fn submit_round(&self, request: &GameRoundRequest) -> Result<GameRoundOutcome> {
        let outcome: GameRoundOutcome = self.submit(&round_path(request), request).await?;
        outcome.check()?;
        Ok(outcome)
    }

    /// List ticket products.
    pub async fn ticket_types(&self) -> Result<Vec<TicketType>> {
        self.get_json("api/tickets/types").await
    }

    pub async fn purchase_ticket(&self, ticket_type_id: u64) -> Result<PurchaseId> {
        let response: PurchaseResponse = self
            .submit("api/tickets/purchase", &PurchaseRequest { ticket_type_id })
            .await?;
        Ok(response.purchase_id)
    }

    /// Reveal a purchased ticket. Callers must invoke this at most once per purchase.
    pub async fn reveal_purchase(&self, purchase_id: PurchaseId) -> Result<GameRoundOutcome> {
        let outcome: GameRoundOutcome = self
            .submit("api/tickets/reveal", &PurchaseRef { purchase_id })
            .await?;
        outcome.check()?;
        Ok(outcome)
    }

    pub async fn claim_ticket(&self, purchase_id: PurchaseId) -> Result<SettleResponse> {
        self.settle("api/tickets/claim", purchase_id).await
    }

    pub async fn save_ticket(&self, purchase_id: PurchaseId) -> Result<SettleResponse> {
        self.settle("api/tickets/save", purchase_id).await
    }

    async fn settle(&self, path: &str, purchase_id: PurchaseId) -> Result<SettleResponse> {
        let response: SettleResponse = self.submit(path, &PurchaseRef { purchase_id }).await?;
        if !response.success {
            return Err(Error::Conflict(
                response
                    .message
                    .unwrap_or_else(|| format!("purchase {purchase_id} not settled")),
            ));
        }
        Ok(response)
    }

    /// Message backlog of a game room.
    pub async fn game_chat_history(&self, game_slug: &str) -> Result<Vec<ChatMessage>> {
        self.get_json(&format!("api/chat/{game_slug}")).await
    }

    /// Post to a game room. The message arrives back over the realtime channel.
    pub async fn post_game_chat(&self, game_slug: &str, message: &str) -> Result<()> {
        let _: OkResponse = self
            .post_json(
                &format!("api/chat/{game_slug}"),
                &PostChatRequest {
                    message: message.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Global community chat backlog.
    pub async fn global_chat_history(&self) -> Result<Vec<ChatMessage>> {
        self.get_json("api/community/chat/history").await
    }

    /// Authoritative profile of the session user.
    pub async fn me(&self) -> Result<UserProfile> {
        self.get_json("api/auth/me").await
    }

    pub async fn logout(&self) -> Result<()> {
        let _: OkResponse = self.post_json("api/auth/logout", &()).await?;
        Ok(())
    }

    pub async fn ai_builder_message(&self, request: &AiBuilderRequest) -> Result<AiBuilderReply> {
        self.post_json("api/admin/ai-builder/chat", request).await
    }

    /// Messages of an admin AI-employee conversation, optionally only those after `after`.
    pub async fn ai_employee_messages(
        &self,
        employee_id: u64,
        after: Option<u64>,
    ) -> Result<Vec<AiChatMessage>> {
        let path = match after {
            Some(after) => format!("api/admin/ai-employees/{employee_id}/messages?after={after}"),
            None => format!("api/admin/ai-employees/{employee_id}/messages"),
        };
        self.get_json(&path).await
    }

    /// Open a raw realtime socket.
    pub async fn connect_socket(&self) -> Result<Socket> {
        let ws_url = self.ws_url.join(SOCKET_PATH)?;
        connect_socket(&ws_url, self.dial_timeout).await
    }
}

pub(crate) async fn connect_socket(ws_url: &Url, dial_timeout: Duration) -> Result<Socket> {
    info!(%ws_url, "connecting to WebSocket");
    let (ws_stream, _) = timeout(dial_timeout, connect_async(ws_url.as_str()))
        .await
        .map_err(|_| Error::DialTimeout)??;
    info!("WebSocket connected");
    Ok(ws_stream)
}

/// Endpoint for a wager on the given game.
pub fn round_path(request: &GameRoundRequest) -> String {
    match (&request.params, request.slug.as_str()) {
        (GameParams::Slots, "slots") => "api/games/slots/spin".to_string(),
        (GameParams::Dice { .. }, "dice") => "api/games/dice/roll".to_string(),
        (GameParams::Slots, slug) => format!("api/games/{slug}/spin"),
        (_, slug) => format!("api/games/{slug}/bet"),
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        let body = response.bytes().await?;
        return Ok(serde_json::from_slice(&body)?);
    }
    let message = match response.json::<ApiError>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    debug!(%status, message, "request rejected");
    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(message),
        StatusCode::UNAUTHORIZED => Error::Unauthorized,
        StatusCode::FORBIDDEN => Error::Forbidden(message),
        StatusCode::CONFLICT => Error::Conflict(message),
        _ => Error::Failed(status),
    })
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Calls the game round lifecycle depends on.
///
/// [Client] is the production implementation; flows are generic over this
/// trait so they can be driven without a network.
pub trait GameApi {
    fn submit_round(
        &self,
        request: &GameRoundRequest,
    ) -> impl Future<Output = Result<GameRoundOutcome>> + Send;

    fn purchase_ticket(&self, ticket_type_id: u64)
        -> impl Future<Output = Result<PurchaseId>> + Send;

    fn reveal_purchase(
        &self,
        purchase_id: PurchaseId,
    ) -> impl Future<Output = Result<GameRoundOutcome>> + Send;

    fn claim_ticket(
        &self,
        purchase_id: PurchaseId,
    ) -> impl Future<Output = Result<SettleResponse>> + Send;

    fn save_ticket(
        &self,
        purchase_id: PurchaseId,
    ) -> impl Future<Output = Result<SettleResponse>> + Send;

    fn me(&self) -> impl Future<Output = Result<UserProfile>> + Send;

    fn logout(&self) -> impl Future<Output = Result<()>> + Send;
}

impl GameApi for Client {
    async fn submit_round(&self, request: &GameRoundRequest) -> Result<GameRoundOutcome> {
        Client::submit_round(self, request).await
    }

    async fn purchase_ticket(&self, ticket_type_id: u64) -> Result<PurchaseId> {
        Client::purchase_ticket(self, ticket_type_id).await
    }

    async fn reveal_purchase(&self, purchase_id: PurchaseId) -> Result<GameRoundOutcome> {
        Client::reveal_purchase(self, purchase_id).await
    }

    async fn claim_ticket(&self, purchase_id: PurchaseId) -> Result<SettleResponse> {
        Client::claim_ticket(self, purchase_id).await
    }

    async fn save_ticket(&self, purchase_id: PurchaseId) -> Result<SettleResponse> {
        Client::save_ticket(self, purchase_id).await
    }

    async fn me(&self) -> Result<UserProfile> {
        Client::me(self).await
    }

    async fn logout(&self) -> Result<()> {
        Client::logout(self).await
    }
}
