//! In-memory [GameApi] for driving flows without a backend.

use crate::{client::GameApi, Error, Result};
use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::Duration,
};
use sweeps_types::{
    api::SettleResponse, GameRoundOutcome, GameRoundRequest, PurchaseId, TicketStatus,
    UserProfile,
};

/// Number of times each endpoint was hit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub submit: usize,
    pub purchase: usize,
    pub reveal: usize,
    pub claim: usize,
    pub save: usize,
    pub me: usize,
    pub logout: usize,
}

#[derive(Default)]
struct State {
    profile: Option<UserProfile>,
    calls: Calls,
    outcomes: VecDeque<GameRoundOutcome>,
    next_purchase_id: PurchaseId,
    failures: usize,
}

pub struct MockApi {
    state: Mutex<State>,
    delay: Duration,
}

/// A logged-in test user.
pub fn profile(gc_balance: f64, sc_balance: f64) -> UserProfile {
    UserProfile {
        id: 7,
        username: "ada".to_string(),
        avatar_url: None,
        gc_balance,
        sc_balance,
        referral_code: "ADA123".to_string(),
        kyc_verified: true,
        payout_tag: None,
    }
}

impl MockApi {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            state: Mutex::new(State {
                profile: Some(profile),
                next_purchase_id: 1,
                ..State::default()
            }),
            delay: Duration::ZERO,
        }
    }

    /// Hold every response for `delay` to expose in-flight windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_outcome(&self, outcome: GameRoundOutcome) {
        self.lock().outcomes.push_back(outcome);
    }

    pub fn set_next_purchase_id(&self, purchase_id: PurchaseId) {
        self.lock().next_purchase_id = purchase_id;
    }

    pub fn set_profile(&self, profile: UserProfile) {
        self.lock().profile = Some(profile);
    }

    /// Fail the next `count` calls with an unknown outcome.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures = count;
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn respond<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut state = self.lock();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(Error::UnknownOutcome("mock transport failure".to_string()));
        }
        Ok(f(&mut state))
    }

    fn next_outcome(state: &mut State) -> GameRoundOutcome {
        state
            .outcomes
            .pop_front()
            .unwrap_or_else(GameRoundOutcome::loss)
    }
}

impl GameApi for MockApi {
    async fn submit_round(&self, _request: &GameRoundRequest) -> Result<GameRoundOutcome> {
        self.lock().calls.submit += 1;
        self.respond(Self::next_outcome).await
    }

    async fn purchase_ticket(&self, _ticket_type_id: u64) -> Result<PurchaseId> {
        self.lock().calls.purchase += 1;
        self.respond(|state| {
            let id = state.next_purchase_id;
            state.next_purchase_id += 1;
            id
        })
        .await
    }

    async fn reveal_purchase(&self, _purchase_id: PurchaseId) -> Result<GameRoundOutcome> {
        self.lock().calls.reveal += 1;
        self.respond(Self::next_outcome).await
    }

    async fn claim_ticket(&self, _purchase_id: PurchaseId) -> Result<SettleResponse> {
        self.lock().calls.claim += 1;
        self.respond(|_| SettleResponse {
            success: true,
            status: TicketStatus::Claimed,
            message: None,
        })
        .await
    }

    async fn save_ticket(&self, _purchase_id: PurchaseId) -> Result<SettleResponse> {
        self.lock().calls.save += 1;
        self.respond(|_| SettleResponse {
            success: true,
            status: TicketStatus::Saved,
            message: None,
        })
        .await
    }

    async fn me(&self) -> Result<UserProfile> {
        self.lock().calls.me += 1;
        self.respond(|state| state.profile.clone())
            .await?
            .ok_or(Error::Unauthorized)
    }

    async fn logout(&self) -> Result<()> {
        self.lock().calls.logout += 1;
        self.respond(|state| {
            state.profile = None;
        })
        .await
    }
}
