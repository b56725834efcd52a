//! Async drivers around [RevealMachine].
//!
//! Each flow owns one game instance. The machine is checked and marked busy
//! synchronously before any request starts, so overlapping calls on the same
//! instance fail with [Error::Busy] without touching the network. After an
//! outcome or a successful claim/save the session profile is refreshed rather
//! than incremented locally.

use crate::{
    client::GameApi,
    reveal::{Controls, Phase, RevealMachine, Settlement},
    session::Session,
    Error, Result,
};
use std::sync::{Mutex, MutexGuard, PoisonError};
use sweeps_types::{Currency, GameRoundOutcome, GameRoundRequest, PurchaseId, TicketType};
use tracing::{debug, info, warn};

fn lock(machine: &Mutex<RevealMachine>) -> MutexGuard<'_, RevealMachine> {
    machine.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn refresh_after<A: GameApi>(api: &A, session: &Session) {
    // The outcome stands even if the refresh fails; the next push or refresh converges
    if let Err(err) = session.refresh(api).await {
        warn!(?err, "profile refresh failed");
    }
}

/// Spin and roll games: one wager per instance, no separate reveal step.
pub struct RoundFlow<'a, A: GameApi> {
    api: &'a A,
    session: &'a Session,
    eligible: Vec<Currency>,
    machine: Mutex<RevealMachine>,
}

impl<'a, A: GameApi> RoundFlow<'a, A> {
    pub fn new(api: &'a A, session: &'a Session, eligible: Vec<Currency>) -> Self {
        Self {
            api,
            session,
            eligible,
            machine: Mutex::new(RevealMachine::new()),
        }
    }

    pub fn phase(&self) -> Phase {
        lock(&self.machine).phase()
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.machine).is_busy()
    }

    pub fn last_outcome(&self) -> Option<GameRoundOutcome> {
        lock(&self.machine).outcome().cloned()
    }

    /// Validate, submit and settle one wager.
    ///
    /// Every call starts a fresh instance; a previous outcome is never reused.
    pub async fn play(&self, request: GameRoundRequest) -> Result<GameRoundOutcome> {
        let balance = self.session.balance()?.get(request.currency);
        request.validate(&self.eligible, balance)?;
        {
            let mut machine = lock(&self.machine);
            if machine.is_busy() {
                return Err(Error::Busy);
            }
            *machine = RevealMachine::new();
            machine.begin_wager()?;
        }

        debug!(
            game = request.game_id,
            bet = request.bet_amount,
            currency = %request.currency,
            "submitting round"
        );
        match self.api.submit_round(&request).await {
            Ok(outcome) => {
                lock(&self.machine).revealed(outcome.clone())?;
                info!(
                    game = request.game_id,
                    is_win = outcome.is_win,
                    win = outcome.win_amount,
                    "round settled"
                );
                refresh_after(self.api, self.session).await;
                Ok(outcome)
            }
            Err(err) => {
                lock(&self.machine).reveal_failed();
                Err(err)
            }
        }
    }
}

/// One purchased ticket from purchase to claim or save.
pub struct TicketFlow<'a, A: GameApi> {
    api: &'a A,
    session: &'a Session,
    ticket: TicketType,
    machine: Mutex<RevealMachine>,
}

impl<'a, A: GameApi> TicketFlow<'a, A> {
    pub fn new(api: &'a A, session: &'a Session, ticket: TicketType) -> Self {
        Self {
            api,
            session,
            ticket,
            machine: Mutex::new(RevealMachine::new()),
        }
    }

    /// Continue a ticket revealed earlier but never claimed or saved.
    pub fn resume(
        api: &'a A,
        session: &'a Session,
        ticket: TicketType,
        purchase_id: PurchaseId,
        outcome: GameRoundOutcome,
    ) -> Self {
        Self {
            api,
            session,
            ticket,
            machine: Mutex::new(RevealMachine::resume(purchase_id, outcome)),
        }
    }

    pub fn ticket(&self) -> &TicketType {
        &self.ticket
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn phase(&self) -> Phase {
        lock(&self.machine).phase()
    }

    pub fn controls(&self) -> Controls {
        lock(&self.machine).controls()
    }

    pub fn purchase_id(&self) -> Option<PurchaseId> {
        lock(&self.machine).purchase_id()
    }

    pub fn outcome(&self) -> Option<GameRoundOutcome> {
        lock(&self.machine).outcome().cloned()
    }

    pub async fn purchase(&self) -> Result<PurchaseId> {
        let balance = self.session.balance()?.get(self.ticket.currency);
        if self.ticket.price > balance {
            return Err(sweeps_types::RequestError::InsufficientFunds {
                currency: self.ticket.currency,
                bet: self.ticket.price,
                balance,
            }
            .into());
        }
        lock(&self.machine).begin_purchase()?;
        match self.api.purchase_ticket(self.ticket.id).await {
            Ok(purchase_id) => {
                lock(&self.machine).purchased(purchase_id);
                info!(purchase_id, ticket = self.ticket.id, "ticket purchased");
                refresh_after(self.api, self.session).await;
                Ok(purchase_id)
            }
            Err(err) => {
                lock(&self.machine).purchase_failed();
                Err(err)
            }
        }
    }

    /// Request the ticket's single outcome.
    pub async fn reveal(&self) -> Result<GameRoundOutcome> {
        let purchase_id = lock(&self.machine).begin_reveal()?;
        debug!(purchase_id, "revealing ticket");
        match self.api.reveal_purchase(purchase_id).await {
            Ok(outcome) => {
                lock(&self.machine).revealed(outcome.clone())?;
                info!(
                    purchase_id,
                    is_win = outcome.is_win,
                    win = outcome.win_amount,
                    "ticket revealed"
                );
                refresh_after(self.api, self.session).await;
                Ok(outcome)
            }
            Err(err) => {
                lock(&self.machine).reveal_failed();
                Err(err)
            }
        }
    }

    pub async fn claim(&self) -> Result<()> {
        self.settle(Settlement::Claim).await
    }

    pub async fn save(&self) -> Result<()> {
        self.settle(Settlement::Save).await
    }

    async fn settle(&self, settlement: Settlement) -> Result<()> {
        let purchase_id = lock(&self.machine).begin_settle(settlement)?;
        let result = match settlement {
            Settlement::Claim => self.api.claim_ticket(purchase_id).await,
            Settlement::Save => self.api.save_ticket(purchase_id).await,
        };
        match result {
            Ok(_) => {
                lock(&self.machine).settled(settlement);
                info!(purchase_id, ?settlement, "ticket settled");
                refresh_after(self.api, self.session).await;
                Ok(())
            }
            Err(err) => {
                lock(&self.machine).settle_failed();
                Err(err)
            }
        }
    }
}
