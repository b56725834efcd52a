//! Reveal state machine.
//!
//! `Idle → Purchased → Revealing → Revealed{is_win} → Claimed | Saved`.
//! Spin and roll games skip the purchase step: a wager moves `Idle` straight
//! to `Revealing`. The machine performs no I/O; flows call `begin_*` before a
//! request and report its result afterwards. A `busy` flag rejects any second
//! action while one is in flight.

use crate::{Error, Result};
use std::fmt;
use sweeps_types::{GameRoundOutcome, PurchaseId, TicketStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Purchased,
    Revealing,
    Revealed { is_win: bool },
    Claimed,
    Saved,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Purchased => f.write_str("purchased"),
            Phase::Revealing => f.write_str("revealing"),
            Phase::Revealed { is_win: true } => f.write_str("revealed (win)"),
            Phase::Revealed { is_win: false } => f.write_str("revealed (loss)"),
            Phase::Claimed => f.write_str("claimed"),
            Phase::Saved => f.write_str("saved"),
        }
    }
}

impl Phase {
    /// Ticket status equivalent, if the instance has been purchased.
    pub fn ticket_status(&self) -> Option<TicketStatus> {
        match self {
            Phase::Idle => None,
            Phase::Purchased => Some(TicketStatus::Purchased),
            Phase::Revealing => Some(TicketStatus::Revealing),
            Phase::Revealed { .. } => Some(TicketStatus::Revealed),
            Phase::Claimed => Some(TicketStatus::Claimed),
            Phase::Saved => Some(TicketStatus::Saved),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Purchase,
    Wager,
    Reveal,
    Claim,
    Save,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Purchase => "purchase",
            Action::Wager => "wager",
            Action::Reveal => "reveal",
            Action::Claim => "claim",
            Action::Save => "save",
        })
    }
}

/// Terminal choice for a winning ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Claim,
    Save,
}

impl From<Settlement> for Action {
    fn from(settlement: Settlement) -> Self {
        match settlement {
            Settlement::Claim => Action::Claim,
            Settlement::Save => Action::Save,
        }
    }
}

/// Which triggers the UI should currently enable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Controls {
    pub purchase: bool,
    pub reveal: bool,
    pub claim: bool,
    pub save: bool,
}

#[derive(Clone, Debug)]
pub struct RevealMachine {
    phase: Phase,
    busy: bool,
    purchase_id: Option<PurchaseId>,
    outcome: Option<GameRoundOutcome>,
}

impl Default for RevealMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RevealMachine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            busy: false,
            purchase_id: None,
            outcome: None,
        }
    }

    /// Rebuild a revealed ticket that was left unresolved earlier.
    pub fn resume(purchase_id: PurchaseId, outcome: GameRoundOutcome) -> Self {
        Self {
            phase: Phase::Revealed {
                is_win: outcome.is_win,
            },
            busy: false,
            purchase_id: Some(purchase_id),
            outcome: Some(outcome),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn purchase_id(&self) -> Option<PurchaseId> {
        self.purchase_id
    }

    pub fn outcome(&self) -> Option<&GameRoundOutcome> {
        self.outcome.as_ref()
    }

    pub fn controls(&self) -> Controls {
        if self.busy {
            return Controls::default();
        }
        let win = self.phase == Phase::Revealed { is_win: true };
        Controls {
            purchase: self.phase == Phase::Idle,
            reveal: self.phase == Phase::Purchased,
            claim: win,
            save: win,
        }
    }

    fn start(&mut self, action: Action) -> Result<()> {
        if self.busy {
            return Err(Error::Busy);
        }
        let allowed = match action {
            Action::Purchase | Action::Wager => self.phase == Phase::Idle,
            Action::Reveal => match self.phase {
                Phase::Purchased => true,
                Phase::Revealing | Phase::Revealed { .. } | Phase::Claimed | Phase::Saved => {
                    return Err(Error::AlreadyRevealed)
                }
                Phase::Idle => false,
            },
            Action::Claim | Action::Save => self.phase == Phase::Revealed { is_win: true },
        };
        if !allowed {
            return Err(Error::InvalidTransition {
                action,
                phase: self.phase,
            });
        }
        self.busy = true;
        Ok(())
    }

    pub fn begin_purchase(&mut self) -> Result<()> {
        self.start(Action::Purchase)
    }

    pub fn purchased(&mut self, purchase_id: PurchaseId) {
        self.phase = Phase::Purchased;
        self.purchase_id = Some(purchase_id);
        self.busy = false;
    }

    pub fn purchase_failed(&mut self) {
        self.busy = false;
    }

    /// Spin/roll: the submit action is the reveal trigger.
    pub fn begin_wager(&mut self) -> Result<()> {
        self.start(Action::Wager)?;
        self.phase = Phase::Revealing;
        Ok(())
    }

    /// Claim the single reveal of this instance.
    pub fn begin_reveal(&mut self) -> Result<PurchaseId> {
        self.start(Action::Reveal)?;
        self.phase = Phase::Revealing;
        // Purchased always carries an id
        self.purchase_id.ok_or(Error::InvalidTransition {
            action: Action::Reveal,
            phase: Phase::Idle,
        })
    }

    pub fn revealed(&mut self, outcome: GameRoundOutcome) -> Result<Phase> {
        if self.phase != Phase::Revealing {
            return Err(Error::InvalidTransition {
                action: Action::Reveal,
                phase: self.phase,
            });
        }
        self.phase = Phase::Revealed {
            is_win: outcome.is_win,
        };
        self.outcome = Some(outcome);
        self.busy = false;
        Ok(self.phase)
    }

    /// The request failed and the outcome is unknown; re-enable the trigger.
    pub fn reveal_failed(&mut self) {
        if self.phase == Phase::Revealing {
            self.phase = if self.purchase_id.is_some() {
                Phase::Purchased
            } else {
                Phase::Idle
            };
        }
        self.busy = false;
    }

    pub fn begin_settle(&mut self, settlement: Settlement) -> Result<PurchaseId> {
        let action = settlement.into();
        self.start(action)?;
        match self.purchase_id {
            Some(purchase_id) => Ok(purchase_id),
            None => {
                self.busy = false;
                Err(Error::InvalidTransition {
                    action,
                    phase: self.phase,
                })
            }
        }
    }

    pub fn settled(&mut self, settlement: Settlement) {
        self.phase = match settlement {
            Settlement::Claim => Phase::Claimed,
            Settlement::Save => Phase::Saved,
        };
        self.busy = false;
    }

    pub fn settle_failed(&mut self) {
        self.busy = false;
    }
}
