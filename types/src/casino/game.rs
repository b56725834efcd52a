use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::SLOT_SYMBOLS;

/// Play currencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// Gold Coins, non-redeemable.
    Gc,
    /// Sweeps Coins, redeemable.
    Sc,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Gc => "GC",
            Currency::Sc => "SC",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Direction of a dice wager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiceDirection {
    Over,
    Under,
}

impl DiceDirection {
    /// Whether `roll` wins against `target`. Ties lose in both directions.
    pub fn wins(&self, roll: f64, target: f64) -> bool {
        match self {
            DiceDirection::Over => roll > target,
            DiceDirection::Under => roll < target,
        }
    }
}

/// Game-specific wager parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GameParams {
    Slots,
    Dice {
        target: f64,
        #[serde(rename = "type")]
        direction: DiceDirection,
    },
    Custom {
        #[serde(default)]
        values: serde_json::Value,
    },
}

/// Reasons a wager is rejected before it leaves the client.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RequestError {
    #[error("bet amount must be positive (got {0})")]
    InvalidBet(f64),
    #[error("{0} is not accepted by this game")]
    IneligibleCurrency(Currency),
    #[error("dice target must be within 0..100 (got {0})")]
    InvalidTarget(f64),
    #[error("insufficient {currency} balance: bet {bet}, available {balance}")]
    InsufficientFunds {
        currency: Currency,
        bet: f64,
        balance: f64,
    },
}

/// A single wager. Immutable once submitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRoundRequest {
    pub game_id: u64,
    pub slug: String,
    pub bet_amount: f64,
    pub currency: Currency,
    pub params: GameParams,
}

impl GameRoundRequest {
    pub fn slots(game_id: u64, bet_amount: f64, currency: Currency) -> Self {
        Self {
            game_id,
            slug: "slots".to_string(),
            bet_amount,
            currency,
            params: GameParams::Slots,
        }
    }

    pub fn dice(
        game_id: u64,
        bet_amount: f64,
        currency: Currency,
        target: f64,
        direction: DiceDirection,
    ) -> Self {
        Self {
            game_id,
            slug: "dice".to_string(),
            bet_amount,
            currency,
            params: GameParams::Dice { target, direction },
        }
    }

    /// Client-side pre-check. The server remains authoritative.
    pub fn validate(&self, eligible: &[Currency], balance: f64) -> Result<(), RequestError> {
        if !self.bet_amount.is_finite() || self.bet_amount <= 0.0 {
            return Err(RequestError::InvalidBet(self.bet_amount));
        }
        if !eligible.contains(&self.currency) {
            return Err(RequestError::IneligibleCurrency(self.currency));
        }
        if let GameParams::Dice { target, .. } = self.params {
            if !(0.0..100.0).contains(&target) {
                return Err(RequestError::InvalidTarget(target));
            }
        }
        if self.bet_amount > balance {
            return Err(RequestError::InsufficientFunds {
                currency: self.currency,
                bet: self.bet_amount,
                balance,
            });
        }
        Ok(())
    }
}

/// Outcome payload violations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum OutcomeError {
    #[error("win amount is not a valid non-negative number: {0}")]
    InvalidAmount(f64),
    #[error("winning outcome carries no win amount")]
    WinWithoutAmount,
    #[error("losing outcome carries win amount {0}")]
    LossWithAmount(f64),
}

/// Server-confirmed result of one wager or ticket reveal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRoundOutcome {
    pub is_win: bool,
    pub win_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reels: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<u8>>,
}

/// Typed view over the game-specific part of an outcome.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundResult<'a> {
    Reels(&'a [u8]),
    Roll(f64),
    Ticket(&'a [u8]),
    Empty,
}

impl GameRoundOutcome {
    pub fn loss() -> Self {
        Self {
            is_win: false,
            win_amount: 0.0,
            reels: None,
            roll: None,
            symbols: None,
        }
    }

    pub fn win(win_amount: f64) -> Self {
        Self {
            is_win: true,
            win_amount,
            ..Self::loss()
        }
    }

    /// Verify `is_win` and `win_amount` agree.
    pub fn check(&self) -> Result<(), OutcomeError> {
        if !self.win_amount.is_finite() || self.win_amount < 0.0 {
            return Err(OutcomeError::InvalidAmount(self.win_amount));
        }
        match (self.is_win, self.win_amount > 0.0) {
            (true, false) => Err(OutcomeError::WinWithoutAmount),
            (false, true) => Err(OutcomeError::LossWithAmount(self.win_amount)),
            _ => Ok(()),
        }
    }

    pub fn result(&self) -> RoundResult<'_> {
        if let Some(reels) = &self.reels {
            return RoundResult::Reels(reels);
        }
        if let Some(roll) = self.roll {
            return RoundResult::Roll(roll);
        }
        if let Some(symbols) = &self.symbols {
            return RoundResult::Ticket(symbols);
        }
        RoundResult::Empty
    }
}

/// Display symbol for a reel index. Out-of-range indices wrap.
pub fn slot_symbol(index: u8) -> &'static str {
    SLOT_SYMBOLS[index as usize % SLOT_SYMBOLS.len()]
}
