use serde::{Deserialize, Serialize};

use super::Currency;

pub type UserId = u64;

/// Authenticated user as returned by `GET /api/auth/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub gc_balance: f64,
    pub sc_balance: f64,
    pub referral_code: String,
    #[serde(default)]
    pub kyc_verified: bool,
    #[serde(default)]
    pub payout_tag: Option<String>,
}

impl UserProfile {
    pub fn balance(&self) -> Balance {
        Balance {
            gc_balance: self.gc_balance,
            sc_balance: self.sc_balance,
        }
    }
}

/// Both currency balances of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub gc_balance: f64,
    pub sc_balance: f64,
}

impl Balance {
    pub fn get(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Gc => self.gc_balance,
            Currency::Sc => self.sc_balance,
        }
    }

    /// Overwrite the fields present in `update`, leaving the rest untouched.
    pub fn merge(&mut self, update: &BalanceUpdate) {
        if let Some(gc) = update.gc_balance {
            self.gc_balance = gc;
        }
        if let Some(sc) = update.sc_balance {
            self.sc_balance = sc;
        }
    }
}

/// Pushed balance replacement. Fields are absolute values, not deltas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sc_balance: Option<f64>,
}

impl From<Balance> for BalanceUpdate {
    fn from(balance: Balance) -> Self {
        Self {
            gc_balance: Some(balance.gc_balance),
            sc_balance: Some(balance.sc_balance),
        }
    }
}
