//! Post-win overlay: headline, share links and claim/save resolution.
//!
//! The overlay never settles anything itself. Claim and save go through the
//! ticket's [TicketFlow](crate::flow::TicketFlow), which owns single-use
//! enforcement; the overlay only reads the resulting phase when it closes.
//! Closing before choosing leaves the win unresolved and still claimable.

use crate::{client::GameApi, flow::TicketFlow, reveal::Phase, Result};
use std::fmt;
use sweeps_types::{Currency, GameRoundOutcome, GameRoundRequest, BIG_WIN_MULTIPLIER};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Headline {
    BigWin,
    Win,
}

impl fmt::Display for Headline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Headline::BigWin => f.write_str("BIG WIN"),
            Headline::Win => f.write_str("WIN"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShareTarget {
    X,
    Facebook,
    Telegram,
}

impl ShareTarget {
    pub const ALL: [ShareTarget; 3] = [
        ShareTarget::X,
        ShareTarget::Facebook,
        ShareTarget::Telegram,
    ];
}

/// How the overlay ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Spin/roll wins are credited with the outcome.
    Credited,
    Claimed,
    Saved,
    Unresolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Round,
    Ticket,
}

#[derive(Clone, Debug)]
pub struct WinCelebration {
    source: Source,
    win_amount: f64,
    stake: f64,
    currency: Currency,
    referral_code: Option<String>,
    shares: usize,
}

impl WinCelebration {
    /// Overlay for a spin or roll. `None` for losses.
    pub fn for_round(
        outcome: &GameRoundOutcome,
        request: &GameRoundRequest,
        referral_code: Option<String>,
    ) -> Option<Self> {
        Self::open(
            Source::Round,
            outcome,
            request.bet_amount,
            request.currency,
            referral_code,
        )
    }

    /// Overlay for a revealed ticket. `None` unless the ticket is a revealed win.
    pub fn for_ticket<A: GameApi>(flow: &TicketFlow<'_, A>) -> Option<Self> {
        if flow.phase() != (Phase::Revealed { is_win: true }) {
            return None;
        }
        let outcome = flow.outcome()?;
        let ticket = flow.ticket();
        Self::open(
            Source::Ticket,
            &outcome,
            ticket.price,
            ticket.currency,
            flow.session().referral_code(),
        )
    }

    fn open(
        source: Source,
        outcome: &GameRoundOutcome,
        stake: f64,
        currency: Currency,
        referral_code: Option<String>,
    ) -> Option<Self> {
        if !outcome.is_win {
            return None;
        }
        Some(Self {
            source,
            win_amount: outcome.win_amount,
            stake,
            currency,
            referral_code,
            shares: 0,
        })
    }

    pub fn headline(&self) -> Headline {
        if self.win_amount >= self.stake * BIG_WIN_MULTIPLIER {
            Headline::BigWin
        } else {
            Headline::Win
        }
    }

    /// e.g. `+500 GC`
    pub fn amount_label(&self) -> String {
        format!("+{} {}", format_amount(self.win_amount), self.currency)
    }

    pub fn win_amount(&self) -> f64 {
        self.win_amount
    }

    /// Whether claim and save apply (tickets only).
    pub fn is_claimable(&self) -> bool {
        self.source == Source::Ticket
    }

    pub fn share_message(&self) -> String {
        let mut message = format!(
            "I just won {} {}!",
            format_amount(self.win_amount),
            self.currency
        );
        if let Some(code) = &self.referral_code {
            message.push_str(&format!(" Join me with referral code {code}"));
        }
        message
    }

    /// Pre-filled share link. Sharing has no balance effect and may be
    /// repeated any number of times.
    pub fn share_url(&mut self, target: ShareTarget, site: &Url) -> Result<Url> {
        let mut link = site.clone();
        if let Some(code) = &self.referral_code {
            link.query_pairs_mut().append_pair("ref", code);
        }
        let message = self.share_message();
        let url = match target {
            ShareTarget::X => Url::parse_with_params(
                "https://twitter.com/intent/tweet",
                &[("text", message.as_str()), ("url", link.as_str())],
            )?,
            ShareTarget::Facebook => Url::parse_with_params(
                "https://www.facebook.com/sharer/sharer.php",
                &[("u", link.as_str()), ("quote", message.as_str())],
            )?,
            ShareTarget::Telegram => Url::parse_with_params(
                "https://t.me/share/url",
                &[("url", link.as_str()), ("text", message.as_str())],
            )?,
        };
        self.shares += 1;
        Ok(url)
    }

    pub fn shares(&self) -> usize {
        self.shares
    }

    /// Close the overlay given the instance's current phase.
    pub fn close(self, phase: Phase) -> Resolution {
        if self.source == Source::Round {
            return Resolution::Credited;
        }
        match phase {
            Phase::Claimed => Resolution::Claimed,
            Phase::Saved => Resolution::Saved,
            _ => Resolution::Unresolved,
        }
    }
}

/// Whole amounts print without decimals, others with two.
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        format!("{amount:.2}")
    }
}
