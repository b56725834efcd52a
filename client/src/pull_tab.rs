//! Pull-tab tickets.
//!
//! The outcome belongs to the ticket, not to any tab. The first pull requests
//! the reveal; every pull, including that one, only flips its own tab.

use crate::{client::GameApi, flow::TicketFlow, reveal::Phase, Error, Result};
use sweeps_types::GameRoundOutcome;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TabState {
    #[default]
    Sealed,
    Pulled,
}

pub struct PullTabTicket<'a, A: GameApi> {
    flow: TicketFlow<'a, A>,
    tabs: Vec<TabState>,
}

impl<'a, A: GameApi> PullTabTicket<'a, A> {
    /// Tab count comes from the ticket type.
    pub fn new(flow: TicketFlow<'a, A>) -> Self {
        let count = flow.ticket().tabs.max(1) as usize;
        Self::with_tabs(flow, count)
    }

    pub fn with_tabs(flow: TicketFlow<'a, A>, count: usize) -> Self {
        Self {
            flow,
            tabs: vec![TabState::Sealed; count],
        }
    }

    pub fn flow(&self) -> &TicketFlow<'a, A> {
        &self.flow
    }

    pub fn tabs(&self) -> &[TabState] {
        &self.tabs
    }

    pub fn pulled(&self) -> usize {
        self.tabs.iter().filter(|&&t| t == TabState::Pulled).count()
    }

    /// Pull one tab. Returns the ticket outcome on the pull that reveals it.
    pub async fn pull(&mut self, index: usize) -> Result<Option<GameRoundOutcome>> {
        let count = self.tabs.len();
        let tab = self
            .tabs
            .get_mut(index)
            .ok_or_else(|| Error::Validation(format!("tab {index} out of range ({count} tabs)")))?;
        if *tab == TabState::Pulled {
            return Ok(None);
        }
        match self.flow.phase() {
            Phase::Idle => {
                debug!(index, "tab pulled before purchase");
                return Ok(None);
            }
            Phase::Purchased => *tab = TabState::Pulled,
            phase => {
                debug!(index, %phase, "cosmetic tab pull");
                *tab = TabState::Pulled;
                return Ok(None);
            }
        }
        match self.flow.reveal().await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) => {
                self.tabs[index] = TabState::Sealed;
                Err(err)
            }
        }
    }

    /// Pull every sealed tab in order. Returns the outcome if one of the
    /// pulls revealed the ticket.
    pub async fn pull_all(&mut self) -> Result<Option<GameRoundOutcome>> {
        let mut revealed = None;
        for index in 0..self.tabs.len() {
            if let Some(outcome) = self.pull(index).await? {
                revealed = Some(outcome);
            }
        }
        Ok(revealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mocks::{profile, MockApi},
        session::Session,
    };
    use sweeps_types::{Currency, TicketKind, TicketType};

    fn ticket() -> TicketType {
        TicketType {
            id: 9,
            name: "Triple Tabs".to_string(),
            kind: TicketKind::PullTab,
            price: 1.0,
            currency: Currency::Sc,
            tabs: 3,
        }
    }

    #[tokio::test]
    async fn test_first_pull_reveals_ticket() {
        let api = MockApi::new(profile(0.0, 5.0));
        api.set_next_purchase_id(42);
        api.push_outcome(GameRoundOutcome::win(3.0));
        let session = Session::new();
        session.login(profile(0.0, 5.0));
        let flow = TicketFlow::new(&api, &session, ticket());
        assert_eq!(flow.purchase().await.unwrap(), 42);

        let mut ticket = PullTabTicket::new(flow);
        assert_eq!(ticket.tabs().len(), 3);
        let outcome = ticket.pull(0).await.unwrap().unwrap();
        assert!(outcome.is_win);
        assert_eq!(api.calls().reveal, 1);

        assert!(ticket.pull(1).await.unwrap().is_none());
        assert!(ticket.pull(2).await.unwrap().is_none());
        assert!(ticket.pull(0).await.unwrap().is_none());
        assert_eq!(api.calls().reveal, 1);
        assert_eq!(ticket.pulled(), 3);
        assert_eq!(ticket.flow().purchase_id(), Some(42));
    }

    #[tokio::test]
    async fn test_pull_all_reveals_once() {
        let api = MockApi::new(profile(0.0, 5.0));
        api.push_outcome(GameRoundOutcome::win(2.0));
        let session = Session::new();
        session.login(profile(0.0, 5.0));
        let flow = TicketFlow::new(&api, &session, ticket());
        flow.purchase().await.unwrap();

        let mut ticket = PullTabTicket::new(flow);
        let outcome = ticket.pull_all().await.unwrap().unwrap();
        assert_eq!(outcome.win_amount, 2.0);
        assert_eq!(ticket.pulled(), 3);
        assert_eq!(api.calls().reveal, 1);
        assert!(ticket.pull_all().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pull_before_purchase_is_cosmetic() {
        let api = MockApi::new(profile(0.0, 5.0));
        let session = Session::new();
        session.login(profile(0.0, 5.0));
        let mut ticket = PullTabTicket::new(TicketFlow::new(&api, &session, ticket()));
        assert!(ticket.pull(1).await.unwrap().is_none());
        assert!(matches!(ticket.pull(7).await, Err(Error::Validation(_))));
        assert_eq!(api.calls().reveal, 0);
        assert_eq!(ticket.pulled(), 0);

        // The same tab reveals once the ticket is bought
        ticket.flow().purchase().await.unwrap();
        assert!(ticket.pull(1).await.unwrap().is_some());
        assert_eq!(api.calls().reveal, 1);
        assert_eq!(ticket.tabs()[1], TabState::Pulled);
    }

    #[tokio::test]
    async fn test_failed_reveal_reseals_tab() {
        let api = MockApi::new(profile(0.0, 5.0));
        let session = Session::new();
        session.login(profile(0.0, 5.0));
        let flow = TicketFlow::new(&api, &session, ticket());
        flow.purchase().await.unwrap();

        let mut ticket = PullTabTicket::new(flow);
        api.fail_next(1);
        assert!(ticket.pull(0).await.is_err());
        assert_eq!(ticket.tabs()[0], TabState::Sealed);
        assert!(ticket.pull(0).await.unwrap().is_some());
    }
}
