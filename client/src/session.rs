//! Authenticated session context.
//!
//! A [Session] is created once at start-up and handed to every consumer. Its
//! balance is written by exactly two paths: an authoritative profile refresh
//! and pushed `balance-update` events. Both replace the fields they carry.

use crate::{client::GameApi, Error, Result};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use sweeps_types::{Balance, BalanceUpdate, ChatUser, UserId, UserProfile};
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct Session {
    profile: RwLock<Option<UserProfile>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<UserProfile>> {
        self.profile.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<UserProfile>> {
        self.profile.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn login(&self, profile: UserProfile) {
        info!(user = profile.id, username = %profile.username, "logged in");
        *self.write() = Some(profile);
    }

    /// Log out server-side and drop the local profile. The local profile is
    /// cleared even when the server call fails.
    pub async fn logout<A: GameApi>(&self, api: &A) -> Result<()> {
        let result = api.logout().await;
        if let Some(profile) = self.write().take() {
            info!(user = profile.id, "logged out");
        }
        result
    }

    /// Replace the local profile with the server's copy.
    pub async fn refresh<A: GameApi>(&self, api: &A) -> Result<UserProfile> {
        let profile = api.me().await?;
        debug!(
            user = profile.id,
            gc = profile.gc_balance,
            sc = profile.sc_balance,
            "profile refreshed"
        );
        *self.write() = Some(profile.clone());
        Ok(profile)
    }

    /// Merge a pushed balance replacement. Returns the resulting balance, or
    /// `None` when no user is logged in (the update is dropped).
    pub fn apply_balance_update(&self, update: &BalanceUpdate) -> Option<Balance> {
        let mut guard = self.write();
        let Some(profile) = guard.as_mut() else {
            warn!("balance update without a session");
            return None;
        };
        let mut balance = profile.balance();
        balance.merge(update);
        profile.gc_balance = balance.gc_balance;
        profile.sc_balance = balance.sc_balance;
        Some(balance)
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().is_some()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.read().clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.read().as_ref().map(|profile| profile.id)
    }

    pub fn balance(&self) -> Result<Balance> {
        self.read()
            .as_ref()
            .map(UserProfile::balance)
            .ok_or(Error::NotLoggedIn)
    }

    pub fn referral_code(&self) -> Option<String> {
        self.read()
            .as_ref()
            .map(|profile| profile.referral_code.clone())
    }

    /// Identity presented when joining chat rooms.
    pub fn chat_user(&self) -> Option<ChatUser> {
        self.read().as_ref().map(|profile| ChatUser {
            id: profile.id,
            username: profile.username.clone(),
            avatar_url: profile.avatar_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{profile, MockApi};

    #[test]
    fn test_balance_updates_merge() {
        let session = Session::new();
        assert!(session
            .apply_balance_update(&BalanceUpdate::default())
            .is_none());
        assert!(matches!(session.balance(), Err(Error::NotLoggedIn)));

        session.login(profile(100.0, 5.0));
        let update = BalanceUpdate {
            gc_balance: None,
            sc_balance: Some(7.5),
        };
        let balance = session.apply_balance_update(&update).unwrap();
        assert_eq!(balance.gc_balance, 100.0);
        assert_eq!(balance.sc_balance, 7.5);

        // Same payload twice is a no-op
        let again = session.apply_balance_update(&update).unwrap();
        assert_eq!(again, balance);
        assert_eq!(session.balance().unwrap(), balance);
    }

    #[tokio::test]
    async fn test_refresh_overrides_local_state() {
        let api = MockApi::new(profile(900.0, 3.0));
        let session = Session::new();
        session.login(profile(100.0, 5.0));
        session.apply_balance_update(&BalanceUpdate {
            gc_balance: Some(120.0),
            sc_balance: None,
        });

        session.refresh(&api).await.unwrap();
        assert_eq!(session.balance().unwrap().gc_balance, 900.0);
        assert_eq!(session.balance().unwrap().sc_balance, 3.0);
        assert_eq!(api.calls().me, 1);
    }

    #[tokio::test]
    async fn test_logout_clears_profile() {
        let api = MockApi::new(profile(1.0, 1.0));
        let session = Session::new();
        session.login(profile(1.0, 1.0));
        assert_eq!(session.chat_user().unwrap().username, "ada");
        session.logout(&api).await.unwrap();
        assert!(!session.is_logged_in());
        assert!(session.referral_code().is_none());
    }
}
