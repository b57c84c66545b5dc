use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::account::{Account, Request};
use crate::config::ApiConfig;

/// The fixed set of accounts claiming on every watched room.
///
/// Built and warmed once, then shared read-only by all monitors.
#[derive(Debug, Default)]
pub struct AccountPool {
    accounts: Vec<Arc<Account>>,
}

impl AccountPool {
    /// Wrap accounts without touching the network
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts: accounts.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build a pool and pre-fetch every account's follow list
    pub async fn warmed(accounts: Vec<Account>) -> Self {
        let pool = Self::new(accounts);
        join_all(
            pool.accounts
                .iter()
                .map(|account| account.warm_cache(Request::ListFollowed)),
        )
        .await;
        info!("Account pool ready with {} account(s)", pool.len());
        pool
    }

    /// Build a warmed pool from session cookies, skipping unusable ones
    pub async fn from_cookies(config: &ApiConfig, cookies: &[String]) -> Self {
        let mut accounts = Vec::with_capacity(cookies.len());
        for (index, cookie) in cookies.iter().enumerate() {
            match Account::from_cookie(config, cookie) {
                Ok(account) => accounts.push(account),
                Err(e) => warn!("Skipping account #{}: {}", index, e),
            }
        }
        Self::warmed(accounts).await
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Account>> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.accounts.iter().map(|a| a.id()).collect()
    }

    /// First pool account appearing in `winners`
    pub fn find_winner(&self, winners: &[u64]) -> Option<u64> {
        winners
            .iter()
            .copied()
            .find(|winner| self.accounts.iter().any(|a| a.id() == *winner))
    }
}
