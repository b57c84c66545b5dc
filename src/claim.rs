//! Claim scheduling and fan-out across the account pool.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::account::Account;
use crate::api::BagItem;
use crate::clock::clamped_millis;
use crate::pool::AccountPool;

/// Everything needed to draw one red packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimTicket {
    pub lot_id: u64,
    pub room_id: u64,
    pub owner_id: u64,
}

/// What one account got out of a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub account_id: u64,
    pub claimed: bool,
    pub bag: Vec<BagItem>,
}

/// Delay before drawing a packet.
///
/// `draw_delay mod last_time` keeps the draw inside the claim window; when a
/// previous packet is still pending, the time left until its removal is added
/// so overlapping packets are drawn one after another.
pub fn jitter_delay(
    draw_delay_secs: u64,
    last_time_secs: u64,
    previous_remove_secs: u64,
    now_secs: u64,
) -> Duration {
    let in_window_ms = match last_time_secs {
        0 => 0,
        window => i128::from(draw_delay_secs % window) * 1000,
    };
    let carry_ms = match previous_remove_secs {
        0 => 0,
        previous => (i128::from(previous) - i128::from(now_secs)) * 1000,
    };
    clamped_millis(in_window_ms + carry_ms)
}

async fn claim_one(account: &Account, ticket: ClaimTicket) -> ClaimOutcome {
    let (claimed, bag) = tokio::join!(
        account.claim_reward(ticket.lot_id, ticket.room_id, ticket.owner_id),
        account.list_bag_contents(),
    );
    if claimed {
        info!(account_id = account.id(), lot_id = ticket.lot_id, "draw ok, bag: {:?}", bag);
    } else {
        warn!(account_id = account.id(), lot_id = ticket.lot_id, "draw failed");
    }
    ClaimOutcome {
        account_id: account.id(),
        claimed,
        bag,
    }
}

/// Draw `ticket` with every account at once.
///
/// Accounts never wait on each other; a failing or slow account only
/// affects its own outcome.
pub async fn fan_out(pool: &AccountPool, ticket: ClaimTicket) -> Vec<ClaimOutcome> {
    join_all(pool.iter().map(|account| claim_one(account, ticket))).await
}

/// Fan out `ticket` after `delay`
pub async fn delayed_fan_out(
    pool: Arc<AccountPool>,
    ticket: ClaimTicket,
    delay: Duration,
) -> Vec<ClaimOutcome> {
    tokio::time::sleep(delay).await;
    fan_out(&pool, ticket).await
}
