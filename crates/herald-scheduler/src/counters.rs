//! Counter and quota accounting.
//!
//! Campaign counters and user quotas share one primitive: try the store's
//! atomic increment, and if that fails fall back to read-then-write. The
//! fallback can lose updates under concurrent writers; it is logged as
//! degraded mode, not an error.

use herald_core::error::Result;
use herald_core::traits::{CampaignStore, CounterStore};
use herald_core::types::{CampaignCounter, ContactStatus, CounterTarget, QuotaField};

/// Add `delta` to a counter.
pub async fn increment<S>(store: &S, target: &CounterTarget, delta: i64) -> Result<()>
where
    S: CounterStore + ?Sized,
{
    match store.increment_atomic(target, delta).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!("⚠️ Atomic increment of {target} unavailable ({e}), degraded read-write");
            let current = store.read_counter(target).await?.unwrap_or(0);
            store.write_counter(target, current + delta).await
        }
    }
}

/// Counter moves for one finished send: outcome +1, pending -1.
pub async fn record_outcome<S>(store: &S, campaign_id: &str, status: ContactStatus) -> Result<()>
where
    S: CounterStore + ?Sized,
{
    let counter = match status {
        ContactStatus::Sent => CampaignCounter::Sent,
        _ => CampaignCounter::Error,
    };
    increment(store, &CounterTarget::campaign(campaign_id, counter), 1).await?;
    increment(
        store,
        &CounterTarget::campaign(campaign_id, CampaignCounter::Pending),
        -1,
    )
    .await
}

/// Actions that consume a user's plan quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaAction {
    CreateCampaign,
    StartCampaign,
    SendMessage,
    SearchLeads,
}

impl QuotaAction {
    pub fn field(&self) -> QuotaField {
        match self {
            Self::CreateCampaign | Self::StartCampaign => QuotaField::CampaignsUsed,
            Self::SendMessage => QuotaField::MessagesUsed,
            Self::SearchLeads => QuotaField::LeadsUsed,
        }
    }
}

/// Whether `user_id` may perform `action`.
///
/// No quota row denies; `-1` is unlimited; `0` blocks; otherwise usage must
/// be below the limit. A failed lookup allows the action.
pub async fn check_quota<S>(store: &S, user_id: &str, action: QuotaAction) -> bool
where
    S: CampaignStore + ?Sized,
{
    let quota = match store.get_quota(user_id).await {
        Ok(Some(q)) => q,
        Ok(None) => {
            tracing::warn!("🚫 No quota configured for user {user_id}");
            return false;
        }
        Err(e) => {
            tracing::error!("❌ Quota lookup failed for user {user_id}: {e}, allowing");
            return true;
        }
    };

    let (limit, used) = quota.limit_and_usage(action.field());
    match limit {
        -1 => true,
        0 => false,
        limit => used < limit,
    }
}

/// Record one use of `action` against the user's quota.
pub async fn increment_quota<S>(store: &S, user_id: &str, action: QuotaAction) -> Result<()>
where
    S: CounterStore + ?Sized,
{
    increment(store, &CounterTarget::quota(user_id, action.field()), 1).await
}
