//! Collaborator traits: persistent store, messaging gateway, tenant
//! directory and notifier. The scheduler only ever sees these.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Campaign, CampaignPatch, CampaignPulse, CampaignStatus, CampaignSummary, Contact,
    ContactOutcome, ContactStatus, CounterTarget, DeliveryReceipt, MessageLog, NewNotification,
    OutboundMessage, TenantProfile, UserQuota,
};

/// Counter primitives. `increment_atomic` is preferred; the read/write pair
/// backs the degraded fallback path when the atomic primitive is unavailable.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Server-side `field = field + delta`.
    async fn increment_atomic(&self, target: &CounterTarget, delta: i64) -> Result<()>;

    /// Current value, `None` when the row does not exist.
    async fn read_counter(&self, target: &CounterTarget) -> Result<Option<i64>>;

    async fn write_counter(&self, target: &CounterTarget, value: i64) -> Result<()>;
}

/// Row store for campaigns, contacts, logs, notifications and quotas.
#[async_trait]
pub trait CampaignStore: CounterStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<()>;

    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>>;

    /// Status + pending count only.
    async fn campaign_pulse(&self, campaign_id: &str) -> Result<Option<CampaignPulse>>;

    async fn update_campaign(&self, campaign_id: &str, patch: &CampaignPatch) -> Result<()>;

    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    async fn insert_contacts(&self, contacts: &[Contact]) -> Result<usize>;

    /// Any contact still `pending`; repeated calls eventually drain them all.
    async fn next_pending_contact(&self, campaign_id: &str) -> Result<Option<Contact>>;

    async fn update_contact(&self, contact_id: &str, outcome: &ContactOutcome) -> Result<()>;

    /// Back to `pending`, clearing error and sent time. Returns rows touched.
    async fn reset_contacts(&self, campaign_id: &str) -> Result<usize>;

    async fn count_contacts(&self, campaign_id: &str, status: Option<ContactStatus>)
    -> Result<i64>;

    async fn append_message_log(&self, log: &MessageLog) -> Result<()>;

    async fn list_message_logs(&self, campaign_id: &str) -> Result<Vec<MessageLog>>;

    async fn delete_message_logs(&self, campaign_id: &str) -> Result<usize>;

    /// Number of `sent` message logs at or after `since`.
    async fn count_sent_since(&self, campaign_id: &str, since: DateTime<Utc>) -> Result<i64>;

    async fn create_notification(&self, notification: &NewNotification) -> Result<()>;

    async fn get_quota(&self, user_id: &str) -> Result<Option<UserQuota>>;
}

/// Resolves tenants to their display name and timezone.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn tenant_profile(&self, tenant_id: &str) -> Result<Option<TenantProfile>>;

    /// IANA timezone name configured for the tenant, if any.
    async fn timezone_for(&self, tenant_id: &str) -> Result<Option<String>> {
        Ok(self
            .tenant_profile(tenant_id)
            .await?
            .and_then(|profile| profile.timezone))
    }
}

/// Outbound messaging gateway. Any `Err` is a terminal failure for that
/// attempt; retries and timeouts are the gateway's own business.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt>;

    /// Whether the tenant's session can currently deliver messages.
    async fn is_connected(&self, _tenant_id: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Fire-and-forget campaign notifications (email, webhook, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn campaign_completed(&self, summary: &CampaignSummary) -> Result<()>;

    async fn campaign_errored(&self, summary: &CampaignSummary, error: &str) -> Result<()>;
}
