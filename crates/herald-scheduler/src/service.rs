//! Campaign lifecycle: the status transitions around the dispatch loop.
//!
//! Every transition that must halt a live loop goes through the registry
//! first and only then touches the stored status.

use std::sync::Arc;

use herald_core::HeraldError;
use herald_core::config::OrphanPolicy;
use herald_core::error::Result;
use herald_core::traits::{CampaignStore, MessageGateway};
use herald_core::types::{
    Campaign, CampaignPatch, CampaignStats, CampaignStatus, Contact, ContactStatus,
};

use crate::clock::Clock;
use crate::counters::{QuotaAction, check_quota, increment_quota};
use crate::registry::WorkerRegistry;
use crate::worker::DispatchContext;

pub struct CampaignService {
    store: Arc<dyn CampaignStore>,
    gateway: Arc<dyn MessageGateway>,
    clock: Arc<dyn Clock>,
    registry: WorkerRegistry,
    /// Serializes start and orphan resumption: check, status write and
    /// spawn happen as one step.
    start_lock: tokio::sync::Mutex<()>,
}

impl CampaignService {
    pub fn new(ctx: DispatchContext) -> Self {
        let store = ctx.store.clone();
        let gateway = ctx.gateway.clone();
        let clock = ctx.clock.clone();
        Self {
            store,
            gateway,
            clock,
            registry: WorkerRegistry::new(Arc::new(ctx)),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Persist a campaign with its contacts. Counters come from the contact
    /// list; the campaign is `ready` when it has at least one contact.
    pub async fn create(&self, mut campaign: Campaign, mut contacts: Vec<Contact>) -> Result<Campaign> {
        for contact in &mut contacts {
            contact.campaign_id = campaign.id.clone();
            contact.status = ContactStatus::Pending;
            contact.error_message = None;
            contact.sent_at = None;
        }

        let total = contacts.len() as i64;
        campaign.total_contacts = total;
        campaign.pending_count = total;
        campaign.sent_count = 0;
        campaign.error_count = 0;
        campaign.status = if total > 0 {
            CampaignStatus::Ready
        } else {
            CampaignStatus::Draft
        };

        self.store.create_campaign(&campaign).await?;
        self.store.insert_contacts(&contacts).await?;
        tracing::info!(
            "📋 Campaign '{}' created ({}) with {total} contacts",
            campaign.name,
            campaign.id
        );
        Ok(campaign)
    }

    pub async fn get(&self, campaign_id: &str) -> Result<Campaign> {
        self.store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| HeraldError::NotFound(format!("campaign {campaign_id}")))
    }

    /// Mark the campaign `running` and spawn its dispatch loop.
    pub async fn start(&self, campaign_id: &str, tenant_id: &str) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        let campaign = self.get(campaign_id).await?;
        if campaign.tenant_id != tenant_id {
            return Err(HeraldError::NotFound(format!("campaign {campaign_id}")));
        }
        if campaign.total_contacts <= 0 {
            return Err(HeraldError::InvalidState(
                "Campaign has no contacts. Upload contacts first.".into(),
            ));
        }
        if campaign.status.is_terminal() {
            return Err(HeraldError::InvalidState(format!(
                "Campaign {campaign_id} is {}",
                campaign.status
            )));
        }
        if self.registry.is_running(campaign_id) {
            return Err(HeraldError::AlreadyRunning(campaign_id.to_string()));
        }
        if !check_quota(self.store.as_ref(), &campaign.user_id, QuotaAction::StartCampaign).await {
            return Err(HeraldError::QuotaExceeded(format!(
                "user {} cannot start more campaigns",
                campaign.user_id
            )));
        }
        if !self.gateway.is_connected(tenant_id).await? {
            return Err(HeraldError::Gateway(
                "WhatsApp session disconnected. Scan the QR code again.".into(),
            ));
        }

        let patch = CampaignPatch {
            started_at: Some(Some(self.clock.now())),
            ..CampaignPatch::status(CampaignStatus::Running)
        };
        self.store.update_campaign(campaign_id, &patch).await?;

        match self.registry.start(campaign_id) {
            Ok(()) => {}
            // A live loop owns the campaign and its `running` status.
            Err(e @ HeraldError::AlreadyRunning(_)) => return Err(e),
            Err(e) => {
                self.store
                    .update_campaign(campaign_id, &CampaignPatch::status(campaign.status))
                    .await?;
                return Err(e);
            }
        }

        if let Err(e) =
            increment_quota(self.store.as_ref(), &campaign.user_id, QuotaAction::StartCampaign)
                .await
        {
            tracing::warn!("⚠️ Failed to record quota usage for {}: {e}", campaign.user_id);
        }
        Ok(())
    }

    pub async fn pause(&self, campaign_id: &str) -> Result<()> {
        let campaign = self.get(campaign_id).await?;
        if campaign.status.is_terminal() {
            return Err(HeraldError::InvalidState(format!(
                "Campaign {campaign_id} is {}",
                campaign.status
            )));
        }
        self.halt(campaign_id).await?;
        self.store
            .update_campaign(campaign_id, &CampaignPatch::status(CampaignStatus::Paused))
            .await?;
        tracing::info!("⏸️ Campaign {campaign_id} paused");
        Ok(())
    }

    pub async fn cancel(&self, campaign_id: &str) -> Result<()> {
        let campaign = self.get(campaign_id).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(HeraldError::InvalidState(format!(
                "Campaign {campaign_id} is already completed"
            )));
        }
        self.halt(campaign_id).await?;
        self.store
            .update_campaign(campaign_id, &CampaignPatch::status(CampaignStatus::Cancelled))
            .await?;
        tracing::info!("🚫 Campaign {campaign_id} cancelled");
        Ok(())
    }

    /// Back to `ready` with every contact pending and the history cleared.
    pub async fn reset(&self, campaign_id: &str) -> Result<()> {
        self.get(campaign_id).await?;
        self.halt(campaign_id).await?;

        self.store.reset_contacts(campaign_id).await?;
        let total = self.store.count_contacts(campaign_id, None).await?;
        let patch = CampaignPatch {
            status: Some(CampaignStatus::Ready),
            total_contacts: Some(total),
            pending_count: Some(total),
            sent_count: Some(0),
            error_count: Some(0),
            started_at: Some(None),
            completed_at: Some(None),
        };
        self.store.update_campaign(campaign_id, &patch).await?;
        let removed = self.store.delete_message_logs(campaign_id).await?;
        tracing::info!("🔄 Campaign {campaign_id} reset ({total} contacts, {removed} logs removed)");
        Ok(())
    }

    pub async fn stats(&self, campaign_id: &str) -> Result<CampaignStats> {
        let campaign = self.get(campaign_id).await?;
        Ok(CampaignStats::from_campaign(
            &campaign,
            self.registry.is_running(campaign_id),
        ))
    }

    /// Handle campaigns stored as `running` with no live loop in this
    /// process (left over from a previous process). Returns their ids.
    pub async fn reconcile_orphans(&self, policy: OrphanPolicy) -> Result<Vec<String>> {
        let _guard = self.start_lock.lock().await;
        let running = self
            .store
            .list_campaigns_by_status(CampaignStatus::Running)
            .await?;

        let mut orphans = Vec::new();
        for campaign in running {
            if self.registry.is_running(&campaign.id) {
                continue;
            }
            match policy {
                OrphanPolicy::Resume => match self.registry.start(&campaign.id) {
                    Ok(()) | Err(HeraldError::AlreadyRunning(_)) => {
                        tracing::info!("♻️ Resumed orphaned campaign {}", campaign.id);
                    }
                    Err(e) => {
                        tracing::error!("❌ Could not resume campaign {}: {e}", campaign.id);
                        continue;
                    }
                },
                OrphanPolicy::Pause => {
                    self.store
                        .update_campaign(&campaign.id, &CampaignPatch::status(CampaignStatus::Paused))
                        .await?;
                    tracing::warn!("⏸️ Paused orphaned campaign {}", campaign.id);
                }
            }
            orphans.push(campaign.id);
        }
        Ok(orphans)
    }

    /// Stop every live loop, leaving stored statuses untouched so the next
    /// process can reconcile them.
    pub async fn shutdown(&self) {
        let running = self.registry.running_ids();
        if !running.is_empty() {
            tracing::info!("🛑 Stopping {} running campaign(s)", running.len());
        }
        self.registry.stop_all().await;
    }

    async fn halt(&self, campaign_id: &str) -> Result<()> {
        match self.registry.stop(campaign_id).await {
            Ok(()) | Err(HeraldError::NotRunning(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
