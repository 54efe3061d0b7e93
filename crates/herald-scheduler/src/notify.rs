//! Campaign notifications: completion and pause-on-error signals.
//! Best-effort side channel. Failures are logged by the caller and never
//! change campaign state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::HeraldError;
use herald_core::config::NotifyConfig;
use herald_core::error::Result;
use herald_core::traits::Notifier;
use herald_core::types::CampaignSummary;
use serde::{Deserialize, Serialize};

/// A notification about one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: NotifyPriority,
    /// Event name: `campaign_completed` or `campaign_error`.
    pub event: String,
    pub campaign: CampaignSummary,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotifyPriority {
    Normal,
    High,
}

impl Notification {
    pub fn completed(summary: &CampaignSummary) -> Self {
        Self {
            title: format!("✅ Campanha '{}' concluída", summary.name),
            body: format!(
                "{} de {} mensagens enviadas, {} com erro.",
                summary.sent_count, summary.total_contacts, summary.error_count
            ),
            priority: NotifyPriority::Normal,
            event: "campaign_completed".into(),
            campaign: summary.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn errored(summary: &CampaignSummary, error: &str) -> Self {
        Self {
            title: "❌ Erro na Campanha".into(),
            body: campaign_error_message(&summary.name, error),
            priority: NotifyPriority::High,
            event: "campaign_error".into(),
            campaign: summary.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// User-facing text for a campaign paused by an unrecoverable error.
/// `error` must already be sanitized.
pub fn campaign_error_message(campaign_name: &str, error: &str) -> String {
    format!("A campanha '{campaign_name}' foi pausada devido a um erro: {error}")
}

/// Generic HTTP webhook: POST the notification as JSON.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers,
        }
    }

    async fn post(&self, notification: &Notification) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .json(notification)
            .timeout(Duration::from_secs(10));
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| HeraldError::Other(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Webhook notification sent: {}", notification.title);
            Ok(())
        } else {
            Err(HeraldError::Other(format!("Webhook error {}", resp.status())))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn campaign_completed(&self, summary: &CampaignSummary) -> Result<()> {
        self.post(&Notification::completed(summary)).await
    }

    async fn campaign_errored(&self, summary: &CampaignSummary, error: &str) -> Result<()> {
        self.post(&Notification::errored(summary, error)).await
    }
}

/// Used when no notification target is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn campaign_completed(&self, summary: &CampaignSummary) -> Result<()> {
        tracing::debug!("📭 Campaign {} completed (no notifier configured)", summary.campaign_id);
        Ok(())
    }

    async fn campaign_errored(&self, summary: &CampaignSummary, _error: &str) -> Result<()> {
        tracing::debug!("📭 Campaign {} errored (no notifier configured)", summary.campaign_id);
        Ok(())
    }
}

/// Webhook when configured, otherwise a no-op.
pub fn notifier_from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match config.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            let headers = config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Arc::new(WebhookNotifier::new(url, headers))
        }
        None => Arc::new(NoopNotifier),
    }
}
