//! Domain model: campaigns, contacts, message logs, quotas.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HeraldError;

/// Campaign lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Ready,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Ready => "ready",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses cannot be started again without a reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "ready" => Ok(CampaignStatus::Ready),
            "running" => Ok(CampaignStatus::Running),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            other => Err(HeraldError::InvalidState(format!(
                "unknown campaign status '{other}'"
            ))),
        }
    }
}

/// Per-contact delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Pending,
    Sent,
    Error,
    Skipped,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Pending => "pending",
            ContactStatus::Sent => "sent",
            ContactStatus::Error => "error",
            ContactStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ContactStatus::Pending),
            "sent" => Ok(ContactStatus::Sent),
            "error" => Ok(ContactStatus::Error),
            "skipped" => Ok(ContactStatus::Skipped),
            other => Err(HeraldError::InvalidState(format!(
                "unknown contact status '{other}'"
            ))),
        }
    }
}

/// Outbound message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Document => "document",
        }
    }
}

impl FromStr for MessageKind {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "document" => Ok(MessageKind::Document),
            other => Err(HeraldError::InvalidState(format!(
                "unknown message type '{other}'"
            ))),
        }
    }
}

/// Message template attached to a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageTemplate {
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub text: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_filename: Option<String>,
}

/// Pacing and working-window settings of a campaign.
///
/// `working_days` uses the Sunday=0 convention of the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingSettings {
    #[serde(default = "default_interval_min")]
    pub interval_min: u64,
    #[serde(default = "default_interval_max")]
    pub interval_max: u64,
    #[serde(default)]
    pub daily_limit: Option<i64>,
    #[serde(default = "default_working_days")]
    pub working_days: Vec<u8>,
    /// "HH:MM"
    #[serde(default)]
    pub start_time: Option<String>,
    /// "HH:MM"
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

fn default_interval_min() -> u64 {
    30
}

fn default_interval_max() -> u64 {
    60
}

fn default_working_days() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            interval_min: default_interval_min(),
            interval_max: default_interval_max(),
            daily_limit: None,
            working_days: default_working_days(),
            start_time: None,
            end_time: None,
            timezone: None,
        }
    }
}

/// A bulk-messaging campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub message: MessageTemplate,
    pub settings: PacingSettings,
    pub total_contacts: i64,
    pub sent_count: i64,
    pub error_count: i64,
    pub pending_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// New draft campaign with zeroed counters.
    pub fn new(
        tenant_id: &str,
        user_id: &str,
        name: &str,
        message: MessageTemplate,
        settings: PacingSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            status: CampaignStatus::Draft,
            message,
            settings,
            total_contacts: 0,
            sent_count: 0,
            error_count: 0,
            pending_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// `sent + error + pending == total`; holds whenever no send is in flight.
    pub fn counters_balanced(&self) -> bool {
        self.sent_count + self.error_count + self.pending_count == self.total_contacts
    }
}

/// One recipient within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Free-form fields available to the template.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_contact_status")]
    pub status: ContactStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

fn default_contact_status() -> ContactStatus {
    ContactStatus::Pending
}

impl Contact {
    pub fn pending(campaign_id: &str, name: &str, phone: &str) -> Self {
        Self {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            name: name.to_string(),
            phone: phone.to_string(),
            email: None,
            category: None,
            extra: BTreeMap::new(),
            status: ContactStatus::Pending,
            error_message: None,
            sent_at: None,
        }
    }
}

/// Outcome written back to a contact after its single send attempt.
#[derive(Debug, Clone)]
pub struct ContactOutcome {
    pub status: ContactStatus,
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Immutable audit record, one per send attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: String,
    pub campaign_id: String,
    pub contact_id: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub status: ContactStatus,
    pub error_message: Option<String>,
    pub message_sent: String,
    pub sent_at: DateTime<Utc>,
}

/// Lightweight status read on every loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignPulse {
    pub status: CampaignStatus,
    pub pending_count: i64,
}

/// Partial campaign update. `None` leaves a column untouched;
/// `Some(None)` on an optional column clears it.
#[derive(Debug, Clone, Default)]
pub struct CampaignPatch {
    pub status: Option<CampaignStatus>,
    pub total_contacts: Option<i64>,
    pub sent_count: Option<i64>,
    pub error_count: Option<i64>,
    pub pending_count: Option<i64>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl CampaignPatch {
    pub fn status(status: CampaignStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Campaign counter columns that the dispatch loop moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CampaignCounter {
    Sent,
    Error,
    Pending,
}

impl CampaignCounter {
    pub fn column(&self) -> &'static str {
        match self {
            CampaignCounter::Sent => "sent_count",
            CampaignCounter::Error => "error_count",
            CampaignCounter::Pending => "pending_count",
        }
    }
}

/// Usage columns of a user's plan quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaField {
    CampaignsUsed,
    MessagesUsed,
    LeadsUsed,
}

impl QuotaField {
    pub fn column(&self) -> &'static str {
        match self {
            QuotaField::CampaignsUsed => "campaigns_used",
            QuotaField::MessagesUsed => "messages_used",
            QuotaField::LeadsUsed => "leads_used",
        }
    }
}

/// Row + column addressed by a counter increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterTarget {
    Campaign {
        campaign_id: String,
        counter: CampaignCounter,
    },
    Quota {
        user_id: String,
        field: QuotaField,
    },
}

impl CounterTarget {
    pub fn campaign(campaign_id: &str, counter: CampaignCounter) -> Self {
        CounterTarget::Campaign {
            campaign_id: campaign_id.to_string(),
            counter,
        }
    }

    pub fn quota(user_id: &str, field: QuotaField) -> Self {
        CounterTarget::Quota {
            user_id: user_id.to_string(),
            field,
        }
    }
}

impl fmt::Display for CounterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterTarget::Campaign { campaign_id, counter } => {
                write!(f, "campaigns[{campaign_id}].{}", counter.column())
            }
            CounterTarget::Quota { user_id, field } => {
                write!(f, "user_quotas[{user_id}].{}", field.column())
            }
        }
    }
}

/// Plan limits and usage. A limit of -1 means unlimited, 0 means blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuota {
    pub user_id: String,
    pub campaigns_limit: i64,
    pub campaigns_used: i64,
    pub messages_limit: i64,
    pub messages_used: i64,
    pub leads_limit: i64,
    pub leads_used: i64,
}

impl UserQuota {
    pub fn limit_and_usage(&self, field: QuotaField) -> (i64, i64) {
        match field {
            QuotaField::CampaignsUsed => (self.campaigns_limit, self.campaigns_used),
            QuotaField::MessagesUsed => (self.messages_limit, self.messages_used),
            QuotaField::LeadsUsed => (self.leads_limit, self.leads_used),
        }
    }
}

/// Tenant (company) profile used by the dispatch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: String,
    pub name: String,
    /// IANA timezone name.
    pub timezone: Option<String>,
}

/// In-app notification row shown in the dashboard bell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: String,
    pub tenant_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

/// Snapshot handed to the notifier on completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub campaign_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub name: String,
    pub total_contacts: i64,
    pub sent_count: i64,
    pub error_count: i64,
}

impl From<&Campaign> for CampaignSummary {
    fn from(c: &Campaign) -> Self {
        Self {
            campaign_id: c.id.clone(),
            tenant_id: c.tenant_id.clone(),
            user_id: c.user_id.clone(),
            name: c.name.clone(),
            total_contacts: c.total_contacts,
            sent_count: c.sent_count,
            error_count: c.error_count,
        }
    }
}

/// Progress figures for status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total: i64,
    pub sent: i64,
    pub pending: i64,
    pub errors: i64,
    pub progress_percent: f64,
    pub is_worker_running: bool,
}

impl CampaignStats {
    pub fn from_campaign(c: &Campaign, is_worker_running: bool) -> Self {
        let progress = if c.total_contacts > 0 {
            (c.sent_count as f64 / c.total_contacts as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            total: c.total_contacts,
            sent: c.sent_count,
            pending: c.pending_count,
            errors: c.error_count,
            progress_percent: progress,
            is_worker_running,
        }
    }
}

/// A message ready for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub tenant_id: String,
    pub kind: MessageKind,
    /// Raw phone number as stored on the contact.
    pub to: String,
    pub body: String,
    pub media_url: Option<String>,
    pub media_filename: Option<String>,
}

/// Gateway acknowledgement of a delivered message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}

/// Fresh row identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
