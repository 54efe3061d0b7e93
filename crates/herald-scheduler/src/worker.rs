//! The per-campaign dispatch loop.
//!
//! One loop drives one campaign: read status, gate on the working window
//! and the daily cap, send to the next pending contact, record the outcome,
//! pace, repeat. It ends `completed`, stops quietly when the campaign is no
//! longer `running`, or forces `paused` on a 24h window stall or an
//! unrecoverable error. Cancellation comes from the registry's token and is
//! observed at every suspension point except the send/record section, which
//! always runs to the end once the gateway has been called.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use herald_core::config::SchedulerConfig;
use herald_core::error::Result;
use herald_core::traits::{CampaignStore, MessageGateway, Notifier, TenantDirectory};
use herald_core::types::{
    CampaignPatch, CampaignStatus, CampaignSummary, Contact, ContactOutcome, ContactStatus,
    MessageLog, MessageTemplate, NewNotification, OutboundMessage, new_id,
};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::counters;
use crate::notify::campaign_error_message;
use crate::render::{contact_fields, render_template};
use crate::sanitize::sanitize_error_message;
use crate::window::{WorkingWindow, resolve_timezone};

/// Everything a dispatch loop talks to.
#[derive(Clone)]
pub struct DispatchContext {
    pub store: Arc<dyn CampaignStore>,
    pub gateway: Arc<dyn MessageGateway>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub settings: SchedulerConfig,
}

/// How a dispatch loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// No pending contacts left; campaign marked `completed`.
    Completed,
    /// Status moved away from `running` externally.
    Stopped,
    /// Campaign row disappeared.
    Vanished,
    /// Outside the working window for the whole wait ceiling; marked `paused`.
    StalledPaused,
    /// Cancellation token fired.
    Cancelled,
    /// Unrecoverable error; campaign marked `paused`. Carries the sanitized message.
    Failed(String),
}

/// Run the dispatch loop for `campaign_id` until it ends.
///
/// Never panics and never returns an error: failures are converted into a
/// paused campaign plus a notification.
pub async fn process_campaign(
    ctx: Arc<DispatchContext>,
    campaign_id: String,
    cancel: CancellationToken,
) -> LoopExit {
    tracing::info!("🚀 Starting dispatch loop for campaign {campaign_id}");

    let outcome = AssertUnwindSafe(run_loop(&ctx, &campaign_id, &cancel))
        .catch_unwind()
        .await;

    let exit = match outcome {
        Ok(Ok(exit)) => exit,
        Ok(Err(e)) => pause_on_error(&ctx, &campaign_id, &e.to_string()).await,
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            pause_on_error(&ctx, &campaign_id, &format!("worker panicked: {msg}")).await
        }
    };

    match &exit {
        LoopExit::Cancelled => tracing::info!("🛑 Campaign {campaign_id} worker cancelled"),
        other => tracing::debug!("Campaign {campaign_id} loop exited: {other:?}"),
    }
    exit
}

/// Await `fut` unless the token fires first.
async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

macro_rules! unless_cancelled {
    ($cancel:expr, $fut:expr) => {
        match or_cancel($cancel, $fut).await {
            Some(out) => out,
            None => return Ok(LoopExit::Cancelled),
        }
    };
}

/// Sent-today cache, refreshed from the store only when the local date changes.
struct DailyCount {
    date: NaiveDate,
    sent: i64,
}

/// Immutable per-run snapshot of the campaign.
struct RunPlan {
    campaign_id: String,
    tenant_id: String,
    template: MessageTemplate,
    window: WorkingWindow,
    tz: Tz,
    company_name: Option<String>,
    interval: (u64, u64),
    daily_limit: Option<i64>,
}

async fn run_loop(
    ctx: &DispatchContext,
    campaign_id: &str,
    cancel: &CancellationToken,
) -> Result<LoopExit> {
    let Some(campaign) = unless_cancelled!(cancel, ctx.store.get_campaign(campaign_id))? else {
        tracing::error!("❌ Campaign {campaign_id} not found");
        return Ok(LoopExit::Vanished);
    };

    let profile = match unless_cancelled!(cancel, ctx.tenants.tenant_profile(&campaign.tenant_id))
    {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!("⚠️ Tenant lookup failed for {}: {e}", campaign.tenant_id);
            None
        }
    };
    let tz_name = profile
        .as_ref()
        .and_then(|p| p.timezone.clone())
        .or_else(|| campaign.settings.timezone.clone());
    let tz = resolve_timezone(tz_name.as_deref(), &ctx.settings.default_timezone);
    tracing::info!(
        "🌎 Campaign {campaign_id} (tenant {}) using timezone {tz}",
        campaign.tenant_id
    );

    let (lo, hi) = (campaign.settings.interval_min, campaign.settings.interval_max);
    let plan = RunPlan {
        campaign_id: campaign_id.to_string(),
        tenant_id: campaign.tenant_id.clone(),
        template: campaign.message.clone(),
        window: WorkingWindow::from_settings(&campaign.settings),
        tz,
        company_name: profile.map(|p| p.name),
        interval: (lo.min(hi), lo.max(hi)),
        daily_limit: campaign.settings.daily_limit.filter(|limit| *limit > 0),
    };

    let today = ctx.clock.now().with_timezone(&tz).date_naive();
    let mut daily = DailyCount {
        date: today,
        sent: unless_cancelled!(
            cancel,
            ctx.store.count_sent_since(campaign_id, local_midnight(today, tz))
        )?,
    };
    let mut wait_cycles: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(LoopExit::Cancelled);
        }

        let Some(pulse) = unless_cancelled!(cancel, ctx.store.campaign_pulse(campaign_id))? else {
            tracing::error!("❌ Campaign {campaign_id} not found - stopping worker");
            return Ok(LoopExit::Vanished);
        };
        if pulse.status != CampaignStatus::Running {
            tracing::info!(
                "⏹️ Campaign {campaign_id} is no longer running (status: {})",
                pulse.status
            );
            return Ok(LoopExit::Stopped);
        }

        // Working window.
        let now = ctx.clock.now();
        if !plan.window.allows(&now.with_timezone(&tz)) {
            wait_cycles += 1;
            if wait_cycles >= ctx.settings.max_wait_cycles {
                tracing::warn!(
                    "⏸️ Campaign {campaign_id} waited {wait_cycles} cycles outside working hours - pausing"
                );
                ctx.store
                    .update_campaign(campaign_id, &CampaignPatch::status(CampaignStatus::Paused))
                    .await?;
                return Ok(LoopExit::StalledPaused);
            }
            if (wait_cycles - 1) % ctx.settings.log_every_cycles.max(1) == 0 {
                tracing::info!(
                    "🌙 Campaign {campaign_id} outside working hours ({tz}), waiting... ({wait_cycles}/{})",
                    ctx.settings.max_wait_cycles
                );
            }
            let poll = Duration::from_secs(ctx.settings.poll_interval_secs);
            unless_cancelled!(cancel, ctx.clock.sleep(poll));
            continue;
        }
        wait_cycles = 0;

        // Next contact, ahead of the daily cap: a drained campaign completes now.
        let Some(contact) =
            unless_cancelled!(cancel, ctx.store.next_pending_contact(campaign_id))?
        else {
            complete_campaign(ctx, campaign_id).await?;
            return Ok(LoopExit::Completed);
        };

        // Daily cap.
        let today = now.with_timezone(&tz).date_naive();
        if today != daily.date {
            daily.sent = unless_cancelled!(
                cancel,
                ctx.store.count_sent_since(campaign_id, local_midnight(today, tz))
            )?;
            daily.date = today;
        }
        if let Some(limit) = plan.daily_limit {
            if daily.sent >= limit {
                tracing::info!(
                    "📊 Campaign {campaign_id} reached daily limit ({}) - waiting for next day",
                    daily.sent
                );
                if let Some(exit) = wait_for_next_day(ctx, &plan, cancel).await? {
                    return Ok(exit);
                }
                daily.sent = 0;
                daily.date = ctx.clock.now().with_timezone(&tz).date_naive();
                continue;
            }
        }

        if cancel.is_cancelled() {
            return Ok(LoopExit::Cancelled);
        }

        if deliver(ctx, &plan, &contact).await? == ContactStatus::Sent {
            daily.sent += 1;
        }

        // Pacing.
        if pulse.pending_count > 1 {
            let secs = {
                let mut rng = rand::thread_rng();
                rng.gen_range(plan.interval.0..=plan.interval.1)
            };
            tracing::info!(
                "⏳ Waiting {secs} seconds before next message... ({} remaining)",
                pulse.pending_count - 1
            );
            if secs > 0 {
                unless_cancelled!(cancel, ctx.clock.sleep(Duration::from_secs(secs)));
            }
        } else {
            tracing::info!("Last message sent, campaign will complete in next iteration");
        }
    }
}

/// Send to one contact and record the outcome. Not cancellable: once the
/// gateway has been called, counters, contact row and log are all written.
async fn deliver(ctx: &DispatchContext, plan: &RunPlan, contact: &Contact) -> Result<ContactStatus> {
    let fields = contact_fields(contact, plan.company_name.as_deref());
    let body = render_template(
        &plan.template.text,
        &fields,
        ctx.settings.template_value_max_len,
    );

    let message = OutboundMessage {
        tenant_id: plan.tenant_id.clone(),
        kind: plan.template.kind,
        to: contact.phone.clone(),
        body: body.clone(),
        media_url: plan.template.media_url.clone(),
        media_filename: plan.template.media_filename.clone(),
    };
    let result = ctx.gateway.send(&message).await;
    let sent_at = ctx.clock.now();

    let (status, error_message) = match result {
        Ok(_) => {
            tracing::info!("✅ Message sent to {} successfully", contact.phone);
            (ContactStatus::Sent, None)
        }
        Err(e) => {
            let sanitized = sanitize_error_message(&e.to_string(), ctx.settings.error_max_len);
            tracing::warn!("⚠️ Failed to send message to {}: {sanitized}", contact.phone);
            (ContactStatus::Error, Some(sanitized))
        }
    };

    counters::record_outcome(ctx.store.as_ref(), &plan.campaign_id, status).await?;

    ctx.store
        .update_contact(
            &contact.id,
            &ContactOutcome {
                status,
                error_message: error_message.clone(),
                sent_at,
            },
        )
        .await?;

    ctx.store
        .append_message_log(&MessageLog {
            id: new_id(),
            campaign_id: plan.campaign_id.clone(),
            contact_id: contact.id.clone(),
            contact_name: contact.name.clone(),
            contact_phone: contact.phone.clone(),
            status,
            error_message,
            message_sent: body,
            sent_at,
        })
        .await?;

    Ok(status)
}

/// Sleep in bounded chunks until the next local midnight, re-probing status
/// between chunks. `Some(exit)` when the loop must end instead of resuming.
async fn wait_for_next_day(
    ctx: &DispatchContext,
    plan: &RunPlan,
    cancel: &CancellationToken,
) -> Result<Option<LoopExit>> {
    let today = ctx.clock.now().with_timezone(&plan.tz).date_naive();
    let next_day = today.succ_opt().unwrap_or(today);
    let resume_at = local_midnight(next_day, plan.tz);
    let chunk = Duration::from_secs(ctx.settings.daily_cap_chunk_secs.max(1));

    loop {
        let now = ctx.clock.now();
        if now >= resume_at {
            return Ok(None);
        }
        let remaining = (resume_at - now).to_std().unwrap_or(Duration::ZERO);
        if or_cancel(cancel, ctx.clock.sleep(remaining.min(chunk))).await.is_none() {
            return Ok(Some(LoopExit::Cancelled));
        }

        let pulse = match or_cancel(cancel, ctx.store.campaign_pulse(&plan.campaign_id)).await {
            Some(pulse) => pulse?,
            None => return Ok(Some(LoopExit::Cancelled)),
        };
        match pulse {
            None => return Ok(Some(LoopExit::Vanished)),
            Some(p) if p.status != CampaignStatus::Running => {
                tracing::info!(
                    "⏹️ Campaign {} status changed during daily limit wait",
                    plan.campaign_id
                );
                return Ok(Some(LoopExit::Stopped));
            }
            Some(_) => {}
        }
    }
}

/// Start of `date` in `tz`, as a UTC instant. When midnight falls in a DST
/// gap, the first valid instant after it.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    (0..=2)
        .find_map(|hours| {
            tz.from_local_datetime(&(midnight + chrono::Duration::hours(hours)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

async fn complete_campaign(ctx: &DispatchContext, campaign_id: &str) -> Result<()> {
    let patch = CampaignPatch {
        completed_at: Some(Some(ctx.clock.now())),
        ..CampaignPatch::status(CampaignStatus::Completed)
    };
    ctx.store.update_campaign(campaign_id, &patch).await?;
    tracing::info!("🎉 Campaign {campaign_id} completed - all contacts processed");

    match ctx.store.get_campaign(campaign_id).await {
        Ok(Some(campaign)) => {
            let summary = CampaignSummary::from(&campaign);
            if let Err(e) = ctx.notifier.campaign_completed(&summary).await {
                tracing::error!("❌ Completion notification failed for {campaign_id}: {e}");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::error!("❌ Could not load campaign {campaign_id} for notification: {e}"),
    }
    Ok(())
}

/// Force `paused`, record an in-app notification and tell the notifier.
/// Every step is best-effort.
async fn pause_on_error(ctx: &DispatchContext, campaign_id: &str, raw: &str) -> LoopExit {
    tracing::error!("❌ Error in campaign worker {campaign_id}: {raw}");
    let sanitized = sanitize_error_message(raw, ctx.settings.error_max_len);

    if let Err(e) = ctx
        .store
        .update_campaign(campaign_id, &CampaignPatch::status(CampaignStatus::Paused))
        .await
    {
        tracing::error!("❌ Failed to pause campaign {campaign_id}: {e}");
    }

    match ctx.store.get_campaign(campaign_id).await {
        Ok(Some(campaign)) => {
            let notification = NewNotification {
                user_id: campaign.user_id.clone(),
                tenant_id: campaign.tenant_id.clone(),
                kind: "campaign_error".into(),
                title: "❌ Erro na Campanha".into(),
                message: campaign_error_message(&campaign.name, &sanitized),
                link: Some("/disparador".into()),
            };
            if let Err(e) = ctx.store.create_notification(&notification).await {
                tracing::error!("❌ Failed to create error notification: {e}");
            }
            let summary = CampaignSummary::from(&campaign);
            if let Err(e) = ctx.notifier.campaign_errored(&summary, &sanitized).await {
                tracing::error!("❌ Error notification failed for {campaign_id}: {e}");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::error!("❌ Could not load campaign {campaign_id} after error: {e}"),
    }

    LoopExit::Failed(sanitized)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
