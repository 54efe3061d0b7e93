//! # Herald Scheduler
//!
//! Drives bulk-messaging campaigns to completion, one independent dispatch
//! loop per campaign.
//!
//! ## Architecture
//! ```text
//! CampaignService (start / pause / cancel / reset / stats)
//!   └── WorkerRegistry (campaign id → live loop, at most one per id)
//!         └── dispatch loop (per campaign)
//!               ├── read status       → stop when no longer running
//!               ├── working window    → poll every 60s, pause after 24h
//!               ├── daily cap         → sleep until tenant-local midnight
//!               ├── render template   → sanitized contact fields
//!               ├── gateway send      → one attempt per contact
//!               ├── counters + log    → atomic increment, fallback RMW
//!               └── random pacing     → [interval_min, interval_max]
//! ```

pub mod clock;
pub mod counters;
pub mod notify;
pub mod registry;
pub mod render;
pub mod sanitize;
pub mod service;
pub mod window;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counters::{QuotaAction, check_quota, increment, increment_quota, record_outcome};
pub use notify::{NoopNotifier, Notification, NotifyPriority, WebhookNotifier, notifier_from_config};
pub use registry::WorkerRegistry;
pub use render::{render_template, sanitize_template_value};
pub use sanitize::sanitize_error_message;
pub use service::CampaignService;
pub use window::{WorkingWindow, is_within_working_hours, resolve_timezone};
pub use worker::{DispatchContext, LoopExit, process_campaign};
