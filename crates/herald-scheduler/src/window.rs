//! Working-window evaluation: may a campaign send right now?
//!
//! Pure functions only. Configuration problems fail open (sendable) with a
//! warning, because a malformed time string must never stall a campaign.

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use chrono_tz::Tz;
use herald_core::types::PacingSettings;

/// External day numbering (Sunday = 0) → internal numbering (Monday = 0).
/// Indexed by the external value.
const SUNDAY_FIRST_TO_MONDAY_FIRST: [u32; 7] = [6, 0, 1, 2, 3, 4, 5];

/// Parsed working window for one campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingWindow {
    /// Monday = 0 ... Sunday = 6.
    days: [bool; 7],
    /// `None` when start/end are absent or unparseable: any time of day.
    hours: Option<(NaiveTime, NaiveTime)>,
}

impl WorkingWindow {
    pub fn from_settings(settings: &PacingSettings) -> Self {
        let mut days = [false; 7];
        for &day in &settings.working_days {
            match SUNDAY_FIRST_TO_MONDAY_FIRST.get(day as usize) {
                Some(&internal) => days[internal as usize] = true,
                None => tracing::warn!("⚠️ Ignoring invalid working day {day} (expected 0-6)"),
            }
        }

        let hours = match (settings.start_time.as_deref(), settings.end_time.as_deref()) {
            (Some(start), Some(end)) => match (parse_time_of_day(start), parse_time_of_day(end)) {
                (Some(s), Some(e)) => Some((s, e)),
                _ => {
                    tracing::warn!(
                        "⚠️ Invalid working hours '{start}'-'{end}', allowing any time of day"
                    );
                    None
                }
            },
            _ => None,
        };

        Self { days, hours }
    }

    /// Day check first, then the time-of-day range (inclusive at both ends).
    pub fn allows(&self, local: &DateTime<Tz>) -> bool {
        let weekday = local.weekday().num_days_from_monday() as usize;
        if !self.days[weekday] {
            return false;
        }

        match self.hours {
            None => true,
            Some((start, end)) => {
                let now = local.time();
                if start <= end {
                    start <= now && now <= end
                } else {
                    // Crosses midnight, e.g. 22:00-02:00.
                    now >= start || now <= end
                }
            }
        }
    }
}

fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// Whether `now` (converted to `tz`) falls inside the campaign's working window.
pub fn is_within_working_hours(settings: &PacingSettings, tz: Tz, now: DateTime<Utc>) -> bool {
    WorkingWindow::from_settings(settings).allows(&now.with_timezone(&tz))
}

/// Parse an IANA timezone name. Unknown or missing names fall back to
/// `default`, and to UTC when the default itself is invalid.
pub fn resolve_timezone(name: Option<&str>, default: &str) -> Tz {
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        match name.parse::<Tz>() {
            Ok(tz) => return tz,
            Err(_) => tracing::warn!("⚠️ Invalid timezone {name}, using {default}"),
        }
    }
    default.parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!("⚠️ Invalid default timezone {default}, using UTC");
        Tz::UTC
    })
}
