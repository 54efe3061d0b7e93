//! SQLite implementation of [`CampaignStore`] and [`TenantDirectory`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::HeraldError;
use herald_core::error::Result;
use herald_core::traits::{CampaignStore, CounterStore, TenantDirectory};
use herald_core::types::{
    Campaign, CampaignPatch, CampaignPulse, CampaignStatus, Contact, ContactOutcome,
    ContactStatus, CounterTarget, MessageLog, NewNotification, TenantProfile, UserQuota,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};

use crate::schema::SCHEMA;

/// Campaign database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

trait DbResultExt<T> {
    fn db(self, what: &str) -> Result<T>;
}

impl<T> DbResultExt<T> for rusqlite::Result<T> {
    fn db(self, what: &str) -> Result<T> {
        self.map_err(|e| HeraldError::database(format!("{what}: {e}")))
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_err(idx, e)),
        None => Ok(None),
    }
}

fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = HeraldError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

fn get_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

const CAMPAIGN_COLUMNS: &str = "id, tenant_id, user_id, name, status, message_json, settings_json, \
     total_contacts, sent_count, error_count, pending_count, created_at, updated_at, started_at, completed_at";

fn row_to_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        user_id: row.get(2)?,
        name: row.get(3)?,
        status: get_parsed(row, 4)?,
        message: get_json(row, 5)?,
        settings: get_json(row, 6)?,
        total_contacts: row.get(7)?,
        sent_count: row.get(8)?,
        error_count: row.get(9)?,
        pending_count: row.get(10)?,
        created_at: get_ts(row, 11)?,
        updated_at: get_ts(row, 12)?,
        started_at: get_opt_ts(row, 13)?,
        completed_at: get_opt_ts(row, 14)?,
    })
}

const CONTACT_COLUMNS: &str =
    "id, campaign_id, name, phone, email, category, extra_json, status, error_message, sent_at";

fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        category: row.get(5)?,
        extra: get_json(row, 6)?,
        status: get_parsed(row, 7)?,
        error_message: row.get(8)?,
        sent_at: get_opt_ts(row, 9)?,
    })
}

/// Table and key column behind a counter target.
fn counter_location(target: &CounterTarget) -> (&'static str, &'static str, &'static str, &str) {
    match target {
        CounterTarget::Campaign {
            campaign_id,
            counter,
        } => ("campaigns", "id", counter.column(), campaign_id.as_str()),
        CounterTarget::Quota { user_id, field } => {
            ("user_quotas", "user_id", field.column(), user_id.as_str())
        }
    }
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).db("Store open")?;

        // WAL for concurrent readers (status CLI while `serve` runs).
        if let Err(e) = conn.execute_batch("PRAGMA journal_mode=WAL;") {
            tracing::warn!("⚠️ Could not enable WAL for {}: {e}", path.display());
        }

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        tracing::debug!("🗄️ Store opened at {}", path.display());
        Ok(store)
    }

    /// Fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().db("Store open")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HeraldError::database(format!("Lock: {e}")))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA).db("Migration")
    }

    pub fn upsert_tenant(&self, tenant: &TenantProfile) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO tenants (id, name, timezone) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name=?2, timezone=?3",
                params![tenant.id, tenant.name, tenant.timezone],
            )
            .db("Upsert tenant")?;
        Ok(())
    }

    pub fn upsert_quota(&self, quota: &UserQuota) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO user_quotas (user_id, campaigns_limit, campaigns_used, messages_limit,
                     messages_used, leads_limit, leads_used)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id) DO UPDATE SET
                   campaigns_limit=?2, campaigns_used=?3, messages_limit=?4,
                   messages_used=?5, leads_limit=?6, leads_used=?7",
                params![
                    quota.user_id,
                    quota.campaigns_limit,
                    quota.campaigns_used,
                    quota.messages_limit,
                    quota.messages_used,
                    quota.leads_limit,
                    quota.leads_used
                ],
            )
            .db("Upsert quota")?;
        Ok(())
    }

    /// Unread in-app notifications for a user, newest first.
    pub fn unread_notifications(&self, user_id: &str) -> Result<Vec<NewNotification>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, tenant_id, type, title, message, link FROM notifications
                 WHERE user_id=?1 AND read=0 ORDER BY id DESC",
            )
            .db("List notifications")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(NewNotification {
                    user_id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    kind: row.get(2)?,
                    title: row.get(3)?,
                    message: row.get(4)?,
                    link: row.get(5)?,
                })
            })
            .db("List notifications")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .db("List notifications")
    }

    pub fn list_contacts(&self, campaign_id: &str) -> Result<Vec<Contact>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM campaign_contacts WHERE campaign_id=?1 ORDER BY rowid"
            ))
            .db("List contacts")?;
        let rows = stmt
            .query_map(params![campaign_id], row_to_contact)
            .db("List contacts")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().db("List contacts")
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn increment_atomic(&self, target: &CounterTarget, delta: i64) -> Result<()> {
        let (table, key, column, id) = counter_location(target);
        let conn = self.conn()?;
        let changed = match target {
            CounterTarget::Campaign { .. } => conn.execute(
                &format!(
                    "UPDATE {table} SET {column} = {column} + ?1, updated_at = ?2 WHERE {key} = ?3"
                ),
                params![delta, ts(&Utc::now()), id],
            ),
            CounterTarget::Quota { .. } => conn.execute(
                &format!("UPDATE {table} SET {column} = {column} + ?1 WHERE {key} = ?2"),
                params![delta, id],
            ),
        }
        .db("Increment counter")?;

        if changed == 0 {
            return Err(HeraldError::NotFound(target.to_string()));
        }
        Ok(())
    }

    async fn read_counter(&self, target: &CounterTarget) -> Result<Option<i64>> {
        let (table, key, column, id) = counter_location(target);
        self.conn()?
            .query_row(
                &format!("SELECT {column} FROM {table} WHERE {key} = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()
            .db("Read counter")
    }

    async fn write_counter(&self, target: &CounterTarget, value: i64) -> Result<()> {
        let (table, key, column, id) = counter_location(target);
        let changed = self
            .conn()?
            .execute(
                &format!("UPDATE {table} SET {column} = ?1 WHERE {key} = ?2"),
                params![value, id],
            )
            .db("Write counter")?;
        if changed == 0 {
            return Err(HeraldError::NotFound(target.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CampaignStore for SqliteStore {
    async fn create_campaign(&self, c: &Campaign) -> Result<()> {
        let message_json = serde_json::to_string(&c.message)?;
        let settings_json = serde_json::to_string(&c.settings)?;
        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO campaigns ({CAMPAIGN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    c.id,
                    c.tenant_id,
                    c.user_id,
                    c.name,
                    c.status.as_str(),
                    message_json,
                    settings_json,
                    c.total_contacts,
                    c.sent_count,
                    c.error_count,
                    c.pending_count,
                    ts(&c.created_at),
                    ts(&c.updated_at),
                    c.started_at.as_ref().map(ts),
                    c.completed_at.as_ref().map(ts),
                ],
            )
            .db("Create campaign")?;
        Ok(())
    }

    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        self.conn()?
            .query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id=?1"),
                params![campaign_id],
                row_to_campaign,
            )
            .optional()
            .db("Get campaign")
    }

    async fn campaign_pulse(&self, campaign_id: &str) -> Result<Option<CampaignPulse>> {
        self.conn()?
            .query_row(
                "SELECT status, pending_count FROM campaigns WHERE id=?1",
                params![campaign_id],
                |row| {
                    Ok(CampaignPulse {
                        status: get_parsed(row, 0)?,
                        pending_count: row.get(1)?,
                    })
                },
            )
            .optional()
            .db("Pulse campaign")
    }

    async fn update_campaign(&self, campaign_id: &str, patch: &CampaignPatch) -> Result<()> {
        let mut sets: Vec<&str> = vec!["updated_at = ?"];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(ts(&Utc::now()))];

        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        let counters = [
            ("total_contacts = ?", patch.total_contacts),
            ("sent_count = ?", patch.sent_count),
            ("error_count = ?", patch.error_count),
            ("pending_count = ?", patch.pending_count),
        ];
        for (set, value) in counters {
            if let Some(v) = value {
                sets.push(set);
                values.push(Box::new(v));
            }
        }
        let stamps = [
            ("started_at = ?", patch.started_at),
            ("completed_at = ?", patch.completed_at),
        ];
        for (set, value) in stamps {
            if let Some(v) = value {
                sets.push(set);
                values.push(Box::new(v.as_ref().map(ts)));
            }
        }
        values.push(Box::new(campaign_id.to_string()));

        let sql = format!("UPDATE campaigns SET {} WHERE id = ?", sets.join(", "));
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let changed = self
            .conn()?
            .execute(&sql, params.as_slice())
            .db("Update campaign")?;
        if changed == 0 {
            return Err(HeraldError::NotFound(format!("campaign {campaign_id}")));
        }
        Ok(())
    }

    async fn list_campaigns_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status=?1 ORDER BY created_at"
            ))
            .db("List campaigns")?;
        let rows = stmt
            .query_map(params![status.as_str()], row_to_campaign)
            .db("List campaigns")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().db("List campaigns")
    }

    async fn insert_contacts(&self, contacts: &[Contact]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().db("Insert contacts")?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO campaign_contacts ({CONTACT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ))
                .db("Insert contacts")?;
            for c in contacts {
                let extra_json = serde_json::to_string(&c.extra)?;
                stmt.execute(params![
                    c.id,
                    c.campaign_id,
                    c.name,
                    c.phone,
                    c.email,
                    c.category,
                    extra_json,
                    c.status.as_str(),
                    c.error_message,
                    c.sent_at.as_ref().map(ts),
                ])
                .db("Insert contact")?;
            }
        }
        tx.commit().db("Insert contacts")?;
        Ok(contacts.len())
    }

    async fn next_pending_contact(&self, campaign_id: &str) -> Result<Option<Contact>> {
        self.conn()?
            .query_row(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM campaign_contacts
                     WHERE campaign_id=?1 AND status='pending' ORDER BY rowid LIMIT 1"
                ),
                params![campaign_id],
                row_to_contact,
            )
            .optional()
            .db("Next pending contact")
    }

    async fn update_contact(&self, contact_id: &str, outcome: &ContactOutcome) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE campaign_contacts SET status=?1, error_message=?2, sent_at=?3 WHERE id=?4",
                params![
                    outcome.status.as_str(),
                    outcome.error_message,
                    ts(&outcome.sent_at),
                    contact_id
                ],
            )
            .db("Update contact")?;
        Ok(())
    }

    async fn reset_contacts(&self, campaign_id: &str) -> Result<usize> {
        self.conn()?
            .execute(
                "UPDATE campaign_contacts SET status='pending', error_message=NULL, sent_at=NULL
                 WHERE campaign_id=?1",
                params![campaign_id],
            )
            .db("Reset contacts")
    }

    async fn count_contacts(
        &self,
        campaign_id: &str,
        status: Option<ContactStatus>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        match status {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id=?1 AND status=?2",
                params![campaign_id, s.as_str()],
                |row| row.get(0),
            ),
            None => conn.query_row(
                "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id=?1",
                params![campaign_id],
                |row| row.get(0),
            ),
        }
        .db("Count contacts")
    }

    async fn append_message_log(&self, log: &MessageLog) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO message_logs (id, campaign_id, contact_id, contact_name, contact_phone,
                     status, error_message, message_sent, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    log.id,
                    log.campaign_id,
                    log.contact_id,
                    log.contact_name,
                    log.contact_phone,
                    log.status.as_str(),
                    log.error_message,
                    log.message_sent,
                    ts(&log.sent_at),
                ],
            )
            .db("Append message log")?;
        Ok(())
    }

    async fn list_message_logs(&self, campaign_id: &str) -> Result<Vec<MessageLog>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, campaign_id, contact_id, contact_name, contact_phone, status,
                        error_message, message_sent, sent_at
                 FROM message_logs WHERE campaign_id=?1 ORDER BY sent_at, rowid",
            )
            .db("List message logs")?;
        let rows = stmt
            .query_map(params![campaign_id], |row| {
                Ok(MessageLog {
                    id: row.get(0)?,
                    campaign_id: row.get(1)?,
                    contact_id: row.get(2)?,
                    contact_name: row.get(3)?,
                    contact_phone: row.get(4)?,
                    status: get_parsed(row, 5)?,
                    error_message: row.get(6)?,
                    message_sent: row.get(7)?,
                    sent_at: get_ts(row, 8)?,
                })
            })
            .db("List message logs")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .db("List message logs")
    }

    async fn delete_message_logs(&self, campaign_id: &str) -> Result<usize> {
        self.conn()?
            .execute(
                "DELETE FROM message_logs WHERE campaign_id=?1",
                params![campaign_id],
            )
            .db("Delete message logs")
    }

    async fn count_sent_since(&self, campaign_id: &str, since: DateTime<Utc>) -> Result<i64> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM message_logs
                 WHERE campaign_id=?1 AND status='sent' AND sent_at >= ?2",
                params![campaign_id, ts(&since)],
                |row| row.get(0),
            )
            .db("Count sent messages")
    }

    async fn create_notification(&self, n: &NewNotification) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO notifications (user_id, tenant_id, type, title, message, link, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    n.user_id,
                    n.tenant_id,
                    n.kind,
                    n.title,
                    n.message,
                    n.link,
                    ts(&Utc::now())
                ],
            )
            .db("Create notification")?;
        Ok(())
    }

    async fn get_quota(&self, user_id: &str) -> Result<Option<UserQuota>> {
        self.conn()?
            .query_row(
                "SELECT user_id, campaigns_limit, campaigns_used, messages_limit, messages_used,
                        leads_limit, leads_used
                 FROM user_quotas WHERE user_id=?1",
                params![user_id],
                |row| {
                    Ok(UserQuota {
                        user_id: row.get(0)?,
                        campaigns_limit: row.get(1)?,
                        campaigns_used: row.get(2)?,
                        messages_limit: row.get(3)?,
                        messages_used: row.get(4)?,
                        leads_limit: row.get(5)?,
                        leads_used: row.get(6)?,
                    })
                },
            )
            .optional()
            .db("Get quota")
    }
}

#[async_trait]
impl TenantDirectory for SqliteStore {
    async fn tenant_profile(&self, tenant_id: &str) -> Result<Option<TenantProfile>> {
        self.conn()?
            .query_row(
                "SELECT id, name, timezone FROM tenants WHERE id=?1",
                params![tenant_id],
                |row| {
                    Ok(TenantProfile {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        timezone: row.get(2)?,
                    })
                },
            )
            .optional()
            .db("Get tenant")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use herald_core::types::{CampaignCounter, MessageTemplate, PacingSettings, QuotaField, new_id};

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    async fn seeded(store: &SqliteStore, contacts: usize) -> Campaign {
        let mut campaign = Campaign::new(
            "t1",
            "u1",
            "Promo",
            MessageTemplate {
                text: "Oi {nome}".into(),
                ..Default::default()
            },
            PacingSettings::default(),
        );
        campaign.status = CampaignStatus::Ready;
        campaign.total_contacts = contacts as i64;
        campaign.pending_count = contacts as i64;
        store.create_campaign(&campaign).await.unwrap();

        let list: Vec<Contact> = (0..contacts)
            .map(|i| Contact::pending(&campaign.id, &format!("C{i}"), &format!("1199999000{i}")))
            .collect();
        store.insert_contacts(&list).await.unwrap();
        campaign
    }

    fn log(campaign_id: &str, status: ContactStatus, at: DateTime<Utc>) -> MessageLog {
        MessageLog {
            id: new_id(),
            campaign_id: campaign_id.into(),
            contact_id: new_id(),
            contact_name: "x".into(),
            contact_phone: "1".into(),
            status,
            error_message: None,
            message_sent: "hi".into(),
            sent_at: at,
        }
    }

    #[test]
    fn test_open_creates_dirs_and_enables_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("herald.db");

        let store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());

        let mode: String = store
            .conn()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_campaign_roundtrip() {
        let store = store();
        let campaign = seeded(&store, 2).await;

        let loaded = store.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Promo");
        assert_eq!(loaded.status, CampaignStatus::Ready);
        assert_eq!(loaded.message.text, "Oi {nome}");
        assert_eq!(loaded.settings.working_days, vec![1, 2, 3, 4, 5]);
        assert!(loaded.counters_balanced());

        assert!(store.get_campaign("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pulse_and_patch() {
        let store = store();
        let campaign = seeded(&store, 3).await;

        let started = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let patch = CampaignPatch {
            started_at: Some(Some(started)),
            ..CampaignPatch::status(CampaignStatus::Running)
        };
        store.update_campaign(&campaign.id, &patch).await.unwrap();

        let pulse = store.campaign_pulse(&campaign.id).await.unwrap().unwrap();
        assert_eq!(pulse.status, CampaignStatus::Running);
        assert_eq!(pulse.pending_count, 3);

        let loaded = store.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(loaded.started_at, Some(started));

        let clear = CampaignPatch {
            started_at: Some(None),
            ..Default::default()
        };
        store.update_campaign(&campaign.id, &clear).await.unwrap();
        let loaded = store.get_campaign(&campaign.id).await.unwrap().unwrap();
        assert!(loaded.started_at.is_none());
        assert_eq!(loaded.status, CampaignStatus::Running);

        let missing = store
            .update_campaign("nope", &CampaignPatch::status(CampaignStatus::Paused))
            .await;
        assert!(matches!(missing, Err(HeraldError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_pending_contacts_drain_in_insertion_order() {
        let store = store();
        let campaign = seeded(&store, 3).await;

        let mut seen = Vec::new();
        while let Some(contact) = store.next_pending_contact(&campaign.id).await.unwrap() {
            seen.push(contact.name.clone());
            store
                .update_contact(
                    &contact.id,
                    &ContactOutcome {
                        status: ContactStatus::Sent,
                        error_message: None,
                        sent_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(seen, vec!["C0", "C1", "C2"]);
        assert_eq!(
            store
                .count_contacts(&campaign.id, Some(ContactStatus::Sent))
                .await
                .unwrap(),
            3
        );

        assert_eq!(store.reset_contacts(&campaign.id).await.unwrap(), 3);
        let contacts = store.list_contacts(&campaign.id).unwrap();
        assert!(contacts.iter().all(|c| c.status == ContactStatus::Pending && c.sent_at.is_none()));
    }

    #[tokio::test]
    async fn test_atomic_counters() {
        let store = store();
        let campaign = seeded(&store, 2).await;
        let sent = CounterTarget::campaign(&campaign.id, CampaignCounter::Sent);
        let pending = CounterTarget::campaign(&campaign.id, CampaignCounter::Pending);

        store.increment_atomic(&sent, 1).await.unwrap();
        store.increment_atomic(&pending, -1).await.unwrap();

        assert_eq!(store.read_counter(&sent).await.unwrap(), Some(1));
        assert_eq!(store.read_counter(&pending).await.unwrap(), Some(1));

        let ghost = CounterTarget::campaign("ghost", CampaignCounter::Sent);
        assert!(store.increment_atomic(&ghost, 1).await.is_err());
        assert_eq!(store.read_counter(&ghost).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quota_counters() {
        let store = store();
        store
            .upsert_quota(&UserQuota {
                user_id: "u1".into(),
                campaigns_limit: 5,
                campaigns_used: 1,
                messages_limit: -1,
                messages_used: 0,
                leads_limit: 0,
                leads_used: 0,
            })
            .unwrap();

        let target = CounterTarget::quota("u1", QuotaField::CampaignsUsed);
        store.increment_atomic(&target, 1).await.unwrap();
        let quota = store.get_quota("u1").await.unwrap().unwrap();
        assert_eq!(quota.campaigns_used, 2);
        assert!(store.get_quota("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_sent_since() {
        let store = store();
        let campaign = seeded(&store, 0).await;
        let yesterday = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap();
        let midnight = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();

        for (status, at) in [
            (ContactStatus::Sent, yesterday),
            (ContactStatus::Sent, midnight),
            (ContactStatus::Sent, later),
            (ContactStatus::Error, later),
        ] {
            store.append_message_log(&log(&campaign.id, status, at)).await.unwrap();
        }

        assert_eq!(store.count_sent_since(&campaign.id, midnight).await.unwrap(), 2);
        assert_eq!(store.list_message_logs(&campaign.id).await.unwrap().len(), 4);
        assert_eq!(store.delete_message_logs(&campaign.id).await.unwrap(), 4);
        assert_eq!(store.count_sent_since(&campaign.id, midnight).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let store = store();
        let a = seeded(&store, 1).await;
        seeded(&store, 1).await;
        store
            .update_campaign(&a.id, &CampaignPatch::status(CampaignStatus::Running))
            .await
            .unwrap();

        let running = store
            .list_campaigns_by_status(CampaignStatus::Running)
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, a.id);
    }

    #[tokio::test]
    async fn test_tenants_and_notifications() {
        let store = store();
        store
            .upsert_tenant(&TenantProfile {
                id: "t1".into(),
                name: "Acme".into(),
                timezone: Some("America/Manaus".into()),
            })
            .unwrap();
        assert_eq!(
            store.timezone_for("t1").await.unwrap().as_deref(),
            Some("America/Manaus")
        );
        assert!(store.tenant_profile("t2").await.unwrap().is_none());

        store
            .create_notification(&NewNotification {
                user_id: "u1".into(),
                tenant_id: "t1".into(),
                kind: "campaign_error".into(),
                title: "x".into(),
                message: "y".into(),
                link: Some("/disparador".into()),
            })
            .await
            .unwrap();
        let unread = store.unread_notifications("u1").unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].link.as_deref(), Some("/disparador"));
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let a = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert!(ts(&a) < ts(&b));
        assert_eq!(ts(&a).len(), ts(&b).len());
    }
}
