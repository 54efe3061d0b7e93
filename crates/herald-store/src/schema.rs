//! Schema migrations.

pub(crate) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        timezone TEXT
    );

    CREATE TABLE IF NOT EXISTS campaigns (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'draft',
        message_json TEXT NOT NULL DEFAULT '{}',
        settings_json TEXT NOT NULL DEFAULT '{}',
        total_contacts INTEGER NOT NULL DEFAULT 0,
        sent_count INTEGER NOT NULL DEFAULT 0,
        error_count INTEGER NOT NULL DEFAULT 0,
        pending_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status);

    CREATE TABLE IF NOT EXISTS campaign_contacts (
        id TEXT PRIMARY KEY,
        campaign_id TEXT NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        phone TEXT NOT NULL,
        email TEXT,
        category TEXT,
        extra_json TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'pending',
        error_message TEXT,
        sent_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_contacts_campaign_status
        ON campaign_contacts(campaign_id, status);

    CREATE TABLE IF NOT EXISTS message_logs (
        id TEXT PRIMARY KEY,
        campaign_id TEXT NOT NULL,
        contact_id TEXT NOT NULL,
        contact_name TEXT NOT NULL DEFAULT '',
        contact_phone TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        error_message TEXT,
        message_sent TEXT NOT NULL DEFAULT '',
        sent_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_logs_campaign_sent
        ON message_logs(campaign_id, status, sent_at);

    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        type TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        link TEXT,
        read INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_quotas (
        user_id TEXT PRIMARY KEY,
        campaigns_limit INTEGER NOT NULL DEFAULT 0,
        campaigns_used INTEGER NOT NULL DEFAULT 0,
        messages_limit INTEGER NOT NULL DEFAULT 0,
        messages_used INTEGER NOT NULL DEFAULT 0,
        leads_limit INTEGER NOT NULL DEFAULT 0,
        leads_used INTEGER NOT NULL DEFAULT 0
    );
";
