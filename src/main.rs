//! # Herald: campaign dispatch service
//!
//! Runs WhatsApp bulk-messaging campaigns: one dispatch loop per running
//! campaign, paced, gated by working hours and daily caps.
//!
//! Usage:
//!   herald serve                      # Resume orphaned campaigns, run until Ctrl-C
//!   herald seed campaign.json         # Create a campaign with its contacts
//!   herald run <id>...                # Start campaigns and wait for them to finish
//!   herald status <id>                # Progress counters

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use herald_channels::WahaGateway;
use herald_core::HeraldConfig;
use herald_core::traits::CampaignStore;
use herald_core::types::{Campaign, Contact, MessageTemplate, PacingSettings, TenantProfile, UserQuota};
use herald_scheduler::{CampaignService, DispatchContext, SystemClock, notifier_from_config};
use herald_store::SqliteStore;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "herald", version, about = "📣 Herald: WhatsApp campaign dispatcher")]
struct Cli {
    /// Config file (default: $HERALD_CONFIG or ~/.herald/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile orphaned campaigns and keep dispatching until Ctrl-C
    Serve,
    /// Start the given campaigns and wait until they stop
    Run {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Create a tenant, quota, campaign and contacts from a JSON file
    Seed { file: PathBuf },
    /// Show campaign progress
    Status { id: String },
    /// Pause a campaign
    Pause { id: String },
    /// Cancel a campaign
    Cancel { id: String },
    /// Put a campaign back to `ready` with every contact pending
    Reset { id: String },
}

/// Shape of a `herald seed` file.
#[derive(Deserialize)]
struct SeedFile {
    tenant: TenantProfile,
    user_id: String,
    #[serde(default)]
    quota: Option<UserQuota>,
    campaign: SeedCampaign,
    #[serde(default)]
    contacts: Vec<SeedContact>,
}

#[derive(Deserialize)]
struct SeedCampaign {
    name: String,
    message: MessageTemplate,
    #[serde(default)]
    settings: PacingSettings,
}

#[derive(Deserialize)]
struct SeedContact {
    name: String,
    phone: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    extra: BTreeMap<String, serde_json::Value>,
}

fn unlimited_quota(user_id: &str) -> UserQuota {
    UserQuota {
        user_id: user_id.to_string(),
        campaigns_limit: -1,
        campaigns_used: 0,
        messages_limit: -1,
        messages_used: 0,
        leads_limit: -1,
        leads_used: 0,
    }
}

struct App {
    config: HeraldConfig,
    store: Arc<SqliteStore>,
    service: CampaignService,
}

impl App {
    fn build(config: HeraldConfig) -> Result<Self> {
        let db_path = config.store.resolved_path();
        let store = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("opening store at {}", db_path.display()))?,
        );
        let gateway = WahaGateway::new(config.gateway.clone()).with_directory(store.clone());

        let ctx = DispatchContext {
            store: store.clone(),
            gateway: Arc::new(gateway),
            tenants: store.clone(),
            notifier: notifier_from_config(&config.notify),
            clock: Arc::new(SystemClock),
            settings: config.scheduler.clone(),
        };
        Ok(Self {
            config,
            store,
            service: CampaignService::new(ctx),
        })
    }

    async fn serve(&self) -> Result<()> {
        let policy = self.config.scheduler.orphan_policy;
        let orphans = self.service.reconcile_orphans(policy).await?;
        println!("📣 Herald v{}", env!("CARGO_PKG_VERSION"));
        println!("   🗄️  Store:    {}", self.config.store.resolved_path().display());
        println!("   🔌 Gateway:  {}", self.config.gateway.url);
        println!("   ♻️  Orphans:  {} ({policy:?})", orphans.len());
        println!();

        tokio::signal::ctrl_c().await?;
        println!("\n🛑 Shutting down...");
        self.service.shutdown().await;
        Ok(())
    }

    async fn run(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            let campaign = self.service.get(id).await?;
            self.service
                .start(id, &campaign.tenant_id)
                .await
                .with_context(|| format!("starting campaign {id}"))?;
            println!("▶️  {} ({id})", campaign.name);
        }

        let registry = self.service.registry().clone();
        let all_done = async {
            for id in ids {
                registry.wait(id).await;
            }
        };
        tokio::select! {
            _ = all_done => {}
            _ = tokio::signal::ctrl_c() => {
                println!("\n🛑 Interrupted, stopping workers...");
                self.service.shutdown().await;
            }
        }

        for id in ids {
            self.print_status(id).await?;
        }
        Ok(())
    }

    async fn seed(&self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let seed: SeedFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;

        self.store.upsert_tenant(&seed.tenant)?;
        match seed.quota {
            Some(quota) => self.store.upsert_quota(&quota)?,
            None => {
                if self.store.get_quota(&seed.user_id).await?.is_none() {
                    self.store.upsert_quota(&unlimited_quota(&seed.user_id))?;
                }
            }
        }

        let campaign = Campaign::new(
            &seed.tenant.id,
            &seed.user_id,
            &seed.campaign.name,
            seed.campaign.message,
            seed.campaign.settings,
        );
        let contacts = seed
            .contacts
            .into_iter()
            .map(|c| Contact {
                email: c.email,
                category: c.category,
                extra: c.extra,
                ..Contact::pending(&campaign.id, &c.name, &c.phone)
            })
            .collect();

        let campaign = self.service.create(campaign, contacts).await?;
        println!(
            "✅ Campaign '{}' created: {} ({} contacts, {})",
            campaign.name, campaign.id, campaign.total_contacts, campaign.status
        );
        Ok(())
    }

    async fn print_status(&self, id: &str) -> Result<()> {
        let campaign = self.service.get(id).await?;
        let stats = self.service.stats(id).await?;
        println!("📊 {} ({id})", campaign.name);
        println!("   Status:   {}", campaign.status);
        println!(
            "   Progress: {}/{} sent, {} errors, {} pending ({:.1}%)",
            stats.sent, stats.total, stats.errors, stats.pending, stats.progress_percent
        );
        if let Some(started) = campaign.started_at {
            println!("   Started:  {started}");
        }
        if let Some(completed) = campaign.completed_at {
            println!("   Finished: {completed}");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let mut config = HeraldConfig::load_from(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        None => HeraldConfig::load()?,
    };
    let app = App::build(config)?;

    match cli.command {
        Command::Serve => app.serve().await?,
        Command::Run { ids } => app.run(&ids).await?,
        Command::Seed { file } => app.seed(&file).await?,
        Command::Status { id } => app.print_status(&id).await?,
        Command::Pause { id } => {
            app.service.pause(&id).await?;
            println!("⏸️  Campaign {id} paused");
        }
        Command::Cancel { id } => {
            app.service.cancel(&id).await?;
            println!("🚫 Campaign {id} cancelled");
        }
        Command::Reset { id } => {
            app.service.reset(&id).await?;
            println!("🔄 Campaign {id} reset");
        }
    }
    Ok(())
}
