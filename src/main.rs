mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use calsinki_core::engine::SyncEngine;
use calsinki_core::rule::SyncRule;
use calsinki_provider_google::GoogleCalendarApi;

#[derive(Parser)]
#[command(name = "calsinki")]
#[command(about = "Synchronize events between Google Calendar accounts with privacy controls")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate a configured account with Google
    Auth {
        /// Account name from config.toml
        account: String,
    },
    /// Run calendar synchronization
    Sync {
        /// Sync only this rule (default: all rules)
        rule: Option<String>,
        /// Plan mutations without applying them
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove previously-synced events from destination calendars
    Purge {
        /// Rule ids to purge
        rules: Vec<String>,
        /// Purge everything this instance ever synced
        #[arg(long, conflicts_with = "rules")]
        all: bool,
        /// Plan deletions without applying them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Auth { account } => cmd_auth(&account).await,
        Commands::Sync { rule, dry_run } => cmd_sync(rule.as_deref(), dry_run).await,
        Commands::Purge {
            rules,
            all,
            dry_run,
        } => cmd_purge(&rules, all, dry_run).await,
        Commands::Config => cmd_config(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CALSINKI_LOG")
        .unwrap_or_else(|_| EnvFilter::new("calsinki=info,warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn cmd_auth(account: &str) -> Result<()> {
    let cfg = config::load_config()?;

    if !cfg.accounts.iter().any(|a| a.name == account) {
        anyhow::bail!(
            "Account '{}' not found in config.\n\
            Available accounts: {}",
            account,
            cfg.accounts
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    println!("Authenticating account '{}'...", account);

    let email = calsinki_provider_google::auth::authenticate(account).await?;

    println!("\nAuthenticated as: {}", email);
    println!("Run `calsinki sync --dry-run` to preview your first sync.");

    Ok(())
}

async fn cmd_sync(rule_id: Option<&str>, dry_run: bool) -> Result<()> {
    let cfg = config::load_config()?;

    if cfg.sync_rules.is_empty() {
        anyhow::bail!(
            "No sync rules configured.\n\
            Add sync_rules to config.toml, then run `calsinki sync` again."
        );
    }

    let engine = SyncEngine::with_identifier(GoogleCalendarApi::new(), &cfg.default_identifier);

    let mut matched = false;
    let mut any_failed = false;

    for rule_config in &cfg.sync_rules {
        if let Some(id) = rule_id {
            if rule_config.id != id {
                continue;
            }
        }
        matched = true;

        // Resolution failures are fatal for this rule only.
        let rule = match cfg.resolve_rule(rule_config) {
            Ok(rule) => rule,
            Err(e) => {
                eprintln!("❌ {:#}", e);
                any_failed = true;
                continue;
            }
        };

        if rule.enabled_targets().next().is_none() {
            if rule_id.is_some() {
                anyhow::bail!("Sync rule '{}' has no enabled destinations", rule.id);
            }
            println!("ℹ️  Rule {} has no enabled destinations, skipping", rule.id);
            continue;
        }

        let report = engine.sync_rule(&rule, dry_run).await;
        output::print_sync_report(&report);
        any_failed |= report.failed();
    }

    if let Some(id) = rule_id {
        if !matched {
            anyhow::bail!("Sync rule '{}' not found", id);
        }
    }

    if any_failed {
        anyhow::bail!("One or more sync passes failed");
    }

    Ok(())
}

async fn cmd_purge(rule_ids: &[String], all: bool, dry_run: bool) -> Result<()> {
    let cfg = config::load_config()?;

    if rule_ids.is_empty() && !all {
        anyhow::bail!(
            "No sync rules specified.\n\
            Pass rule ids to purge ('calsinki purge work_to_personal'),\n\
            or --all to remove everything calsinki has synced."
        );
    }

    let engine = SyncEngine::with_identifier(GoogleCalendarApi::new(), &cfg.default_identifier);

    if all {
        let mut rules: Vec<SyncRule> = Vec::new();
        for rule_config in &cfg.sync_rules {
            match cfg.resolve_rule(rule_config) {
                Ok(rule) => rules.push(rule),
                Err(e) => eprintln!("❌ {:#}", e),
            }
        }
        let report = engine.purge_all(&rules, dry_run).await;
        output::print_purge_report(&report);
        if report.failed() {
            anyhow::bail!("Purge failed on one or more calendars");
        }
        return Ok(());
    }

    let mut any_failed = false;
    for id in rule_ids {
        let rule_config = cfg
            .sync_rules
            .iter()
            .find(|rule| &rule.id == id)
            .ok_or_else(|| anyhow::anyhow!("Sync rule '{}' not found", id))?;
        let rule = cfg.resolve_rule(rule_config)?;

        let report = engine.purge_rule(&rule, dry_run).await;
        output::print_purge_report(&report);
        any_failed |= report.failed();
    }

    if any_failed {
        anyhow::bail!("Purge failed on one or more calendars");
    }

    Ok(())
}

fn cmd_config() -> Result<()> {
    let cfg = config::load_config()?;

    println!("Identifier: {}", cfg.default_identifier);

    for account in &cfg.accounts {
        println!("\nAccount: {} <{}>", account.name, account.email);
        for calendar in &account.calendars {
            println!(
                "  {}.{} -> {} ({})",
                account.name, calendar.label, calendar.calendar_id, calendar.name
            );
        }
    }

    for rule_config in &cfg.sync_rules {
        println!("\nRule: {}", rule_config.id);
        println!("  source: {}", rule_config.source_calendar);
        for destination in &rule_config.destination {
            println!(
                "  -> {} [{}]{}",
                destination.calendar,
                match destination.privacy_mode {
                    calsinki_core::rule::PrivacyMode::Public => "public",
                    calsinki_core::rule::PrivacyMode::Private => "private",
                },
                if destination.enabled { "" } else { " (disabled)" }
            );
        }
    }

    let errors = cfg.validate();
    if !errors.is_empty() {
        println!();
        for error in &errors {
            eprintln!("❌ {}", error);
        }
        anyhow::bail!("Configuration has {} problem(s)", errors.len());
    }

    println!("\nConfiguration OK.");
    Ok(())
}
