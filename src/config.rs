//! Configuration loading and resolution.
//!
//! The config file lives at ~/.config/calsinki/config.toml and declares
//! accounts (each owning labeled calendars) and sync rules. Rules reference
//! calendars as "account.label"; resolution turns them into the engine's
//! rule entities carrying concrete provider calendar ids.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use calsinki_core::rule::{PrivacyMode, SyncRule, SyncTarget, DEFAULT_IDENTIFIER};

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Namespaces all marker keys; lets several installs share calendars.
    #[serde(default = "default_identifier")]
    pub default_identifier: String,

    #[serde(default)]
    pub accounts: Vec<Account>,

    #[serde(default)]
    pub sync_rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub calendars: Vec<CalendarRef>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarRef {
    /// Unique label within the account ("primary", "team").
    pub label: String,
    /// Google Calendar id (email, calendar id, or resource id).
    pub calendar_id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    /// Source calendar as "account.label".
    pub source_calendar: String,
    #[serde(default)]
    pub destination: Vec<TargetConfig>,
}

#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// Destination calendar as "account.label".
    pub calendar: String,
    #[serde(default = "default_privacy_mode")]
    pub privacy_mode: PrivacyMode,
    #[serde(default = "default_privacy_label")]
    pub privacy_label: String,
    #[serde(default)]
    pub show_time: bool,
    #[serde(default)]
    pub title_prefix: String,
    #[serde(default)]
    pub title_suffix: String,
    #[serde(default)]
    pub event_color: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_identifier() -> String {
    DEFAULT_IDENTIFIER.to_string()
}

fn default_privacy_mode() -> PrivacyMode {
    PrivacyMode::Public
}

fn default_privacy_label() -> String {
    "Busy".to_string()
}

fn default_true() -> bool {
    true
}

/// Get the config file path (~/.config/calsinki/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Could not determine config directory")?
        .join("calsinki")
        .join("config.toml"))
}

/// Load config from ~/.config/calsinki/config.toml
pub fn load_config() -> Result<Config> {
    let path = config_path()?;

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}\n\n\
            Create it with your accounts and sync rules:\n\n\
            [[accounts]]\n\
            name = \"work\"\n\
            email = \"work@company.com\"\n\n\
            [[accounts.calendars]]\n\
            label = \"primary\"\n\
            calendar_id = \"work@company.com\"\n\
            name = \"Work Calendar\"\n\n\
            [[sync_rules]]\n\
            id = \"work_to_personal\"\n\
            source_calendar = \"work.primary\"\n\n\
            [[sync_rules.destination]]\n\
            calendar = \"personal.primary\"\n\
            privacy_mode = \"private\"\n\
            privacy_label = \"Busy\"",
            path.display()
        );
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

    Ok(config)
}

impl Config {
    /// Find a calendar by its "account.label" reference.
    pub fn find_calendar(&self, reference: &str) -> Option<(&Account, &CalendarRef)> {
        let (account_name, label) = reference.split_once('.')?;
        let account = self.accounts.iter().find(|a| a.name == account_name)?;
        let calendar = account.calendars.iter().find(|c| c.label == label)?;
        Some((account, calendar))
    }

    /// Resolve one rule's calendar references into an engine rule.
    pub fn resolve_rule(&self, rule: &RuleConfig) -> Result<SyncRule> {
        let (source_account, source_calendar) =
            self.find_calendar(&rule.source_calendar).with_context(|| {
                format!(
                    "Sync rule '{}' references unknown source calendar: {}",
                    rule.id, rule.source_calendar
                )
            })?;

        let mut targets = Vec::with_capacity(rule.destination.len());
        for destination in &rule.destination {
            let (account, calendar) =
                self.find_calendar(&destination.calendar).with_context(|| {
                    format!(
                        "Sync rule '{}' references unknown destination calendar: {}",
                        rule.id, destination.calendar
                    )
                })?;
            targets.push(SyncTarget {
                account: account.name.clone(),
                calendar_id: calendar.calendar_id.clone(),
                name: calendar.name.clone(),
                privacy_mode: destination.privacy_mode,
                privacy_label: destination.privacy_label.clone(),
                show_time: destination.show_time,
                title_prefix: destination.title_prefix.clone(),
                title_suffix: destination.title_suffix.clone(),
                event_color: destination.event_color.clone(),
                enabled: destination.enabled,
            });
        }

        Ok(SyncRule {
            id: rule.id.clone(),
            source_account: source_account.name.clone(),
            source_calendar_id: source_calendar.calendar_id.clone(),
            source_name: source_calendar.name.clone(),
            targets,
        })
    }

    /// Validate the configuration, returning all problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for account in &self.accounts {
            if account.name.is_empty() {
                errors.push("Account must have a name".to_string());
            }
            if account.email.is_empty() {
                errors.push(format!("Account '{}' must have an email", account.name));
            }
            for calendar in &account.calendars {
                if calendar.calendar_id.is_empty() {
                    errors.push(format!(
                        "Calendar '{}' in account '{}' must have a calendar id",
                        calendar.name, account.name
                    ));
                }
            }
        }

        let mut seen_rule_ids = std::collections::HashSet::new();
        for rule in &self.sync_rules {
            if !seen_rule_ids.insert(&rule.id) {
                errors.push(format!("Duplicate sync rule id: {}", rule.id));
            }
            if self.find_calendar(&rule.source_calendar).is_none() {
                errors.push(format!(
                    "Sync rule '{}' references unknown source calendar: {}",
                    rule.id, rule.source_calendar
                ));
            }
            for destination in &rule.destination {
                if self.find_calendar(&destination.calendar).is_none() {
                    errors.push(format!(
                        "Sync rule '{}' references unknown destination calendar: {}",
                        rule.id, destination.calendar
                    ));
                }
                if destination.calendar == rule.source_calendar {
                    errors.push(format!(
                        "Sync rule '{}' cannot sync calendar to itself: {}",
                        rule.id, rule.source_calendar
                    ));
                }
            }
        }

        errors
    }
}
