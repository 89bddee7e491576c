use super::QueryKey;
use super::notify::Locale;
use crate::types::constants::{DEFAULT_SCHEMA, FEED_BUFFER_SIZE};
use crate::types::{RealtimeError, Result};

/// Env var selecting the notification language (`en`, `es`)
pub const LOCALE_ENV: &str = "LEDGER_SYNC_LOCALE";
/// Env var toggling insert toasts (`true`/`false`/`1`/`0`)
pub const NOTIFY_INSERTS_ENV: &str = "LEDGER_SYNC_NOTIFY_INSERTS";

/// Text in every supported locale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedText {
    pub en: String,
    pub es: String,
}

impl LocalizedText {
    pub fn new(en: impl Into<String>, es: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            es: es.into(),
        }
    }

    pub fn get(&self, locale: Locale) -> &str {
        match locale {
            Locale::English => &self.en,
            Locale::Spanish => &self.es,
        }
    }
}

/// How an inserted row is summarized in a toast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTemplate {
    /// e.g. "New expense"
    pub heading: LocalizedText,
    /// Column shown after the heading, e.g. `vendor`
    pub title_column: String,
    /// Column formatted as dollars, e.g. `amount`
    pub amount_column: Option<String>,
}

/// A table the session subscribes to, and which cached queries it feeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedTable {
    pub name: String,
    pub key_prefixes: Vec<QueryKey>,
    pub notification: Option<NotificationTemplate>,
}

impl WatchedTable {
    /// Watches `name`, invalidating queries under `[name]`
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key_prefixes: vec![QueryKey::new([name.as_str()])],
            name,
            notification: None,
        }
    }

    /// Also invalidates queries under `prefix` (dashboards, aggregates)
    pub fn also_invalidates(mut self, prefix: QueryKey) -> Self {
        if !self.key_prefixes.contains(&prefix) {
            self.key_prefixes.push(prefix);
        }
        self
    }

    pub fn notify_inserts(
        mut self,
        heading: LocalizedText,
        title_column: &str,
        amount_column: Option<&str>,
    ) -> Self {
        self.notification = Some(NotificationTemplate {
            heading,
            title_column: title_column.to_string(),
            amount_column: amount_column.map(str::to_string),
        });
        self
    }
}

/// Configuration for a [`RealtimeSync`](super::RealtimeSync) session
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub schema: String,
    pub tables: Vec<WatchedTable>,
    pub locale: Locale,
    /// Show a toast when a row is inserted from another session
    pub notify_inserts: bool,
    /// Capacity of each subscription's broadcast buffer
    pub feed_buffer: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        let dashboard = QueryKey::new(["dashboard"]);
        let budget_progress = QueryKey::new(["budget-progress"]);

        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            tables: vec![
                WatchedTable::new("expenses")
                    .also_invalidates(dashboard.clone())
                    .also_invalidates(budget_progress.clone())
                    .notify_inserts(
                        LocalizedText::new("New expense", "Nuevo gasto"),
                        "vendor",
                        Some("amount"),
                    ),
                WatchedTable::new("income")
                    .also_invalidates(dashboard.clone())
                    .notify_inserts(
                        LocalizedText::new("New income", "Nuevo ingreso"),
                        "source",
                        Some("amount"),
                    ),
                WatchedTable::new("mileage")
                    .also_invalidates(dashboard.clone())
                    .notify_inserts(
                        LocalizedText::new("New trip", "Nuevo viaje"),
                        "purpose",
                        None,
                    ),
                WatchedTable::new("contracts").notify_inserts(
                    LocalizedText::new("New contract", "Nuevo contrato"),
                    "client_name",
                    Some("value"),
                ),
                WatchedTable::new("budgets").also_invalidates(budget_progress),
                WatchedTable::new("investment_goals").also_invalidates(dashboard),
                WatchedTable::new("bank_statements"),
            ],
            locale: Locale::default(),
            notify_inserts: true,
            feed_buffer: FEED_BUFFER_SIZE,
        }
    }
}

impl SyncOptions {
    /// Defaults, overridden by `LEDGER_SYNC_LOCALE` and `LEDGER_SYNC_NOTIFY_INSERTS`
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] when a variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(locale) = lookup(LOCALE_ENV) {
            options.locale = locale.parse()?;
        }
        if let Some(flag) = lookup(NOTIFY_INSERTS_ENV) {
            options.notify_inserts = parse_flag(&flag).ok_or_else(|| {
                RealtimeError::Config(format!("{} must be a boolean, got {:?}", NOTIFY_INSERTS_ENV, flag))
            })?;
        }

        Ok(options)
    }

    pub fn table(&self, name: &str) -> Option<&WatchedTable> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Restricts the watched tables to `names`, in that order
    pub fn with_tables(mut self, names: &[&str]) -> Self {
        let tables = names
            .iter()
            .map(|name| {
                self.table(name)
                    .cloned()
                    .unwrap_or_else(|| WatchedTable::new(*name))
            })
            .collect();
        self.tables = tables;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
