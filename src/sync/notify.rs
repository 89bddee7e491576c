use super::config::WatchedTable;
use super::{ChangeEvent, ConnectionState, RowChange};
use crate::types::RealtimeError;
use serde_json::Value;
use std::str::FromStr;
use tokio::sync::mpsc;

/// Display language for user-facing text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    English,
    Spanish,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
        }
    }
}

impl FromStr for Locale {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = s.split(['-', '_']).next().unwrap_or_default();
        match lang.to_ascii_lowercase().as_str() {
            "en" => Ok(Self::English),
            "es" => Ok(Self::Spanish),
            _ => Err(RealtimeError::Config(format!("unsupported locale: {}", s))),
        }
    }
}

/// A transient message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub detail: Option<String>,
}

/// Where change notifications are shown
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, detail: Option<&str>);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => tracing::info!("{} ({})", message, detail),
            None => tracing::info!("{}", message),
        }
    }
}

/// Forwards notifications to a UI over a channel
#[derive(Debug, Clone)]
pub struct ToastNotifier {
    tx: mpsc::UnboundedSender<Toast>,
}

impl ToastNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ToastNotifier {
    fn notify(&self, message: &str, detail: Option<&str>) {
        let toast = Toast {
            message: message.to_string(),
            detail: detail.map(str::to_string),
        };
        if self.tx.send(toast).is_err() {
            tracing::debug!("Toast dropped, no UI listening: {}", message);
        }
    }
}

/// Status indicator text
pub fn connection_text(state: ConnectionState, locale: Locale) -> &'static str {
    match (state, locale) {
        (ConnectionState::Connecting, Locale::English) => "Connecting...",
        (ConnectionState::Connecting, Locale::Spanish) => "Conectando...",
        (ConnectionState::Connected, Locale::English) => "Live updates on",
        (ConnectionState::Connected, Locale::Spanish) => "Actualizaciones en vivo",
        (ConnectionState::Disconnected, Locale::English) => "Offline",
        (ConnectionState::Disconnected, Locale::Spanish) => "Sin conexión",
    }
}

fn insert_detail(locale: Locale) -> &'static str {
    match locale {
        Locale::English => "Synced to your account",
        Locale::Spanish => "Sincronizado con tu cuenta",
    }
}

/// Summary toast for an inserted row, e.g. `New expense: Acme Corp - $42.50`.
///
/// `None` for anything but an insert, or when the table has no template.
pub fn insert_toast(event: &ChangeEvent, table: &WatchedTable, locale: Locale) -> Option<Toast> {
    let RowChange::Inserted(row) = &event.change else {
        return None;
    };
    let template = table.notification.as_ref()?;

    let mut message = template.heading.get(locale).to_string();
    let title = row.get(&template.title_column).and_then(display_text);
    let amount = template
        .amount_column
        .as_ref()
        .and_then(|column| row.get(column))
        .and_then(format_amount);

    match (title, amount) {
        (Some(title), Some(amount)) => message.push_str(&format!(": {} - {}", title, amount)),
        (Some(title), None) => message.push_str(&format!(": {}", title)),
        (None, Some(amount)) => message.push_str(&format!(": {}", amount)),
        (None, None) => {}
    }

    Some(Toast {
        message,
        detail: Some(insert_detail(locale).to_string()),
    })
}

fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Formats a numeric column as dollars with cents, e.g. `$1,234.50`.
///
/// Accepts JSON numbers and numeric strings (`numeric` columns arrive as either).
pub fn format_amount(value: &Value) -> Option<String> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    // Cents must fit in a u64
    if !amount.is_finite() || amount.abs() * 100.0 >= u64::MAX as f64 {
        return None;
    }

    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    Some(format!("{}${}.{:02}", sign, grouped, cents % 100))
}
