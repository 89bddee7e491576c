use crate::types::constants::postgres_events;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::config::PostgresChangesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostgresChangeEvent {
    #[serde(rename = "*")]
    All,
    Insert,
    Update,
    Delete,
}

impl PostgresChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => postgres_events::ALL,
            Self::Insert => postgres_events::INSERT,
            Self::Update => postgres_events::UPDATE,
            Self::Delete => postgres_events::DELETE,
        }
    }
}

/// A `postgres_changes` binding: which rows the server should stream to us.
///
/// `filter` is a server-side predicate such as `user_id=eq.42`. It is sent in the
/// join payload and never evaluated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresChangesFilter {
    pub event: PostgresChangeEvent,
    pub schema: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl PostgresChangesFilter {
    pub fn new(event: PostgresChangeEvent, schema: impl Into<String>) -> Self {
        Self {
            event,
            schema: schema.into(),
            table: None,
            filter: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Join-payload form of this binding
    pub fn to_config(&self) -> PostgresChangesConfig {
        PostgresChangesConfig {
            event: self.event.as_str().to_string(),
            schema: self.schema.clone(),
            table: self.table.clone(),
            filter: self.filter.clone(),
        }
    }

    /// Local routing check: event category, schema and table.
    pub fn matches(&self, payload: &PostgresChangesPayload) -> bool {
        let event_matches = match self.event {
            PostgresChangeEvent::All => true,
            PostgresChangeEvent::Insert => matches!(payload, PostgresChangesPayload::Insert(_)),
            PostgresChangeEvent::Update => matches!(payload, PostgresChangesPayload::Update(_)),
            PostgresChangeEvent::Delete => matches!(payload, PostgresChangesPayload::Delete(_)),
        };

        event_matches
            && self.schema == payload.schema()
            && self
                .table
                .as_deref()
                .is_none_or(|table| table == "*" || table == payload.table())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PostgresChangesPayloadBase {
    pub schema: String,
    pub table: String,
    pub commit_timestamp: String,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

// Internal struct for deserializing server format
#[derive(Deserialize, Debug)]
struct PostgresInsertPayloadRaw {
    #[serde(flatten)]
    base: PostgresChangesPayloadBase,
    #[serde(default)]
    record: HashMap<String, Value>,
}

#[derive(Serialize, Debug, Clone)]
pub struct PostgresInsertPayload {
    #[serde(flatten)]
    pub base: PostgresChangesPayloadBase,
    pub new: HashMap<String, Value>,
}

impl<'de> Deserialize<'de> for PostgresInsertPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = PostgresInsertPayloadRaw::deserialize(deserializer)?;
        Ok(PostgresInsertPayload {
            base: raw.base,
            new: raw.record,
        })
    }
}

// Internal struct for deserializing server format
#[derive(Deserialize, Debug)]
struct PostgresUpdatePayloadRaw {
    #[serde(flatten)]
    base: PostgresChangesPayloadBase,
    #[serde(default)]
    record: HashMap<String, Value>,
    #[serde(default)]
    old_record: HashMap<String, Value>,
}

#[derive(Serialize, Debug, Clone)]
pub struct PostgresUpdatePayload {
    #[serde(flatten)]
    pub base: PostgresChangesPayloadBase,
    pub new: HashMap<String, Value>,
    pub old: HashMap<String, Value>,
}

impl<'de> Deserialize<'de> for PostgresUpdatePayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = PostgresUpdatePayloadRaw::deserialize(deserializer)?;
        Ok(PostgresUpdatePayload {
            base: raw.base,
            new: raw.record,
            old: raw.old_record,
        })
    }
}

// Internal struct for deserializing server format
#[derive(Deserialize, Debug)]
struct PostgresDeletePayloadRaw {
    #[serde(flatten)]
    base: PostgresChangesPayloadBase,
    #[serde(default)]
    old_record: HashMap<String, Value>,
}

#[derive(Serialize, Debug, Clone)]
pub struct PostgresDeletePayload {
    #[serde(flatten)]
    pub base: PostgresChangesPayloadBase,
    pub old: HashMap<String, Value>,
}

impl<'de> Deserialize<'de> for PostgresDeletePayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = PostgresDeletePayloadRaw::deserialize(deserializer)?;
        Ok(PostgresDeletePayload {
            base: raw.base,
            old: raw.old_record,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum PostgresChangesPayload {
    Insert(PostgresInsertPayload),
    Update(PostgresUpdatePayload),
    Delete(PostgresDeletePayload),
}

impl PostgresChangesPayload {
    /// Parses a `postgres_changes` message payload.
    ///
    /// The server wraps the change in `{"ids": [...], "data": {...}}`; a bare
    /// change object is accepted as well.
    pub fn from_message_payload(payload: &Value) -> serde_json::Result<Self> {
        let data = payload.get("data").unwrap_or(payload);
        Self::deserialize(data)
    }

    pub fn base(&self) -> &PostgresChangesPayloadBase {
        match self {
            Self::Insert(payload) => &payload.base,
            Self::Update(payload) => &payload.base,
            Self::Delete(payload) => &payload.base,
        }
    }

    pub fn schema(&self) -> &str {
        &self.base().schema
    }

    pub fn table(&self) -> &str {
        &self.base().table
    }

    pub fn commit_timestamp(&self) -> &str {
        &self.base().commit_timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_insert_payload_from_server_format() {
        let json = r#"{
            "columns": [
                {"name": "id", "type": "uuid"},
                {"name": "vendor", "type": "text"},
                {"name": "amount", "type": "numeric"}
            ],
            "commit_timestamp": "2025-11-27T16:16:54.545Z",
            "errors": null,
            "record": {
                "id": "8d6c",
                "vendor": "Acme Corp",
                "amount": 42.5
            },
            "schema": "public",
            "table": "expenses",
            "type": "INSERT"
        }"#;

        let payload: PostgresChangesPayload = serde_json::from_str(json).unwrap();

        match payload {
            PostgresChangesPayload::Insert(insert) => {
                assert_eq!(insert.base.schema, "public");
                assert_eq!(insert.base.table, "expenses");
                assert_eq!(insert.base.columns.len(), 3);
                assert_eq!(insert.new["vendor"], "Acme Corp");
                assert_eq!(insert.new["amount"].as_f64(), Some(42.5));
            }
            _ => panic!("Expected Insert variant"),
        }
    }

    #[test]
    fn test_deserialize_update_inside_data_envelope() {
        let payload = serde_json::json!({
            "ids": [31],
            "data": {
                "commit_timestamp": "2025-11-27T16:20:00.000Z",
                "errors": null,
                "record": {"id": 7, "source": "Payroll"},
                "old_record": {"id": 7},
                "schema": "public",
                "table": "income",
                "type": "UPDATE"
            }
        });

        let payload = PostgresChangesPayload::from_message_payload(&payload).unwrap();

        match payload {
            PostgresChangesPayload::Update(update) => {
                assert_eq!(update.base.table, "income");
                assert_eq!(update.new["source"], "Payroll");
                assert_eq!(update.old["id"], 7);
            }
            _ => panic!("Expected Update variant"),
        }
    }

    #[test]
    fn test_deserialize_delete_payload_from_server_format() {
        let json = r#"{
            "commit_timestamp": "2025-11-27T16:25:00.000Z",
            "old_record": {"id": 47},
            "schema": "public",
            "table": "mileage",
            "type": "DELETE"
        }"#;

        let payload: PostgresChangesPayload = serde_json::from_str(json).unwrap();

        match payload {
            PostgresChangesPayload::Delete(delete) => {
                assert_eq!(delete.base.table, "mileage");
                assert_eq!(delete.old["id"], 47);
                assert!(delete.base.columns.is_empty());
            }
            _ => panic!("Expected Delete variant"),
        }
    }

    #[test]
    fn test_filter_matching() {
        let payload: PostgresChangesPayload = serde_json::from_value(serde_json::json!({
            "commit_timestamp": "2025-11-27T16:25:00.000Z",
            "record": {"id": 1},
            "schema": "public",
            "table": "budgets",
            "type": "INSERT"
        }))
        .unwrap();

        let all = PostgresChangesFilter::new(PostgresChangeEvent::All, "public").table("budgets");
        let inserts = PostgresChangesFilter::new(PostgresChangeEvent::Insert, "public");
        let deletes =
            PostgresChangesFilter::new(PostgresChangeEvent::Delete, "public").table("budgets");
        let other_table =
            PostgresChangesFilter::new(PostgresChangeEvent::All, "public").table("expenses");

        assert!(all.matches(&payload));
        assert!(inserts.matches(&payload));
        assert!(!deletes.matches(&payload));
        assert!(!other_table.matches(&payload));
    }

    #[test]
    fn test_row_filter_is_forwarded_not_evaluated() {
        let filter = PostgresChangesFilter::new(PostgresChangeEvent::All, "public")
            .table("contracts")
            .filter("user_id=eq.u1");

        let config = filter.to_config();
        assert_eq!(config.event, "*");
        assert_eq!(config.filter.as_deref(), Some("user_id=eq.u1"));

        let payload: PostgresChangesPayload = serde_json::from_value(serde_json::json!({
            "commit_timestamp": "2025-11-27T16:25:00.000Z",
            "record": {"id": 1, "user_id": "someone-else"},
            "schema": "public",
            "table": "contracts",
            "type": "INSERT"
        }))
        .unwrap();
        assert!(filter.matches(&payload));
    }
}
