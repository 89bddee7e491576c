use crate::channel::PostgresChangesPayload;
use crate::types::FeedError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub type Row = HashMap<String, Value>;

/// Primary key of a row, normalised to text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Reads the `id` column of a row. Strings and integers are accepted.
    pub fn from_row(row: &Row) -> Option<Self> {
        match row.get("id")? {
            Value::String(id) if !id.is_empty() => Some(Self(id.clone())),
            Value::Number(id) => Some(Self(id.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened to the row
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Inserted(Row),
    Updated(Row),
    Deleted(RowId),
}

/// A row-level change delivered by the feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    pub commit_timestamp: String,
    pub change: RowChange,
}

impl ChangeEvent {
    /// Parses a raw `postgres_changes` payload.
    ///
    /// Payloads the server flagged with errors, inserts and updates without a
    /// record, and deletes without the old row's `id` are rejected as
    /// [`FeedError::MalformedEvent`].
    pub fn from_payload(payload: &Value) -> Result<Self, FeedError> {
        let parsed = PostgresChangesPayload::from_message_payload(payload)
            .map_err(|e| FeedError::MalformedEvent(e.to_string()))?;

        let base = parsed.base();
        if let Some(errors) = base.errors.as_ref().filter(|errors| !errors.is_empty()) {
            return Err(FeedError::MalformedEvent(format!(
                "server reported errors for {}: {}",
                base.table,
                errors.join("; ")
            )));
        }

        let schema = base.schema.clone();
        let table = base.table.clone();
        let commit_timestamp = base.commit_timestamp.clone();

        let change = match parsed {
            PostgresChangesPayload::Insert(insert) if !insert.new.is_empty() => {
                RowChange::Inserted(insert.new)
            }
            PostgresChangesPayload::Update(update) if !update.new.is_empty() => {
                RowChange::Updated(update.new)
            }
            PostgresChangesPayload::Delete(delete) => match RowId::from_row(&delete.old) {
                Some(id) => RowChange::Deleted(id),
                None => {
                    return Err(FeedError::MalformedEvent(format!(
                        "delete on {} without an old row id",
                        table
                    )));
                }
            },
            _ => {
                return Err(FeedError::MalformedEvent(format!(
                    "change on {} without a record",
                    table
                )));
            }
        };

        Ok(Self {
            schema,
            table,
            commit_timestamp,
            change,
        })
    }

    pub fn row_id(&self) -> Option<RowId> {
        match &self.change {
            RowChange::Inserted(row) | RowChange::Updated(row) => RowId::from_row(row),
            RowChange::Deleted(id) => Some(id.clone()),
        }
    }

    /// Identity of this delivery, stable across redeliveries of the same change
    pub fn fingerprint(&self) -> String {
        let kind = match self.change {
            RowChange::Inserted(_) => "insert",
            RowChange::Updated(_) => "update",
            RowChange::Deleted(_) => "delete",
        };
        let id = self.row_id();
        format!(
            "{}:{}:{}:{}",
            self.table,
            kind,
            id.as_ref().map(RowId::as_str).unwrap_or("?"),
            self.commit_timestamp
        )
    }
}

/// Subscription health as seen by the feed's consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Subscribed,
    Failed(FeedError),
}

/// One item on a subscription's broadcast stream
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(ChangeEvent),
    Status(FeedStatus),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_event() {
        let event = ChangeEvent::from_payload(&json!({
            "ids": [1],
            "data": {
                "commit_timestamp": "2025-11-27T16:16:54.545Z",
                "errors": null,
                "record": {"id": "e-1", "vendor": "Acme Corp", "amount": 42.5},
                "schema": "public",
                "table": "expenses",
                "type": "INSERT"
            }
        }))
        .unwrap();

        assert_eq!(event.table, "expenses");
        assert_eq!(event.row_id(), Some(RowId::new("e-1")));
        match &event.change {
            RowChange::Inserted(row) => assert_eq!(row["vendor"], "Acme Corp"),
            other => panic!("Expected Inserted, got {:?}", other),
        }
        assert_eq!(
            event.fingerprint(),
            "expenses:insert:e-1:2025-11-27T16:16:54.545Z"
        );
    }

    #[test]
    fn test_delete_event_carries_identifier() {
        let event = ChangeEvent::from_payload(&json!({
            "commit_timestamp": "2025-11-27T16:25:00.000Z",
            "old_record": {"id": 47},
            "schema": "public",
            "table": "mileage",
            "type": "DELETE"
        }))
        .unwrap();

        assert_eq!(event.change, RowChange::Deleted(RowId::new("47")));
    }

    #[test]
    fn test_delete_without_id_is_malformed() {
        let result = ChangeEvent::from_payload(&json!({
            "commit_timestamp": "2025-11-27T16:25:00.000Z",
            "old_record": {},
            "schema": "public",
            "table": "mileage",
            "type": "DELETE"
        }));

        assert!(matches!(result, Err(FeedError::MalformedEvent(_))));
    }

    #[test]
    fn test_insert_without_record_is_malformed() {
        let result = ChangeEvent::from_payload(&json!({
            "commit_timestamp": "2025-11-27T16:25:00.000Z",
            "schema": "public",
            "table": "income",
            "type": "INSERT"
        }));

        assert!(matches!(result, Err(FeedError::MalformedEvent(_))));
    }

    #[test]
    fn test_server_errors_are_malformed() {
        let result = ChangeEvent::from_payload(&json!({
            "commit_timestamp": "2025-11-27T16:25:00.000Z",
            "errors": ["Error 413: Payload Too Large"],
            "record": {"id": 1},
            "schema": "public",
            "table": "contracts",
            "type": "UPDATE"
        }));

        match result {
            Err(FeedError::MalformedEvent(reason)) => assert!(reason.contains("413")),
            other => panic!("Expected MalformedEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_type_is_malformed() {
        let result = ChangeEvent::from_payload(&json!({"table": "expenses"}));
        assert!(matches!(result, Err(FeedError::MalformedEvent(_))));
    }
}
