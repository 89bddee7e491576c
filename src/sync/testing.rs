//! In-memory transport for exercising the sync layer without a server.

use super::transport::{ChangeTransport, FeedRequest, TransportEvent, TransportSubscription};
use crate::types::{RealtimeError, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    Open(String),
    Close(String),
}

/// Records every open/close and hands tests the sending side of each channel
#[derive(Default)]
pub struct FakeTransport {
    failing: bool,
    ops: Mutex<Vec<TransportOp>>,
    senders: Mutex<HashMap<String, mpsc::Sender<TransportEvent>>>,
    requests: Mutex<HashMap<String, FeedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open` fails as if the server were unreachable
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn request(&self, topic: &str) -> Option<FeedRequest> {
        self.requests.lock().unwrap().get(topic).cloned()
    }

    pub fn sender(&self, topic: &str) -> Option<mpsc::Sender<TransportEvent>> {
        self.senders.lock().unwrap().get(topic).cloned()
    }

    /// Ends every open stream
    pub fn drop_senders(&self) {
        self.senders.lock().unwrap().clear();
    }

    /// Waits until `topic` is open and returns its sender
    pub async fn wait_open(&self, topic: &str) -> mpsc::Sender<TransportEvent> {
        for _ in 0..200 {
            if let Some(sender) = self.sender(topic) {
                return sender;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{} never opened; ops: {:?}", topic, self.ops());
    }

    pub async fn wait_op(&self, op: TransportOp) {
        for _ in 0..200 {
            if self.ops().contains(&op) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{:?} never happened; ops: {:?}", op, self.ops());
    }
}

impl ChangeTransport for FakeTransport {
    async fn open(&self, request: FeedRequest) -> Result<TransportSubscription> {
        let topic = request.topic.clone();
        self.ops.lock().unwrap().push(TransportOp::Open(topic.clone()));
        if self.failing {
            return Err(RealtimeError::Connection("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().unwrap().insert(topic.clone(), tx);
        self.requests.lock().unwrap().insert(topic.clone(), request);

        Ok(TransportSubscription {
            topic: format!("realtime:{}", topic),
            events: rx,
        })
    }

    async fn close(&self, request: &FeedRequest) -> Result<()> {
        let topic = &request.topic;
        self.ops
            .lock()
            .unwrap()
            .push(TransportOp::Close(topic.clone()));
        let mut requests = self.requests.lock().unwrap();
        if requests.get(topic).is_some_and(|open| open.id == request.id) {
            requests.remove(topic);
            self.senders.lock().unwrap().remove(topic);
        }
        Ok(())
    }
}

fn change_payload(kind: &str, table: &str, field: &str, row: Value, ts: &str) -> Value {
    let mut data = json!({
        "type": kind,
        "schema": "public",
        "table": table,
        "commit_timestamp": ts,
        "errors": null,
        "columns": [],
    });
    data[field] = row;
    json!({"ids": [1], "data": data})
}

pub fn insert_payload(table: &str, record: Value, ts: &str) -> Value {
    change_payload("INSERT", table, "record", record, ts)
}

pub fn update_payload(table: &str, record: Value, ts: &str) -> Value {
    change_payload("UPDATE", table, "record", record, ts)
}

pub fn delete_payload(table: &str, id: i64, ts: &str) -> Value {
    change_payload("DELETE", table, "old_record", json!({"id": id}), ts)
}
