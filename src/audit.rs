//! Audit records carried through the work queue.
//!
//! The queue itself is payload-agnostic; this is the JSON shape the admin
//! backend enqueues for its audit trail (`{"action","entity","entityId","meta"}`).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ProcessError;
use crate::payload::Payload;

/// What happened to the audited entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    /// Generic HTTP request trail.
    Http,
    /// Scheduled daily health record.
    DailyCheck,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Http => "HTTP",
            AuditAction::DailyCheck => "DAILY_CHECK",
        }
    }
}

/// One audit-trail entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub action: AuditAction,
    pub entity: String,
    pub entity_id: u64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

impl AuditRecord {
    pub fn new(action: AuditAction, entity: impl Into<String>, entity_id: u64) -> Self {
        Self {
            action,
            entity: entity.into(),
            entity_id,
            meta: Value::Null,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// The record written by the daily scheduled check.
    pub fn daily_check() -> Self {
        Self::new(AuditAction::DailyCheck, "system", 0).with_meta(json!({
            "kind": "daily_check",
            "note": "daily audit executed automatically",
        }))
    }

    /// Encodes the record as a JSON payload.
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        Ok(Payload::from(serde_json::to_vec(self)?))
    }

    /// Decodes a payload; malformed input is a permanent failure.
    pub fn from_payload(payload: &Payload) -> Result<Self, ProcessError> {
        Ok(serde_json::from_slice(payload.as_bytes())?)
    }
}
