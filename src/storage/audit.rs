// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for authentication and authorization events.
//!
//! Entries are append-only: this module has no update or delete path.
//! Recording is a side effect only; a failure to write is logged and never
//! changes the outcome of the operation being audited.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AuthDatabase, StorageResult, AUDIT_LOG};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Sign-in events
    LoginSuccess,
    LoginFailure,
    Logout,

    // Token events
    TokenRefreshed,
    RefreshRejected,
    RefreshReuseDetected,

    // Request events
    TokenRejected,
    PermissionDenied,
    SecurityViolation,

    // Admin events
    RoleChanged,
    AccountDeactivated,
    AccountActivated,
}

/// Where a request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// Sequence number, assigned on append.
    pub id: u64,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// User who triggered the event (if known).
    pub actor_id: Option<u64>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Additional details.
    #[schema(value_type = Object)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl AuditLogEntry {
    /// Create a new entry; `id` is assigned when recorded.
    pub fn new(action: AuditAction) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            action,
            actor_id: None,
            client_ip: None,
            user_agent: None,
            context: BTreeMap::new(),
        }
    }

    /// Set the acting user.
    pub fn with_actor(mut self, actor_id: u64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Set the acting user if known.
    pub fn with_optional_actor(mut self, actor_id: Option<u64>) -> Self {
        self.actor_id = actor_id;
        self
    }

    /// Copy client ip and user agent from the request.
    pub fn with_request(mut self, meta: &RequestMeta) -> Self {
        self.client_ip = meta.client_ip.clone();
        self.user_agent = meta.user_agent.clone();
        self
    }

    /// Add a context value.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// Append-only audit sink shared by every request.
#[derive(Clone)]
pub struct AuditRecorder {
    db: Arc<AuthDatabase>,
}

impl AuditRecorder {
    pub fn new(db: Arc<AuthDatabase>) -> Self {
        Self { db }
    }

    /// Record an entry. Never fails the caller.
    pub fn record(&self, entry: AuditLogEntry) {
        let action = entry.action;
        if let Err(e) = self.append(entry) {
            tracing::error!(?action, error = %e, "failed to write audit entry");
        }
    }

    fn append(&self, mut entry: AuditLogEntry) -> StorageResult<()> {
        let write_txn = self.db.inner().begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_LOG)?;
            entry.id = table.last()?.map(|(k, _)| k.value() + 1).unwrap_or(1);
            let json = serde_json::to_vec(&entry)?;
            table.insert(entry.id, json.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(action = ?entry.action, actor_id = ?entry.actor_id, "audit entry recorded");
        Ok(())
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> StorageResult<Vec<AuditLogEntry>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;
        let mut entries = Vec::with_capacity(limit.min(256));
        for entry in table.iter()?.rev().take(limit) {
            let (_, value) = entry?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    /// Entries with the given action, oldest first.
    pub fn by_action(&self, action: AuditAction) -> StorageResult<Vec<AuditLogEntry>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;
        let mut entries = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let entry: AuditLogEntry = serde_json::from_slice(value.value())?;
            if entry.action == action {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
