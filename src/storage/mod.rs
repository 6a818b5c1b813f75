// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Auth Storage Module
//!
//! Durable state for the auth subsystem, kept in one embedded redb database
//! (pure Rust, ACID). redb runs one write transaction at a time, which is what
//! makes refresh rotation and authorization-code consumption atomic: the
//! loser of a race sees the winner's commit.
//!
//! ## Table Layout
//!
//! ```text
//! users                   user_id -> Identity (JSON)
//! user_subjects           "<provider>#<subject>" -> user_id
//! refresh_credentials     sha256(credential) -> RefreshRecord (JSON)
//! consumed_refresh        sha256(credential) -> ConsumedRecord (JSON)
//! authorization_codes     sha256(code) -> consumed-at (Unix seconds)
//! audit_log               sequence -> AuditLogEntry (JSON), append-only
//! ```
//!
//! Secrets (refresh credentials, authorization codes) are only ever stored
//! as digests. Consumed digests are swept on write once they can no longer
//! matter.

pub mod audit;
pub mod codes;
pub mod refresh;
pub mod users;

use std::path::Path;

use base64ct::{Base64UrlUnpadded, Encoding};
use redb::{Database, TableDefinition};
use sha2::{Digest, Sha256};

pub use audit::{AuditAction, AuditLogEntry, AuditRecorder, RequestMeta};
pub use codes::AuthorizationCodeLedger;
pub use refresh::{RefreshRecord, RefreshRepository, RotationOutcome};
pub use users::{Identity, UserRepository};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
pub(crate) const USER_SUBJECTS: TableDefinition<&str, u64> = TableDefinition::new("user_subjects");
pub(crate) const REFRESH_CREDENTIALS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("refresh_credentials");
pub(crate) const CONSUMED_REFRESH: TableDefinition<&str, &[u8]> =
    TableDefinition::new("consumed_refresh");
pub(crate) const AUTHORIZATION_CODES: TableDefinition<&str, i64> =
    TableDefinition::new("authorization_codes");
pub(crate) const AUDIT_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_log");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("random number generator failure")]
    Entropy,
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// AuthDatabase
// =============================================================================

/// Embedded ACID auth database.
pub struct AuthDatabase {
    db: Database,
}

impl AuthDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_SUBJECTS)?;
            let _ = write_txn.open_table(REFRESH_CREDENTIALS)?;
            let _ = write_txn.open_table(CONSUMED_REFRESH)?;
            let _ = write_txn.open_table(AUTHORIZATION_CODES)?;
            let _ = write_txn.open_table(AUDIT_LOG)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn inner(&self) -> &Database {
        &self.db
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(self)
    }

    pub fn refresh_credentials(&self) -> RefreshRepository<'_> {
        RefreshRepository::new(self)
    }

    pub fn authorization_codes(&self) -> AuthorizationCodeLedger<'_> {
        AuthorizationCodeLedger::new(self)
    }

    /// Cheap liveness probe used by the health endpoint.
    pub fn is_readable(&self) -> bool {
        use redb::ReadableDatabase;
        self.db
            .begin_read()
            .map(|txn| txn.open_table(USERS).is_ok())
            .unwrap_or(false)
    }
}

/// Digest used as the storage key for secrets.
pub(crate) fn secret_digest(secret: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(secret.as_bytes()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Open a fresh database in a temporary directory.
    pub fn temp_database() -> (TempDir, AuthDatabase) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let db = AuthDatabase::open(&temp.path().join("auth.redb")).expect("Failed to open db");
        (temp, db)
    }
}
