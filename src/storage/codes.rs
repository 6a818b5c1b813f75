// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger of consumed OAuth authorization codes.
//!
//! A code is consumed before it is sent to the provider, so a replay is
//! refused locally whether or not the provider would have caught it.
//! Entries older than [`CODE_RETENTION_SECS`] are swept on every write.

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTableMetadata};

use super::{secret_digest, AuthDatabase, StorageResult, AUTHORIZATION_CODES};

/// Providers expire codes within minutes (RFC 6749 section 4.1.2 caps them at
/// 10), so a digest older than this can no longer be replayed successfully.
pub const CODE_RETENTION_SECS: i64 = 60 * 60;

pub struct AuthorizationCodeLedger<'a> {
    db: &'a AuthDatabase,
}

impl<'a> AuthorizationCodeLedger<'a> {
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Mark `code` as used. Returns `false` if it had already been used.
    pub fn consume(&self, code: &str) -> StorageResult<bool> {
        self.consume_at(code, Utc::now().timestamp())
    }

    pub(crate) fn consume_at(&self, code: &str, now: i64) -> StorageResult<bool> {
        let digest = secret_digest(code);
        let write_txn = self.db.inner().begin_write()?;
        let first_use = {
            let mut table = write_txn.open_table(AUTHORIZATION_CODES)?;

            let cutoff = now.saturating_sub(CODE_RETENTION_SECS);
            table.retain(|_, consumed_at| consumed_at >= cutoff)?;

            let previous = table.insert(digest.as_str(), now)?;
            previous.is_none()
        };
        write_txn.commit()?;
        Ok(first_use)
    }

    /// Number of codes currently remembered.
    pub fn tracked(&self) -> StorageResult<u64> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(AUTHORIZATION_CODES)?;
        Ok(table.len()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_database;

    #[test]
    fn codes_are_single_use() {
        let (_temp, db) = temp_database();
        let ledger = db.authorization_codes();
        assert!(ledger.consume("code-1").unwrap());
        assert!(!ledger.consume("code-1").unwrap());
        assert!(ledger.consume("code-2").unwrap());
    }

    #[test]
    fn old_codes_are_swept_on_write() {
        let (_temp, db) = temp_database();
        let ledger = db.authorization_codes();
        let start = 1_700_000_000;

        assert!(ledger.consume_at("early", start).unwrap());
        assert!(ledger.consume_at("recent", start + CODE_RETENTION_SECS).unwrap());
        assert_eq!(ledger.tracked().unwrap(), 2);

        // Still inside the window relative to "recent"
        assert!(!ledger.consume_at("recent", start + CODE_RETENTION_SECS + 1).unwrap());
        assert_eq!(ledger.tracked().unwrap(), 1);

        assert!(ledger.consume_at("later", start + 3 * CODE_RETENTION_SECS).unwrap());
        assert_eq!(ledger.tracked().unwrap(), 1);
    }
}
