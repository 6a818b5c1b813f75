// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Refresh credentials.
//!
//! A refresh credential is an opaque random string. Each one belongs to a
//! family started at sign-in; every rotation consumes the presented credential
//! and issues its successor in the same write transaction. Presenting a
//! consumed credential again is treated as replay and revokes the whole
//! family.
//!
//! Consumed digests are kept until the longest-lived credential that could
//! have followed them has expired, and swept on every write after that. A
//! replay older than that is simply unknown.

use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use super::{
    secret_digest, AuthDatabase, StorageError, StorageResult, CONSUMED_REFRESH,
    REFRESH_CREDENTIALS,
};
use crate::auth::claims::AuthProvider;

const CREDENTIAL_BYTES: usize = 32;

/// Stored metadata for a live refresh credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub user_id: u64,
    pub family_id: String,
    pub provider: AuthProvider,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Tombstone of a consumed credential, used for replay detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ConsumedRecord {
    family_id: String,
    user_id: u64,
    retain_until: DateTime<Utc>,
}

/// Result of presenting a refresh credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The credential was live; it is now consumed and `credential` replaces it.
    Rotated {
        record: RefreshRecord,
        credential: String,
    },
    /// The credential was live but past its expiry; it is now consumed.
    Expired { user_id: u64 },
    /// The credential had already been consumed; its family is now revoked.
    Reused { family_id: String, revoked: usize },
    /// Never issued (or long gone).
    Unknown,
}

/// Repository for refresh credentials.
pub struct RefreshRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> RefreshRepository<'a> {
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Start a new family for `user_id` and return its first credential.
    pub fn issue(&self, user_id: u64, provider: AuthProvider, ttl: Duration) -> StorageResult<String> {
        let now = Utc::now();
        let record = RefreshRecord {
            user_id,
            family_id: uuid::Uuid::new_v4().to_string(),
            provider,
            issued_at: now,
            expires_at: expiry(now, ttl),
        };
        let credential = generate_credential()?;

        let write_txn = self.db.inner().begin_write()?;
        {
            let mut live = write_txn.open_table(REFRESH_CREDENTIALS)?;
            insert_record(&mut live, &secret_digest(&credential), &record)?;
        }
        write_txn.commit()?;
        Ok(credential)
    }

    /// Consume `presented` and, if it was live, issue its successor.
    ///
    /// Invalidate-old and issue-new happen in one write transaction, so of
    /// several concurrent callers presenting the same credential exactly one
    /// sees [`RotationOutcome::Rotated`].
    pub fn rotate(&self, presented: &str, ttl: Duration) -> StorageResult<RotationOutcome> {
        let digest = secret_digest(presented);
        let now = Utc::now();

        let write_txn = self.db.inner().begin_write()?;
        let outcome = {
            let mut live = write_txn.open_table(REFRESH_CREDENTIALS)?;
            let mut consumed = write_txn.open_table(CONSUMED_REFRESH)?;

            sweep_consumed(&mut consumed, now)?;
            let removed = take_record(&mut live, &digest)?;

            match removed {
                Some(record) => {
                    if record.expires_at <= now {
                        mark_consumed(&mut consumed, &digest, &record, record.expires_at)?;
                        RotationOutcome::Expired {
                            user_id: record.user_id,
                        }
                    } else {
                        let successor = RefreshRecord {
                            issued_at: now,
                            expires_at: expiry(now, ttl),
                            ..record.clone()
                        };
                        // A replay matters for as long as the successor is usable
                        mark_consumed(&mut consumed, &digest, &record, successor.expires_at)?;
                        let credential = generate_credential()?;
                        insert_record(&mut live, &secret_digest(&credential), &successor)?;
                        RotationOutcome::Rotated { record, credential }
                    }
                }
                None => match consumed_record(&consumed, &digest)? {
                    Some(tombstone) => {
                        let family_id = tombstone.family_id;
                        let revoked =
                            revoke_where(&mut live, &mut consumed, |r| r.family_id == family_id)?;
                        RotationOutcome::Reused { family_id, revoked }
                    }
                    None => RotationOutcome::Unknown,
                },
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Revoke a credential as a sign-out.
    ///
    /// A live credential is revoked on its own. A credential that was already
    /// rotated away revokes whatever its family still has live, since the
    /// caller holding it is ending that session. Returns the owner when
    /// anything was revoked.
    pub fn revoke(&self, presented: &str) -> StorageResult<Option<u64>> {
        let digest = secret_digest(presented);
        let now = Utc::now();
        let write_txn = self.db.inner().begin_write()?;
        let owner = {
            let mut live = write_txn.open_table(REFRESH_CREDENTIALS)?;
            let mut consumed = write_txn.open_table(CONSUMED_REFRESH)?;
            sweep_consumed(&mut consumed, now)?;
            match take_record(&mut live, &digest)? {
                Some(record) => {
                    mark_consumed(&mut consumed, &digest, &record, record.expires_at)?;
                    Some(record.user_id)
                }
                None => match consumed_record(&consumed, &digest)? {
                    Some(tombstone) => {
                        let family_id = tombstone.family_id;
                        let revoked =
                            revoke_where(&mut live, &mut consumed, |r| r.family_id == family_id)?;
                        (revoked > 0).then_some(tombstone.user_id)
                    }
                    None => None,
                },
            }
        };
        write_txn.commit()?;
        Ok(owner)
    }

    /// Revoke every live credential of `user_id`.
    pub fn revoke_user(&self, user_id: u64) -> StorageResult<usize> {
        let write_txn = self.db.inner().begin_write()?;
        let revoked = {
            let mut live = write_txn.open_table(REFRESH_CREDENTIALS)?;
            let mut consumed = write_txn.open_table(CONSUMED_REFRESH)?;
            sweep_consumed(&mut consumed, Utc::now())?;
            revoke_where(&mut live, &mut consumed, |r| r.user_id == user_id)?
        };
        write_txn.commit()?;
        Ok(revoked)
    }

    /// Number of live credentials.
    pub fn live_count(&self) -> StorageResult<u64> {
        use redb::{ReadableDatabase, ReadableTableMetadata};
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(REFRESH_CREDENTIALS)?;
        Ok(table.len()?)
    }

    /// Number of consumed credentials still remembered for replay detection.
    pub fn consumed_count(&self) -> StorageResult<u64> {
        use redb::{ReadableDatabase, ReadableTableMetadata};
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(CONSUMED_REFRESH)?;
        Ok(table.len()?)
    }
}

type LiveTable<'txn> = Table<'txn, &'static str, &'static [u8]>;
type ConsumedTable<'txn> = Table<'txn, &'static str, &'static [u8]>;

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn generate_credential() -> StorageResult<String> {
    let mut bytes = [0u8; CREDENTIAL_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| StorageError::Entropy)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

fn insert_record(table: &mut LiveTable<'_>, digest: &str, record: &RefreshRecord) -> StorageResult<()> {
    let json = serde_json::to_vec(record)?;
    table.insert(digest, json.as_slice())?;
    Ok(())
}

fn take_record(table: &mut LiveTable<'_>, digest: &str) -> StorageResult<Option<RefreshRecord>> {
    match table.remove(digest)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn mark_consumed(
    table: &mut ConsumedTable<'_>,
    digest: &str,
    record: &RefreshRecord,
    retain_until: DateTime<Utc>,
) -> StorageResult<()> {
    let tombstone = ConsumedRecord {
        family_id: record.family_id.clone(),
        user_id: record.user_id,
        retain_until,
    };
    let json = serde_json::to_vec(&tombstone)?;
    table.insert(digest, json.as_slice())?;
    Ok(())
}

fn consumed_record(table: &ConsumedTable<'_>, digest: &str) -> StorageResult<Option<ConsumedRecord>> {
    match table.get(digest)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Drop tombstones whose family can no longer hold a usable credential.
fn sweep_consumed(table: &mut ConsumedTable<'_>, now: DateTime<Utc>) -> StorageResult<()> {
    table.retain(|_, value| {
        serde_json::from_slice::<ConsumedRecord>(value).is_ok_and(|t| t.retain_until > now)
    })?;
    Ok(())
}

/// Move every live credential matching `matches` to the consumed table.
fn revoke_where<F>(
    live: &mut LiveTable<'_>,
    consumed: &mut ConsumedTable<'_>,
    matches: F,
) -> StorageResult<usize>
where
    F: Fn(&RefreshRecord) -> bool,
{
    let mut doomed = Vec::new();
    for entry in live.iter()? {
        let (key, value) = entry?;
        let record: RefreshRecord = serde_json::from_slice(value.value())?;
        if matches(&record) {
            doomed.push((key.value().to_string(), record));
        }
    }
    for (digest, record) in &doomed {
        live.remove(digest.as_str())?;
        mark_consumed(consumed, digest, record, record.expires_at)?;
    }
    Ok(doomed.len())
}
