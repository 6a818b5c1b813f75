// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable identity records.
//!
//! One role per identity. A login never changes the stored role; only the
//! explicit administrative operations here do.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, Table};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AuthDatabase, StorageError, StorageResult, USERS, USER_SUBJECTS};
use crate::auth::claims::AuthProvider;
use crate::auth::roles::RoleHierarchy;

/// Durable user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Numeric user id
    pub id: u64,
    /// Provider-specific subject (`local|<role>` for dev identities)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_subject: Option<String>,
    pub email: String,
    /// Assigned role name
    pub role: String,
    /// Inactive identities are rejected even with a valid token
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Subject prefix of pre-provisioned development identities.
pub const DEV_SUBJECT_PREFIX: &str = "local|";

/// Subject of the development identity for `role`.
pub fn dev_subject(role: &str) -> String {
    format!("{DEV_SUBJECT_PREFIX}{role}")
}

/// Key in the subject index. Each provider gets its own namespace, so a
/// provider subject can never resolve to a development identity.
fn subject_key(provider: AuthProvider, subject: &str) -> String {
    format!("{provider}#{subject}")
}

/// Repository for identity records.
pub struct UserRepository<'a> {
    db: &'a AuthDatabase,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a AuthDatabase) -> Self {
        Self { db }
    }

    /// Get an identity by id.
    pub fn get(&self, id: u64) -> StorageResult<Option<Identity>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an identity by the subject `provider` knows it under.
    pub fn find_by_subject(
        &self,
        provider: AuthProvider,
        subject: &str,
    ) -> StorageResult<Option<Identity>> {
        let key = subject_key(provider, subject);
        let read_txn = self.db.inner().begin_read()?;
        let subjects = read_txn.open_table(USER_SUBJECTS)?;
        let Some(id) = subjects.get(key.as_str())?.map(|v| v.value()) else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        match users.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// List all identities, ordered by id.
    pub fn list(&self) -> StorageResult<Vec<Identity>> {
        let read_txn = self.db.inner().begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let mut users = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            users.push(serde_json::from_slice(value.value())?);
        }
        Ok(users)
    }

    /// Record an OAuth login for provider `subject`, creating the identity on
    /// first login.
    ///
    /// Returns the identity and whether it was created. An existing identity
    /// only gets its `last_login_at` updated. Lookup and insert share one
    /// write transaction, so concurrent first logins create a single row.
    pub fn record_login(
        &self,
        subject: &str,
        email: &str,
        default_role: &str,
    ) -> StorageResult<(Identity, bool)> {
        let now = Utc::now();
        let key = subject_key(AuthProvider::OAuth, subject);
        let write_txn = self.db.inner().begin_write()?;
        let result = {
            let mut users = write_txn.open_table(USERS)?;
            let mut subjects = write_txn.open_table(USER_SUBJECTS)?;
            let existing = subjects.get(key.as_str())?.map(|v| v.value());

            match existing {
                Some(id) => {
                    let mut identity = load(&users, id)?;
                    identity.last_login_at = Some(now);
                    store(&mut users, &identity)?;
                    (identity, false)
                }
                None => {
                    let identity = Identity {
                        id: next_id(&users)?,
                        external_subject: Some(subject.to_string()),
                        email: email.to_string(),
                        role: default_role.to_string(),
                        active: true,
                        created_at: now,
                        last_login_at: Some(now),
                    };
                    store(&mut users, &identity)?;
                    subjects.insert(key.as_str(), identity.id)?;
                    (identity, true)
                }
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    /// Update `last_login_at` of an existing identity.
    pub fn touch_login(&self, id: u64) -> StorageResult<Identity> {
        self.update(id, |identity| {
            identity.last_login_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Create the development identity for `role` if it doesn't exist yet.
    pub fn ensure_dev_identity(&self, role: &str) -> StorageResult<Identity> {
        let subject = dev_subject(role);
        let key = subject_key(AuthProvider::Local, &subject);
        let write_txn = self.db.inner().begin_write()?;
        let identity = {
            let mut users = write_txn.open_table(USERS)?;
            let mut subjects = write_txn.open_table(USER_SUBJECTS)?;
            let existing = subjects.get(key.as_str())?.map(|v| v.value());
            match existing {
                Some(id) => load(&users, id)?,
                None => {
                    let identity = Identity {
                        id: next_id(&users)?,
                        external_subject: Some(subject.clone()),
                        email: format!("{role}@dev.local"),
                        role: role.to_string(),
                        active: true,
                        created_at: Utc::now(),
                        last_login_at: None,
                    };
                    store(&mut users, &identity)?;
                    subjects.insert(key.as_str(), identity.id)?;
                    identity
                }
            }
        };
        write_txn.commit()?;
        Ok(identity)
    }

    /// Change the role of an identity.
    ///
    /// Refuses to remove the last active holder of a protected role.
    pub fn set_role(&self, id: u64, role: &str, roles: &RoleHierarchy) -> StorageResult<Identity> {
        let role = roles
            .get(role)
            .ok_or_else(|| StorageError::NotFound(format!("Role {role}")))?
            .name
            .clone();
        self.update_guarded(id, roles, |identity| {
            identity.role = role.clone();
        })
    }

    /// Activate or deactivate an identity.
    ///
    /// Refuses to deactivate the last active holder of a protected role.
    pub fn set_active(&self, id: u64, active: bool, roles: &RoleHierarchy) -> StorageResult<Identity> {
        self.update_guarded(id, roles, |identity| {
            identity.active = active;
        })
    }

    fn update<F>(&self, id: u64, change: F) -> StorageResult<Identity>
    where
        F: FnOnce(&mut Identity) -> StorageResult<()>,
    {
        let write_txn = self.db.inner().begin_write()?;
        let identity = {
            let mut users = write_txn.open_table(USERS)?;
            let mut identity = load(&users, id)?;
            change(&mut identity)?;
            store(&mut users, &identity)?;
            identity
        };
        write_txn.commit()?;
        Ok(identity)
    }

    fn update_guarded<F>(&self, id: u64, roles: &RoleHierarchy, change: F) -> StorageResult<Identity>
    where
        F: FnOnce(&mut Identity),
    {
        let write_txn = self.db.inner().begin_write()?;
        let identity = {
            let mut users = write_txn.open_table(USERS)?;
            let current = load(&users, id)?;
            let mut updated = current.clone();
            change(&mut updated);

            let loses_protected_holder = current.active
                && roles.get(&current.role).is_some_and(|r| r.protected)
                && (!updated.active || updated.role != current.role);
            if loses_protected_holder {
                let mut holders = 0usize;
                for entry in users.iter()? {
                    let (_, value) = entry?;
                    let other: Identity = serde_json::from_slice(value.value())?;
                    if other.active && other.role == current.role {
                        holders += 1;
                    }
                }
                if holders <= 1 {
                    return Err(StorageError::Conflict(format!(
                        "{} is the last active {}",
                        current.email, current.role
                    )));
                }
            }

            store(&mut users, &updated)?;
            updated
        };
        write_txn.commit()?;
        Ok(identity)
    }
}

fn load<T>(table: &T, id: u64) -> StorageResult<Identity>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(serde_json::from_slice(value.value())?),
        None => Err(StorageError::NotFound(format!("User {id}"))),
    }
}

fn store(table: &mut Table<u64, &'static [u8]>, identity: &Identity) -> StorageResult<()> {
    let json = serde_json::to_vec(identity)?;
    table.insert(identity.id, json.as_slice())?;
    Ok(())
}

fn next_id<T>(table: &T) -> StorageResult<u64>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    Ok(table.last()?.map(|(k, _)| k.value() + 1).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_database;

    #[test]
    fn first_login_creates_then_updates() {
        let (_temp, db) = temp_database();
        let repo = db.users();

        let (created, is_new) = repo.record_login("idp|1", "a@example.com", "viewer").unwrap();
        assert!(is_new);
        assert_eq!(created.id, 1);
        assert_eq!(created.role, "viewer");

        let (again, is_new) = repo.record_login("idp|1", "changed@example.com", "viewer").unwrap();
        assert!(!is_new);
        assert_eq!(again.id, 1);
        assert_eq!(again.email, "a@example.com");
        assert!(again.last_login_at >= created.last_login_at);
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn login_never_changes_a_stored_role() {
        let (_temp, db) = temp_database();
        let roles = RoleHierarchy::default();
        let repo = db.users();

        let (identity, _) = repo.record_login("idp|2", "b@example.com", "viewer").unwrap();
        repo.set_role(identity.id, "dispatcher", &roles).unwrap();
        let (after, _) = repo.record_login("idp|2", "b@example.com", "viewer").unwrap();
        assert_eq!(after.role, "dispatcher");
    }

    #[test]
    fn dev_identities_are_provisioned_once() {
        let (_temp, db) = temp_database();
        let repo = db.users();
        let first = repo.ensure_dev_identity("technician").unwrap();
        let second = repo.ensure_dev_identity("technician").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.email, "technician@dev.local");
        assert_eq!(
            repo.find_by_subject(AuthProvider::Local, "local|technician")
                .unwrap()
                .unwrap()
                .id,
            first.id
        );
    }

    #[test]
    fn provider_subject_cannot_claim_a_dev_identity() {
        let (_temp, db) = temp_database();
        let repo = db.users();
        let admin = repo.ensure_dev_identity("admin").unwrap();

        let (outsider, is_new) = repo
            .record_login("local|admin", "mallory@example.com", "viewer")
            .unwrap();
        assert!(is_new);
        assert_ne!(outsider.id, admin.id);
        assert_eq!(outsider.role, "viewer");
        assert_eq!(
            repo.find_by_subject(AuthProvider::OAuth, "local|admin")
                .unwrap()
                .unwrap()
                .id,
            outsider.id
        );
        assert_eq!(
            repo.find_by_subject(AuthProvider::Local, "local|admin")
                .unwrap()
                .unwrap()
                .id,
            admin.id
        );
        assert!(repo
            .find_by_subject(AuthProvider::OAuth, "local|technician")
            .unwrap()
            .is_none());
    }

    #[test]
    fn last_protected_holder_is_kept() {
        let (_temp, db) = temp_database();
        let roles = RoleHierarchy::default();
        let repo = db.users();
        let admin = repo.ensure_dev_identity("admin").unwrap();

        assert!(matches!(
            repo.set_active(admin.id, false, &roles),
            Err(StorageError::Conflict(_))
        ));
        assert!(matches!(
            repo.set_role(admin.id, "viewer", &roles),
            Err(StorageError::Conflict(_))
        ));

        let (second, _) = repo.record_login("idp|3", "c@example.com", "viewer").unwrap();
        repo.set_role(second.id, "admin", &roles).unwrap();
        let demoted = repo.set_role(admin.id, "viewer", &roles).unwrap();
        assert_eq!(demoted.role, "viewer");
    }

    #[test]
    fn unknown_role_or_user_is_not_found() {
        let (_temp, db) = temp_database();
        let roles = RoleHierarchy::default();
        let repo = db.users();
        let tech = repo.ensure_dev_identity("technician").unwrap();

        assert!(matches!(
            repo.set_role(tech.id, "overlord", &roles),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            repo.set_active(999, false, &roles),
            Err(StorageError::NotFound(_))
        ));
        assert!(repo.get(999).unwrap().is_none());
    }

    #[test]
    fn deactivation_round_trips() {
        let (_temp, db) = temp_database();
        let roles = RoleHierarchy::default();
        let repo = db.users();
        let tech = repo.ensure_dev_identity("technician").unwrap();

        repo.set_active(tech.id, false, &roles).unwrap();
        assert!(!repo.get(tech.id).unwrap().unwrap().active);
        repo.set_active(tech.id, true, &roles).unwrap();
        assert!(repo.get(tech.id).unwrap().unwrap().active);
    }
}
