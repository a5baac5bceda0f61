#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use keel_kernel_contracts::common::validate_text;
use keel_kernel_contracts::tenancy::{Role, UserId, YachtId};
use keel_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};
use sha2::{Digest, Sha256};

use crate::store::StorageError;

/// Bearer tokens are never stored; only their sha-256 digest is.
pub fn token_hash(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub active: bool,
}

impl Validate for UserRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.user_id.validate()?;
        validate_text("user.display_name", &self.display_name, 128)
    }
}

/// A user belongs to exactly one yacht with exactly one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRecord {
    pub user_id: UserId,
    pub yacht_id: YachtId,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: UserId,
    pub issued_at: MonotonicTimeNs,
    pub expires_at: MonotonicTimeNs,
}

impl SessionRecord {
    pub fn is_live(&self, now: MonotonicTimeNs) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup<'a> {
    Live(&'a SessionRecord),
    Expired,
    Unknown,
}

/// Master directory: yachts, users, memberships and bearer sessions. Not tenant-partitioned.
#[derive(Debug, Clone, Default)]
pub struct MasterDirectory {
    yachts: BTreeSet<YachtId>,
    users: BTreeMap<UserId, UserRecord>,
    memberships: BTreeMap<UserId, MembershipRecord>,
    sessions: BTreeMap<String, SessionRecord>,
}

impl MasterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_yacht(&mut self, yacht_id: YachtId) -> Result<(), StorageError> {
        yacht_id.validate()?;
        if !self.yachts.insert(yacht_id.clone()) {
            return Err(StorageError::DuplicateKey {
                table: "yachts",
                key: yacht_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn insert_user(&mut self, record: UserRecord) -> Result<(), StorageError> {
        record.validate()?;
        if self.users.contains_key(&record.user_id) {
            return Err(StorageError::DuplicateKey {
                table: "users",
                key: record.user_id.to_string(),
            });
        }
        self.users.insert(record.user_id.clone(), record);
        Ok(())
    }

    pub fn insert_membership(&mut self, record: MembershipRecord) -> Result<(), StorageError> {
        if !self.users.contains_key(&record.user_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "memberships.user_id",
                key: record.user_id.to_string(),
            });
        }
        if !self.yachts.contains(&record.yacht_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "memberships.yacht_id",
                key: record.yacht_id.to_string(),
            });
        }
        if self.memberships.contains_key(&record.user_id) {
            return Err(StorageError::DuplicateKey {
                table: "memberships",
                key: record.user_id.to_string(),
            });
        }
        self.memberships.insert(record.user_id.clone(), record);
        Ok(())
    }

    pub fn issue_session(
        &mut self,
        token: &str,
        user_id: &UserId,
        issued_at: MonotonicTimeNs,
        ttl_ns: u64,
    ) -> Result<(), StorageError> {
        if token.len() < 16 || token.len() > 512 {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "session.token",
                    reason: "must be 16..=512 chars",
                },
            ));
        }
        if !self.users.contains_key(user_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "sessions.user_id",
                key: user_id.to_string(),
            });
        }
        let hash = token_hash(token);
        if self.sessions.contains_key(&hash) {
            return Err(StorageError::DuplicateKey {
                table: "sessions",
                key: "token".to_string(),
            });
        }
        self.sessions.insert(
            hash.clone(),
            SessionRecord {
                token_hash: hash,
                user_id: user_id.clone(),
                issued_at,
                expires_at: MonotonicTimeNs(issued_at.0.saturating_add(ttl_ns)),
            },
        );
        Ok(())
    }

    pub fn revoke_session(&mut self, token: &str) -> bool {
        self.sessions.remove(&token_hash(token)).is_some()
    }

    pub fn lookup_session(&self, token: &str, now: MonotonicTimeNs) -> SessionLookup<'_> {
        match self.sessions.get(&token_hash(token)) {
            Some(s) if s.is_live(now) => SessionLookup::Live(s),
            Some(_) => SessionLookup::Expired,
            None => SessionLookup::Unknown,
        }
    }

    pub fn user(&self, user_id: &UserId) -> Option<&UserRecord> {
        self.users.get(user_id)
    }

    pub fn membership(&self, user_id: &UserId) -> Option<&MembershipRecord> {
        self.memberships.get(user_id)
    }

    pub fn has_yacht(&self, yacht_id: &YachtId) -> bool {
        self.yachts.contains(yacht_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
