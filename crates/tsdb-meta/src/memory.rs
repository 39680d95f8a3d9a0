//! In-memory MetaStore
//!
//! Holds everything behind one lock. Passwords are stored as
//! `sha256$<salt>$<digest>` with a random per-user salt.

use crate::error::{MetaError, Result};
use crate::store::MetaStore;
use crate::types::{DatabaseInfo, Privilege, RetentionPolicyInfo, ShardGroupInfo, UserInfo};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct MetaData {
    databases: BTreeMap<String, DatabaseInfo>,
    users: BTreeMap<String, UserInfo>,
}

/// MetaStore kept in process memory
#[derive(Debug, Default)]
pub struct MemoryMetaStore {
    data: RwLock<MetaData>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database without retention policies
    pub fn create_database(&self, name: &str) -> Result<DatabaseInfo> {
        let mut data = self.data.write();
        if data.databases.contains_key(name) {
            return Err(MetaError::DatabaseExists(name.to_string()));
        }
        let db = DatabaseInfo {
            name: name.to_string(),
            default_retention_policy: String::new(),
            retention_policies: Vec::new(),
        };
        data.databases.insert(name.to_string(), db.clone());
        info!(database = name, "Created database");
        Ok(db)
    }

    /// Add a retention policy to a database. The first policy added becomes
    /// the default one.
    pub fn create_retention_policy(&self, database: &str, rp: RetentionPolicyInfo) -> Result<()> {
        let mut data = self.data.write();
        let db = data
            .databases
            .get_mut(database)
            .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))?;
        if db.retention_policy(&rp.name).is_some() {
            return Err(MetaError::RetentionPolicyExists(rp.name));
        }
        if db.default_retention_policy.is_empty() {
            db.default_retention_policy = rp.name.clone();
        }
        debug!(database, retention_policy = %rp.name, "Created retention policy");
        db.retention_policies.push(rp);
        Ok(())
    }

    pub fn set_default_retention_policy(&self, database: &str, name: &str) -> Result<()> {
        let mut data = self.data.write();
        let db = data
            .databases
            .get_mut(database)
            .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))?;
        if db.retention_policy(name).is_none() {
            return Err(MetaError::RetentionPolicyNotFound(name.to_string()));
        }
        db.default_retention_policy = name.to_string();
        Ok(())
    }

    /// Add a shard group to a retention policy
    pub fn create_shard_group(
        &self,
        database: &str,
        retention_policy: &str,
        group: ShardGroupInfo,
    ) -> Result<()> {
        let mut data = self.data.write();
        let db = data
            .databases
            .get_mut(database)
            .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))?;
        let rp = db
            .retention_policies
            .iter_mut()
            .find(|rp| rp.name == retention_policy)
            .ok_or_else(|| MetaError::RetentionPolicyNotFound(retention_policy.to_string()))?;
        if rp.shard_groups.iter().any(|g| g.id == group.id) {
            return Err(MetaError::ShardGroupExists(group.id));
        }
        rp.shard_groups.push(group);
        Ok(())
    }
}

impl MetaStore for MemoryMetaStore {
    fn database(&self, name: &str) -> Result<Option<DatabaseInfo>> {
        Ok(self.data.read().databases.get(name).cloned())
    }

    fn databases(&self) -> Result<Vec<DatabaseInfo>> {
        Ok(self.data.read().databases.values().cloned().collect())
    }

    fn retention_policy(&self, database: &str, name: &str) -> Result<Option<RetentionPolicyInfo>> {
        let data = self.data.read();
        let db = data
            .databases
            .get(database)
            .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))?;
        Ok(db.retention_policy(name).cloned())
    }

    fn user(&self, name: &str) -> Result<Option<UserInfo>> {
        Ok(self.data.read().users.get(name).cloned())
    }

    fn users(&self) -> Result<Vec<UserInfo>> {
        Ok(self.data.read().users.values().cloned().collect())
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<UserInfo> {
        let data = self.data.read();
        let user = data
            .users
            .get(username)
            .ok_or(MetaError::AuthenticationFailed)?;
        if !verify_password(&user.hash, password) {
            return Err(MetaError::AuthenticationFailed);
        }
        Ok(user.clone())
    }

    fn admin_user_exists(&self) -> Result<bool> {
        Ok(self.data.read().users.values().any(|u| u.admin))
    }

    fn user_count(&self) -> Result<usize> {
        Ok(self.data.read().users.len())
    }

    fn create_user(&self, name: &str, password: &str, admin: bool) -> Result<UserInfo> {
        if name.is_empty() {
            return Err(MetaError::UsernameRequired);
        }
        let mut data = self.data.write();
        if data.users.contains_key(name) {
            return Err(MetaError::UserExists(name.to_string()));
        }
        let user = UserInfo {
            name: name.to_string(),
            hash: hash_password(password),
            admin,
            privileges: BTreeMap::new(),
        };
        data.users.insert(name.to_string(), user.clone());
        info!(user = name, admin, "Created user");
        Ok(user)
    }

    fn drop_user(&self, name: &str) -> Result<()> {
        self.data
            .write()
            .users
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| MetaError::UserNotFound(name.to_string()))
    }

    fn set_privilege(&self, username: &str, database: &str, privilege: Privilege) -> Result<()> {
        let mut data = self.data.write();
        let user = data
            .users
            .get_mut(username)
            .ok_or_else(|| MetaError::UserNotFound(username.to_string()))?;
        user.privileges.insert(database.to_string(), privilege);
        Ok(())
    }

    fn set_admin_privilege(&self, username: &str, admin: bool) -> Result<()> {
        let mut data = self.data.write();
        let user = data
            .users
            .get_mut(username)
            .ok_or_else(|| MetaError::UserNotFound(username.to_string()))?;
        user.admin = admin;
        Ok(())
    }
}

/// SHA-256 rounds applied when hashing a new password
const HASH_ROUNDS: u32 = 10_000;

/// `sha256$<rounds>$<salt>$<digest>`
fn hash_password(password: &str) -> String {
    let salt = hex::encode(rand::random::<[u8; 16]>());
    format!(
        "sha256${}${}${}",
        HASH_ROUNDS,
        salt,
        digest(&salt, password, HASH_ROUNDS)
    )
}

fn verify_password(hash: &str, password: &str) -> bool {
    let mut parts = hash.splitn(4, '$');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("sha256"), Some(rounds), Some(salt), Some(expected)) => match rounds.parse() {
            Ok(rounds) => constant_time_eq(&digest(salt, password, rounds), expected),
            Err(_) => false,
        },
        _ => false,
    }
}

/// Salted SHA-256, re-hashed `rounds` times
fn digest(salt: &str, password: &str, rounds: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let mut out = hasher.finalize();
    for _ in 1..rounds {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(out);
        out = hasher.finalize();
    }
    hex::encode(out)
}

/// Compares without exiting early on the first differing byte
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
