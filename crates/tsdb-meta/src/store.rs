//! The MetaStore capability

use crate::error::Result;
use crate::types::{DatabaseInfo, Privilege, RetentionPolicyInfo, UserInfo};

/// Source of database topology and users.
///
/// The store and executor only read through this trait (plus the user
/// management calls issued by user statements); persistence of meta data is
/// entirely up to the implementation.
pub trait MetaStore: Send + Sync {
    /// Database by name, `None` if it does not exist
    fn database(&self, name: &str) -> Result<Option<DatabaseInfo>>;

    /// All databases
    fn databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// Retention policy of a database, `None` if it does not exist
    fn retention_policy(&self, database: &str, name: &str) -> Result<Option<RetentionPolicyInfo>>;

    /// User by name, `None` if it does not exist
    fn user(&self, name: &str) -> Result<Option<UserInfo>>;

    /// All users
    fn users(&self) -> Result<Vec<UserInfo>>;

    /// Check a username and password, returning the user on success
    fn authenticate(&self, username: &str, password: &str) -> Result<UserInfo>;

    /// True if at least one admin user exists
    fn admin_user_exists(&self) -> Result<bool>;

    /// Number of users
    fn user_count(&self) -> Result<usize>;

    fn create_user(&self, name: &str, password: &str, admin: bool) -> Result<UserInfo>;

    fn drop_user(&self, name: &str) -> Result<()>;

    /// Set a user's privilege on a database
    fn set_privilege(&self, username: &str, database: &str, privilege: Privilege) -> Result<()>;

    /// Grant or revoke cluster admin
    fn set_admin_privilege(&self, username: &str, admin: bool) -> Result<()>;
}
