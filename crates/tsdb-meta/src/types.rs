//! Meta records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tsdb_core::{TimeRange, Timestamp};

/// A database and its retention policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    /// Name of the retention policy used when a statement names none
    pub default_retention_policy: String,
    pub retention_policies: Vec<RetentionPolicyInfo>,
}

impl DatabaseInfo {
    /// Look up a retention policy by name
    pub fn retention_policy(&self, name: &str) -> Option<&RetentionPolicyInfo> {
        self.retention_policies.iter().find(|rp| rp.name == name)
    }
}

/// A retention policy and its shard groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicyInfo {
    pub name: String,
    /// How long data is kept; zero means forever
    pub duration: Duration,
    pub replica_n: u32,
    pub shard_groups: Vec<ShardGroupInfo>,
}

impl RetentionPolicyInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration: Duration::ZERO,
            replica_n: 1,
            shard_groups: Vec::new(),
        }
    }

    /// Shard groups whose interval overlaps the range, by start time
    pub fn shard_groups_by_time_range(&self, range: &TimeRange) -> Vec<&ShardGroupInfo> {
        let mut groups: Vec<&ShardGroupInfo> = self
            .shard_groups
            .iter()
            .filter(|g| g.overlaps(range))
            .collect();
        groups.sort_by_key(|g| (g.start_time, g.id));
        groups
    }
}

/// A time interval `[start_time, end_time)` and the shards holding it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardGroupInfo {
    pub id: u64,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub shards: Vec<ShardInfo>,
}

impl ShardGroupInfo {
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        TimeRange::new(self.start_time, self.end_time).overlaps(range)
    }
}

/// A shard and the nodes that own it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: u64,
    pub owner_ids: Vec<u64>,
}

/// Privilege a user holds on a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Privilege {
    NoPrivileges,
    Read,
    Write,
    All,
}

impl Privilege {
    /// True if holding `self` grants `wanted`
    pub fn grants(self, wanted: Privilege) -> bool {
        self == Privilege::All || self == wanted
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Privilege::NoPrivileges => "NO PRIVILEGES",
            Privilege::Read => "READ",
            Privilege::Write => "WRITE",
            Privilege::All => "ALL PRIVILEGES",
        };
        f.write_str(s)
    }
}

/// A user account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    /// Salted password hash
    pub hash: String,
    pub admin: bool,
    /// Database -> privilege
    pub privileges: BTreeMap<String, Privilege>,
}

impl UserInfo {
    /// True if the user may exercise `privilege` on `database`.
    /// Admins are authorized for everything.
    pub fn authorize(&self, privilege: Privilege, database: &str) -> bool {
        if self.admin {
            return true;
        }
        self.privileges
            .get(database)
            .map_or(false, |p| p.grants(privilege))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(admin: bool) -> UserInfo {
        UserInfo {
            name: "u".to_string(),
            hash: String::new(),
            admin,
            privileges: BTreeMap::from([
                ("db0".to_string(), Privilege::Read),
                ("db1".to_string(), Privilege::All),
            ]),
        }
    }

    #[test]
    fn test_user_authorize() {
        let u = user(false);
        assert!(u.authorize(Privilege::Read, "db0"));
        assert!(!u.authorize(Privilege::Write, "db0"));
        assert!(u.authorize(Privilege::Write, "db1"));
        assert!(!u.authorize(Privilege::Read, "db2"));

        assert!(user(true).authorize(Privilege::Write, "db2"));
    }

    #[test]
    fn test_shard_group_interval() {
        let group = ShardGroupInfo {
            id: 1,
            start_time: 100,
            end_time: 200,
            shards: vec![],
        };
        assert!(group.overlaps(&TimeRange::default()));
        assert!(group.overlaps(&TimeRange::new(199, 300)));
        assert!(!group.overlaps(&TimeRange::new(200, 300)));
    }

    #[test]
    fn test_shard_groups_by_time_range() {
        let mut rp = RetentionPolicyInfo::new("rp");
        for (id, start) in [(2, 200), (1, 100), (3, 300)] {
            rp.shard_groups.push(ShardGroupInfo {
                id,
                start_time: start,
                end_time: start + 100,
                shards: vec![],
            });
        }

        let ids: Vec<u64> = rp
            .shard_groups_by_time_range(&TimeRange::new(150, 320))
            .iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let ids: Vec<u64> = rp
            .shard_groups_by_time_range(&TimeRange::new(0, 150))
            .iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(ids, vec![1]);
    }
}
