//! tsdb meta - cluster topology and users as seen by the store and executor
//!
//! - `MetaStore`: capability trait supplying databases, retention policies,
//!   shard groups and users
//! - Record types: `DatabaseInfo`, `RetentionPolicyInfo`, `ShardGroupInfo`,
//!   `ShardInfo`, `UserInfo`
//! - `MemoryMetaStore`: in-process implementation

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{MetaError, Result};
pub use memory::MemoryMetaStore;
pub use store::MetaStore;
pub use types::*;
