//! Per-statement execution

use crate::ast::{Fields, Measurement, SelectStatement, Statement};
use crate::error::{QueryError, Result};
use crate::result::{field_value, time_value, Row};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use tsdb_core::{Tag, TagFilter, Timestamp};
use tsdb_meta::{MetaStore, Privilege, RetentionPolicyInfo};
use tsdb_storage::{FieldSet, ScanSeries, Shard, StorageError, Store};

/// Runs statements against one store and metastore
pub(crate) struct StatementRunner {
    store: Arc<Store>,
    meta: Arc<dyn MetaStore>,
    database: String,
}

/// Records of one series merged across shards
struct MergedSeries {
    tags: Vec<Tag>,
    records: BTreeMap<Timestamp, FieldSet>,
}

impl StatementRunner {
    pub(crate) fn new(store: Arc<Store>, meta: Arc<dyn MetaStore>, database: String) -> Self {
        Self {
            store,
            meta,
            database,
        }
    }

    pub(crate) fn meta(&self) -> &dyn MetaStore {
        self.meta.as_ref()
    }

    /// Run a statement, returning its rows unchunked
    pub(crate) fn execute(&self, stmt: &Statement) -> Result<Vec<Row>> {
        match stmt {
            Statement::Select(select) => self.select(select),
            Statement::DropSeries { source, condition } => {
                self.drop_series(source.as_ref(), condition)
            }
            Statement::ShowTagKeys { source } => self.show_tag_keys(source.as_ref()),
            Statement::ShowTagValues { source, key } => self.show_tag_values(source.as_ref(), key),
            Statement::ShowMeasurements => self.show_measurements(),
            Statement::ShowDatabases => self.show_databases(),
            Statement::CreateUser {
                name,
                password,
                admin,
            } => {
                self.meta.create_user(name, password, *admin)?;
                Ok(Vec::new())
            }
            Statement::DropUser { name } => {
                self.meta.drop_user(name)?;
                Ok(Vec::new())
            }
            Statement::ShowUsers => self.show_users(),
            Statement::Grant {
                privilege,
                on,
                user,
            } => self.grant(*privilege, on.as_deref(), user),
        }
    }

    fn database_of<'a>(&'a self, source: Option<&'a Measurement>) -> Result<&'a str> {
        let db = source
            .and_then(|m| m.database.as_deref())
            .unwrap_or(&self.database);
        if db.is_empty() {
            return Err(QueryError::DatabaseRequired);
        }
        Ok(db)
    }

    /// Retention policies a statement touches: the named one, or all of the
    /// database's policies
    fn retention_policies(&self, source: Option<&Measurement>) -> Result<Vec<RetentionPolicyInfo>> {
        let db_name = self.database_of(source)?;
        if let Some(rp_name) = source.and_then(|m| m.retention_policy.as_deref()) {
            let rp = self.meta.retention_policy(db_name, rp_name)?.ok_or_else(|| {
                QueryError::RetentionPolicyNotFound {
                    database: db_name.to_string(),
                    name: rp_name.to_string(),
                }
            })?;
            return Ok(vec![rp]);
        }

        let db = self
            .meta
            .database(db_name)?
            .ok_or_else(|| QueryError::DatabaseNotFound(db_name.to_string()))?;
        Ok(db.retention_policies)
    }

    /// Local shards of every shard group of the given policies
    fn shards_of(&self, rps: &[RetentionPolicyInfo]) -> Result<Vec<Arc<Shard>>> {
        let ids = rps
            .iter()
            .flat_map(|rp| rp.shard_groups.iter())
            .flat_map(|g| g.shards.iter().map(|s| s.id));
        self.local_shards(ids)
    }

    fn local_shards(&self, ids: impl Iterator<Item = u64>) -> Result<Vec<Arc<Shard>>> {
        let mut seen = BTreeSet::new();
        let mut shards = Vec::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.store.shard(id) {
                Ok(shard) => shards.push(shard),
                Err(StorageError::ShardNotFound(_)) => {
                    debug!(shard_id = id, "Shard not held locally, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(shards)
    }

    fn select(&self, stmt: &SelectStatement) -> Result<Vec<Row>> {
        let db_name = self.database_of(Some(&stmt.source))?;
        let db = self
            .meta
            .database(db_name)?
            .ok_or_else(|| QueryError::DatabaseNotFound(db_name.to_string()))?;
        let rp_name = stmt
            .source
            .retention_policy
            .clone()
            .unwrap_or(db.default_retention_policy);
        let rp = self.meta.retention_policy(db_name, &rp_name)?.ok_or_else(|| {
            QueryError::RetentionPolicyNotFound {
                database: db_name.to_string(),
                name: rp_name.clone(),
            }
        })?;

        let ids = rp
            .shard_groups_by_time_range(&stmt.time_range)
            .into_iter()
            .flat_map(|g| g.shards.iter().map(|s| s.id));
        let shards = self.local_shards(ids)?;

        let scans = shards
            .par_iter()
            .map(|shard| shard.scan(&stmt.source.name, &stmt.condition, &stmt.time_range))
            .collect::<std::result::Result<Vec<Vec<ScanSeries>>, StorageError>>()?;

        let merged = merge_scans(scans);
        debug!(
            measurement = %stmt.source.name,
            shards = shards.len(),
            series = merged.len(),
            "Scanned shards"
        );

        let columns: Vec<String> = match &stmt.fields {
            Fields::All => discovered_fields(&shards, &stmt.source.name, &merged)?,
            Fields::List(names) => names.clone(),
        };
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        for series in merged {
            let values: Vec<Vec<Value>> = series
                .records
                .iter()
                .filter(|(_, fields)| columns.iter().any(|c| fields.contains_key(c)))
                .skip(stmt.offset)
                .take(stmt.limit.unwrap_or(usize::MAX))
                .map(|(ts, fields)| {
                    let mut row = Vec::with_capacity(columns.len() + 1);
                    row.push(time_value(*ts));
                    row.extend(
                        columns
                            .iter()
                            .map(|c| fields.get(c).map_or(Value::Null, field_value)),
                    );
                    row
                })
                .collect();
            if values.is_empty() {
                continue;
            }

            let mut header = Vec::with_capacity(columns.len() + 1);
            header.push("time".to_string());
            header.extend(columns.iter().cloned());
            rows.push(Row {
                name: stmt.source.name.clone(),
                tags: series.tags.into_iter().map(|t| (t.key, t.value)).collect(),
                columns: header,
                values,
            });
        }
        Ok(rows)
    }

    fn drop_series(
        &self,
        source: Option<&Measurement>,
        condition: &[TagFilter],
    ) -> Result<Vec<Row>> {
        let shards = self.shards_of(&self.retention_policies(source)?)?;
        let mut removed = 0;
        for shard in &shards {
            let measurements = match source {
                Some(m) => vec![m.name.clone()],
                None => shard.measurements()?,
            };
            for measurement in &measurements {
                removed += shard.drop_series(measurement, condition)?;
            }
        }
        debug!(shards = shards.len(), removed, "Dropped series");
        Ok(Vec::new())
    }

    /// Measurements known to any of the shards, restricted to the source
    fn measurements_of(
        &self,
        shards: &[Arc<Shard>],
        source: Option<&Measurement>,
    ) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for shard in shards {
            names.extend(shard.measurements()?);
        }
        if let Some(m) = source {
            names.retain(|n| *n == m.name);
        }
        Ok(names)
    }

    fn show_tag_keys(&self, source: Option<&Measurement>) -> Result<Vec<Row>> {
        let shards = self.shards_of(&self.retention_policies(source)?)?;
        let mut rows = Vec::new();
        for measurement in self.measurements_of(&shards, source)? {
            let mut keys = BTreeSet::new();
            for shard in &shards {
                keys.extend(shard.tag_keys(&measurement)?);
            }
            let mut row = Row::new(measurement, &["tagKey"]);
            row.values = keys.into_iter().map(|k| vec![Value::String(k)]).collect();
            rows.push(row);
        }
        Ok(rows)
    }

    fn show_tag_values(&self, source: Option<&Measurement>, key: &str) -> Result<Vec<Row>> {
        let shards = self.shards_of(&self.retention_policies(source)?)?;
        let mut rows = Vec::new();
        for measurement in self.measurements_of(&shards, source)? {
            let mut values = BTreeSet::new();
            for shard in &shards {
                values.extend(shard.tag_values(Some(&measurement), key)?);
            }
            if values.is_empty() {
                continue;
            }
            let mut row = Row::new(measurement, &["key", "value"]);
            row.values = values
                .into_iter()
                .map(|v| vec![Value::String(key.to_string()), Value::String(v)])
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }

    fn show_measurements(&self) -> Result<Vec<Row>> {
        let shards = self.shards_of(&self.retention_policies(None)?)?;
        let names = self.measurements_of(&shards, None)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut row = Row::new("measurements", &["name"]);
        row.values = names.into_iter().map(|n| vec![Value::String(n)]).collect();
        Ok(vec![row])
    }

    fn show_databases(&self) -> Result<Vec<Row>> {
        let mut row = Row::new("databases", &["name"]);
        row.values = self
            .meta
            .databases()?
            .into_iter()
            .map(|db| vec![Value::String(db.name)])
            .collect();
        Ok(vec![row])
    }

    fn show_users(&self) -> Result<Vec<Row>> {
        let mut row = Row::new("", &["user", "admin"]);
        row.values = self
            .meta
            .users()?
            .into_iter()
            .map(|u| vec![Value::String(u.name), Value::Bool(u.admin)])
            .collect();
        Ok(vec![row])
    }

    fn grant(&self, privilege: Privilege, on: Option<&str>, user: &str) -> Result<Vec<Row>> {
        match on {
            Some(db) => self.meta.set_privilege(user, db, privilege)?,
            None if privilege == Privilege::All => self.meta.set_admin_privilege(user, true)?,
            None => {
                return Err(QueryError::InvalidStatement(format!(
                    "{} must be granted on a database",
                    privilege
                )))
            }
        }
        Ok(Vec::new())
    }
}

/// Field names present in the merged records, in the order the shards first
/// saw them. Shards are consulted in the order given.
fn discovered_fields(
    shards: &[Arc<Shard>],
    measurement: &str,
    merged: &[MergedSeries],
) -> Result<Vec<String>> {
    let present: HashSet<&str> = merged
        .iter()
        .flat_map(|s| s.records.values().flat_map(|f| f.keys().map(String::as_str)))
        .collect();

    let mut columns: Vec<String> = Vec::new();
    for shard in shards {
        for key in shard.field_keys(measurement)? {
            if present.contains(key.as_str()) && !columns.contains(&key) {
                columns.push(key);
            }
        }
    }
    Ok(columns)
}

/// Merge per-shard scans into one entry per series, keeping the order in
/// which series were first seen. A later shard's field value wins on equal
/// timestamps.
fn merge_scans(scans: Vec<Vec<ScanSeries>>) -> Vec<MergedSeries> {
    let mut merged: Vec<MergedSeries> = Vec::new();
    let mut positions: HashMap<Vec<Tag>, usize> = HashMap::new();

    for series in scans.into_iter().flatten() {
        let idx = *positions.entry(series.tags.clone()).or_insert_with(|| {
            merged.push(MergedSeries {
                tags: series.tags.clone(),
                records: BTreeMap::new(),
            });
            merged.len() - 1
        });
        let records = &mut merged[idx].records;
        for record in series.records {
            records
                .entry(record.timestamp)
                .or_default()
                .extend(record.fields);
        }
    }

    merged
}
