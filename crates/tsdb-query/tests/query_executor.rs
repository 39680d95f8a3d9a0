//! Integration tests for the query executor
//!
//! These run statements end to end: points written to shards of a real
//! store on disk, topology resolved through a MetaStore, results read off
//! the executor's channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tsdb_core::{now_nanos, ErrorKind, Point, TagFilter};
use tsdb_meta::{
    DatabaseInfo, MemoryMetaStore, MetaStore, Privilege, RetentionPolicyInfo, ShardGroupInfo,
    ShardInfo, UserInfo,
};
use tsdb_query::{
    result::to_json, ExecutionContext, ExecutorConfig, Measurement, Query, QueryError,
    QueryExecutor, QueryResult, SelectStatement, Statement,
};
use tsdb_storage::Store;

const HOUR: i64 = 3_600_000_000_000;

/// MetaStore with one database whose retention policy "bar" holds a single
/// shard group around the current time containing shard 1
struct TestMetaStore {
    user_count: AtomicUsize,
}

impl TestMetaStore {
    fn new(user_count: usize) -> Self {
        Self {
            user_count: AtomicUsize::new(user_count),
        }
    }

    fn bar() -> RetentionPolicyInfo {
        let now = now_nanos();
        let mut rp = RetentionPolicyInfo::new("bar");
        rp.shard_groups.push(ShardGroupInfo {
            id: 1,
            start_time: now - HOUR,
            end_time: now + HOUR,
            shards: vec![ShardInfo {
                id: 1,
                owner_ids: vec![1],
            }],
        });
        rp
    }
}

impl MetaStore for TestMetaStore {
    fn database(&self, name: &str) -> tsdb_meta::Result<Option<DatabaseInfo>> {
        Ok(Some(DatabaseInfo {
            name: name.to_string(),
            default_retention_policy: "foo".to_string(),
            retention_policies: vec![Self::bar()],
        }))
    }

    fn databases(&self) -> tsdb_meta::Result<Vec<DatabaseInfo>> {
        Ok(self.database("foo")?.into_iter().collect())
    }

    fn retention_policy(
        &self,
        _database: &str,
        _name: &str,
    ) -> tsdb_meta::Result<Option<RetentionPolicyInfo>> {
        Ok(Some(Self::bar()))
    }

    fn user(&self, _name: &str) -> tsdb_meta::Result<Option<UserInfo>> {
        Ok(None)
    }

    fn users(&self) -> tsdb_meta::Result<Vec<UserInfo>> {
        Ok(Vec::new())
    }

    fn authenticate(&self, _username: &str, _password: &str) -> tsdb_meta::Result<UserInfo> {
        Err(tsdb_meta::MetaError::AuthenticationFailed)
    }

    fn admin_user_exists(&self) -> tsdb_meta::Result<bool> {
        Ok(false)
    }

    fn user_count(&self) -> tsdb_meta::Result<usize> {
        Ok(self.user_count.load(Ordering::SeqCst))
    }

    fn create_user(&self, name: &str, _password: &str, admin: bool) -> tsdb_meta::Result<UserInfo> {
        self.user_count.fetch_add(1, Ordering::SeqCst);
        Ok(UserInfo {
            name: name.to_string(),
            hash: String::new(),
            admin,
            privileges: Default::default(),
        })
    }

    fn drop_user(&self, _name: &str) -> tsdb_meta::Result<()> {
        Ok(())
    }

    fn set_privilege(&self, _: &str, _: &str, _: Privilege) -> tsdb_meta::Result<()> {
        Ok(())
    }

    fn set_admin_privilege(&self, _: &str, _: bool) -> tsdb_meta::Result<()> {
        Ok(())
    }
}

/// Test environment: a store on disk with shard 1 of foo.bar and an executor
struct TestEnv {
    _dir: TempDir,
    path: std::path::PathBuf,
    executor: QueryExecutor,
}

impl TestEnv {
    fn new(meta: Arc<dyn MetaStore>) -> Self {
        Self::with_config(meta, ExecutorConfig::default())
    }

    fn with_config(meta: Arc<dyn MetaStore>, config: ExecutorConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        let store = Arc::new(Store::new(&path));
        store.open().unwrap();
        store.create_shard("foo", "bar", 1).unwrap();

        let executor = QueryExecutor::with_config(store, config);
        executor.set_meta_store(meta);

        Self {
            _dir: dir,
            path,
            executor,
        }
    }

    fn write(&self, points: &[Point]) {
        self.executor.store().write_to_shard(1, points).unwrap();
    }

    /// Close the store and swap in a freshly opened one over the same path
    fn reopen(&self) {
        self.executor.store().close().unwrap();
        let store = Arc::new(Store::new(&self.path));
        store.open().unwrap();
        self.executor.set_store(store);
    }

    fn run(&self, query: Query, chunk_size: usize) -> Vec<QueryResult> {
        collect(self.executor.execute_query(query, "foo", chunk_size).unwrap())
    }

    fn run_json(&self, query: Query) -> String {
        to_json(&self.run(query, 20)).unwrap()
    }
}

fn collect(mut rx: mpsc::Receiver<QueryResult>) -> Vec<QueryResult> {
    let mut results = Vec::new();
    while let Some(result) = rx.blocking_recv() {
        results.push(result);
    }
    results
}

fn cpu_point(host: &str, value: f64, ts: i64) -> Point {
    Point::builder("cpu")
        .tag("host", host)
        .field("value", value)
        .timestamp(ts)
        .build()
        .unwrap()
}

fn select_stmt() -> Statement {
    SelectStatement::new("cpu").into()
}

fn select_cpu() -> Query {
    Query::single(select_stmt())
}

fn show_tag_keys() -> Query {
    Query::single(Statement::ShowTagKeys { source: None })
}

const CPU_SERVER_JSON: &str = r#"[{"series":[{"name":"cpu","tags":{"host":"server"},"columns":["time","value"],"values":[["1970-01-01T00:00:01.000000002Z",1],["1970-01-01T00:00:02.000000003Z",1]]}]}]"#;

#[test]
fn test_write_points_and_execute_query() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[cpu_point("server", 1.0, 1_000_000_002)]);
    env.write(&[cpu_point("server", 1.0, 2_000_000_003)]);

    assert_eq!(env.run_json(select_cpu()), CPU_SERVER_JSON);

    env.reopen();
    assert_eq!(env.run_json(select_cpu()), CPU_SERVER_JSON);
}

#[test]
fn test_drop_series_statement() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[cpu_point("server", 1.0, 1_000_000_000)]);

    let drop = Query::single(Statement::DropSeries {
        source: Some(Measurement::new("cpu")),
        condition: vec![TagFilter::equals("host", "server")],
    });
    let results = env.run(drop, 20);
    assert_eq!(results.len(), 1);
    assert!(!results[0].is_error());

    let tag_keys = r#"[{"series":[{"name":"cpu","columns":["tagKey"],"values":[["host"]]}]}]"#;

    assert_eq!(env.run_json(select_cpu()), "[{}]");
    assert_eq!(env.run_json(show_tag_keys()), tag_keys);

    env.reopen();
    assert_eq!(env.run_json(select_cpu()), "[{}]");
    assert_eq!(env.run_json(show_tag_keys()), tag_keys);
}

#[test]
fn test_drop_series_with_invalid_regex_reports_error() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[cpu_point("server", 1.0, 1_000_000_000)]);

    let drop = Query::single(Statement::DropSeries {
        source: Some(Measurement::new("cpu")),
        condition: vec![TagFilter::Regex {
            key: "host".to_string(),
            pattern: "serv(".to_string(),
        }],
    });
    let results = env.run(drop, 20);
    assert_eq!(results.len(), 1);
    let error = results[0].error.as_deref().unwrap();
    assert!(error.contains("Invalid regex pattern 'serv('"), "{}", error);

    // The series is still there
    assert_eq!(
        env.run_json(select_cpu()),
        r#"[{"series":[{"name":"cpu","tags":{"host":"server"},"columns":["time","value"],"values":[["1970-01-01T00:00:01Z",1]]}]}]"#
    );
}

#[test]
fn test_authenticate_if_user_count_zero_and_create_user() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));

    let create_admin = Query::single(Statement::CreateUser {
        name: "foo".to_string(),
        password: "asdf".to_string(),
        admin: true,
    });
    assert!(env.executor.authorize(None, &create_admin, "").is_ok());

    let create_user = Query::single(Statement::CreateUser {
        name: "foo".to_string(),
        password: "asdf".to_string(),
        admin: false,
    });
    let err = env.executor.authorize(None, &create_user, "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);

    assert!(env.executor.authorize(None, &select_cpu(), "foo").is_err());

    let env = TestEnv::new(Arc::new(TestMetaStore::new(1)));
    assert!(env.executor.authorize(None, &create_admin, "").is_err());
    assert!(env.executor.authorize(None, &create_user, "").is_err());
}

#[test]
fn test_execute_without_meta_store_fails() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::new(dir.path()));
    store.open().unwrap();
    let executor = QueryExecutor::new(store);

    assert!(matches!(
        executor.execute_query(select_cpu(), "foo", 10),
        Err(QueryError::NoMetaStore)
    ));
}

#[test]
fn test_select_results_are_chunked() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    let points: Vec<Point> = (1..=5)
        .map(|i| cpu_point("server", i as f64, i * 1_000_000_000))
        .collect();
    env.write(&points);

    let results = env.run(select_cpu(), 2);
    assert_eq!(results.len(), 3);
    assert_eq!(
        results.iter().map(|r| r.partial).collect::<Vec<_>>(),
        vec![true, true, false]
    );
    assert!(results.iter().all(|r| r.statement_id == 0));

    let values: Vec<serde_json::Value> = results
        .iter()
        .flat_map(|r| r.series.iter())
        .flat_map(|row| row.values.iter().map(|v| v[1].clone()))
        .collect();
    assert_eq!(values, (1..=5).map(serde_json::Value::from).collect::<Vec<_>>());
}

#[test]
fn test_failed_statement_does_not_stop_query() {
    let meta = Arc::new(MemoryMetaStore::new());
    meta.create_database("foo").unwrap();
    meta.create_retention_policy("foo", TestMetaStore::bar()).unwrap();
    let env = TestEnv::new(meta);
    env.write(&[cpu_point("server", 1.0, 1_000_000_002)]);

    let query = Query::new(vec![
        SelectStatement::new("cpu")
            .source(Measurement::new("cpu").with_database("missing"))
            .into(),
        SelectStatement::new("cpu").into(),
    ]);
    let results = env.run(query, 10);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].statement_id, 0);
    assert_eq!(
        results[0].error.as_deref(),
        Some("database not found: missing")
    );
    assert_eq!(results[1].statement_id, 1);
    assert_eq!(results[1].series.len(), 1);
}

#[test]
fn test_select_fields_filters_and_limits() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[
        Point::builder("cpu")
            .tag("host", "a")
            .field("value", 1.5)
            .field("idle", 90i64)
            .timestamp(10)
            .build()
            .unwrap(),
        Point::builder("cpu")
            .tag("host", "a")
            .field("value", 2.5)
            .timestamp(20)
            .build()
            .unwrap(),
        Point::builder("cpu")
            .tag("host", "a")
            .field("value", 3.5)
            .timestamp(30)
            .build()
            .unwrap(),
        cpu_point("b", 7.0, 10),
    ]);

    let all = env.run_json(Query::single(
        SelectStatement::new("cpu").filter(TagFilter::equals("host", "a")),
    ));
    assert_eq!(
        all,
        concat!(
            r#"[{"series":[{"name":"cpu","tags":{"host":"a"},"columns":["time","value","idle"],"#,
            r#""values":[["1970-01-01T00:00:00.00000001Z",1.5,90],"#,
            r#"["1970-01-01T00:00:00.00000002Z",2.5,null],"#,
            r#"["1970-01-01T00:00:00.00000003Z",3.5,null]]}]}]"#
        )
    );

    let paged = env.run(
        Query::single(
            SelectStatement::new("cpu")
                .fields(&["value"])
                .offset(1)
                .limit(1),
        ),
        10,
    );
    // host=b has a single row, which the offset skips
    let rows = &paged[0].series;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].tags["host"], "a");
    assert_eq!(
        rows[0].values,
        vec![vec![
            serde_json::json!("1970-01-01T00:00:00.00000002Z"),
            serde_json::json!(2.5)
        ]]
    );
}

#[test]
fn test_select_all_columns_in_discovery_order() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[Point::builder("cpu")
        .tag("host", "a")
        .field("value", 1.0)
        .field("alpha", 2.0)
        .timestamp(10)
        .build()
        .unwrap()]);
    env.write(&[Point::builder("cpu")
        .tag("host", "b")
        .field("beta", 3.0)
        .timestamp(10)
        .build()
        .unwrap()]);

    let expected = concat!(
        r#"[{"series":[{"name":"cpu","tags":{"host":"a"},"columns":["time","value","alpha","beta"],"#,
        r#""values":[["1970-01-01T00:00:00.00000001Z",1,2,null]]},"#,
        r#"{"name":"cpu","tags":{"host":"b"},"columns":["time","value","alpha","beta"],"#,
        r#""values":[["1970-01-01T00:00:00.00000001Z",null,null,3]]}]}]"#
    );
    assert_eq!(env.run_json(select_cpu()), expected);

    env.reopen();
    assert_eq!(env.run_json(select_cpu()), expected);

    // Fields only found in dropped series are not columns
    env.run(
        Query::single(Statement::DropSeries {
            source: Some(Measurement::new("cpu")),
            condition: vec![TagFilter::equals("host", "b")],
        }),
        10,
    );
    assert_eq!(
        env.run_json(select_cpu()),
        concat!(
            r#"[{"series":[{"name":"cpu","tags":{"host":"a"},"columns":["time","value","alpha"],"#,
            r#""values":[["1970-01-01T00:00:00.00000001Z",1,2]]}]}]"#
        )
    );
}

#[test]
fn test_select_unknown_measurement_is_empty() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[cpu_point("server", 1.0, 1)]);
    assert_eq!(env.run_json(Query::single(SelectStatement::new("mem"))), "[{}]");
}

#[test]
fn test_select_merges_shards() {
    let meta = Arc::new(MemoryMetaStore::new());
    meta.create_database("foo").unwrap();
    meta.create_retention_policy("foo", RetentionPolicyInfo::new("bar"))
        .unwrap();
    for (group, shard, start) in [(1, 1, 0), (2, 2, 100)] {
        meta.create_shard_group(
            "foo",
            "bar",
            ShardGroupInfo {
                id: group,
                start_time: start,
                end_time: start + 100,
                shards: vec![ShardInfo {
                    id: shard,
                    owner_ids: vec![1],
                }],
            },
        )
        .unwrap();
    }

    let env = TestEnv::new(meta);
    let store = env.executor.store();
    store.create_shard("foo", "bar", 2).unwrap();
    store
        .write_to_shard(1, &[cpu_point("server", 1.0, 50)])
        .unwrap();
    store
        .write_to_shard(2, &[cpu_point("server", 2.0, 150)])
        .unwrap();

    let results = env.run(select_cpu(), 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].series.len(), 1);
    assert_eq!(results[0].series[0].values.len(), 2);

    // Only the second group overlaps
    let results = env.run(Query::single(SelectStatement::new("cpu").time_range(120, 200)), 10);
    assert_eq!(results[0].series[0].values.len(), 1);
}

#[test]
fn test_show_statements() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[
        cpu_point("a", 1.0, 1),
        cpu_point("b", 1.0, 1),
        Point::builder("mem")
            .tag("region", "west")
            .field("free", 1i64)
            .timestamp(1)
            .build()
            .unwrap(),
    ]);

    assert_eq!(
        env.run_json(Query::single(Statement::ShowMeasurements)),
        r#"[{"series":[{"name":"measurements","columns":["name"],"values":[["cpu"],["mem"]]}]}]"#
    );

    assert_eq!(
        env.run_json(Query::single(Statement::ShowTagValues {
            source: Some(Measurement::new("cpu")),
            key: "host".to_string(),
        })),
        r#"[{"series":[{"name":"cpu","columns":["key","value"],"values":[["host","a"],["host","b"]]}]}]"#
    );

    assert_eq!(
        env.run_json(show_tag_keys()),
        concat!(
            r#"[{"series":[{"name":"cpu","columns":["tagKey"],"values":[["host"]]},"#,
            r#"{"name":"mem","columns":["tagKey"],"values":[["region"]]}]}]"#
        )
    );

    assert_eq!(
        env.run_json(Query::single(Statement::ShowDatabases)),
        r#"[{"series":[{"name":"databases","columns":["name"],"values":[["foo"]]}]}]"#
    );
}

#[test]
fn test_drop_series_without_source_drops_all_measurements() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[cpu_point("a", 1.0, 1), cpu_point("b", 1.0, 1)]);

    env.run(
        Query::single(Statement::DropSeries {
            source: None,
            condition: vec![TagFilter::equals("host", "a")],
        }),
        10,
    );

    let results = env.run(select_cpu(), 10);
    assert_eq!(results[0].series.len(), 1);
    assert_eq!(results[0].series[0].tags["host"], "b");
}

#[test]
fn test_user_statements_with_authorization() {
    let meta = Arc::new(MemoryMetaStore::new());
    meta.create_database("foo").unwrap();
    meta.create_retention_policy("foo", TestMetaStore::bar()).unwrap();
    let env = TestEnv::with_config(
        meta.clone(),
        ExecutorConfig {
            enforce_auth: true,
            ..ExecutorConfig::default()
        },
    );
    env.write(&[cpu_point("server", 1.0, 1)]);

    // Bootstrap: the admin is created, the statement after it is refused
    let results = env.run(
        Query::new(vec![
            Statement::CreateUser {
                name: "root".to_string(),
                password: "secret".to_string(),
                admin: true,
            },
            Statement::ShowUsers,
        ]),
        10,
    );
    assert!(!results[0].is_error());
    assert_eq!(results[1].error.as_deref(), Some("no user provided"));

    let root = meta.authenticate("root", "secret").unwrap();
    let run_as = |user: &UserInfo, query: Query| {
        collect(
            env.executor
                .execute_query_with(query, "foo", 10, ExecutionContext::with_user(user.clone()))
                .unwrap(),
        )
    };

    let results = run_as(
        &root,
        Query::new(vec![
            Statement::CreateUser {
                name: "bob".to_string(),
                password: "pw".to_string(),
                admin: false,
            },
            Statement::Grant {
                privilege: Privilege::Read,
                on: Some("foo".to_string()),
                user: "bob".to_string(),
            },
            Statement::ShowUsers,
        ]),
    );
    assert!(results.iter().all(|r| !r.is_error()));
    assert_eq!(
        serde_json::to_string(&results[2]).unwrap(),
        r#"{"series":[{"columns":["user","admin"],"values":[["bob",false],["root",true]]}]}"#
    );

    let bob = meta.user("bob").unwrap().unwrap();
    let results = run_as(
        &bob,
        Query::new(vec![
            select_stmt(),
            Statement::DropSeries {
                source: None,
                condition: vec![],
            },
        ]),
    );
    assert_eq!(results[0].series.len(), 1);
    assert!(results[1]
        .error
        .as_deref()
        .unwrap()
        .starts_with("user bob not authorized"));

    let results = run_as(
        &root,
        Query::single(Statement::Grant {
            privilege: Privilege::Write,
            on: None,
            user: "bob".to_string(),
        }),
    );
    assert!(results[0].is_error());

    let results = run_as(&root, Query::single(Statement::DropUser { name: "bob".to_string() }));
    assert!(!results[0].is_error());
    assert!(meta.user("bob").unwrap().is_none());
}

#[test]
fn test_cancelled_query_produces_nothing() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[cpu_point("server", 1.0, 1)]);

    let ctx = ExecutionContext::default();
    ctx.cancel.cancel();
    let rx = env
        .executor
        .execute_query_with(select_cpu(), "foo", 10, ctx)
        .unwrap();
    assert!(collect(rx).is_empty());
}

#[test]
fn test_dropped_receiver_stops_producer() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    let points: Vec<Point> = (1..=50).map(|i| cpu_point("server", 1.0, i)).collect();
    env.write(&points);

    let rx = env
        .executor
        .execute_query(Query::new(vec![select_stmt(); 20]), "foo", 1)
        .unwrap();
    drop(rx);

    // The store stays usable while the producer winds down
    env.write(&[cpu_point("server", 2.0, 100)]);
}

#[tokio::test]
async fn test_results_stream_to_async_consumer() {
    let env = TestEnv::new(Arc::new(TestMetaStore::new(0)));
    env.write(&[cpu_point("server", 1.0, 1_000_000_002)]);

    let mut rx = env
        .executor
        .execute_query(
            Query::new(vec![select_stmt(), Statement::ShowMeasurements]),
            "foo",
            10,
        )
        .unwrap();

    let mut ids = Vec::new();
    while let Some(result) = rx.recv().await {
        ids.push(result.statement_id);
    }
    assert_eq!(ids, vec![0, 1]);
}
