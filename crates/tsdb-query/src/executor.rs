//! Query executor
//!
//! Statements run one at a time on a dedicated producer thread. Each
//! statement's rows are split into chunks and sent over a bounded channel,
//! so a slow consumer applies back-pressure to execution. Dropping the
//! receiver or cancelling the context stops the producer at the next send.

use crate::ast::Query;
use crate::auth;
use crate::error::{QueryError, Result};
use crate::result::{QueryResult, Row};
use crate::statements::StatementRunner;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsdb_meta::{MetaStore, UserInfo};
use tsdb_storage::Store;

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Rows per result when the caller passes a chunk size of zero
    pub default_chunk_size: usize,
    /// Results buffered ahead of the consumer
    pub channel_capacity: usize,
    /// Authorize every statement, even when no user is supplied
    pub enforce_auth: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: 10_000,
            channel_capacity: 16,
            enforce_auth: false,
        }
    }
}

/// Per-call execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// User running the query; statements are authorized against it when set
    pub user: Option<UserInfo>,
    /// Stops execution when cancelled
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn with_user(user: UserInfo) -> Self {
        Self {
            user: Some(user),
            cancel: CancellationToken::new(),
        }
    }
}

/// Runs queries against a store, resolving topology through a MetaStore
pub struct QueryExecutor {
    store: RwLock<Arc<Store>>,
    meta: RwLock<Option<Arc<dyn MetaStore>>>,
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_config(store, ExecutorConfig::default())
    }

    pub fn with_config(store: Arc<Store>, config: ExecutorConfig) -> Self {
        Self {
            store: RwLock::new(store),
            meta: RwLock::new(None),
            config,
        }
    }

    pub fn set_meta_store(&self, meta: Arc<dyn MetaStore>) {
        *self.meta.write() = Some(meta);
    }

    /// Replace the store, e.g. after reopening it
    pub fn set_store(&self, store: Arc<Store>) {
        *self.store.write() = store;
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.read().clone()
    }

    pub fn meta_store(&self) -> Option<Arc<dyn MetaStore>> {
        self.meta.read().clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Check that `user` may run every statement of `query`
    pub fn authorize(&self, user: Option<&UserInfo>, query: &Query, database: &str) -> Result<()> {
        let meta = self.meta_store().ok_or(QueryError::NoMetaStore)?;
        auth::authorize(meta.as_ref(), user, query, database)
    }

    /// Execute `query` against `database` without a user.
    ///
    /// Results arrive in statement order; each statement yields at least one
    /// result and no result holds more than `chunk_size` rows.
    pub fn execute_query(
        &self,
        query: Query,
        database: &str,
        chunk_size: usize,
    ) -> Result<mpsc::Receiver<QueryResult>> {
        self.execute_query_with(query, database, chunk_size, ExecutionContext::default())
    }

    /// Execute `query` with a user and cancellation token
    pub fn execute_query_with(
        &self,
        query: Query,
        database: &str,
        chunk_size: usize,
        ctx: ExecutionContext,
    ) -> Result<mpsc::Receiver<QueryResult>> {
        let meta = self.meta_store().ok_or(QueryError::NoMetaStore)?;
        let runner = StatementRunner::new(self.store(), meta, database.to_string());
        let chunk_size = if chunk_size == 0 {
            self.config.default_chunk_size.max(1)
        } else {
            chunk_size
        };
        let check_auth = self.config.enforce_auth || ctx.user.is_some();

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| QueryError::Execution(format!("failed to build runtime: {}", e)))?;

        info!(
            database,
            statements = query.statements.len(),
            chunk_size,
            "Executing query"
        );

        let database = database.to_string();
        std::thread::spawn(move || {
            runtime.block_on(produce(runner, query, database, chunk_size, check_auth, ctx, tx));
        });

        Ok(rx)
    }
}

async fn produce(
    runner: StatementRunner,
    query: Query,
    database: String,
    chunk_size: usize,
    check_auth: bool,
    ctx: ExecutionContext,
    tx: mpsc::Sender<QueryResult>,
) {
    for (statement_id, stmt) in query.statements.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            debug!(statement_id, "Query cancelled");
            return;
        }

        let outcome = if check_auth {
            auth::authorize_statement(runner.meta(), ctx.user.as_ref(), stmt, &database)
                .and_then(|_| runner.execute(stmt))
        } else {
            runner.execute(stmt)
        };

        let results = match outcome {
            Ok(rows) => chunk_rows(statement_id, rows, chunk_size),
            Err(e) => {
                warn!(statement_id, statement = %stmt, error = %e, "Statement failed");
                vec![QueryResult::from_error(statement_id, &e)]
            }
        };

        for result in results {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    debug!(statement_id, "Query cancelled");
                    return;
                }
                sent = tx.send(result) => {
                    if sent.is_err() {
                        debug!(statement_id, "Result receiver dropped");
                        return;
                    }
                }
            }
        }
    }
}

/// Split a statement's rows into results of at most `chunk_size` values.
/// A row larger than the remaining room is split across results, each
/// carrying the row's name, tags and columns. Every result but the last is
/// marked partial.
pub(crate) fn chunk_rows(statement_id: usize, rows: Vec<Row>, chunk_size: usize) -> Vec<QueryResult> {
    let mut results = Vec::new();
    let mut current: Vec<Row> = Vec::new();
    let mut room = chunk_size;

    for row in rows {
        if row.values.is_empty() {
            current.push(row);
            continue;
        }

        let header = row.header();
        let mut values = row.values.into_iter().peekable();
        while values.peek().is_some() {
            if room == 0 {
                results.push(QueryResult::new(statement_id, std::mem::take(&mut current)));
                room = chunk_size;
            }
            let mut part = header.clone();
            part.values.extend(values.by_ref().take(room));
            room -= part.values.len();
            current.push(part);
        }
    }
    results.push(QueryResult::new(statement_id, current));

    let last = results.len() - 1;
    for result in &mut results[..last] {
        result.partial = true;
    }
    results
}
