//! tsdb query - statement execution over the shard store
//!
//! This crate provides:
//! - AST: parsed statements handed to the executor
//! - Authorization of statements against MetaStore users
//! - Query executor: dispatches statements and streams chunked results over
//!   a bounded channel
//! - Result model with its JSON wire shape

pub mod ast;
pub mod auth;
pub mod error;
pub mod executor;
pub mod result;
mod statements;

pub use ast::{Fields, Measurement, Query, RequiredPrivilege, SelectStatement, Statement};
pub use auth::{authorize, authorize_statement};
pub use error::{QueryError, Result};
pub use executor::{ExecutionContext, ExecutorConfig, QueryExecutor};
pub use result::{QueryResult, Row};
