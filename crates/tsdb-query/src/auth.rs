//! Statement authorization

use crate::ast::{Query, Statement};
use crate::error::{QueryError, Result};
use tsdb_meta::{MetaStore, UserInfo};

/// Check that `user` may run every statement of `query`.
///
/// See [`authorize_statement`] for the rules.
pub fn authorize(
    meta: &dyn MetaStore,
    user: Option<&UserInfo>,
    query: &Query,
    database: &str,
) -> Result<()> {
    for stmt in &query.statements {
        authorize_statement(meta, user, stmt, database)?;
    }
    Ok(())
}

/// Check that `user` may run `stmt`.
///
/// Without a user, the only statement allowed is creating an admin user, and
/// only while no users exist. Admins may run anything. Other users need every
/// privilege the statement requires.
pub fn authorize_statement(
    meta: &dyn MetaStore,
    user: Option<&UserInfo>,
    stmt: &Statement,
    database: &str,
) -> Result<()> {
    let Some(user) = user else {
        if meta.user_count()? == 0 {
            if matches!(stmt, Statement::CreateUser { admin: true, .. }) {
                return Ok(());
            }
            return Err(QueryError::Authorization(
                "create admin user first or disable authentication".to_string(),
            ));
        }
        return Err(QueryError::Authorization("no user provided".to_string()));
    };

    if user.admin {
        return Ok(());
    }

    for required in stmt.required_privileges(database) {
        if required.admin {
            return Err(QueryError::Authorization(format!(
                "statement '{}', requires admin privilege",
                stmt
            )));
        }
        if required.database.is_empty() {
            return Err(QueryError::DatabaseRequired);
        }
        if !user.authorize(required.privilege, &required.database) {
            return Err(QueryError::Authorization(format!(
                "user {} not authorized to execute statement '{}', requires {} on {}",
                user.name, stmt, required.privilege, required.database
            )));
        }
    }

    Ok(())
}
