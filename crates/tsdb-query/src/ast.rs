//! Statement AST
//!
//! Statements arrive already parsed; this module only models them, reports
//! the privileges each one needs and renders them back as query text for
//! logs and error messages.

use std::fmt;
use tsdb_core::{TagFilter, TimeRange};
use tsdb_meta::Privilege;

/// A list of statements executed in order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub statements: Vec<Statement>,
}

impl Query {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// Query holding a single statement
    pub fn single(statement: impl Into<Statement>) -> Self {
        Self {
            statements: vec![statement.into()],
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stmt) in self.statements.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

/// A measurement, optionally qualified by database and retention policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub database: Option<String>,
    pub retention_policy: Option<String>,
    pub name: String,
}

impl Measurement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            database: None,
            retention_policy: None,
            name: name.into(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_retention_policy(mut self, retention_policy: impl Into<String>) -> Self {
        self.retention_policy = Some(retention_policy.into());
        self
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.database, &self.retention_policy) {
            (Some(db), Some(rp)) => write!(f, "\"{}\".\"{}\".", db, rp)?,
            (Some(db), None) => write!(f, "\"{}\"..", db)?,
            (None, Some(rp)) => write!(f, "\"{}\".", rp)?,
            (None, None) => {}
        }
        write!(f, "{}", self.name)
    }
}

/// Projection of a SELECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fields {
    /// `*`: every field of the measurement
    All,
    /// Named fields, in output column order
    List(Vec<String>),
}

/// `SELECT <fields> FROM <source> [WHERE ...] [LIMIT n] [OFFSET m]`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub fields: Fields,
    pub source: Measurement,
    /// Tag predicates, all of which must hold
    pub condition: Vec<TagFilter>,
    pub time_range: TimeRange,
    /// Maximum rows per series
    pub limit: Option<usize>,
    /// Rows skipped per series
    pub offset: usize,
}

impl SelectStatement {
    /// `SELECT * FROM <measurement>`
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            fields: Fields::All,
            source: Measurement::new(measurement),
            condition: Vec::new(),
            time_range: TimeRange::default(),
            limit: None,
            offset: 0,
        }
    }

    pub fn source(mut self, source: Measurement) -> Self {
        self.source = source;
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Fields::List(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn filter(mut self, filter: TagFilter) -> Self {
        self.condition.push(filter);
        self
    }

    pub fn time_range(mut self, start: i64, end: i64) -> Self {
        self.time_range = TimeRange::new(start, end);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// A parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    DropSeries {
        /// All measurements of the database when absent
        source: Option<Measurement>,
        condition: Vec<TagFilter>,
    },
    ShowTagKeys {
        /// All measurements when absent
        source: Option<Measurement>,
    },
    ShowTagValues {
        source: Option<Measurement>,
        key: String,
    },
    ShowMeasurements,
    ShowDatabases,
    CreateUser {
        name: String,
        password: String,
        /// `WITH ALL PRIVILEGES`
        admin: bool,
    },
    DropUser {
        name: String,
    },
    ShowUsers,
    Grant {
        privilege: Privilege,
        /// Database the privilege applies to; cluster-wide when absent
        on: Option<String>,
        user: String,
    },
}

impl From<SelectStatement> for Statement {
    fn from(stmt: SelectStatement) -> Self {
        Statement::Select(stmt)
    }
}

/// A privilege needed to run a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredPrivilege {
    /// Only cluster admins may run the statement
    pub admin: bool,
    pub database: String,
    pub privilege: Privilege,
}

impl RequiredPrivilege {
    fn admin() -> Self {
        Self {
            admin: true,
            database: String::new(),
            privilege: Privilege::All,
        }
    }

    fn on(database: &str, privilege: Privilege) -> Self {
        Self {
            admin: false,
            database: database.to_string(),
            privilege,
        }
    }
}

impl Statement {
    /// Privileges needed to run the statement. Unqualified sources resolve
    /// against `default_database`.
    pub fn required_privileges(&self, default_database: &str) -> Vec<RequiredPrivilege> {
        let db_of = |source: Option<&Measurement>| -> String {
            source
                .and_then(|m| m.database.clone())
                .unwrap_or_else(|| default_database.to_string())
        };

        match self {
            Statement::Select(stmt) => {
                vec![RequiredPrivilege::on(&db_of(Some(&stmt.source)), Privilege::Read)]
            }
            Statement::DropSeries { source, .. } => {
                vec![RequiredPrivilege::on(&db_of(source.as_ref()), Privilege::Write)]
            }
            Statement::ShowTagKeys { source } | Statement::ShowTagValues { source, .. } => {
                vec![RequiredPrivilege::on(&db_of(source.as_ref()), Privilege::Read)]
            }
            Statement::ShowMeasurements => {
                vec![RequiredPrivilege::on(default_database, Privilege::Read)]
            }
            Statement::ShowDatabases
            | Statement::CreateUser { .. }
            | Statement::DropUser { .. }
            | Statement::ShowUsers
            | Statement::Grant { .. } => vec![RequiredPrivilege::admin()],
        }
    }
}

fn write_condition(f: &mut fmt::Formatter<'_>, condition: &[TagFilter]) -> fmt::Result {
    for (i, filter) in condition.iter().enumerate() {
        f.write_str(if i == 0 { " WHERE " } else { " AND " })?;
        write!(f, "{}", filter)?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Select(stmt) => {
                f.write_str("SELECT ")?;
                match &stmt.fields {
                    Fields::All => f.write_str("*")?,
                    Fields::List(names) => f.write_str(&names.join(", "))?,
                }
                write!(f, " FROM {}", stmt.source)?;
                write_condition(f, &stmt.condition)?;
                if let Some(limit) = stmt.limit {
                    write!(f, " LIMIT {}", limit)?;
                }
                if stmt.offset > 0 {
                    write!(f, " OFFSET {}", stmt.offset)?;
                }
                Ok(())
            }
            Statement::DropSeries { source, condition } => {
                f.write_str("DROP SERIES")?;
                if let Some(source) = source {
                    write!(f, " FROM {}", source)?;
                }
                write_condition(f, condition)
            }
            Statement::ShowTagKeys { source } => {
                f.write_str("SHOW TAG KEYS")?;
                if let Some(source) = source {
                    write!(f, " FROM {}", source)?;
                }
                Ok(())
            }
            Statement::ShowTagValues { source, key } => {
                f.write_str("SHOW TAG VALUES")?;
                if let Some(source) = source {
                    write!(f, " FROM {}", source)?;
                }
                write!(f, " WITH KEY = \"{}\"", key)
            }
            Statement::ShowMeasurements => f.write_str("SHOW MEASUREMENTS"),
            Statement::ShowDatabases => f.write_str("SHOW DATABASES"),
            Statement::CreateUser { name, admin, .. } => {
                write!(f, "CREATE USER {} WITH PASSWORD [REDACTED]", name)?;
                if *admin {
                    f.write_str(" WITH ALL PRIVILEGES")?;
                }
                Ok(())
            }
            Statement::DropUser { name } => write!(f, "DROP USER {}", name),
            Statement::ShowUsers => f.write_str("SHOW USERS"),
            Statement::Grant {
                privilege,
                on,
                user,
            } => {
                write!(f, "GRANT {}", privilege)?;
                if let Some(db) = on {
                    write!(f, " ON {}", db)?;
                }
                write!(f, " TO {}", user)
            }
        }
    }
}
