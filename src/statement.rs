use std::fmt;
use std::sync::Arc;

use crate::types::RowValues;

/// A SQL statement and its parameters, opaque to the transaction machinery.
///
/// Cloning is cheap: the SQL text is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: Arc<str>,
    params: Vec<RowValues>,
}

impl Statement {
    #[must_use]
    pub fn new(sql: impl AsRef<str>) -> Self {
        Self {
            sql: Arc::from(sql.as_ref()),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_params(sql: impl AsRef<str>, params: Vec<RowValues>) -> Self {
        Self {
            sql: Arc::from(sql.as_ref()),
            params,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[RowValues] {
        &self.params
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
