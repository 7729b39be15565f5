use crate::{row_map::RowRef, BunnyDbError, Result, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Col {
    pub name: String,
    pub decltype: Option<String>,
}

/// Engine-reported metadata about one statement execution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionStats {
    pub affected_row_count: u64,
    pub last_insert_rowid: Option<i64>,
    pub replication_index: Option<String>,
    pub rows_read: Option<u64>,
    pub rows_written: Option<u64>,
    pub query_duration_ms: Option<f64>,
}

/// Columns and rows returned by one statement.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultSet {
    pub cols: Vec<Col>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub stats: ExecutionStats,
}

impl ResultSet {
    /// Returns a name-addressable view of the row at `index`.
    pub fn row(&self, index: usize) -> Option<RowRef<'_>> {
        self.rows.get(index).map(|values| RowRef {
            cols: &self.cols,
            values,
        })
    }

    /// Iterates all rows as name-addressable views.
    pub fn iter_rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|values| RowRef {
            cols: &self.cols,
            values,
        })
    }
}

/// Statement rejected by the database engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryError {
    /// Position of the statement inside its run.
    pub statement_index: usize,
    pub message: String,
    pub code: Option<String>,
    /// SQL text that produced the error.
    pub sql: String,
}

/// Result of submitting one statement.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutcome {
    Rows(ResultSet),
    Error(QueryError),
}

impl QueryOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Rows(_))
    }

    pub fn result_set(&self) -> Option<&ResultSet> {
        match self {
            Self::Rows(result) => Some(result),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            Self::Rows(_) => None,
            Self::Error(error) => Some(error),
        }
    }

    /// Converts an engine rejection into [`BunnyDbError::Sql`].
    pub fn into_result_set(self) -> Result<ResultSet> {
        match self {
            Self::Rows(result) => Ok(result),
            Self::Error(error) => Err(BunnyDbError::Sql {
                message: error.message,
                code: error.code,
            }),
        }
    }
}

/// Table entry from the schema listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaItem {
    pub name: String,
}
