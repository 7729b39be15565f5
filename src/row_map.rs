//! Column-name access to result rows.

use crate::{Col, Value};

/// One result row seen as a column → value mapping.
///
/// Borrowed from a [`crate::ResultSet`]; lookups by name ignore ASCII case
/// and resolve to the first matching column.
#[derive(Clone, Copy, Debug)]
pub struct RowRef<'a> {
    pub cols: &'a [Col],
    pub values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        let idx = self
            .cols
            .iter()
            .position(|col| col.name.eq_ignore_ascii_case(name))?;
        self.values.get(idx)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Float(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn get_text(&self, name: &str) -> Option<&'a str> {
        self.get(name)?.as_text()
    }

    /// Pairs of column name and value, in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.cols
            .iter()
            .map(|col| col.name.as_str())
            .zip(self.values.iter())
    }
}
