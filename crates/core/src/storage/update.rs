//! Partial UPDATE statement builder
//!
//! Patches only name the columns they touch, so the SET list is assembled at
//! runtime. Column names are always static strings from this crate.

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use super::parse::format_datetime;
use crate::error::Result;

pub struct Update {
    table: &'static str,
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl Update {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) -> &mut Self {
        self.columns.push(column);
        self.values.push(value.into());
        self
    }

    /// Run the update against rows where `column = key`, returning rows changed
    pub fn execute_where(
        mut self,
        conn: &Connection,
        column: &'static str,
        key: impl Into<Value>,
    ) -> Result<usize> {
        self.set("updated_at", format_datetime(Utc::now()));

        let assignments = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            self.table,
            assignments,
            column,
            self.values.len() + 1
        );

        self.values.push(key.into());
        let changed = conn.execute(&sql, params_from_iter(self.values))?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_touches_named_columns_only() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id TEXT PRIMARY KEY, a TEXT, b INTEGER, updated_at TEXT);
             INSERT INTO t VALUES ('x', 'keep', 1, NULL);",
        )
        .unwrap();

        let mut update = Update::new("t");
        update.set("b", 7i64);
        let changed = update.execute_where(&conn, "id", "x".to_string()).unwrap();
        assert_eq!(changed, 1);

        let (a, b, stamped): (String, i64, Option<String>) = conn
            .query_row("SELECT a, b, updated_at FROM t", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!(a, "keep");
        assert_eq!(b, 7);
        assert!(stamped.is_some());
    }

    #[test]
    fn test_update_missing_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY, a TEXT, updated_at TEXT);")
            .unwrap();

        let mut update = Update::new("t");
        update.set("a", Value::Null);
        let changed = update.execute_where(&conn, "id", "nope".to_string()).unwrap();
        assert_eq!(changed, 0);
    }
}
