//! SQLite backend over `rusqlite`.

use std::path::{Path, PathBuf};

use log::{debug, info};
use rusqlite::{Connection, params_from_iter, types::Value};
use rust_decimal::prelude::ToPrimitive;

use super::{Database, DbColumn, DbError, DbResult, SqlDialect};
use crate::value::{SqlValue, TIMESTAMP_FORMAT};

const MEMORY: &str = ":memory:";

pub struct SqliteDatabase {
    path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MEMORY)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> DbResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbError::new("database is not connected"))
    }
}

fn to_sql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Decimal(d) => match (d.fract().is_zero(), d.to_i64()) {
            (true, Some(i)) => Value::Integer(i),
            _ => d.to_f64().map(Value::Real).unwrap_or(Value::Null),
        },
        SqlValue::Real(f) if f.is_finite() => Value::Real(*f),
        SqlValue::Real(_) => Value::Null,
        SqlValue::Boolean(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(ts) => Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn connect(&mut self) -> DbResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = if self.path.as_os_str() == MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(&self.path)?
        };
        info!("Connected to SQLite database {:?}", self.path);
        self.conn = Some(conn);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                debug!("Closing SQLite connection failed: {err}");
            }
            debug!("Disconnected from {:?}", self.path);
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn ping(&mut self) -> DbResult<()> {
        let one: i64 = self.conn()?.query_row("SELECT 1", [], |row| row.get(0))?;
        if one == 1 {
            Ok(())
        } else {
            Err(DbError::new(format!("unexpected ping result {one}")))
        }
    }

    fn table_exists(&mut self, name: &str) -> DbResult<bool> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND upper(name) = upper(?1)",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn get_columns(&mut self, name: &str) -> DbResult<Vec<DbColumn>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(name)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(DbColumn {
                    name: row.get::<_, String>(1)?,
                    data_type: row.get::<_, String>(2)?,
                    nullable: row.get::<_, i64>(3)? == 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<usize> {
        let conn = self.conn()?;
        let affected = conn.execute(sql, params_from_iter(params.iter().map(to_sql_value)))?;
        Ok(affected)
    }

    fn execute_many(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> DbResult<usize> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let mut affected = 0;
        for row in rows {
            affected += stmt.execute(params_from_iter(row.iter().map(to_sql_value)))?;
        }
        Ok(affected)
    }

    fn begin(&mut self) -> DbResult<()> {
        self.conn()?.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        self.conn()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.conn()?.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        self.disconnect();
    }
}
