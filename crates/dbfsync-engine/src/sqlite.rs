//! `SQLite`-backed reference implementation of [`Sink`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Serves as the
//! in-tree sink for integration tests and small deployments; production
//! sinks for other dialects implement the same trait out of tree.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use dbfsync_types::{Key, Record, RunAuditRecord, SinkError, Value};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::sink::{Sink, SinkConnector};

/// Upper bound on bound parameters per bulk fingerprint lookup. Key sets
/// larger than this are read in several bulk queries, never per-key.
const MAX_LOOKUP_PARAMS: usize = 900;

/// Idempotent DDL for the audit table.
const CREATE_AUDIT_TABLE: &str = "
CREATE TABLE IF NOT EXISTS sync_audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id TEXT NOT NULL,
    sync_time TEXT NOT NULL,
    rows_processed INTEGER NOT NULL,
    rows_upserted INTEGER NOT NULL,
    elapsed_seconds REAL NOT NULL,
    chunk_size INTEGER NOT NULL,
    mem_used_mb REAL NOT NULL
);
";

/// `SQLite` sink over one pooled connection.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open or create a `SQLite` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns a `Connection`-kind [`SinkError`] when the file cannot be
    /// opened.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let conn = Connection::open(path)
            .map_err(|e| SinkError::connection(format!("open {}: {e}", path.display())))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory sink (for testing).
    ///
    /// # Errors
    ///
    /// Returns a `Connection`-kind [`SinkError`] when the database cannot
    /// be initialized.
    pub fn in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SinkError::connection(format!("open in-memory: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run raw DDL, for provisioning target tables.
    ///
    /// # Errors
    ///
    /// Returns the classified [`SinkError`] on failure.
    pub fn execute_batch(&self, sql: &str) -> Result<(), SinkError> {
        let conn = self.lock_conn()?;
        conn.execute_batch(sql).map_err(classify)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        self.conn
            .lock()
            .map_err(|_| SinkError::other("sink connection lock poisoned"))
    }

    /// Column names of `table`, erroring with `Schema` when it is absent.
    fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, SinkError> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(classify)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    notnull: row.get::<_, i64>(3)? != 0,
                    pk_position: row.get::<_, i64>(5)?,
                })
            })
            .map_err(classify)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(classify)?;
        if columns.is_empty() {
            return Err(SinkError::schema(format!("no such table: {table}")));
        }
        Ok(columns)
    }

    fn require_columns(
        columns: &[ColumnInfo],
        table: &str,
        required: impl Iterator<Item = String>,
    ) -> Result<(), SinkError> {
        for name in required {
            if !columns
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&name))
            {
                return Err(SinkError::schema(format!(
                    "table '{table}' is missing expected column '{name}'"
                )));
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn audit_rows(&self) -> Vec<(String, i64, i64)> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT entry_id, rows_processed, rows_upserted FROM sync_audit_log ORDER BY id",
            )
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }
}

impl Sink for SqliteSink {
    fn ping(&self) -> Result<(), SinkError> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(classify)
    }

    fn fetch_fingerprints(
        &self,
        table: &str,
        key_fields: &[String],
        fingerprint_field: &str,
        keys: &[Key],
    ) -> Result<HashMap<Key, String>, SinkError> {
        let conn = self.lock_conn()?;
        let columns = Self::table_columns(&conn, table)?;
        Self::require_columns(
            &columns,
            table,
            key_fields
                .iter()
                .cloned()
                .chain(std::iter::once(fingerprint_field.to_string())),
        )?;

        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let key_list = key_fields
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        let keys_per_query = (MAX_LOOKUP_PARAMS / key_fields.len().max(1)).max(1);

        let mut found = HashMap::new();
        for batch in keys.chunks(keys_per_query) {
            let row_placeholder = format!(
                "({})",
                vec!["?"; key_fields.len()].join(", ")
            );
            let sql = format!(
                "SELECT {key_list}, {fp} FROM {tbl} WHERE ({key_list}) IN (VALUES {rows})",
                fp = quote_ident(fingerprint_field),
                tbl = quote_ident(table),
                rows = vec![row_placeholder.as_str(); batch.len()].join(", "),
            );
            let params: Vec<&dyn rusqlite::ToSql> = batch
                .iter()
                .flat_map(|key| key.parts().iter().map(|p| p as &dyn rusqlite::ToSql))
                .collect();

            let mut stmt = conn.prepare(&sql).map_err(classify)?;
            let mut rows = stmt.query(params.as_slice()).map_err(classify)?;
            while let Some(row) = rows.next().map_err(classify)? {
                let mut parts = Vec::with_capacity(key_fields.len());
                for i in 0..key_fields.len() {
                    parts.push(canonical_column_text(row.get_ref(i).map_err(classify)?));
                }
                let fingerprint: String = row.get(key_fields.len()).map_err(classify)?;
                found.insert(Key::new(parts), fingerprint);
            }
        }
        Ok(found)
    }

    fn upsert_chunk(
        &self,
        table: &str,
        key_fields: &[String],
        records: &[Record],
    ) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        // Column list is the union across the chunk, in first-appearance
        // order; a record lacking a column binds NULL for it.
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for name in record.field_names() {
                if !columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                    columns.push(name.to_string());
                }
            }
        }
        let non_key: Vec<&String> = columns
            .iter()
            .filter(|c| !key_fields.iter().any(|k| k.eq_ignore_ascii_case(c)))
            .collect();

        let col_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let conflict_cols = key_fields
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        let conflict_action = if non_key.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!(
                "DO UPDATE SET {}",
                non_key
                    .iter()
                    .map(|c| format!("{col} = excluded.{col}", col = quote_ident(c)))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        let sql = format!(
            "INSERT INTO {tbl} ({col_list}) VALUES ({placeholders}) \
             ON CONFLICT({conflict_cols}) {conflict_action}",
            tbl = quote_ident(table),
        );

        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction().map_err(classify)?;
        {
            let mut stmt = tx.prepare(&sql).map_err(classify)?;
            for record in records {
                let params: Vec<rusqlite::types::Value> = columns
                    .iter()
                    .map(|c| {
                        let value = record.get(c).unwrap_or(&Value::Null);
                        if key_fields.iter().any(|k| k.eq_ignore_ascii_case(c)) {
                            to_sql_key_value(value)
                        } else {
                            to_sql_value(value)
                        }
                    })
                    .collect();
                stmt.execute(rusqlite::params_from_iter(params))
                    .map_err(classify)?;
            }
        }
        tx.commit().map_err(classify)
    }

    fn widen_text_columns(&self, table: &str) -> Result<(), SinkError> {
        let conn = self.lock_conn()?;
        let columns = Self::table_columns(&conn, table)?;

        let mut defs = Vec::with_capacity(columns.len());
        for col in &columns {
            let decl = col.decl_type.to_ascii_uppercase();
            let widened = if decl.contains("CHAR") || decl.contains("CLOB") {
                "TEXT".to_string()
            } else {
                col.decl_type.clone()
            };
            let mut def = format!("{} {}", quote_ident(&col.name), widened);
            if col.notnull {
                def.push_str(" NOT NULL");
            }
            defs.push(def);
        }
        let mut pk_cols: Vec<&ColumnInfo> =
            columns.iter().filter(|c| c.pk_position > 0).collect();
        pk_cols.sort_by_key(|c| c.pk_position);
        if !pk_cols.is_empty() {
            defs.push(format!(
                "PRIMARY KEY ({})",
                pk_cols
                    .iter()
                    .map(|c| quote_ident(&c.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        let staging = format!("{table}__widen");
        tracing::warn!(table, "Rebuilding table with widened text columns");
        let rebuild = format!(
            "BEGIN;\n\
             CREATE TABLE {stg} ({defs});\n\
             INSERT INTO {stg} SELECT * FROM {tbl};\n\
             DROP TABLE {tbl};\n\
             ALTER TABLE {stg} RENAME TO {tbl};\n\
             COMMIT;",
            stg = quote_ident(&staging),
            tbl = quote_ident(table),
            defs = defs.join(", "),
        );
        conn.execute_batch(&rebuild).map_err(classify)
    }

    fn append_audit(&self, record: &RunAuditRecord) -> Result<(), SinkError> {
        let conn = self.lock_conn()?;
        conn.execute_batch(CREATE_AUDIT_TABLE).map_err(classify)?;
        #[allow(clippy::cast_possible_wrap)]
        conn.execute(
            "INSERT INTO sync_audit_log \
             (entry_id, sync_time, rows_processed, rows_upserted, elapsed_seconds, chunk_size, mem_used_mb) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.entry_id.as_str(),
                record.sync_time.to_rfc3339(),
                record.rows_processed as i64,
                record.rows_upserted as i64,
                record.elapsed_seconds,
                record.chunk_size as i64,
                record.mem_used_mb,
            ],
        )
        .map_err(classify)?;
        Ok(())
    }
}

/// Opens a [`SqliteSink`] at a fixed path on every `connect` call.
pub struct SqliteSinkConnector {
    path: std::path::PathBuf,
}

impl SqliteSinkConnector {
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SinkConnector for SqliteSinkConnector {
    fn connect(&self) -> Result<Box<dyn Sink>, SinkError> {
        Ok(Box::new(SqliteSink::open(&self.path)?))
    }
}

struct ColumnInfo {
    name: String,
    decl_type: String,
    notnull: bool,
    pk_position: i64,
}

/// Double-quote an identifier, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Key columns are stored in canonical form so fingerprint lookups,
/// which bind canonicalized key parts, compare equal against them.
fn to_sql_key_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Text(s) => rusqlite::types::Value::Text(s.trim().to_string()),
        other => to_sql_value(other),
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(f) => rusqlite::types::Value::Real(*f),
        Value::Date(d) => rusqlite::types::Value::Text(d.format("%Y-%m-%d").to_string()),
    }
}

/// Render a stored column value in the same canonical form the engine
/// uses when building keys from records.
fn canonical_column_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => Value::Real(f).canonical_text(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).trim().to_string(),
        ValueRef::Blob(b) => hex::encode(b),
    }
}

/// Map a `rusqlite` failure onto the engine's sink taxonomy.
fn classify(err: rusqlite::Error) -> SinkError {
    let message = err.to_string();
    if let rusqlite::Error::SqliteFailure(ffi, _) = &err {
        match ffi.code {
            rusqlite::ErrorCode::DatabaseBusy
            | rusqlite::ErrorCode::DatabaseLocked
            | rusqlite::ErrorCode::CannotOpen
            | rusqlite::ErrorCode::SystemIoFailure => return SinkError::connection(message),
            rusqlite::ErrorCode::TooBig => return SinkError::data_too_long(message),
            _ => {}
        }
    }
    if message.contains("no such table") || message.contains("no such column") || message.contains("has no column") {
        return SinkError::schema(message);
    }
    SinkError::other(message)
}
