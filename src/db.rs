use crate::config::Config;
use anyhow::Result;
use libsql::{Builder, Connection, Database as LibsqlDatabase, Value};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// SQL expression for the millisecond UTC timestamps stored in every table.
pub const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_catalog.sql", include_str!("migrations/001_catalog.sql"))];

pub struct Database {
    _db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = format!("INSERT INTO _migrations (name, applied_at) VALUES (?, {NOW})");
        conn.execute(&query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());
        let db = match (cfg.app.turso_url.clone(), cfg.app.turso_auth_token.clone()) {
            (Some(url), Some(token)) => {
                tracing::info!("[db] running in synced database mode (offline writes)");
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                Builder::new_synced_database(&path, url, token)
                    .sync_interval(sync_interval)
                    .build()
                    .await?
            }
            _ => Builder::new_local(&path).build().await?,
        };

        Self::setup(db).await
    }

    /// Private in-memory database with the full schema applied.
    pub async fn in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::setup(db).await
    }

    async fn setup(db: LibsqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::retail::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::uploads::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in crate::users::migrations() {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            _db: db,
            conn,
            tx_lock: Mutex::new(()),
        })
    }

    /// Serialises multi-statement writes on the shared connection. Hold the
    /// guard across `begin` .. `finish`.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.tx_lock.lock().await
    }

    pub async fn begin(&self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        Ok(())
    }

    /// Commits on `Ok`, rolls back on `Err`.
    pub async fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.conn.execute("COMMIT", ()).await?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    pub async fn exists(&self, table: &str, id: i64) -> Result<bool> {
        let query = format!("SELECT 1 FROM {table} WHERE id = ? LIMIT 1");
        let mut rows = self.conn.query(&query, libsql::params![id]).await?;
        Ok(rows.next().await?.is_some())
    }

    pub async fn count(&self, query: &str, params: Vec<Value>) -> Result<i64> {
        let mut rows = self.conn.query(query, params).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

/// WHERE-clause builder shared by the list queries and their counts.
#[derive(Debug, Default, Clone)]
pub struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<Value> {
        self.params.clone()
    }
}

/// Case-insensitive substring pattern for `LOWER(col) LIKE ? ESCAPE '\'`.
pub fn like_pattern(term: &str) -> Value {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    Value::Text(escaped)
}

pub fn split_ids(s: Option<String>) -> Vec<i64> {
    let mut ids: Vec<i64> = s
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn applies_migrations_once() {
        let db = Database::in_memory().await.unwrap();

        let applied = db.count("SELECT COUNT(*) FROM _migrations", vec![]).await.unwrap();
        assert!(applied >= 5);

        for (filename, sql) in MIGRATIONS {
            Database::run_migration(db.connection(), filename, sql).await.unwrap();
        }
        let again = db.count("SELECT COUNT(*) FROM _migrations", vec![]).await.unwrap();
        assert_eq!(applied, again);
    }

    #[tokio::test]
    async fn rolls_back_failed_transactions() {
        let db = Database::in_memory().await.unwrap();

        let _guard = db.lock().await;
        db.begin().await.unwrap();
        let result: Result<()> = async {
            db.connection()
                .execute("INSERT INTO publishers (name) VALUES ('Tor')", ())
                .await?;
            anyhow::bail!("abort")
        }
        .await;
        assert!(db.finish(result).await.is_err());

        let count = db.count("SELECT COUNT(*) FROM publishers", vec![]).await.unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn builds_where_clauses() {
        let mut filter = Filter::new();
        assert_eq!(filter.where_sql(), "");

        filter.push("a = ?", [Value::Integer(1)]);
        filter.push("b = ?", [Value::Integer(2)]);
        assert_eq!(filter.where_sql(), "WHERE a = ? AND b = ?");
        assert_eq!(filter.params().len(), 2);
    }

    #[test]
    fn escapes_like_wildcards() {
        assert!(matches!(like_pattern("Ln-V7"), Value::Text(s) if s == "%ln-v7%"));
        assert!(matches!(like_pattern("50%_off"), Value::Text(s) if s == "%50\\%\\_off%"));
    }

    #[test]
    fn splits_concatenated_ids() {
        assert_eq!(split_ids(Some("3,1, 2".to_string())), vec![1, 2, 3]);
        assert!(split_ids(None).is_empty());
    }
}
