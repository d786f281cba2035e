use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use super::backend::StateBackend;
use super::models::{ResourceIdentity, ResourceRecord};

const CREATE_TABLES_SQL: &str = "
    CREATE TABLE IF NOT EXISTS resources (
        address TEXT PRIMARY KEY,
        scope_chain TEXT NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        record_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_resources_scope_chain
        ON resources (scope_chain);
";

/// SQLite-backed state store for local development and single-user runs.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create the state database.
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(dir) = Path::new(db_path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open state database at {}", db_path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl StateBackend for SqliteBackend {
    async fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(CREATE_TABLES_SQL)?;
        Ok(())
    }

    async fn get(&self, identity: &ResourceIdentity) -> Result<Option<ResourceRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT record_json FROM resources WHERE address = ?1")?;
        let json: Option<String> = stmt
            .query_row(params![identity.address()], |row| row.get(0))
            .ok();
        match json {
            Some(json) => {
                let record: ResourceRecord = serde_json::from_str(&json).with_context(|| {
                    format!("Corrupt state record for {}", identity.address())
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, record: &ResourceRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO resources (address, scope_chain, kind, status, record_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(address) DO UPDATE SET
                scope_chain = excluded.scope_chain,
                kind = excluded.kind,
                status = excluded.status,
                record_json = excluded.record_json,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                record.address(),
                record.identity.scope_chain.join("/"),
                record.identity.kind,
                record.status.to_string(),
                json,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn delete(&self, identity: &ResourceIdentity) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM resources WHERE address = ?1",
            params![identity.address()],
        )?;
        Ok(())
    }

    async fn list(&self, scope_prefix: &[String]) -> Result<Vec<ResourceRecord>> {
        let conn = self.conn.lock().unwrap();
        let rows: Vec<String> = if scope_prefix.is_empty() {
            let mut stmt =
                conn.prepare("SELECT record_json FROM resources ORDER BY address")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        } else {
            // Match whole chain segments: "app" must not match "app2/...".
            let joined = scope_prefix.join("/");
            let mut stmt = conn.prepare(
                "SELECT record_json FROM resources
                 WHERE scope_chain = ?1 OR scope_chain LIKE ?1 || '/%'
                 ORDER BY address",
            )?;
            let rows = stmt
                .query_map(params![joined], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.iter()
            .map(|json| {
                serde_json::from_str(json).context("Corrupt state record in listing")
            })
            .collect()
    }
}
