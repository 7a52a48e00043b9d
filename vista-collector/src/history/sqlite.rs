/**
 * HISTORY SQLITE - Implémentation SQLite du journal d'uploads
 *
 * FONCTIONNEMENT :
 * - Une table (la "collection" configurée) : une ligne par upload, document JSON complet
 * - Connexion ouverte paresseusement au premier append : une base inaccessible
 *   ne bloque pas le démarrage, l'erreur apparaît (et est loggée) au premier usage
 * - `_id` = UUID v4 attribué ici, stocké dans le document et dans sa propre colonne
 */

use super::{HistoryError, HistoryStore, RECORD_ID_FIELD};
use crate::models::{Report, HOSTNAME_FIELD, RECEIVED_AT_FIELD};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

pub struct SqliteHistory {
    database: PathBuf,
    table: String,
    conn: Mutex<Option<Connection>>,
}

impl SqliteHistory {
    /// `table` doit être un identifiant SQL valide (vérifié par `CollectorConfig::validate`).
    pub fn new<P: Into<PathBuf>>(database: P, table: &str) -> Self {
        Self {
            database: database.into(),
            table: table.to_string(),
            conn: Mutex::new(None),
        }
    }

    fn open(&self) -> Result<Connection, HistoryError> {
        if let Some(parent) = self.database.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.database)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                record_id TEXT NOT NULL UNIQUE,
                hostname TEXT NOT NULL,
                received_at TEXT,
                document TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{t}_hostname ON {t}(hostname);",
            t = self.table
        ))?;
        info!(database = %self.database.display(), table = %self.table, "history store opened");
        Ok(conn)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, HistoryError>,
    ) -> Result<T, HistoryError> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(HistoryError::Unavailable(self.database.display().to_string())),
        }
    }
}

fn text_field(report: &Report, key: &str) -> Option<String> {
    report.get(key).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

impl HistoryStore for SqliteHistory {
    fn append(&self, report: &Report) -> Result<String, HistoryError> {
        let id = Uuid::new_v4().to_string();

        let mut document = report.clone();
        document.insert(RECORD_ID_FIELD.into(), Value::String(id.clone()));
        let json = serde_json::to_string(&document)?;

        let hostname = text_field(report, HOSTNAME_FIELD).unwrap_or_default();
        let received_at = text_field(report, RECEIVED_AT_FIELD);

        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (record_id, hostname, received_at, document) VALUES (?1, ?2, ?3, ?4)",
                    self.table
                ),
                params![id, hostname, received_at, json],
            )?;
            Ok(())
        })?;

        debug!(record_id = %id, %hostname, "history record appended");
        Ok(id)
    }

    fn count(&self) -> Result<u64, HistoryError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        })
    }

    fn recent_for(&self, hostname: &str, limit: usize) -> Result<Vec<Report>, HistoryError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT document FROM {} WHERE hostname = ?1 ORDER BY seq DESC LIMIT ?2",
                self.table
            ))?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt.query_map(params![hostname, limit], |row| row.get::<_, String>(0))?;

            let mut out = Vec::new();
            for doc in rows {
                out.push(serde_json::from_str(&doc?)?);
            }
            Ok(out)
        })
    }
}
