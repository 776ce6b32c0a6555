//! `SQLite`-backed analysis storage for persistence.

use crate::classify::ThreatLevel;
use crate::record::AnalysisRecord;
use crate::store::{AnalysisQuery, AnalysisStorage, ThreatStats};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::error;

const COLUMNS: &str = "id, created_at, subject, sender, recipient, body, threat_level, \
                       confidence_score, analysis_summary, indicators";

/// `SQLite`-backed analysis store with persistence.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    max: usize,
}

impl SqliteStore {
    /// Create or open a `SQLite` database at the given path.
    ///
    /// # Errors
    /// Fails if the database cannot be opened or the schema cannot be created.
    pub fn open(path: &str, max: usize) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS analyses (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT,
                body TEXT NOT NULL,
                threat_level TEXT NOT NULL,
                confidence_score INTEGER NOT NULL,
                analysis_summary TEXT NOT NULL,
                indicators TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_level ON analyses(threat_level);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            max,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enforce_max(&self, conn: &Connection) {
        let result = conn.execute(
            "DELETE FROM analyses WHERE seq NOT IN (SELECT seq FROM analyses ORDER BY seq DESC LIMIT ?)",
            params![self.max],
        );
        if let Err(e) = result {
            error!("Failed to trim analysis history: {e}");
        }
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisRecord> {
        let level: String = row.get(6)?;
        let threat_level = level
            .parse::<ThreatLevel>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
        let indicators_json: String = row.get(9)?;

        Ok(AnalysisRecord {
            id: row.get(0)?,
            created_at: row.get(1)?,
            subject: row.get(2)?,
            sender: row.get(3)?,
            recipient: row.get(4)?,
            body: row.get(5)?,
            threat_level,
            confidence_score: row.get(7)?,
            analysis_summary: row.get(8)?,
            indicators: serde_json::from_str(&indicators_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
            })?,
        })
    }

    fn select(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Vec<AnalysisRecord> {
        let mut stmt = match conn.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Failed to prepare history query: {e}");
                return Vec::new();
            }
        };

        stmt.query_map(params, Self::row_to_record)
            .map(|rows| {
                rows.filter_map(|row| {
                    row.map_err(|e| error!("Skipping unreadable analysis row: {e}"))
                        .ok()
                })
                .collect()
            })
            .unwrap_or_default()
    }
}

#[allow(clippy::significant_drop_tightening)]
impl AnalysisStorage for SqliteStore {
    fn push(&self, record: AnalysisRecord) {
        let conn = self.lock();
        let indicators_json = serde_json::to_string(&record.indicators).unwrap_or_default();

        let result = conn.execute(
            &format!("INSERT INTO analyses ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                record.id,
                record.created_at,
                record.subject,
                record.sender,
                record.recipient,
                record.body,
                record.threat_level.as_str(),
                record.confidence_score,
                record.analysis_summary,
                indicators_json,
            ],
        );

        match result {
            Ok(_) => self.enforce_max(&conn),
            Err(e) => error!("Failed to store analysis {}: {e}", record.id),
        }
    }

    fn query(&self, query: &AnalysisQuery) -> Vec<AnalysisRecord> {
        let conn = self.lock();

        let mut sql = format!("SELECT {COLUMNS} FROM analyses");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(level) = query.threat_level {
            sql.push_str(" WHERE threat_level = ?");
            params_vec.push(Box::new(level.as_str()));
        }

        sql.push_str(" ORDER BY seq DESC");

        // Search is applied in Rust so case folding and literal matching agree
        // with the in-memory store.
        let searching = query
            .search
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());

        if let Some(limit) = query.limit.filter(|_| !searching) {
            sql.push_str(" LIMIT ?");
            params_vec.push(Box::new(limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(AsRef::as_ref).collect();
        let records = Self::select(&conn, &sql, &params_refs);

        if searching {
            records
                .into_iter()
                .filter(|r| query.matches(r))
                .take(query.limit.unwrap_or(usize::MAX))
                .collect()
        } else {
            records
        }
    }

    fn get_by_id(&self, id: &str) -> Option<AnalysisRecord> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {COLUMNS} FROM analyses WHERE id = ?"))
            .ok()?;
        match stmt.query_row(params![id], Self::row_to_record) {
            Ok(record) => Some(record),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                error!("Failed to read analysis {id}: {e}");
                None
            }
        }
    }

    fn remove(&self, id: &str) -> bool {
        let conn = self.lock();
        conn.execute("DELETE FROM analyses WHERE id = ?", params![id])
            .map(|n| n > 0)
            .unwrap_or(false)
    }

    fn clear(&self) {
        let conn = self.lock();
        if let Err(e) = conn.execute("DELETE FROM analyses", []) {
            error!("Failed to clear analysis history: {e}");
        }
    }

    fn stats(&self) -> ThreatStats {
        let conn = self.lock();
        let Ok(mut stmt) = conn.prepare("SELECT threat_level FROM analyses") else {
            return ThreatStats::default();
        };
        stmt.query_map([], |row| row.get::<_, String>(0))
            .map(|rows| {
                rows.filter_map(Result::ok)
                    .filter_map(|level| level.parse::<ThreatLevel>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn close(&self) {
        let conn = self.lock();
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        tracing::info!("SQLite database checkpointed and ready for shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AnalysisStore;

    fn record(id: &str, subject: &str, level: ThreatLevel) -> AnalysisRecord {
        AnalysisRecord {
            id: id.to_string(),
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            subject: subject.to_string(),
            sender: "someone@example.com".to_string(),
            recipient: None,
            body: "body".to_string(),
            threat_level: level,
            confidence_score: 80,
            analysis_summary: "summary".to_string(),
            indicators: vec!["one".to_string(), "two".to_string()],
        }
    }

    #[test]
    fn filters_and_orders_newest_first() {
        let store = SqliteStore::open(":memory:", 10).unwrap();
        store.push(record("a", "Invoice overdue", ThreatLevel::Phishing));
        store.push(record("b", "Team lunch", ThreatLevel::Safe));
        store.push(record("c", "Reset your password", ThreatLevel::Phishing));

        let all = store.query(&AnalysisQuery::default());
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
        assert_eq!(all[0].indicators, ["one", "two"]);

        let phishing = store.query(&AnalysisQuery {
            threat_level: Some(ThreatLevel::Phishing),
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(phishing.len(), 1);
        assert_eq!(phishing[0].id, "c");

        let searched = store.query(&AnalysisQuery {
            search: Some("INVOICE".to_string()),
            ..Default::default()
        });
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].id, "a");

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.phishing, 2);
        assert_eq!(stats.safe, 1);
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let store = SqliteStore::open(":memory:", 2).unwrap();
        for id in ["a", "b", "c"] {
            store.push(record(id, "s", ThreatLevel::Safe));
        }
        assert!(store.get_by_id("a").is_none());
        assert!(store.get_by_id("c").is_some());
        assert!(store.remove("b"));
        assert!(!store.remove("b"));
        store.clear();
        assert_eq!(store.stats(), ThreatStats::default());
    }

    fn ids(store: &dyn AnalysisStorage, query: &AnalysisQuery) -> Vec<String> {
        store.query(query).into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn search_matches_in_memory_store() {
        let sqlite = SqliteStore::open(":memory:", 10).unwrap();
        let memory = AnalysisStore::new(10);
        for store in [&sqlite as &dyn AnalysisStorage, &memory] {
            store.push(record("a", "Quarterly report", ThreatLevel::Safe));
            store.push(record("b", "50% off_today", ThreatLevel::Suspicious));
            store.push(record("c", "ÉTÉ sale", ThreatLevel::Phishing));
        }

        for needle in ["%", "_", "50%", "été", "REPORT", "nothing"] {
            let query = AnalysisQuery {
                search: Some(needle.to_string()),
                ..Default::default()
            };
            assert_eq!(ids(&sqlite, &query), ids(&memory, &query), "search {needle:?}");
        }

        let literal = sqlite.query(&AnalysisQuery {
            search: Some("%".to_string()),
            ..Default::default()
        });
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].id, "b");

        let limited = sqlite.query(&AnalysisQuery {
            search: Some("a".to_string()),
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "c");
    }

    #[test]
    fn corrupt_indicators_are_not_read_as_empty() {
        let store = SqliteStore::open(":memory:", 10).unwrap();
        store.push(record("a", "s", ThreatLevel::Safe));
        store
            .lock()
            .execute("UPDATE analyses SET indicators = 'not json' WHERE id = 'a'", [])
            .unwrap();

        assert!(store.get_by_id("a").is_none());
        assert!(store.query(&AnalysisQuery::default()).is_empty());
    }
}
