//! SQLite persistence for interaction logs and the response cache.

use std::path::Path;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use sectorflux_types::{AggregateMetrics, LogEntry, NewLogEntry};
use tokio::sync::{mpsc, oneshot};

use crate::{Result, SectorFluxError};

/// Most recent rows kept in the `requests` table; older rows are pruned on
/// every insert.
const MAX_HISTORY_ENTRIES: i64 = 100;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    method TEXT,
    endpoint TEXT,
    model TEXT,
    request_body TEXT,
    response_status INTEGER,
    response_body TEXT,
    duration_ms INTEGER,
    prompt_tokens INTEGER DEFAULT 0,
    completion_tokens INTEGER DEFAULT 0,
    prompt_eval_duration_ms INTEGER DEFAULT 0,
    eval_duration_ms INTEGER DEFAULT 0,
    ttft_ms INTEGER DEFAULT 0,
    is_starred INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS cache (
    request_body TEXT PRIMARY KEY,
    response_status INTEGER,
    response_body TEXT
);
"#;

const LOG_COLUMNS: &str = "id, timestamp, method, endpoint, model, request_body, \
     response_status, response_body, duration_ms, prompt_tokens, completion_tokens, \
     prompt_eval_duration_ms, eval_duration_ms, ttft_ms, is_starred";

enum WriteTask {
    Log(NewLogEntry),
    CachePut {
        request_body: String,
        response_status: u16,
        response_body: String,
    },
    Flush(oneshot::Sender<()>),
}

/// Durable log of proxied interactions plus the request→response cache.
///
/// Reads run on the calling thread against a dedicated read connection; all
/// log and cache writes are queued to a single writer thread that owns its own
/// connection. WAL journaling keeps the two from blocking each other. The
/// starred flag is the one exception: it is updated synchronously so the
/// caller can observe the failure.
pub struct Store {
    conn: Mutex<Connection>,
    queue: Mutex<Option<mpsc::UnboundedSender<WriteTask>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    /// Open or create the store at `path` and start the writer thread.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let write_conn =
            Connection::open(path).map_err(|e| SectorFluxError::Init(e.to_string()))?;

        // WAL lets readers run while the writer thread holds the write lock.
        // Falling back to the rollback journal is survivable, so only warn.
        if let Err(e) = write_conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(target: "sectorflux::store", "Failed to enable WAL mode: {e}");
        }
        write_conn
            .execute_batch(SCHEMA)
            .map_err(|e| SectorFluxError::Init(e.to_string()))?;
        write_conn
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| SectorFluxError::Init(e.to_string()))?;

        let read_conn =
            Connection::open(path).map_err(|e| SectorFluxError::Init(e.to_string()))?;
        read_conn
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| SectorFluxError::Init(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = std::thread::Builder::new()
            .name("sectorflux-store-writer".to_string())
            .spawn(move || write_loop(write_conn, rx))
            .map_err(|e| SectorFluxError::Init(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(read_conn),
            queue: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Queue a log row for the writer thread. Never blocks; insert failures
    /// are logged by the writer rather than reported to the caller.
    pub fn submit_log(&self, entry: NewLogEntry) {
        self.submit(WriteTask::Log(entry));
    }

    /// Queue an insert-or-replace of a cached response.
    pub fn cache_put(&self, request_body: String, response_status: u16, response_body: String) {
        self.submit(WriteTask::CachePut {
            request_body,
            response_status,
            response_body,
        });
    }

    fn submit(&self, task: WriteTask) {
        if let Some(tx) = self.queue.lock().unwrap().as_ref() {
            if tx.send(task).is_err() {
                tracing::error!(
                    target: "sectorflux::store",
                    "Writer is gone; dropping queued write"
                );
            }
        }
    }

    /// Wait until every task queued before this call has been executed.
    pub async fn flush(&self) {
        let rx = {
            let queue = self.queue.lock().unwrap();
            let Some(tx) = queue.as_ref() else { return };
            let (ack, rx) = oneshot::channel();
            if tx.send(WriteTask::Flush(ack)).is_err() {
                return;
            }
            rx
        };
        let _ = rx.await;
    }

    /// Drain the queue and stop the writer thread. Idempotent; also runs on
    /// drop.
    pub fn shutdown(&self) {
        // Dropping the sender lets the writer finish the queued tasks and exit.
        self.queue.lock().unwrap().take();
        if let Some(handle) = self.writer.lock().unwrap().take() {
            if handle.join().is_err() {
                tracing::error!(target: "sectorflux::store", "Store writer thread panicked");
            }
        }
    }

    /// Most recent `limit` rows, newest first.
    pub fn get_logs(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM requests ORDER BY id DESC LIMIT ?1"
        ))?;
        let logs = stmt
            .query_map(params![limit], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn get_log(&self, id: i64) -> Result<Option<LogEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM requests WHERE id = ?1"),
                params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Set or clear the starred flag. A missing id is a no-op.
    pub fn set_starred(&self, id: i64, starred: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE requests SET is_starred = ?1 WHERE id = ?2",
            params![starred as i64, id],
        )?;
        Ok(())
    }

    /// Exact-match cache lookup on the raw request body. Lookup failures are
    /// reported as a miss.
    pub fn cache_lookup(&self, request_body: &str) -> Option<(u16, String)> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT response_status, response_body FROM cache WHERE request_body = ?1",
            params![request_body],
            |row| Ok((row.get::<_, i64>(0)? as u16, row.get(1)?)),
        )
        .optional()
        .unwrap_or_else(|e| {
            tracing::error!(target: "sectorflux::store", "Cache lookup failed: {e}");
            None
        })
    }

    /// Compute the aggregate view in three scans: row count, mean latency,
    /// cache-hit count (`duration_ms = 0` rows).
    pub fn aggregate_metrics(&self) -> Result<AggregateMetrics> {
        let conn = self.conn.lock().unwrap();
        let total_requests: i64 =
            conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))?;
        let avg_latency_ms: f64 = conn.query_row(
            "SELECT COALESCE(AVG(duration_ms), 0) FROM requests",
            [],
            |row| row.get(0),
        )?;
        let cache_hits: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE duration_ms = 0",
            [],
            |row| row.get(0),
        )?;

        let cache_hit_rate = if total_requests > 0 {
            cache_hits as f64 / total_requests as f64
        } else {
            0.0
        };

        Ok(AggregateMetrics {
            total_requests,
            avg_latency_ms,
            cache_hit_rate,
        })
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Writer thread body: drain the FIFO queue until every sender is gone, then
/// exit. Each task runs against the writer's own connection, outside any
/// shared lock.
fn write_loop(conn: Connection, mut rx: mpsc::UnboundedReceiver<WriteTask>) {
    while let Some(task) = rx.blocking_recv() {
        match task {
            WriteTask::Log(entry) => {
                if let Err(e) = insert_log(&conn, &entry) {
                    tracing::error!(target: "sectorflux::store", "Async log insert failed: {e}");
                }
            }
            WriteTask::CachePut {
                request_body,
                response_status,
                response_body,
            } => {
                let result = conn.execute(
                    "INSERT OR REPLACE INTO cache (request_body, response_status, response_body) \
                     VALUES (?1, ?2, ?3)",
                    params![request_body, response_status as i64, response_body],
                );
                if let Err(e) = result {
                    tracing::error!(target: "sectorflux::store", "Cache write failed: {e}");
                }
            }
            WriteTask::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

fn insert_log(conn: &Connection, entry: &NewLogEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO requests (method, endpoint, model, request_body, response_status, \
         response_body, duration_ms, prompt_tokens, completion_tokens, \
         prompt_eval_duration_ms, eval_duration_ms, ttft_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            entry.method,
            entry.endpoint,
            entry.model,
            entry.request_body,
            entry.response_status as i64,
            entry.response_body,
            entry.duration_ms,
            entry.prompt_tokens,
            entry.completion_tokens,
            entry.prompt_eval_duration_ms,
            entry.eval_duration_ms,
            entry.ttft_ms,
        ],
    )?;

    // Enforce the history bound. Starred rows are not exempt.
    conn.execute(
        "DELETE FROM requests WHERE id NOT IN \
         (SELECT id FROM requests ORDER BY id DESC LIMIT ?1)",
        params![MAX_HISTORY_ENTRIES],
    )?;
    Ok(())
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        method: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        endpoint: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        model: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        request_body: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        response_status: row.get::<_, i64>(6)? as u16,
        response_body: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        duration_ms: row.get(8)?,
        prompt_tokens: row.get(9)?,
        completion_tokens: row.get(10)?,
        prompt_eval_duration_ms: row.get(11)?,
        eval_duration_ms: row.get(12)?,
        ttft_ms: row.get(13)?,
        is_starred: row.get::<_, i64>(14)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn entry(endpoint: &str, duration_ms: i64) -> NewLogEntry {
        NewLogEntry {
            method: "POST".to_string(),
            endpoint: endpoint.to_string(),
            model: "llama3".to_string(),
            request_body: r#"{"model":"llama3","prompt":"hi"}"#.to_string(),
            response_status: 200,
            response_body: r#"{"done":true}"#.to_string(),
            duration_ms,
            prompt_tokens: 5,
            completion_tokens: 7,
            prompt_eval_duration_ms: 200,
            eval_duration_ms: 400,
            ttft_ms: 12,
        }
    }

    #[tokio::test]
    async fn log_roundtrip() {
        let (store, _dir) = test_store();
        store.submit_log(entry("/api/generate", 42));
        store.flush().await;

        let logs = store.get_logs(50).unwrap();
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert_eq!(log.endpoint, "/api/generate");
        assert_eq!(log.model, "llama3");
        assert_eq!(log.duration_ms, 42);
        assert_eq!(log.prompt_tokens, 5);
        assert_eq!(log.ttft_ms, 12);
        assert!(!log.is_starred);
        assert!(!log.timestamp.is_empty());

        let by_id = store.get_log(log.id).unwrap().unwrap();
        assert_eq!(by_id.response_body, log.response_body);
    }

    #[tokio::test]
    async fn logs_come_back_newest_first() {
        let (store, _dir) = test_store();
        for i in 0..5 {
            store.submit_log(entry(&format!("/api/generate/{i}"), 10 + i));
        }
        store.flush().await;

        let logs = store.get_logs(3).unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs[0].id > logs[1].id && logs[1].id > logs[2].id);
        assert_eq!(logs[0].endpoint, "/api/generate/4");
    }

    #[tokio::test]
    async fn history_is_bounded_to_newest_100() {
        let (store, _dir) = test_store();
        for _ in 0..120 {
            store.submit_log(entry("/api/generate", 10));
        }
        store.flush().await;

        let logs = store.get_logs(500).unwrap();
        assert_eq!(logs.len(), 100);
        // Rows 1..=20 were pruned.
        assert_eq!(logs[0].id, 120);
        assert_eq!(logs[99].id, 21);
        assert!(store.get_log(20).unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_put_lookup_and_replace() {
        let (store, _dir) = test_store();
        let key = r#"{"model":"llama3","prompt":"hi"}"#;

        assert!(store.cache_lookup(key).is_none());

        store.cache_put(key.to_string(), 200, "first".to_string());
        store.flush().await;
        assert_eq!(store.cache_lookup(key), Some((200, "first".to_string())));

        // Colliding key replaces the row.
        store.cache_put(key.to_string(), 200, "second".to_string());
        store.flush().await;
        assert_eq!(store.cache_lookup(key), Some((200, "second".to_string())));

        // Keys are exact bytes; whitespace matters.
        assert!(store.cache_lookup(&format!(" {key}")).is_none());
    }

    #[tokio::test]
    async fn starred_toggle_is_idempotent() {
        let (store, _dir) = test_store();
        store.submit_log(entry("/api/chat", 10));
        store.flush().await;
        let id = store.get_logs(1).unwrap()[0].id;

        store.set_starred(id, true).unwrap();
        store.set_starred(id, true).unwrap();
        assert!(store.get_log(id).unwrap().unwrap().is_starred);

        store.set_starred(id, false).unwrap();
        assert!(!store.get_log(id).unwrap().unwrap().is_starred);

        // Absent id is a no-op, not an error.
        store.set_starred(9999, true).unwrap();
    }

    #[tokio::test]
    async fn metrics_count_cache_hits() {
        let (store, _dir) = test_store();
        for duration in [0, 100, 300, 0] {
            store.submit_log(entry("/api/generate", duration));
        }
        store.flush().await;

        let metrics = store.aggregate_metrics().unwrap();
        assert_eq!(metrics.total_requests, 4);
        assert!((metrics.avg_latency_ms - 100.0).abs() < f64::EPSILON);
        assert!((metrics.cache_hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn metrics_on_empty_store() {
        let (store, _dir) = test_store();
        let metrics = store.aggregate_metrics().unwrap();
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.avg_latency_ms, 0.0);
        assert_eq!(metrics.cache_hit_rate, 0.0);
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        {
            let store = Store::open(&path).unwrap();
            for _ in 0..10 {
                store.submit_log(entry("/api/generate", 10));
            }
            store.shutdown();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.aggregate_metrics().unwrap().total_requests, 10);
    }
}
