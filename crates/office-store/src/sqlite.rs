//! SQLite-backed task and audit stores.
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`)
//! so that string comparison in SQL matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use office_types::{
    AuditFilter, AuditLog, AuditStore, Comment, StatusHistory, StoreError, Task, TaskId, TaskScope,
    TaskStore, UnknownVariant,
};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::str::FromStr;

const TASK_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        description TEXT NOT NULL,
        deadline TEXT,
        deadline_type TEXT NOT NULL,
        status TEXT NOT NULL,
        task_type TEXT NOT NULL,
        assigned_to INTEGER,
        created_by INTEGER NOT NULL,
        linked_document INTEGER,
        processing_content TEXT NOT NULL DEFAULT '',
        processing_notes TEXT NOT NULL DEFAULT '',
        completion_date TEXT,
        report_file TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    );

    CREATE TABLE IF NOT EXISTS task_status_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        old_status TEXT NOT NULL DEFAULT '',
        new_status TEXT NOT NULL,
        changed_by INTEGER NOT NULL,
        notes TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        user_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        deleted_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);
    CREATE INDEX IF NOT EXISTS idx_history_task ON task_status_history(task_id);
    CREATE INDEX IF NOT EXISTS idx_comments_task ON comments(task_id);
"#;

const AUDIT_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        action TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id INTEGER NOT NULL DEFAULT 0,
        ip_address TEXT NOT NULL DEFAULT '',
        user_agent TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        old_values TEXT NOT NULL DEFAULT '',
        new_values TEXT NOT NULL DEFAULT '',
        metadata TEXT NOT NULL DEFAULT '',
        success INTEGER NOT NULL,
        error_message TEXT,
        duration INTEGER NOT NULL DEFAULT 0,
        timestamp TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_logs(entity_type, entity_id);
    CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_logs(timestamp);
    CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_logs(user_id);
"#;

const TASK_COLUMNS: &str = "id, description, deadline, deadline_type, status, task_type, \
    assigned_to, created_by, linked_document, processing_content, processing_notes, \
    completion_date, report_file, created_at, updated_at, deleted_at";

const HISTORY_COLUMNS: &str = "id, task_id, old_status, new_status, changed_by, notes, created_at";

const AUDIT_COLUMNS: &str = "id, user_id, action, entity_type, entity_id, ip_address, user_agent, \
    description, old_values, new_values, metadata, success, error_message, duration, timestamp";

fn open(path: impl AsRef<Path>, schema: &str) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(|e| StoreError::Other(e.to_string()))?;
    init(conn, schema)
}

fn init(conn: Connection, schema: &str) -> Result<Connection, StoreError> {
    conn.execute_batch(schema)
        .map_err(|e| StoreError::Other(e.to_string()))?;
    Ok(conn)
}

/// Outcome of a guarded task update.
enum Saved {
    Written,
    Missing,
    Stale,
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_ts(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(ts)
}

fn id_param(id: u64) -> i64 {
    id as i64
}

fn opt_id_param(id: Option<u64>) -> Option<i64> {
    id.map(id_param)
}

fn get_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

fn get_opt_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(|v| v as u64))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => get_ts(row, idx).map(Some),
    }
}

fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: get_id(row, 0)?,
        description: row.get(1)?,
        deadline: get_opt_ts(row, 2)?,
        deadline_type: get_enum(row, 3)?,
        status: get_enum(row, 4)?,
        task_type: get_enum(row, 5)?,
        assigned_to: get_opt_id(row, 6)?,
        created_by: get_id(row, 7)?,
        linked_document: get_opt_id(row, 8)?,
        processing_content: row.get(9)?,
        processing_notes: row.get(10)?,
        completion_date: get_opt_ts(row, 11)?,
        report_file: row.get(12)?,
        created_at: get_ts(row, 13)?,
        updated_at: get_ts(row, 14)?,
        deleted_at: get_opt_ts(row, 15)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<StatusHistory> {
    let old: String = row.get(2)?;
    let old_status = if old.is_empty() {
        None
    } else {
        Some(get_enum(row, 2)?)
    };
    Ok(StatusHistory {
        id: get_id(row, 0)?,
        task_id: get_id(row, 1)?,
        old_status,
        new_status: get_enum(row, 3)?,
        changed_by: get_id(row, 4)?,
        notes: row.get(5)?,
        created_at: get_ts(row, 6)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: get_id(row, 0)?,
        task_id: get_id(row, 1)?,
        user_id: get_id(row, 2)?,
        content: row.get(3)?,
        created_at: get_ts(row, 4)?,
        deleted_at: get_opt_ts(row, 5)?,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditLog> {
    Ok(AuditLog {
        id: get_id(row, 0)?,
        user_id: get_id(row, 1)?,
        action: get_enum(row, 2)?,
        entity_type: get_enum(row, 3)?,
        entity_id: get_id(row, 4)?,
        ip_address: row.get(5)?,
        user_agent: row.get(6)?,
        description: row.get(7)?,
        old_values: row.get(8)?,
        new_values: row.get(9)?,
        metadata: row.get(10)?,
        success: row.get(11)?,
        error_message: row.get(12)?,
        duration: row.get::<_, i64>(13)?.max(0) as u64,
        timestamp: get_ts(row, 14)?,
    })
}

fn insert_history(conn: &Connection, task_id: TaskId, h: &StatusHistory) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO task_status_history (task_id, old_status, new_status, changed_by, notes, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id_param(task_id),
            h.old_status.map(|s| s.as_str()).unwrap_or(""),
            h.new_status.as_str(),
            id_param(h.changed_by),
            h.notes,
            ts(&h.created_at),
        ],
    )
}

fn insert_comment(conn: &Connection, c: &Comment) -> rusqlite::Result<u64> {
    conn.execute(
        "INSERT INTO comments (task_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            id_param(c.task_id),
            id_param(c.user_id),
            c.content,
            ts(&c.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid() as u64)
}

fn task_is_live(conn: &Connection, id: TaskId) -> rusqlite::Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE id = ?1 AND deleted_at IS NULL",
        params![id_param(id)],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// SQLite-backed task store (tasks, history, comments).
pub struct SqliteTaskStore {
    conn: std::sync::Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            conn: std::sync::Mutex::new(open(path, TASK_SCHEMA)?),
        })
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(Self {
            conn: std::sync::Mutex::new(init(conn, TASK_SCHEMA)?),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| StoreError::Other(e.to_string()))
    }

    fn select_tasks(&self, sql: &str, args: Vec<Value>) -> Result<Vec<Task>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), task_from_row)?;
            rows.collect()
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(&self, mut task: Task, initial: StatusHistory) -> Result<Task, StoreError> {
        let id = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO tasks (description, deadline, deadline_type, status, task_type, assigned_to, \
                 created_by, linked_document, processing_content, processing_notes, completion_date, \
                 report_file, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    task.description,
                    opt_ts(&task.deadline),
                    task.deadline_type.as_str(),
                    task.status.as_str(),
                    task.task_type.as_str(),
                    opt_id_param(task.assigned_to),
                    id_param(task.created_by),
                    opt_id_param(task.linked_document),
                    task.processing_content,
                    task.processing_notes,
                    opt_ts(&task.completion_date),
                    task.report_file,
                    ts(&task.created_at),
                    ts(&task.updated_at),
                ],
            )?;
            let id = tx.last_insert_rowid() as u64;
            insert_history(&tx, id, &initial)?;
            tx.commit()?;
            Ok(id)
        })?;
        task.id = id;
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND deleted_at IS NULL");
        Ok(self
            .select_tasks(&sql, vec![Value::Integer(id_param(id))])?
            .into_iter()
            .next())
    }

    async fn save_transition(
        &self,
        task: &Task,
        expected_updated_at: DateTime<Utc>,
        history: Option<StatusHistory>,
        comment: Option<Comment>,
    ) -> Result<(), StoreError> {
        let outcome = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let n = tx.execute(
                "UPDATE tasks SET description = ?2, deadline = ?3, deadline_type = ?4, status = ?5, \
                 task_type = ?6, assigned_to = ?7, linked_document = ?8, processing_content = ?9, \
                 processing_notes = ?10, completion_date = ?11, report_file = ?12, updated_at = ?13 \
                 WHERE id = ?1 AND deleted_at IS NULL AND updated_at = ?14",
                params![
                    id_param(task.id),
                    task.description,
                    opt_ts(&task.deadline),
                    task.deadline_type.as_str(),
                    task.status.as_str(),
                    task.task_type.as_str(),
                    opt_id_param(task.assigned_to),
                    opt_id_param(task.linked_document),
                    task.processing_content,
                    task.processing_notes,
                    opt_ts(&task.completion_date),
                    task.report_file,
                    ts(&task.updated_at),
                    ts(&expected_updated_at),
                ],
            )?;
            if n == 0 {
                let live: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM tasks WHERE id = ?1 AND deleted_at IS NULL",
                    params![id_param(task.id)],
                    |row| row.get(0),
                )?;
                return Ok(if live == 0 { Saved::Missing } else { Saved::Stale });
            }
            if let Some(h) = &history {
                insert_history(&tx, task.id, h)?;
            }
            if let Some(c) = &comment {
                insert_comment(&tx, c)?;
            }
            tx.commit()?;
            Ok(Saved::Written)
        })?;
        match outcome {
            Saved::Written => Ok(()),
            Saved::Missing => Err(StoreError::NotFound(format!("task {}", task.id))),
            Saved::Stale => Err(StoreError::Conflict(format!(
                "task {} was modified concurrently",
                task.id
            ))),
        }
    }

    async fn list_tasks(&self, scope: TaskScope) -> Result<Vec<Task>, StoreError> {
        let (cond, args) = match scope {
            TaskScope::All => ("", vec![]),
            TaskScope::AssignedTo(u) => (" AND assigned_to = ?1", vec![Value::Integer(id_param(u))]),
            TaskScope::AssignedOrCreatedBy(u) => (
                " AND (assigned_to = ?1 OR created_by = ?1)",
                vec![Value::Integer(id_param(u))],
            ),
        };
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted_at IS NULL{cond} \
             ORDER BY created_at DESC, id DESC"
        );
        self.select_tasks(&sql, args)
    }

    async fn tasks_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted_at IS NULL \
             AND created_at >= ?1 AND created_at <= ?2 ORDER BY created_at DESC, id DESC"
        );
        self.select_tasks(&sql, vec![Value::Text(ts(&start)), Value::Text(ts(&end))])
    }

    async fn status_history(&self, task_id: TaskId) -> Result<Vec<StatusHistory>, StoreError> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM task_status_history WHERE task_id = ?1 \
             ORDER BY created_at ASC, id ASC"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![id_param(task_id)], history_from_row)?;
            rows.collect()
        })
    }

    async fn add_comment(&self, mut comment: Comment) -> Result<Comment, StoreError> {
        let id = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            if !task_is_live(&tx, comment.task_id)? {
                return Ok(None);
            }
            let id = insert_comment(&tx, &comment)?;
            tx.commit()?;
            Ok(Some(id))
        })?;
        match id {
            Some(id) => {
                comment.id = id;
                Ok(comment)
            }
            None => Err(StoreError::NotFound(format!("task {}", comment.task_id))),
        }
    }

    async fn comments(&self, task_id: TaskId) -> Result<Vec<Comment>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, user_id, content, created_at, deleted_at FROM comments \
                 WHERE task_id = ?1 AND deleted_at IS NULL ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![id_param(task_id)], comment_from_row)?;
            rows.collect()
        })
    }

    async fn soft_delete(&self, task_id: TaskId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let at = ts(&at);
        let deleted = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            if !task_is_live(&tx, task_id)? {
                return Ok(false);
            }
            tx.execute(
                "UPDATE comments SET deleted_at = ?2 WHERE task_id = ?1 AND deleted_at IS NULL",
                params![id_param(task_id), at],
            )?;
            tx.execute(
                "UPDATE tasks SET deleted_at = ?2 WHERE id = ?1",
                params![id_param(task_id), at],
            )?;
            tx.commit()?;
            Ok(true)
        })?;
        if deleted {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("task {}", task_id)))
        }
    }
}

/// SQLite-backed audit log store.
pub struct SqliteAuditStore {
    conn: std::sync::Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            conn: std::sync::Mutex::new(open(path, AUDIT_SCHEMA)?),
        })
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(Self {
            conn: std::sync::Mutex::new(init(conn, AUDIT_SCHEMA)?),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Other(format!("failed to acquire lock: {}", e)))?;
        f(&conn).map_err(|e| StoreError::Other(e.to_string()))
    }
}

/// WHERE clause plus positional arguments for an audit filter.
fn audit_where(filter: &AuditFilter) -> (String, Vec<Value>) {
    let mut conds: Vec<&str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    if let Some(v) = filter.user_id {
        conds.push("user_id = ?");
        args.push(Value::Integer(id_param(v)));
    }
    if let Some(v) = filter.action {
        conds.push("action = ?");
        args.push(Value::Text(v.as_str().to_string()));
    }
    if let Some(v) = filter.entity_type {
        conds.push("entity_type = ?");
        args.push(Value::Text(v.as_str().to_string()));
    }
    if let Some(v) = filter.entity_id {
        conds.push("entity_id = ?");
        args.push(Value::Integer(id_param(v)));
    }
    if let Some(v) = filter.success {
        conds.push("success = ?");
        args.push(Value::Integer(i64::from(v)));
    }
    if let Some(v) = &filter.start {
        conds.push("timestamp >= ?");
        args.push(Value::Text(ts(v)));
    }
    if let Some(v) = &filter.end {
        conds.push("timestamp <= ?");
        args.push(Value::Text(ts(v)));
    }
    if let Some(v) = &filter.ip_address {
        conds.push("ip_address = ?");
        args.push(Value::Text(v.clone()));
    }
    if conds.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conds.join(" AND ")), args)
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, mut entry: AuditLog) -> Result<AuditLog, StoreError> {
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_logs (user_id, action, entity_type, entity_id, ip_address, user_agent, \
                 description, old_values, new_values, metadata, success, error_message, duration, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    id_param(entry.user_id),
                    entry.action.as_str(),
                    entry.entity_type.as_str(),
                    id_param(entry.entity_id),
                    entry.ip_address,
                    entry.user_agent,
                    entry.description,
                    entry.old_values,
                    entry.new_values,
                    entry.metadata,
                    entry.success,
                    entry.error_message,
                    entry.duration as i64,
                    ts(&entry.timestamp),
                ],
            )?;
            Ok(conn.last_insert_rowid() as u64)
        })?;
        entry.id = id;
        Ok(entry)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<AuditLog>, u64), StoreError> {
        let (clause, args) = audit_where(filter);
        let count_sql = format!("SELECT COUNT(*) FROM audit_logs{clause}");
        let page_sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs{clause} \
             ORDER BY timestamp DESC, id DESC LIMIT {} OFFSET {}",
            limit as i64, offset as i64
        );
        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row(&count_sql, params_from_iter(args.iter()), |r| r.get(0))?;
            let mut stmt = conn.prepare(&page_sql)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), audit_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((rows, total.max(0) as u64))
        })
    }

    async fn scan(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>, StoreError> {
        let (clause, args) = audit_where(filter);
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_logs{clause} ORDER BY timestamp ASC, id ASC");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), audit_from_row)?;
            rows.collect()
        })
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = ts(&cutoff);
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM audit_logs WHERE timestamp < ?1", params![cutoff])?;
            Ok(n as u64)
        })
    }
}
