//! Core Store implementation
//!
//! Each collection's JSONL log is the source of truth. Live rows and their
//! indexed fields are replayed into an in-memory SQLite database the first
//! time a collection is touched, and every filter query runs against it.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::{Filter, FilterOp, IndexValue, Record};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store at {0} is locked by another process (is `ringback run` active?)")]
    Locked(PathBuf),

    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Record already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    #[error("Invalid collection name: {0:?}")]
    InvalidCollection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index error: {0}")]
    Index(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA: &str = "
    CREATE TABLE records (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        data TEXT NOT NULL,
        fields TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );
    CREATE TABLE record_index (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        field TEXT NOT NULL,
        kind TEXT NOT NULL,
        field_value NOT NULL
    );
    CREATE INDEX idx_record_index_lookup ON record_index (collection, field, kind, field_value);
    CREATE INDEX idx_record_index_owner ON record_index (collection, id);
";

/// One line of a collection log
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Put {
        id: String,
        #[serde(default)]
        index: HashMap<String, IndexValue>,
        record: Value,
    },
    Delete {
        id: String,
    },
}

/// Row counts for a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStats {
    /// Live rows
    pub rows: usize,
    /// Lines in the on-disk log (puts and deletes)
    pub log_lines: usize,
}

fn needs_compaction(stats: CollectionStats) -> bool {
    stats.log_lines > stats.rows * 2 + crate::DEFAULT_COMPACT_SLACK
}

/// SQLite kind tag and value for an index entry
fn sql_value(value: &IndexValue) -> (&'static str, SqlValue) {
    match value {
        IndexValue::Bool(v) => ("bool", SqlValue::Integer(i64::from(*v))),
        IndexValue::Int(v) => ("int", SqlValue::Integer(*v)),
        IndexValue::String(v) => ("string", SqlValue::Text(v.clone())),
    }
}

fn sql_op(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "=",
        FilterOp::Ne => "<>",
        FilterOp::Lt => "<",
        FilterOp::Le => "<=",
        FilterOp::Gt => ">",
        FilterOp::Ge => ">=",
    }
}

fn index_put(conn: &Connection, collection: &str, id: &str, index: &HashMap<String, IndexValue>, record: &Value) -> StoreResult<()> {
    index_delete(conn, collection, id)?;
    conn.execute(
        "INSERT INTO records (collection, id, data, fields) VALUES (?1, ?2, ?3, ?4)",
        params![collection, id, serde_json::to_string(record)?, serde_json::to_string(index)?],
    )?;
    let mut insert =
        conn.prepare_cached("INSERT INTO record_index (collection, id, field, kind, field_value) VALUES (?1, ?2, ?3, ?4, ?5)")?;
    for (field, value) in index {
        let (kind, value) = sql_value(value);
        insert.execute(params![collection, id, field, kind, value])?;
    }
    Ok(())
}

fn index_delete(conn: &Connection, collection: &str, id: &str) -> StoreResult<bool> {
    conn.execute(
        "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;
    let removed = conn.execute(
        "DELETE FROM records WHERE collection = ?1 AND id = ?2",
        params![collection, id],
    )?;
    Ok(removed > 0)
}

fn index_apply(conn: &Connection, collection: &str, entry: &LogEntry) -> StoreResult<()> {
    match entry {
        LogEntry::Put { id, index, record } => index_put(conn, collection, id, index, record),
        LogEntry::Delete { id } => index_delete(conn, collection, id).map(|_| ()),
    }
}

/// The record store
///
/// Owns an exclusive lock on its directory for as long as it is open.
pub struct Store {
    base_path: PathBuf,
    index: Connection,
    /// Log line counts of the collections replayed so far
    log_lines: HashMap<String, usize>,
    _lock: File,
}

impl Store {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(base_path.join(".lock"))?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(base_path.clone()))?;

        let index = Connection::open_in_memory()?;
        index.execute_batch(SCHEMA)?;

        debug!(?base_path, "Opened call store");
        Ok(Self {
            base_path,
            index,
            log_lines: HashMap::new(),
            _lock: lock,
        })
    }

    /// Directory backing this store
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", name))
    }

    /// Validate a collection name and replay its log into the index on first use
    fn ensure_loaded(&mut self, name: &str) -> StoreResult<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(StoreError::InvalidCollection(name.to_string()));
        }
        if self.log_lines.contains_key(name) {
            return Ok(());
        }

        let path = self.collection_path(name);
        let mut log_lines = self.replay(name, &path)?;
        let rows = self.row_count(name)?;
        if needs_compaction(CollectionStats { rows, log_lines }) {
            self.write_snapshot(name, &path)?;
            info!(collection = name, rows, before = log_lines, "Compacted collection on open");
            log_lines = rows;
        }
        self.log_lines.insert(name.to_string(), log_lines);
        Ok(())
    }

    /// Load a collection log into the index, returning its line count
    fn replay(&mut self, name: &str, path: &Path) -> StoreResult<usize> {
        if !path.exists() {
            return Ok(0);
        }

        let content = fs::read_to_string(path)?;
        let tx = self.index.transaction()?;
        let mut log_lines = 0;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => {
                    index_apply(&tx, name, &entry)?;
                    log_lines += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping corrupt log line");
                }
            }
        }
        tx.commit()?;

        // A torn final line after a crash: terminate it so the next append starts clean
        if !content.is_empty() && !content.ends_with('\n') {
            let mut file = OpenOptions::new().append(true).open(path)?;
            writeln!(file)?;
        }

        debug!(path = %path.display(), lines = log_lines, "Loaded collection");
        Ok(log_lines)
    }

    fn row_count(&self, name: &str) -> StoreResult<usize> {
        let count: i64 = self.index.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn contains(&self, name: &str, id: &str) -> StoreResult<bool> {
        let found = self
            .index
            .query_row(
                "SELECT 1 FROM records WHERE collection = ?1 AND id = ?2",
                params![name, id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn append(&mut self, name: &str, entry: LogEntry) -> StoreResult<()> {
        self.ensure_loaded(name)?;
        let path = self.collection_path(name);
        let line = serde_json::to_string(&entry)?;

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", line)?;
        file.sync_data()?;

        index_apply(&self.index, name, &entry)?;
        *self.log_lines.entry(name.to_string()).or_default() += 1;
        Ok(())
    }

    /// Insert or replace a record
    pub fn put<T: Record>(&mut self, record: T) -> StoreResult<()> {
        let collection = T::collection_name();
        debug!(collection, id = record.id(), "Store::put: called");
        let entry = LogEntry::Put {
            id: record.id().to_string(),
            index: record.indexed_fields(),
            record: serde_json::to_value(&record)?,
        };
        self.append(collection, entry)
    }

    /// Insert a record that must not already exist
    pub fn create<T: Record>(&mut self, record: T) -> StoreResult<String> {
        let collection = T::collection_name();
        let id = record.id().to_string();
        self.ensure_loaded(collection)?;
        if self.contains(collection, &id)? {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id,
            });
        }
        self.put(record)?;
        Ok(id)
    }

    /// Replace a record that must already exist
    pub fn update<T: Record>(&mut self, record: T) -> StoreResult<()> {
        let collection = T::collection_name();
        self.ensure_loaded(collection)?;
        if !self.contains(collection, record.id())? {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: record.id().to_string(),
            });
        }
        self.put(record)
    }

    /// Fetch a record by id
    pub fn get<T: Record>(&mut self, id: &str) -> StoreResult<Option<T>> {
        let collection = T::collection_name();
        self.ensure_loaded(collection)?;
        let data: Option<String> = self
            .index
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Delete a record by id, returning whether it existed
    pub fn delete<T: Record>(&mut self, id: &str) -> StoreResult<bool> {
        self.delete_in(T::collection_name(), id)
    }

    /// Delete a row from a collection by name
    pub fn delete_in(&mut self, collection: &str, id: &str) -> StoreResult<bool> {
        debug!(collection, id, "Store::delete_in: called");
        self.ensure_loaded(collection)?;
        if !self.contains(collection, id)? {
            debug!(collection, id, "Store::delete_in: not present");
            return Ok(false);
        }
        self.append(collection, LogEntry::Delete { id: id.to_string() })?;
        Ok(true)
    }

    /// Raw JSON of the rows matching every filter, ordered by id
    ///
    /// A row matches a filter only when it exposes the field with the same
    /// value kind as the filter.
    fn query(&mut self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<String>> {
        self.ensure_loaded(collection)?;

        let mut sql = String::from("SELECT r.data FROM records r WHERE r.collection = ?1");
        let mut values = vec![SqlValue::Text(collection.to_string())];
        for filter in filters {
            let (kind, value) = sql_value(&filter.value);
            let n = values.len();
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM record_index i WHERE i.collection = r.collection AND i.id = r.id \
                 AND i.field = ?{} AND i.kind = ?{} AND i.field_value {} ?{})",
                n + 1,
                n + 2,
                sql_op(filter.op),
                n + 3
            ));
            values.push(SqlValue::Text(filter.field.clone()));
            values.push(SqlValue::Text(kind.to_string()));
            values.push(value);
        }
        sql.push_str(" ORDER BY r.id");

        let mut stmt = self.index.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// List records matching every filter
    ///
    /// Rows that no longer deserialize as `T` are skipped.
    pub fn list<T: Record>(&mut self, filters: &[Filter]) -> StoreResult<Vec<T>> {
        let name = T::collection_name();
        let mut records = Vec::new();
        for data in self.query(name, filters)? {
            match serde_json::from_str::<T>(&data) {
                Ok(record) => records.push(record),
                Err(e) => warn!(collection = name, error = %e, "Skipping undecodable row"),
            }
        }
        Ok(records)
    }

    /// List raw JSON rows of a collection
    pub fn list_raw(&mut self, collection: &str) -> StoreResult<Vec<Value>> {
        self.query(collection, &[])?
            .iter()
            .map(|data| serde_json::from_str(data).map_err(StoreError::from))
            .collect()
    }

    /// Row and log line counts for a collection
    pub fn stats(&mut self, collection: &str) -> StoreResult<CollectionStats> {
        self.ensure_loaded(collection)?;
        Ok(CollectionStats {
            rows: self.row_count(collection)?,
            log_lines: self.log_lines.get(collection).copied().unwrap_or_default(),
        })
    }

    /// Rewrite a collection log so it holds exactly one line per live row
    pub fn compact(&mut self, collection: &str) -> StoreResult<CollectionStats> {
        let before = self.stats(collection)?;
        let path = self.collection_path(collection);
        self.write_snapshot(collection, &path)?;
        self.log_lines.insert(collection.to_string(), before.rows);
        info!(collection, before = before.log_lines, after = before.rows, "Compacted collection");
        Ok(CollectionStats {
            rows: before.rows,
            log_lines: before.rows,
        })
    }

    fn write_snapshot(&self, collection: &str, path: &Path) -> StoreResult<()> {
        let mut stmt = self
            .index
            .prepare("SELECT id, data, fields FROM records WHERE collection = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for (id, data, fields) in rows {
                let entry = LogEntry::Put {
                    id,
                    index: serde_json::from_str(&fields)?,
                    record: serde_json::from_str(&data)?,
                };
                writeln!(file, "{}", serde_json::to_string(&entry)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Names of the collections present on disk
    pub fn collection_names(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "jsonl").unwrap_or(false)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Alarm {
        id: String,
        due_at: i64,
        armed: bool,
    }

    impl Alarm {
        fn new(id: &str, due_at: i64, armed: bool) -> Self {
            Self {
                id: id.to_string(),
                due_at,
                armed,
            }
        }
    }

    impl Record for Alarm {
        fn id(&self) -> &str {
            &self.id
        }

        fn updated_at(&self) -> i64 {
            self.due_at
        }

        fn collection_name() -> &'static str {
            "alarms"
        }

        fn indexed_fields(&self) -> HashMap<String, IndexValue> {
            let mut fields = HashMap::new();
            fields.insert("due_at".to_string(), IndexValue::Int(self.due_at));
            fields.insert("armed".to_string(), IndexValue::Bool(self.armed));
            fields
        }
    }

    #[test]
    fn test_put_get_delete() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        store.put(Alarm::new("a", 10, true)).unwrap();
        let got: Option<Alarm> = store.get("a").unwrap();
        assert_eq!(got, Some(Alarm::new("a", 10, true)));

        assert!(store.delete::<Alarm>("a").unwrap());
        assert!(!store.delete::<Alarm>("a").unwrap());
        assert!(store.get::<Alarm>("a").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_and_reindexes() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        store.put(Alarm::new("a", 10, true)).unwrap();
        store.put(Alarm::new("a", 500, true)).unwrap();

        let early: Vec<Alarm> = store
            .list(&[Filter::new("due_at", FilterOp::Le, IndexValue::Int(100))])
            .unwrap();
        assert!(early.is_empty());

        let all: Vec<Alarm> = store.list(&[]).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].due_at, 500);
    }

    #[test]
    fn test_list_with_multiple_filters() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        store.put(Alarm::new("a", 10, true)).unwrap();
        store.put(Alarm::new("b", 20, false)).unwrap();
        store.put(Alarm::new("c", 30, true)).unwrap();
        store.put(Alarm::new("d", 40, true)).unwrap();

        let due: Vec<Alarm> = store
            .list(&[
                Filter::new("due_at", FilterOp::Le, IndexValue::Int(30)),
                Filter::eq("armed", IndexValue::Bool(true)),
            ])
            .unwrap();
        let ids: Vec<&str> = due.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_filter_requires_field_of_same_kind() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        store.put(Alarm::new("a", 10, true)).unwrap();
        store.put(Alarm::new("b", 20, false)).unwrap();

        let not_ten: Vec<Alarm> = store
            .list(&[Filter::new("due_at", FilterOp::Ne, IndexValue::Int(10))])
            .unwrap();
        assert_eq!(not_ten, vec![Alarm::new("b", 20, false)]);

        let wrong_kind: Vec<Alarm> = store
            .list(&[Filter::eq("armed", IndexValue::Int(1))])
            .unwrap();
        assert!(wrong_kind.is_empty());

        let missing: Vec<Alarm> = store
            .list(&[Filter::new("label", FilterOp::Ne, IndexValue::String("x".to_string()))])
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_delete_drops_index_entries() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        store.put(Alarm::new("a", 10, true)).unwrap();
        store.delete::<Alarm>("a").unwrap();
        store.put(Alarm::new("b", 10, true)).unwrap();

        let due: Vec<Alarm> = store
            .list(&[Filter::eq("due_at", IndexValue::Int(10))])
            .unwrap();
        assert_eq!(due, vec![Alarm::new("b", 10, true)]);
    }

    #[test]
    fn test_create_and_update_guards() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();

        assert!(matches!(
            store.update(Alarm::new("x", 1, true)),
            Err(StoreError::NotFound { .. })
        ));
        store.create(Alarm::new("x", 1, true)).unwrap();
        assert!(matches!(
            store.create(Alarm::new("x", 2, true)),
            Err(StoreError::AlreadyExists { .. })
        ));
        store.update(Alarm::new("x", 2, true)).unwrap();
        assert_eq!(store.get::<Alarm>("x").unwrap().unwrap().due_at, 2);
    }

    #[test]
    fn test_reopen_replays_log() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = Store::open(temp.path()).unwrap();
            store.put(Alarm::new("a", 10, true)).unwrap();
            store.put(Alarm::new("b", 20, true)).unwrap();
            store.delete::<Alarm>("a").unwrap();
        }

        let mut store = Store::open(temp.path()).unwrap();
        let all: Vec<Alarm> = store.list(&[]).unwrap();
        assert_eq!(all, vec![Alarm::new("b", 20, true)]);
        assert_eq!(store.stats("alarms").unwrap().log_lines, 3);

        let late: Vec<Alarm> = store
            .list(&[Filter::new("due_at", FilterOp::Gt, IndexValue::Int(5))])
            .unwrap();
        assert_eq!(late, vec![Alarm::new("b", 20, true)]);
    }

    #[test]
    fn test_corrupt_tail_is_skipped() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = Store::open(temp.path()).unwrap();
            store.put(Alarm::new("a", 10, true)).unwrap();
        }
        let path = temp.path().join("alarms.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"op\":\"put\",\"id\":\"b\"").unwrap();

        let mut store = Store::open(temp.path()).unwrap();
        let all: Vec<Alarm> = store.list(&[]).unwrap();
        assert_eq!(all.len(), 1);

        store.put(Alarm::new("c", 30, true)).unwrap();
        drop(store);
        let mut store = Store::open(temp.path()).unwrap();
        assert!(store.get::<Alarm>("c").unwrap().is_some());
    }

    #[test]
    fn test_compact_rewrites_log() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();
        for due in 0..10 {
            store.put(Alarm::new("a", due, true)).unwrap();
        }
        assert_eq!(store.stats("alarms").unwrap().log_lines, 10);

        let stats = store.compact("alarms").unwrap();
        assert_eq!(stats, CollectionStats { rows: 1, log_lines: 1 });

        drop(store);
        let mut store = Store::open(temp.path()).unwrap();
        assert_eq!(store.get::<Alarm>("a").unwrap().unwrap().due_at, 9);
        assert_eq!(store.stats("alarms").unwrap().log_lines, 1);
    }

    #[test]
    fn test_second_open_is_locked() {
        let temp = TempDir::new().unwrap();
        let _first = Store::open(temp.path()).unwrap();
        assert!(matches!(Store::open(temp.path()), Err(StoreError::Locked(_))));
    }

    #[test]
    fn test_invalid_collection_name() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();
        assert!(matches!(
            store.list_raw("../escape"),
            Err(StoreError::InvalidCollection(_))
        ));
    }

    #[test]
    fn test_collection_names() {
        let temp = TempDir::new().unwrap();
        let mut store = Store::open(temp.path()).unwrap();
        store.put(Alarm::new("a", 1, true)).unwrap();
        assert_eq!(store.collection_names().unwrap(), vec!["alarms".to_string()]);
    }
}
