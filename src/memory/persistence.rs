//! 会话持久化
//!
//! 整个系统只有一条 SessionRecord（固定 session key），包含转录、偏好与搜索缓存。
//! 存储只需 load / upsert 两个操作；提供 SQLite（默认）、JSON 文件与内存三种实现。

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{Message, PreferenceSet};

/// 固定的 session key
pub const DEFAULT_SESSION_KEY: &str = "default";

/// 存储层错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// 唯一的持久化聚合
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub transcript: Vec<Message>,
    #[serde(default)]
    pub preferences: PreferenceSet,
    #[serde(default)]
    pub search_cache: BTreeMap<String, String>,
    /// RFC 3339，由存储在 upsert 时写入
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, transcript: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            transcript,
            preferences: PreferenceSet::new(),
            search_cache: BTreeMap::new(),
            updated_at: None,
        }
    }
}

/// 存储接口：按 key 读取 / 覆盖写入
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn upsert(&self, key: &str, record: &SessionRecord) -> Result<(), StoreError>;
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// SQLite 存储：单表，转录/偏好/缓存以 JSON 文本存放；阻塞调用放到 spawn_blocking
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// 打开（或创建）数据库文件并建表；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_records (
                id TEXT PRIMARY KEY,
                transcript TEXT NOT NULL,
                preferences TEXT NOT NULL,
                search_cache TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            let row = conn
                .query_row(
                    "SELECT transcript, preferences, search_cache, updated_at
                     FROM session_records WHERE id = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            let Some((transcript, preferences, search_cache, updated_at)) = row else {
                return Ok(None);
            };
            Ok(Some(SessionRecord {
                id: key,
                transcript: serde_json::from_str(&transcript)?,
                preferences: serde_json::from_str(&preferences)?,
                search_cache: serde_json::from_str(&search_cache)?,
                updated_at: Some(updated_at),
            }))
        })
        .await
    }

    async fn upsert(&self, key: &str, record: &SessionRecord) -> Result<(), StoreError> {
        let key = key.to_string();
        let transcript = serde_json::to_string(&record.transcript)?;
        let preferences = serde_json::to_string(&record.preferences)?;
        let search_cache = serde_json::to_string(&record.search_cache)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO session_records (id, transcript, preferences, search_cache, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    transcript = excluded.transcript,
                    preferences = excluded.preferences,
                    search_cache = excluded.search_cache,
                    updated_at = excluded.updated_at",
                params![key, transcript, preferences, search_cache, now_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }
}

/// JSON 文件存储：单文件，key -> SessionRecord
#[derive(Debug)]
pub struct JsonFileSessionStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<HashMap<String, SessionRecord>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn load(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    /// 先写临时文件再 rename，避免半截文件
    async fn upsert(&self, key: &str, record: &SessionRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read_all().await?;
        let mut record = record.clone();
        record.updated_at = Some(now_rfc3339());
        all.insert(key.to_string(), record);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&all)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// 内存存储（测试或 storage.backend = "memory"）
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: tokio::sync::RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn upsert(&self, key: &str, record: &SessionRecord) -> Result<(), StoreError> {
        let mut record = record.clone();
        record.updated_at = Some(now_rfc3339());
        self.records.write().await.insert(key.to_string(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record() -> SessionRecord {
        let mut record = SessionRecord::new(
            DEFAULT_SESSION_KEY,
            vec![
                Message::system("sys"),
                Message::user("pesquise gatos"),
                Message::assistant("Resultados salvos"),
            ],
        );
        record.preferences.insert("Prefere respostas curtas");
        record.preferences.insert("Gosta de gatos");
        record
            .search_cache
            .insert("gatos".to_string(), "A\n\nB\n\nC".to_string());
        record
    }

    async fn assert_round_trip(store: &dyn SessionStore) {
        assert!(store.load(DEFAULT_SESSION_KEY).await.unwrap().is_none());

        let record = sample_record();
        store.upsert(DEFAULT_SESSION_KEY, &record).await.unwrap();
        let loaded = store.load(DEFAULT_SESSION_KEY).await.unwrap().unwrap();

        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.transcript, record.transcript);
        assert_eq!(loaded.preferences, record.preferences);
        assert_eq!(loaded.search_cache, record.search_cache);
        assert!(loaded.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SqliteSessionStore::open(dir.path().join("nested/memoria.db")).unwrap();
        assert_round_trip(&store).await;
    }

    #[tokio::test]
    async fn test_sqlite_upsert_overwrites_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memoria.db");
        {
            let store = SqliteSessionStore::open(&path).unwrap();
            let mut record = sample_record();
            store.upsert(DEFAULT_SESSION_KEY, &record).await.unwrap();
            record.transcript.push(Message::user("mais uma"));
            store.upsert(DEFAULT_SESSION_KEY, &record).await.unwrap();
        }
        let store = SqliteSessionStore::open(&path).unwrap();
        let loaded = store.load(DEFAULT_SESSION_KEY).await.unwrap().unwrap();
        assert_eq!(loaded.transcript.len(), 4);
        assert_eq!(loaded.transcript[3], Message::user("mais uma"));
    }

    #[tokio::test]
    async fn test_json_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileSessionStore::new(dir.path().join("memoria.json"));
        assert_round_trip(&store).await;
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        assert_round_trip(&MemorySessionStore::new()).await;
    }

    #[test]
    fn test_record_without_cache_field_loads() {
        let raw = r#"{"id":"default","transcript":[{"role":"system","content":"s"}],"preferences":["x"]}"#;
        let record: SessionRecord = serde_json::from_str(raw).unwrap();
        assert!(record.search_cache.is_empty());
        assert_eq!(record.preferences.len(), 1);
    }
}
