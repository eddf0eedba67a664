//! 记忆层：对话转录、偏好集合、搜索缓存、会话持久化

pub mod conversation;
pub mod persistence;
pub mod preferences;
pub mod search_cache;

pub use conversation::{Message, Role, Transcript, DEFAULT_MAX_TURNS};
pub use persistence::{
    JsonFileSessionStore, MemorySessionStore, SessionRecord, SessionStore, SqliteSessionStore,
    StoreError, DEFAULT_SESSION_KEY,
};
pub use preferences::PreferenceSet;
pub use search_cache::SearchCache;
