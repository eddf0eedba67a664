//! 搜索缓存：规范化查询词 -> 已拼接的抓取内容
//!
//! 进程内写一次（不失效、不过期），随 SessionRecord 持久化，重启后复用。

use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct SearchCache {
    entries: BTreeMap<String, String>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// 仅在 key 不存在时写入；返回是否写入
    pub fn insert(&mut self, key: impl Into<String>, content: impl Into<String>) -> bool {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, content.into());
        true
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_once() {
        let mut cache = SearchCache::new();
        assert!(cache.insert("gatos", "A"));
        assert!(!cache.insert("gatos", "B"));
        assert_eq!(cache.get("gatos"), Some("A"));
        assert_eq!(cache.get("cães"), None);
    }
}
