//! 学习到的用户偏好：无重复的自由文本集合（保留插入顺序）

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct PreferenceSet {
    items: Vec<String>,
}

impl PreferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 集合并：已存在（去首尾空白后相同）时忽略，返回是否新增
    pub fn insert(&mut self, preference: &str) -> bool {
        let preference = preference.trim();
        if preference.is_empty() || self.contains(preference) {
            return false;
        }
        self.items.push(preference.to_string());
        true
    }

    pub fn contains(&self, preference: &str) -> bool {
        let preference = preference.trim();
        self.items.iter().any(|p| p == preference)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<String>> for PreferenceSet {
    fn from(items: Vec<String>) -> Self {
        items.into_iter().collect()
    }
}

impl From<PreferenceSet> for Vec<String> {
    fn from(set: PreferenceSet) -> Self {
        set.items
    }
}

impl FromIterator<String> for PreferenceSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            set.insert(&item);
        }
        set
    }
}
