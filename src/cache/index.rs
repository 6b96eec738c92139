//! Keyword Index Module
//!
//! Inverted index from search keyword to the set of keys tagged with it.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// == Search Logic ==
/// How multiple keywords combine in a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchLogic {
    /// Keys tagged with every keyword
    And,
    /// Keys tagged with any keyword
    #[default]
    Or,
}

impl FromStr for SearchLogic {
    type Err = std::convert::Infallible;

    /// Anything other than "AND" (case-insensitive) is treated as OR.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("and") {
            Ok(SearchLogic::And)
        } else {
            Ok(SearchLogic::Or)
        }
    }
}

// == Keyword Index ==
/// Keyword to key-set mapping.
///
/// Sets are ordered so results are deterministic. A keyword whose set would
/// become empty is removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordIndex {
    tags: BTreeMap<String, BTreeSet<String>>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags `key` with `keyword`. Adding the same pair again has no effect.
    pub fn add_tag(&mut self, keyword: &str, key: &str) {
        self.tags
            .entry(keyword.to_string())
            .or_default()
            .insert(key.to_string());
    }

    /// Removes `key` from every keyword, dropping keywords left empty.
    pub fn remove_key(&mut self, key: &str) {
        self.tags.retain(|_, keys| {
            keys.remove(key);
            !keys.is_empty()
        });
    }

    /// Keys matching `keywords` combined with `logic`.
    ///
    /// No keywords matches nothing.
    pub fn search<S: AsRef<str>>(&self, keywords: &[S], logic: SearchLogic) -> Vec<String> {
        let mut sets = keywords.iter().map(|k| self.tags.get(k.as_ref()));

        let Some(first) = sets.next() else {
            return Vec::new();
        };
        let mut result: BTreeSet<&String> = first.into_iter().flatten().collect();

        for set in sets {
            match logic {
                SearchLogic::And => match set {
                    Some(set) => result.retain(|k| set.contains(*k)),
                    None => result.clear(),
                },
                SearchLogic::Or => result.extend(set.into_iter().flatten()),
            }
        }

        result.into_iter().cloned().collect()
    }

    /// Number of distinct keywords.
    pub fn keyword_count(&self) -> usize {
        self.tags.len()
    }

    pub fn contains_keyword(&self, keyword: &str) -> bool {
        self.tags.contains_key(keyword)
    }

    /// Every key referenced by any keyword.
    pub fn keys(&self) -> BTreeSet<&String> {
        self.tags.values().flatten().collect()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeywordIndex {
        let mut index = KeywordIndex::new();
        index.add_tag("a", "only_a");
        index.add_tag("a", "both");
        index.add_tag("b", "both");
        index.add_tag("b", "only_b");
        index
    }

    #[test]
    fn test_empty_keywords_match_nothing() {
        let index = sample();
        let none: [&str; 0] = [];
        assert!(index.search(&none, SearchLogic::Or).is_empty());
        assert!(index.search(&none, SearchLogic::And).is_empty());
    }

    #[test]
    fn test_single_keyword() {
        let index = sample();
        assert_eq!(index.search(&["a"], SearchLogic::And), ["both", "only_a"]);
        assert!(index.search(&["zzz"], SearchLogic::Or).is_empty());
    }

    #[test]
    fn test_and_or() {
        let index = sample();
        assert_eq!(index.search(&["a", "b"], SearchLogic::And), ["both"]);
        assert_eq!(
            index.search(&["a", "b"], SearchLogic::Or),
            ["both", "only_a", "only_b"]
        );
    }

    #[test]
    fn test_and_with_unknown_keyword_is_empty() {
        let index = sample();
        assert!(index.search(&["a", "missing"], SearchLogic::And).is_empty());
        assert!(index.search(&["missing", "a"], SearchLogic::And).is_empty());
    }

    #[test]
    fn test_add_tag_is_idempotent() {
        let mut once = KeywordIndex::new();
        once.add_tag("t", "k");
        let mut twice = once.clone();
        twice.add_tag("t", "k");

        assert_eq!(once, twice);
        assert_eq!(twice.search(&["t"], SearchLogic::Or), ["k"]);
    }

    #[test]
    fn test_remove_key_drops_empty_keywords() {
        let mut index = sample();
        index.remove_key("only_a");
        assert!(index.contains_keyword("a"));

        index.remove_key("both");
        assert!(!index.contains_keyword("a"));
        assert_eq!(index.keyword_count(), 1);
        assert_eq!(index.search(&["b"], SearchLogic::Or), ["only_b"]);

        // removing an unknown key is a no-op
        index.remove_key("never");
        assert_eq!(index.keyword_count(), 1);
    }

    #[test]
    fn test_logic_parsing_is_permissive() {
        assert_eq!("AND".parse::<SearchLogic>().unwrap(), SearchLogic::And);
        assert_eq!("and".parse::<SearchLogic>().unwrap(), SearchLogic::And);
        assert_eq!("OR".parse::<SearchLogic>().unwrap(), SearchLogic::Or);
        assert_eq!("xor".parse::<SearchLogic>().unwrap(), SearchLogic::Or);
        assert_eq!(SearchLogic::default(), SearchLogic::Or);
    }

    #[test]
    fn test_serialized_form() {
        let mut index = KeywordIndex::new();
        index.add_tag("vip", "user:1");
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#"{"vip":["user:1"]}"#);

        let back: KeywordIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }
}
