//! In-memory inverted index over a requirement set.
//!
//! Built from scratch whenever the candidate set changes; rebuilding
//! is cheap at the expected volumes (low thousands of requirements).
//! Every contiguous substring of the searchable text, up to a fixed
//! window length, maps to the set of requirements containing it, so a
//! keystroke never triggers a full scan.

use std::collections::{HashMap, HashSet};

use crate::models::Requirement;

/// Longest substring window inserted into the index; queries are
/// truncated to this length.
pub const MAX_TOKEN_LEN: usize = 20;

/// Queries shorter than this return nothing.
pub const MIN_QUERY_LEN: usize = 2;

/// Hard cap on returned results.
pub const MAX_RESULTS: usize = 200;

/// Per-field search filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Heading,
    Text,
    CatalogTitle,
}

/// One indexed requirement with its catalog context.
#[derive(Debug, Clone)]
pub struct SearchEntry {
    pub catalog_id: String,
    pub catalog_title: String,
    pub requirement: Requirement,
}

impl SearchEntry {
    /// Internal entry key. Requirement ids are only unique within a
    /// catalog, so entries are keyed by the pair.
    fn key(&self) -> String {
        format!("{}/{}", self.catalog_id, self.requirement.id)
    }
}

/// Token and per-field indices over one requirement set.
pub struct SearchIndex {
    tokens: HashMap<String, HashSet<String>>,
    by_heading: HashMap<String, HashSet<String>>,
    by_text: HashMap<String, HashSet<String>>,
    by_catalog_title: HashMap<String, HashSet<String>>,
    entries: HashMap<String, SearchEntry>,
}

/// Lower-cases and collapses all whitespace runs to single spaces.
fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every contiguous substring of length 1..=MAX_TOKEN_LEN, on char
/// boundaries.
fn substrings(text: &str, min_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    for start in 0..chars.len() {
        let max_len = MAX_TOKEN_LEN.min(chars.len() - start);
        for len in min_len..=max_len {
            out.push(chars[start..start + len].iter().collect());
        }
    }
    out
}

impl SearchIndex {
    /// Builds the index over the given entries. Container requirements
    /// never enter the index.
    pub fn build(candidates: Vec<SearchEntry>) -> Self {
        let mut index = SearchIndex {
            tokens: HashMap::new(),
            by_heading: HashMap::new(),
            by_text: HashMap::new(),
            by_catalog_title: HashMap::new(),
            entries: HashMap::new(),
        };

        for entry in candidates {
            if entry.requirement.is_container {
                continue;
            }
            let key = entry.key();
            let req = &entry.requirement;

            let issue_keys: Vec<&str> = req
                .issues_linked
                .iter()
                .map(|l| l.issue_key.as_str())
                .collect();
            let searchable = normalize(&format!(
                "{} {} {} {} {} {} {}",
                req.heading,
                req.text,
                entry.catalog_title,
                entry.catalog_id,
                req.dependencies.join(" "),
                req.id,
                issue_keys.join(" "),
            ));
            for token in substrings(&searchable, 1) {
                index.tokens.entry(token).or_default().insert(key.clone());
            }

            index
                .by_heading
                .entry(normalize(&req.heading))
                .or_default()
                .insert(key.clone());
            index
                .by_text
                .entry(normalize(&req.text))
                .or_default()
                .insert(key.clone());
            index
                .by_catalog_title
                .entry(normalize(&entry.catalog_title))
                .or_default()
                .insert(key.clone());

            index.entries.insert(key, entry);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs a substring query, optionally restricted to one field.
    ///
    /// Queries shorter than [`MIN_QUERY_LEN`] characters return
    /// nothing. Results are capped at [`MAX_RESULTS`] and carry no
    /// order beyond index iteration order; callers needing an order
    /// must sort.
    pub fn query(&self, query: &str, field: Option<SearchField>) -> Vec<&SearchEntry> {
        let normalized = normalize(query);
        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() < MIN_QUERY_LEN {
            return Vec::new();
        }
        let truncated: String = chars[..chars.len().min(MAX_TOKEN_LEN)].iter().collect();

        let ids: HashSet<String> = match field {
            Some(field) => self.field_union(&truncated, field),
            None => self.token_intersection(&truncated),
        };

        ids.into_iter()
            .take(MAX_RESULTS)
            .filter_map(|id| self.entries.get(&id))
            .collect()
    }

    /// Union of id sets whose exact field value contains the query.
    fn field_union(&self, query: &str, field: SearchField) -> HashSet<String> {
        let map = match field {
            SearchField::Heading => &self.by_heading,
            SearchField::Text => &self.by_text,
            SearchField::CatalogTitle => &self.by_catalog_title,
        };
        let mut ids = HashSet::new();
        for (value, set) in map {
            if value.contains(query) {
                ids.extend(set.iter().cloned());
            }
        }
        ids
    }

    /// Intersection of the index sets of every query substring (of at
    /// least the minimum length) present in the index.
    fn token_intersection(&self, query: &str) -> HashSet<String> {
        let mut result: Option<HashSet<String>> = None;
        for token in substrings(query, MIN_QUERY_LEN) {
            let Some(set) = self.tokens.get(&token) else {
                continue;
            };
            result = Some(match result {
                None => set.clone(),
                Some(acc) => acc.intersection(set).cloned().collect(),
            });
        }
        result.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(catalog_id: &str, id: &str, heading: &str, text: &str) -> SearchEntry {
        SearchEntry {
            catalog_id: catalog_id.into(),
            catalog_title: "Security catalog".into(),
            requirement: Requirement {
                id: id.into(),
                heading: heading.into(),
                text: text.into(),
                important: 0,
                section: "1".into(),
                level: 1,
                parent_id: None,
                children_ids: Vec::new(),
                dependencies: Vec::new(),
                is_container: false,
                issues_linked: Vec::new(),
                correlation: None,
                catalog_title: String::new(),
            },
        }
    }

    fn two_entry_index() -> SearchIndex {
        SearchIndex::build(vec![
            entry("catalog-1", "A-1", "Encryption", "Data encrypted at rest"),
            entry("catalog-1", "A-2", "Backup", "Nightly backups kept 30 days"),
        ])
    }

    #[test]
    fn test_substring_query_matches_single_requirement() {
        let index = two_entry_index();
        let results = index.query("encr", None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].requirement.id, "A-1");
    }

    #[test]
    fn test_query_shorter_than_minimum_returns_nothing() {
        let index = two_entry_index();
        assert!(index.query("e", None).is_empty());
        assert!(index.query("", None).is_empty());
    }

    #[test]
    fn test_query_is_case_and_whitespace_insensitive() {
        let index = two_entry_index();
        let results = index.query("  ENCRYPTION ", None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].requirement.id, "A-1");
    }

    #[test]
    fn test_containers_never_enter_the_index() {
        let mut container = entry("catalog-1", "A-3", "Section", "");
        container.requirement.is_container = true;
        let index = SearchIndex::build(vec![
            container,
            entry("catalog-1", "A-1", "Encryption", "x"),
        ]);
        assert_eq!(index.len(), 1);
        assert!(index.query("section", None).is_empty());
    }

    #[test]
    fn test_field_filter_restricts_to_field() {
        let index = two_entry_index();
        // "rest" appears only in A-1's body text.
        assert_eq!(index.query("rest", Some(SearchField::Text)).len(), 1);
        assert!(index.query("rest", Some(SearchField::Heading)).is_empty());
        // Both entries share the catalog title.
        assert_eq!(
            index.query("security", Some(SearchField::CatalogTitle)).len(),
            2
        );
    }

    #[test]
    fn test_query_matches_requirement_id_and_catalog_id() {
        let index = two_entry_index();
        assert_eq!(index.query("a-2", None).len(), 1);
        assert_eq!(index.query("catalog-1", None).len(), 2);
    }

    #[test]
    fn test_same_requirement_id_in_two_catalogs_does_not_collide() {
        let index = SearchIndex::build(vec![
            entry("catalog-1", "A-1", "Encryption", "x"),
            entry("catalog-2", "A-1", "Encryption", "y"),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.query("encryption", None).len(), 2);
    }

    #[test]
    fn test_long_query_is_truncated_to_window() {
        let long_heading = "a".repeat(40);
        let index = SearchIndex::build(vec![entry("catalog-1", "A-1", &long_heading, "x")]);
        // 30 chars exceeds the window; the truncated query still hits.
        let results = index.query(&"a".repeat(30), None);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_result_cap() {
        let entries: Vec<SearchEntry> = (0..300)
            .map(|i| entry("catalog-1", &format!("A-{i}"), "shared heading", "x"))
            .collect();
        let index = SearchIndex::build(entries);
        assert_eq!(index.query("shared", None).len(), MAX_RESULTS);
    }
}
