//! Catalog CRUD over the key-value store.
//!
//! A catalog is the unit of persistence: the whole document, embedded
//! requirements included, is read and rewritten on every mutation.
//! There is no optimistic version check; concurrent writers to the
//! same catalog race and the later write wins.

use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::links::strip_issue_entries;
use crate::models::{Catalog, CatalogSummary, CATALOG_KEY_PREFIX};
use crate::store::KeyValueStore;

/// Loads and parses a catalog document, `CatalogNotFound` when absent.
pub(crate) fn load_catalog(store: &dyn KeyValueStore, catalog_id: &str) -> EngineResult<Catalog> {
    let value = store
        .get(catalog_id)?
        .ok_or_else(|| EngineError::CatalogNotFound(catalog_id.to_string()))?;
    let catalog = serde_json::from_value(value).map_err(crate::error::StoreError::Serde)?;
    Ok(catalog)
}

/// Refreshes `date_update` and writes the whole catalog document back.
pub(crate) fn save_catalog(store: &dyn KeyValueStore, catalog: &mut Catalog) -> EngineResult<()> {
    catalog.touch();
    let value = serde_json::to_value(&*catalog).map_err(crate::error::StoreError::Serde)?;
    store.set(&catalog.id, value)?;
    Ok(())
}

/// CRUD and prefix-scan access to catalog records. Owns id generation
/// and timestamping.
pub struct CatalogRepository<'s> {
    store: &'s dyn KeyValueStore,
}

impl<'s> CatalogRepository<'s> {
    pub fn new(store: &'s dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// Creates and persists an empty catalog, returning it.
    pub fn create(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        prefix: &str,
    ) -> EngineResult<Catalog> {
        let mut catalog = Catalog::new(user_id, title, description, prefix);
        // Timestamp-derived ids can collide within one millisecond;
        // probe forward until the key is free.
        let mut millis = catalog.date_creation.timestamp_millis();
        while self.store.get(&catalog.id)?.is_some() {
            millis += 1;
            catalog.id = format!("{}{}", CATALOG_KEY_PREFIX, millis);
        }
        save_catalog(self.store, &mut catalog)?;
        debug!(catalog_id = %catalog.id, "created catalog");
        Ok(catalog)
    }

    pub fn get_by_id(&self, catalog_id: &str) -> EngineResult<Catalog> {
        load_catalog(self.store, catalog_id)
    }

    /// Scans all catalog documents and returns lightweight summaries.
    ///
    /// A malformed record never fails the listing: missing fields
    /// default to empty, and the id is always taken from the store key.
    pub fn list_all(&self) -> EngineResult<Vec<CatalogSummary>> {
        let records = self.store.query_by_prefix(CATALOG_KEY_PREFIX)?;
        let mut summaries = Vec::with_capacity(records.len());
        for (key, value) in records {
            let mut summary: CatalogSummary = match serde_json::from_value(value) {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping fields of malformed catalog record");
                    CatalogSummary::default()
                }
            };
            summary.id = key;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    pub fn save(&self, catalog: &mut Catalog) -> EngineResult<()> {
        save_catalog(self.store, catalog)
    }

    /// Removes the catalog, then strips every work-item link entry that
    /// referenced it, deleting work-item documents left empty.
    pub fn delete(&self, catalog_id: &str) -> EngineResult<()> {
        self.store.delete(catalog_id)?;
        let stripped =
            strip_issue_entries(self.store, |entry| entry.catalog_id == catalog_id)?;
        debug!(catalog_id = %catalog_id, stripped, "deleted catalog and cascaded link cleanup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::issue_storage_key;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_create_and_get() {
        let store = MemoryStore::new();
        let repo = CatalogRepository::new(&store);

        let catalog = repo.create("user-1", "Security", "Security NFRs", "SEC").unwrap();
        let fetched = repo.get_by_id(&catalog.id).unwrap();
        assert_eq!(fetched.title, "Security");
        assert_eq!(fetched.prefix, "SEC");
        assert!(fetched.requirements.is_empty());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let repo = CatalogRepository::new(&store);
        match repo.get_by_id("catalog-0") {
            Err(EngineError::CatalogNotFound(id)) => assert_eq!(id, "catalog-0"),
            other => panic!("expected CatalogNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_list_all_tolerates_malformed_records() {
        let store = MemoryStore::new();
        let repo = CatalogRepository::new(&store);
        repo.create("u", "Perf", "", "PRF").unwrap();
        store.set("catalog-junk", json!("not an object")).unwrap();
        store.set("issue-ABC-1", json!([])).unwrap();

        let summaries = repo.list_all().unwrap();
        assert_eq!(summaries.len(), 2);
        let junk = summaries.iter().find(|s| s.id == "catalog-junk").unwrap();
        assert_eq!(junk.title, "");
        assert!(summaries.iter().any(|s| s.title == "Perf"));
    }

    #[test]
    fn test_save_refreshes_date_update() {
        let store = MemoryStore::new();
        let repo = CatalogRepository::new(&store);
        let mut catalog = repo.create("u", "T", "D", "P").unwrap();
        let created = catalog.date_update;

        std::thread::sleep(std::time::Duration::from_millis(5));
        repo.save(&mut catalog).unwrap();
        assert!(catalog.date_update > created);
    }

    #[test]
    fn test_delete_cascades_into_work_item_documents() {
        let store = MemoryStore::new();
        let repo = CatalogRepository::new(&store);
        let catalog = repo.create("u", "T", "D", "P").unwrap();

        // Three work items reference the catalog; one also references another.
        store
            .set(
                &issue_storage_key("ABC-1"),
                json!([{ "reqId": "P-0", "catalogId": catalog.id, "status": "pending_validation" }]),
            )
            .unwrap();
        store
            .set(
                &issue_storage_key("ABC-2"),
                json!([{ "reqId": "P-1", "catalogId": catalog.id, "status": "Validated" }]),
            )
            .unwrap();
        store
            .set(
                &issue_storage_key("ABC-3"),
                json!([
                    { "reqId": "P-2", "catalogId": catalog.id, "status": "Validated" },
                    { "reqId": "X-0", "catalogId": "catalog-other", "status": "Validated" }
                ]),
            )
            .unwrap();

        repo.delete(&catalog.id).unwrap();

        assert!(store.get(&catalog.id).unwrap().is_none());
        // Emptied documents are deleted, not left as empty arrays.
        assert!(store.get(&issue_storage_key("ABC-1")).unwrap().is_none());
        assert!(store.get(&issue_storage_key("ABC-2")).unwrap().is_none());
        // The mixed document keeps its unrelated entry.
        let remaining = store.get(&issue_storage_key("ABC-3")).unwrap().unwrap();
        let entries = remaining.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["catalogId"], "catalog-other");
    }
}
