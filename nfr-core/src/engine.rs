//! Operation surface consumed by UI glue.
//!
//! A thin facade over the repositories; every method corresponds to
//! one logical operation and follows command -> mutate embedded list
//! -> persist whole catalog -> return refreshed view. Transient store
//! errors propagate unchanged and should be retried by the caller at
//! this boundary, not inside the engine.

use serde::Serialize;
use tracing::debug;

use crate::catalogs::CatalogRepository;
use crate::error::EngineResult;
use crate::import::{self, CsvError, RowError};
use crate::links::{IssueLinkRegistry, LinkOutcome};
use crate::models::{
    Catalog, CatalogSummary, LinkStatus, LinkedRequirement, Requirement, RequirementDraft,
    RequirementPatch, WorkItemSummary,
};
use crate::requirements::RequirementLifecycle;
use crate::store::KeyValueStore;

/// Outcome of a CSV import. Partial success is expected: bad rows are
/// reported, good rows land.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub total: usize,
    pub success: usize,
    pub errors: Vec<RowError>,
    /// Set when the import created a new catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
}

pub struct Engine<'s> {
    store: &'s dyn KeyValueStore,
}

impl<'s> Engine<'s> {
    pub fn new(store: &'s dyn KeyValueStore) -> Self {
        Self { store }
    }

    fn catalogs(&self) -> CatalogRepository<'s> {
        CatalogRepository::new(self.store)
    }

    fn requirements(&self) -> RequirementLifecycle<'s> {
        RequirementLifecycle::new(self.store)
    }

    fn links(&self) -> IssueLinkRegistry<'s> {
        IssueLinkRegistry::new(self.store)
    }

    // Catalogs

    pub fn create_catalog(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        prefix: &str,
    ) -> EngineResult<String> {
        Ok(self.catalogs().create(user_id, title, description, prefix)?.id)
    }

    pub fn list_catalogs(&self) -> EngineResult<Vec<CatalogSummary>> {
        self.catalogs().list_all()
    }

    pub fn get_catalog(&self, catalog_id: &str) -> EngineResult<Catalog> {
        self.catalogs().get_by_id(catalog_id)
    }

    pub fn delete_catalog(&self, catalog_id: &str) -> EngineResult<()> {
        self.catalogs().delete(catalog_id)
    }

    // Requirements

    pub fn add_requirement(
        &self,
        catalog_id: &str,
        draft: RequirementDraft,
    ) -> EngineResult<Requirement> {
        self.requirements().add(catalog_id, draft)
    }

    pub fn update_requirement(
        &self,
        catalog_id: &str,
        req_id: &str,
        patch: RequirementPatch,
    ) -> EngineResult<()> {
        self.requirements().update(catalog_id, req_id, patch)
    }

    pub fn delete_requirement(&self, catalog_id: &str, req_id: &str) -> EngineResult<()> {
        self.requirements().remove(catalog_id, req_id)
    }

    // Work-item links

    pub fn link_requirement_to_issue(
        &self,
        issue_key: &str,
        req_id: &str,
        catalog_id: &str,
    ) -> EngineResult<LinkOutcome> {
        self.links().link(issue_key, req_id, catalog_id)
    }

    pub fn unlink_requirement(
        &self,
        issue_key: &str,
        req_id: &str,
        catalog_id: &str,
    ) -> EngineResult<()> {
        self.links().unlink(issue_key, req_id, catalog_id)
    }

    pub fn set_status_requirement(
        &self,
        issue_key: &str,
        req_id: &str,
        catalog_id: &str,
        status: LinkStatus,
        explanation: Option<String>,
    ) -> EngineResult<()> {
        self.links()
            .set_status(issue_key, req_id, catalog_id, status, explanation)
    }

    pub fn get_linked_requirements(
        &self,
        issue_key: &str,
    ) -> EngineResult<Vec<LinkedRequirement>> {
        self.links().get_for_work_item(issue_key)
    }

    pub fn get_linked_issues(&self, catalog_id: &str) -> EngineResult<Vec<WorkItemSummary>> {
        self.links().get_for_catalog(catalog_id)
    }

    // CSV import

    /// Parses hierarchical CSV and appends the flattened requirements
    /// to an existing catalog. Row ids come from the CSV itself.
    pub fn import_csv(
        &self,
        catalog_id: &str,
        csv_text: &str,
        _user_id: &str,
    ) -> EngineResult<ImportReport> {
        let mut catalog = self.catalogs().get_by_id(catalog_id)?;
        let report = match self.parse_and_flatten(csv_text, &catalog.title) {
            Ok((requirements, mut report)) => {
                report.success = requirements.len();
                catalog.requirements.extend(requirements);
                self.catalogs().save(&mut catalog)?;
                report
            }
            Err(report) => report,
        };
        debug!(catalog_id, total = report.total, success = report.success, "imported CSV");
        Ok(report)
    }

    /// Parses hierarchical CSV into a brand-new catalog.
    pub fn import_hierarchical_csv(
        &self,
        catalog_name: &str,
        catalog_description: &str,
        prefix: &str,
        csv_text: &str,
        user_id: &str,
    ) -> EngineResult<ImportReport> {
        match self.parse_and_flatten(csv_text, catalog_name) {
            Ok((requirements, mut report)) => {
                let mut catalog =
                    self.catalogs()
                        .create(user_id, catalog_name, catalog_description, prefix)?;
                report.success = requirements.len();
                catalog.requirements = requirements;
                self.catalogs().save(&mut catalog)?;
                report.catalog_id = Some(catalog.id);
                Ok(report)
            }
            Err(report) => Ok(report),
        }
    }

    /// Shared import pipeline: parse, reconstruct hierarchy, flatten.
    /// Whole-input failures become a report with a single row-0 error
    /// so the caller always gets `{total, success, errors}` back.
    fn parse_and_flatten(
        &self,
        csv_text: &str,
        catalog_title: &str,
    ) -> Result<(Vec<Requirement>, ImportReport), ImportReport> {
        let parsed = match import::parse_csv(csv_text) {
            Ok(parsed) => parsed,
            Err(e @ (CsvError::Empty | CsvError::MissingColumns(_))) => {
                return Err(ImportReport {
                    total: 0,
                    success: 0,
                    errors: vec![RowError { row: 0, message: e.to_string() }],
                    catalog_id: None,
                });
            }
        };
        let report = ImportReport {
            total: parsed.total_rows,
            success: 0,
            errors: parsed.errors,
            catalog_id: None,
        };
        let forest = import::build_hierarchy(parsed.records);
        let requirements = import::flatten(&forest, catalog_title);
        Ok((requirements, report))
    }

    /// Wipes every document in the store and reports how many were
    /// removed. Destructive; exposed for administrative tooling only.
    pub fn delete_all_data(&self) -> EngineResult<usize> {
        let all = self.store.query_by_prefix("")?;
        let deleted = all.len();
        for (key, _) in all {
            self.store.delete(&key)?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DerivedStatus;
    use crate::status::{derive_status, rollup};
    use crate::store::MemoryStore;

    const CSV: &str = "id;level;section;heading;text;important;dependencies\n\
        R1;1;1;Storage;;0;\n\
        R2;2;1.1;Backup;Nightly backups;60;\n\
        R3;2;1.2;Restore;Tested restores;70;R2";

    #[test]
    fn test_import_hierarchical_csv_creates_catalog() {
        let store = MemoryStore::new();
        let engine = Engine::new(&store);

        let report = engine
            .import_hierarchical_csv("Ops", "Operational NFRs", "OPS", CSV, "user-1")
            .unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.success, 3);
        assert!(report.errors.is_empty());

        let catalog_id = report.catalog_id.unwrap();
        let catalog = engine.get_catalog(&catalog_id).unwrap();
        assert_eq!(catalog.title, "Ops");
        assert_eq!(catalog.requirements.len(), 3);
        assert!(catalog.requirements[0].is_container);
        assert_eq!(catalog.requirements[0].children_ids, vec!["R2", "R3"]);
    }

    #[test]
    fn test_import_csv_appends_to_existing_catalog() {
        let store = MemoryStore::new();
        let engine = Engine::new(&store);
        let catalog_id = engine.create_catalog("u", "Ops", "", "OPS").unwrap();

        let report = engine.import_csv(&catalog_id, CSV, "u").unwrap();
        assert_eq!(report.success, 3);
        assert!(report.catalog_id.is_none());
        assert_eq!(engine.get_catalog(&catalog_id).unwrap().requirements.len(), 3);
    }

    #[test]
    fn test_import_missing_columns_reported_not_thrown() {
        let store = MemoryStore::new();
        let engine = Engine::new(&store);
        let catalog_id = engine.create_catalog("u", "Ops", "", "OPS").unwrap();

        let report = engine.import_csv(&catalog_id, "id;level\n1;2", "u").unwrap();
        assert_eq!(report.success, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("section"));
        assert!(engine.get_catalog(&catalog_id).unwrap().requirements.is_empty());
    }

    #[test]
    fn test_link_validate_flow() {
        let store = MemoryStore::new();
        let engine = Engine::new(&store);
        let catalog_id = engine.create_catalog("u", "Sec", "", "SEC").unwrap();
        let req = engine
            .add_requirement(
                &catalog_id,
                RequirementDraft {
                    heading: "Encryption".into(),
                    text: "at rest".into(),
                    important: 80,
                    section: "1".into(),
                    dependencies: Vec::new(),
                },
            )
            .unwrap();

        engine
            .link_requirement_to_issue("ABC-1", &req.id, &catalog_id)
            .unwrap();
        let linked = engine.get_linked_requirements("ABC-1").unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].status, LinkStatus::PendingValidation);

        engine
            .set_status_requirement("ABC-1", &req.id, &catalog_id, LinkStatus::Validated, None)
            .unwrap();
        let linked = engine.get_linked_requirements("ABC-1").unwrap();
        assert_eq!(linked[0].status, LinkStatus::Validated);

        let catalog = engine.get_catalog(&catalog_id).unwrap();
        let req = catalog.requirement(&req.id).unwrap();
        assert_eq!(derive_status(&req.issues_linked), DerivedStatus::Validated);
        assert_eq!(rollup(&catalog.requirements).validated, vec![req.id.clone()]);
    }

    #[test]
    fn test_delete_all_data() {
        let store = MemoryStore::new();
        let engine = Engine::new(&store);
        engine.create_catalog("u", "A", "", "A").unwrap();
        engine.create_catalog("u", "B", "", "B").unwrap();

        let deleted = engine.delete_all_data().unwrap();
        assert!(deleted >= 2);
        assert!(engine.list_catalogs().unwrap().is_empty());
    }
}
