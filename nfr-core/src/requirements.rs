//! Mutation operations on the requirement list embedded in a catalog.

use tracing::debug;

use crate::catalogs::{load_catalog, save_catalog};
use crate::error::{EngineError, EngineResult};
use crate::links::strip_issue_entries;
use crate::models::{Requirement, RequirementDraft, RequirementPatch};
use crate::store::KeyValueStore;

/// Excludes container requirements from a list.
///
/// Pure and non-mutating: every consumer that counts, renders or
/// searches goes through this instead of filtering stored entities in
/// place.
pub fn filter_visible(requirements: &[Requirement]) -> Vec<&Requirement> {
    requirements.iter().filter(|r| !r.is_container).collect()
}

/// Add, update and delete operations on a catalog's requirements.
pub struct RequirementLifecycle<'s> {
    store: &'s dyn KeyValueStore,
}

impl<'s> RequirementLifecycle<'s> {
    pub fn new(store: &'s dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// Appends a non-container requirement with an id allocated from
    /// the catalog's persisted counter, and returns it.
    pub fn add(&self, catalog_id: &str, draft: RequirementDraft) -> EngineResult<Requirement> {
        let mut catalog = load_catalog(self.store, catalog_id)?;
        let id = catalog.allocate_requirement_id();
        let requirement = Requirement {
            id,
            heading: draft.heading,
            text: draft.text,
            important: draft.important.min(100),
            section: draft.section,
            level: 2,
            parent_id: None,
            children_ids: Vec::new(),
            dependencies: draft.dependencies,
            is_container: false,
            issues_linked: Vec::new(),
            correlation: None,
            catalog_title: catalog.title.clone(),
        };
        catalog.requirements.push(requirement.clone());
        save_catalog(self.store, &mut catalog)?;
        debug!(catalog_id, req_id = %requirement.id, "added requirement");
        Ok(requirement)
    }

    /// Merges a patch onto the matching requirement. Link state is
    /// never touched here; it changes only through the issue-link
    /// registry. An unknown requirement id surfaces `NotFound`.
    pub fn update(
        &self,
        catalog_id: &str,
        req_id: &str,
        patch: RequirementPatch,
    ) -> EngineResult<()> {
        let mut catalog = load_catalog(self.store, catalog_id)?;
        let requirement = catalog
            .requirement_mut(req_id)
            .ok_or_else(|| EngineError::RequirementNotFound(req_id.to_string()))?;

        if let Some(heading) = patch.heading {
            requirement.heading = heading;
        }
        if let Some(text) = patch.text {
            requirement.text = text;
        }
        if let Some(important) = patch.important {
            requirement.important = important.min(100);
        }
        if let Some(section) = patch.section {
            requirement.section = section;
        }
        if let Some(dependencies) = patch.dependencies {
            requirement.dependencies = dependencies;
        }
        if let Some(correlation) = patch.correlation {
            requirement.correlation = Some(correlation);
        }

        save_catalog(self.store, &mut catalog)?;
        Ok(())
    }

    /// Removes the requirement from the catalog, then strips matching
    /// entries from every work-item document, deleting documents left
    /// empty. Symmetric with catalog delete.
    pub fn remove(&self, catalog_id: &str, req_id: &str) -> EngineResult<()> {
        let mut catalog = load_catalog(self.store, catalog_id)?;
        let before = catalog.requirements.len();
        catalog.requirements.retain(|r| r.id != req_id);
        if catalog.requirements.len() == before {
            return Err(EngineError::RequirementNotFound(req_id.to_string()));
        }
        save_catalog(self.store, &mut catalog)?;

        let stripped = strip_issue_entries(self.store, |entry| {
            entry.req_id == req_id && entry.catalog_id == catalog_id
        })?;
        debug!(catalog_id, req_id, stripped, "removed requirement and cascaded link cleanup");
        Ok(())
    }
}
