//! Many-to-many relation between external work items and requirements.
//!
//! Every link exists as two denormalized copies: an entry in the work
//! item's `issue-<key>` document and an [`IssueLink`] on the
//! requirement. The store offers no cross-document atomicity, so both
//! copies are written independently (work-item side first) and every
//! cleanup path is idempotent so an interrupted cascade can simply be
//! re-run.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalogs::{load_catalog, save_catalog};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    issue_storage_key, IssueLink, LinkEntry, LinkStatus, LinkedRequirement, WorkItemEntry,
    WorkItemSummary, ISSUE_KEY_PREFIX,
};
use crate::store::KeyValueStore;

/// Result of a link attempt. Linking an already-linked pair is a
/// logged no-op, never a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyLinked,
}

/// Parses a work-item document into link entries. Anything that is
/// not an array of entries is treated as empty.
pub(crate) fn parse_link_entries(value: &Value) -> Vec<LinkEntry> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn write_link_entries(
    store: &dyn KeyValueStore,
    key: &str,
    entries: &[LinkEntry],
) -> EngineResult<()> {
    if entries.is_empty() {
        // Never leave an empty array behind.
        store.delete(key)?;
    } else {
        let value = serde_json::to_value(entries).map_err(crate::error::StoreError::Serde)?;
        store.set(key, value)?;
    }
    Ok(())
}

/// Scans every work-item document and drops entries matching the
/// predicate, deleting documents left with no entries. This is the
/// single reconciliation routine behind catalog-delete and
/// requirement-delete cascades; re-running it is harmless.
pub(crate) fn strip_issue_entries<F>(store: &dyn KeyValueStore, drop: F) -> EngineResult<usize>
where
    F: Fn(&LinkEntry) -> bool,
{
    let mut stripped = 0;
    for (key, value) in store.query_by_prefix(ISSUE_KEY_PREFIX)? {
        let entries = parse_link_entries(&value);
        let kept: Vec<LinkEntry> = entries.iter().filter(|e| !drop(e)).cloned().collect();
        if kept.len() != entries.len() {
            stripped += entries.len() - kept.len();
            write_link_entries(store, &key, &kept)?;
        } else if entries.is_empty() && !matches!(value, Value::Array(_)) {
            // Replace non-array garbage with nothing at all.
            store.delete(&key)?;
        }
    }
    Ok(stripped)
}

/// Maintains both denormalized link views under link, unlink, status
/// change and cascade delete.
pub struct IssueLinkRegistry<'s> {
    store: &'s dyn KeyValueStore,
}

impl<'s> IssueLinkRegistry<'s> {
    pub fn new(store: &'s dyn KeyValueStore) -> Self {
        Self { store }
    }

    fn load_entries(&self, issue_key: &str) -> EngineResult<Vec<LinkEntry>> {
        let key = issue_storage_key(issue_key);
        Ok(self
            .store
            .get(&key)?
            .map(|value| parse_link_entries(&value))
            .unwrap_or_default())
    }

    /// Links a requirement to a work item with `pending_validation`
    /// status on both sides.
    pub fn link(
        &self,
        issue_key: &str,
        req_id: &str,
        catalog_id: &str,
    ) -> EngineResult<LinkOutcome> {
        let mut entries = self.load_entries(issue_key)?;
        if entries
            .iter()
            .any(|e| e.req_id == req_id && e.catalog_id == catalog_id)
        {
            warn!(issue_key, req_id, catalog_id, "requirement already linked, ignoring");
            return Ok(LinkOutcome::AlreadyLinked);
        }

        entries.push(LinkEntry {
            req_id: req_id.to_string(),
            catalog_id: catalog_id.to_string(),
            status: LinkStatus::PendingValidation,
            explanation: None,
        });
        write_link_entries(self.store, &issue_storage_key(issue_key), &entries)?;

        // Second write of the two-write protocol: the requirement side.
        let mut catalog = load_catalog(self.store, catalog_id)?;
        let requirement = catalog
            .requirement_mut(req_id)
            .ok_or_else(|| EngineError::RequirementNotFound(req_id.to_string()))?;
        requirement.issues_linked.push(IssueLink {
            issue_key: issue_key.to_string(),
            status: LinkStatus::PendingValidation,
            explanation: None,
            linked_at: Utc::now(),
        });
        save_catalog(self.store, &mut catalog)?;

        debug!(issue_key, req_id, catalog_id, "linked requirement to work item");
        Ok(LinkOutcome::Linked)
    }

    /// Removes the link from both sides. Calling it again for the same
    /// triple is a no-op, and an emptied work-item document is deleted
    /// rather than left as an empty array.
    pub fn unlink(&self, issue_key: &str, req_id: &str, catalog_id: &str) -> EngineResult<()> {
        let mut entries = self.load_entries(issue_key)?;
        entries.retain(|e| !(e.req_id == req_id && e.catalog_id == catalog_id));
        write_link_entries(self.store, &issue_storage_key(issue_key), &entries)?;

        match load_catalog(self.store, catalog_id) {
            Ok(mut catalog) => {
                if let Some(requirement) = catalog.requirement_mut(req_id) {
                    requirement.issues_linked.retain(|l| l.issue_key != issue_key);
                }
                save_catalog(self.store, &mut catalog)?;
            }
            Err(EngineError::CatalogNotFound(_)) => {
                // The catalog vanished between writes; the work-item
                // side is already clean, so the cleanup still holds.
                warn!(issue_key, catalog_id, "unlink skipped requirement side, catalog gone");
            }
            Err(e) => return Err(e),
        }

        debug!(issue_key, req_id, catalog_id, "unlinked requirement from work item");
        Ok(())
    }

    /// Updates the status (and explanation) on both copies of the link.
    /// `Unfulfilled` and `accept_risk` must carry an explanation.
    pub fn set_status(
        &self,
        issue_key: &str,
        req_id: &str,
        catalog_id: &str,
        status: LinkStatus,
        explanation: Option<String>,
    ) -> EngineResult<()> {
        if status.requires_explanation() && explanation.as_deref().map_or(true, str::is_empty) {
            return Err(EngineError::Validation(format!(
                "status '{}' requires an explanation",
                status
            )));
        }

        let mut entries = self.load_entries(issue_key)?;
        if entries.is_empty() {
            return Err(EngineError::WorkItemNotFound(issue_key.to_string()));
        }
        for entry in entries
            .iter_mut()
            .filter(|e| e.req_id == req_id && e.catalog_id == catalog_id)
        {
            entry.status = status;
            entry.explanation = explanation.clone();
        }
        write_link_entries(self.store, &issue_storage_key(issue_key), &entries)?;

        let mut catalog = load_catalog(self.store, catalog_id)?;
        if let Some(requirement) = catalog.requirement_mut(req_id) {
            for link in requirement
                .issues_linked
                .iter_mut()
                .filter(|l| l.issue_key == issue_key)
            {
                link.status = status;
                link.explanation = explanation.clone();
            }
        }
        save_catalog(self.store, &mut catalog)?;

        debug!(issue_key, req_id, catalog_id, %status, "updated link status");
        Ok(())
    }

    /// Joins a work item's raw link list against the owning catalogs
    /// and requirements. Entries whose catalog or requirement has been
    /// deleted since are silently dropped.
    pub fn get_for_work_item(&self, issue_key: &str) -> EngineResult<Vec<LinkedRequirement>> {
        let entries = self.load_entries(issue_key)?;
        let mut enriched = Vec::with_capacity(entries.len());
        for entry in entries {
            let catalog = match load_catalog(self.store, &entry.catalog_id) {
                Ok(catalog) => catalog,
                Err(EngineError::CatalogNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let Some(requirement) = catalog.requirement(&entry.req_id) else {
                continue;
            };
            let status = requirement
                .issues_linked
                .iter()
                .find(|l| l.issue_key == issue_key)
                .map(|l| l.status)
                .unwrap_or(entry.status);
            enriched.push(LinkedRequirement {
                req_id: entry.req_id,
                catalog_id: entry.catalog_id,
                catalog_title: catalog.title.clone(),
                status,
                requirement: requirement.clone(),
            });
        }
        Ok(enriched)
    }

    /// Groups every work-item document referencing the catalog into
    /// `{issueKey, entries}` summaries.
    pub fn get_for_catalog(&self, catalog_id: &str) -> EngineResult<Vec<WorkItemSummary>> {
        let mut summaries = Vec::new();
        for (key, value) in self.store.query_by_prefix(ISSUE_KEY_PREFIX)? {
            let entries: Vec<WorkItemEntry> = parse_link_entries(&value)
                .into_iter()
                .filter(|e| e.catalog_id == catalog_id)
                .map(|e| WorkItemEntry {
                    req_id: e.req_id,
                    status: e.status,
                })
                .collect();
            if !entries.is_empty() {
                summaries.push(WorkItemSummary {
                    issue_key: key[ISSUE_KEY_PREFIX.len()..].to_string(),
                    entries,
                });
            }
        }
        Ok(summaries)
    }
}
