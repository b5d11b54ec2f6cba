use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key prefix under which catalog documents are stored.
pub const CATALOG_KEY_PREFIX: &str = "catalog-";

/// Key prefix under which per-work-item link documents are stored.
pub const ISSUE_KEY_PREFIX: &str = "issue-";

/// Builds the storage key for a work item's link document.
pub fn issue_storage_key(issue_key: &str) -> String {
    format!("{}{}", ISSUE_KEY_PREFIX, issue_key)
}

/// Verification status carried by a single work-item link.
///
/// This is the closed set of statuses a caller can set; display-only
/// values derived from a whole link list live in [`DerivedStatus`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkStatus {
    #[serde(rename = "pending_validation")]
    PendingValidation,
    Validated,
    Unfulfilled,
    #[serde(rename = "accept_risk")]
    AcceptRisk,
}

impl LinkStatus {
    /// Statuses that must carry an explanation when set.
    pub fn requires_explanation(&self) -> bool {
        matches!(self, LinkStatus::Unfulfilled | LinkStatus::AcceptRisk)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::PendingValidation => write!(f, "pending_validation"),
            LinkStatus::Validated => write!(f, "Validated"),
            LinkStatus::Unfulfilled => write!(f, "Unfulfilled"),
            LinkStatus::AcceptRisk => write!(f, "accept_risk"),
        }
    }
}

/// Display status derived from a requirement's full link list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DerivedStatus {
    #[serde(rename = "noStatus")]
    NoStatus,
    Unfulfilled,
    #[serde(rename = "pending_validation")]
    PendingValidation,
    Validated,
    #[serde(rename = "validated_with_risk")]
    ValidatedWithRisk,
    Unknown,
}

impl fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivedStatus::NoStatus => write!(f, "noStatus"),
            DerivedStatus::Unfulfilled => write!(f, "Unfulfilled"),
            DerivedStatus::PendingValidation => write!(f, "pending_validation"),
            DerivedStatus::Validated => write!(f, "Validated"),
            DerivedStatus::ValidatedWithRisk => write!(f, "validated_with_risk"),
            DerivedStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Requirement-side copy of a work-item link.
///
/// The matching work-item-side copy is a [`LinkEntry`]; the two must
/// always carry the same status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueLink {
    pub issue_key: String,
    pub status: LinkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub linked_at: DateTime<Utc>,
}

/// Work-item-side copy of a link, one element of an `issue-<key>` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkEntry {
    pub req_id: String,
    pub catalog_id: String,
    pub status: LinkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// A single non-functional requirement or structural container node.
///
/// One canonical shape is used everywhere; legacy field aliases are
/// handled only at the import boundary, never inside the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Unique within its catalog, immutable after creation.
    pub id: String,
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub text: String,
    /// Importance weight, clamped to 0-100.
    #[serde(default)]
    pub important: u8,
    /// Dotted-decimal hierarchy position, e.g. "1.2.3".
    #[serde(default)]
    pub section: String,
    /// Hierarchy depth.
    #[serde(default)]
    pub level: u32,
    /// Weak back-reference to the parent node; relation only, not ownership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// True for structural section nodes with no verification text.
    /// Containers are excluded from status computations and search.
    #[serde(default)]
    pub is_container: bool,
    #[serde(default)]
    pub issues_linked: Vec<IssueLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub catalog_title: String,
}

impl Requirement {
    pub fn is_container_text(text: &str) -> bool {
        text.trim().is_empty()
    }
}

/// Caller-supplied fields for a new requirement.
#[derive(Debug, Clone, Default)]
pub struct RequirementDraft {
    pub heading: String,
    pub text: String,
    pub important: u8,
    pub section: String,
    pub dependencies: Vec<String>,
}

/// Partial update for an existing requirement.
///
/// `issues_linked` is deliberately absent: link state changes only
/// through the issue-link registry, never through a general update.
#[derive(Debug, Clone, Default)]
pub struct RequirementPatch {
    pub heading: Option<String>,
    pub text: Option<String>,
    pub important: Option<u8>,
    pub section: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub correlation: Option<Vec<String>>,
}

/// A titled, prefixed collection of requirements; the unit of storage.
///
/// The whole document (including every requirement) is read and
/// rewritten on each mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Immutable storage key, `catalog-<millis>`.
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Prefix from which requirement ids are derived.
    #[serde(default)]
    pub prefix: String,
    pub date_creation: DateTime<Utc>,
    pub date_update: DateTime<Utc>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    /// Persisted allocation counter for requirement ids. Unlike the
    /// positional `<prefix>-<len>` scheme, this stays gap-safe after
    /// deletions. Seeded lazily for documents written before the
    /// counter existed.
    #[serde(default)]
    pub next_ordinal: u32,
}

impl Catalog {
    /// Creates a catalog with a fresh `catalog-<millis>` id and both
    /// timestamps set to now.
    pub fn new(user_id: &str, title: &str, description: &str, prefix: &str) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}{}", CATALOG_KEY_PREFIX, now.timestamp_millis()),
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            prefix: prefix.to_string(),
            date_creation: now,
            date_update: now,
            requirements: Vec::new(),
            next_ordinal: 0,
        }
    }

    /// Refreshes `date_update`; called on every write.
    pub fn touch(&mut self) {
        self.date_update = Utc::now();
    }

    pub fn requirement(&self, req_id: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.id == req_id)
    }

    pub fn requirement_mut(&mut self, req_id: &str) -> Option<&mut Requirement> {
        self.requirements.iter_mut().find(|r| r.id == req_id)
    }

    /// Allocates the next requirement id as `<prefix>-<ordinal>` and
    /// advances the persisted counter.
    pub fn allocate_requirement_id(&mut self) -> String {
        self.seed_ordinal_if_unset();
        let id = format!("{}-{}", self.prefix, self.next_ordinal);
        self.next_ordinal += 1;
        id
    }

    /// Seeds the counter for catalogs persisted before it existed:
    /// one past the highest ordinal already present, falling back to
    /// the requirement count when no id carries a parseable ordinal.
    fn seed_ordinal_if_unset(&mut self) {
        if self.next_ordinal != 0 || self.requirements.is_empty() {
            return;
        }
        let stem = format!("{}-", self.prefix);
        let highest = self
            .requirements
            .iter()
            .filter_map(|r| r.id.strip_prefix(&stem))
            .filter_map(|rest| rest.parse::<u32>().ok())
            .max();
        self.next_ordinal = match highest {
            Some(n) => n + 1,
            None => self.requirements.len() as u32,
        };
    }
}

/// Lightweight catalog view returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

/// A requirement joined with its work-item link context, as returned
/// by the per-work-item read side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedRequirement {
    pub req_id: String,
    pub catalog_id: String,
    pub catalog_title: String,
    pub status: LinkStatus,
    #[serde(flatten)]
    pub requirement: Requirement,
}

/// One work item and its entries for a given catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemSummary {
    pub issue_key: String,
    pub entries: Vec<WorkItemEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemEntry {
    pub req_id: String,
    pub status: LinkStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&LinkStatus::PendingValidation).unwrap(),
            "\"pending_validation\""
        );
        assert_eq!(
            serde_json::to_string(&LinkStatus::Validated).unwrap(),
            "\"Validated\""
        );
        assert_eq!(
            serde_json::to_string(&LinkStatus::AcceptRisk).unwrap(),
            "\"accept_risk\""
        );
        assert_eq!(
            serde_json::to_string(&DerivedStatus::ValidatedWithRisk).unwrap(),
            "\"validated_with_risk\""
        );
        assert_eq!(
            serde_json::to_string(&DerivedStatus::NoStatus).unwrap(),
            "\"noStatus\""
        );
    }

    #[test]
    fn test_catalog_id_and_timestamps() {
        let catalog = Catalog::new("user-1", "Security", "NFRs", "SEC");
        assert!(catalog.id.starts_with(CATALOG_KEY_PREFIX));
        assert_eq!(catalog.date_creation, catalog.date_update);
        assert!(catalog.requirements.is_empty());
    }

    #[test]
    fn test_allocate_requirement_id_advances() {
        let mut catalog = Catalog::new("u", "T", "D", "SEC");
        assert_eq!(catalog.allocate_requirement_id(), "SEC-0");
        assert_eq!(catalog.allocate_requirement_id(), "SEC-1");
        assert_eq!(catalog.next_ordinal, 2);
    }

    #[test]
    fn test_allocate_requirement_id_seeds_from_existing() {
        let mut catalog = Catalog::new("u", "T", "D", "SEC");
        catalog.requirements.push(Requirement {
            id: "SEC-7".into(),
            heading: String::new(),
            text: String::new(),
            important: 0,
            section: String::new(),
            level: 0,
            parent_id: None,
            children_ids: Vec::new(),
            dependencies: Vec::new(),
            is_container: false,
            issues_linked: Vec::new(),
            correlation: None,
            catalog_title: String::new(),
        });
        // Counter was never persisted; it must not reuse SEC-7.
        assert_eq!(catalog.allocate_requirement_id(), "SEC-8");
    }

    #[test]
    fn test_requirement_defaults_on_sparse_document() {
        let req: Requirement = serde_json::from_str(r#"{"id":"A-1"}"#).unwrap();
        assert_eq!(req.id, "A-1");
        assert!(!req.is_container);
        assert!(req.issues_linked.is_empty());
        assert!(req.parent_id.is_none());
    }

    #[test]
    fn test_issue_storage_key() {
        assert_eq!(issue_storage_key("ABC-1"), "issue-ABC-1");
    }
}
