pub mod catalogs;
pub mod engine;
pub mod error;
pub mod import;
pub mod links;
pub mod models;
pub mod requirements;
pub mod search;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use catalogs::CatalogRepository;
pub use engine::{Engine, ImportReport};
pub use error::{EngineError, EngineResult, StoreError};
pub use import::{
    build_hierarchy, count_requirements, flatten, parse_csv, CsvError, CsvRecord, ParsedCsv,
    RowError, TreeNode, REQUIRED_COLUMNS,
};
pub use links::{IssueLinkRegistry, LinkOutcome};
pub use models::{
    issue_storage_key, Catalog, CatalogSummary, DerivedStatus, IssueLink, LinkEntry, LinkStatus,
    LinkedRequirement, Requirement, RequirementDraft, RequirementPatch, WorkItemEntry,
    WorkItemSummary, CATALOG_KEY_PREFIX, ISSUE_KEY_PREFIX,
};
pub use requirements::{filter_visible, RequirementLifecycle};
pub use search::{SearchEntry, SearchField, SearchIndex, MAX_RESULTS, MAX_TOKEN_LEN, MIN_QUERY_LEN};
pub use status::{derive_status, rollup, StatusRollup};
pub use store::{FileStore, KeyValueStore, MemoryStore};
