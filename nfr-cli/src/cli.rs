use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nfr", about = "Manage NFR requirement catalogs and work-item verification")]
pub struct Cli {
    /// Path to the store file (defaults to ~/.nfr-catalog.json, or $NFR_DB)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Catalog operations
    #[command(subcommand)]
    Catalog(CatalogCommand),
    /// Requirement operations
    #[command(subcommand)]
    Req(ReqCommand),
    /// Work-item link operations
    #[command(subcommand)]
    Link(LinkCommand),
    /// CSV import
    #[command(subcommand)]
    Import(ImportCommand),
    /// Search requirements across all catalogs
    Search {
        query: String,
        /// Restrict the search to one field
        #[arg(long, value_enum)]
        field: Option<FieldArg>,
    },
    /// Store maintenance
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// Create an empty catalog
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Prefix from which requirement ids are derived
        #[arg(long)]
        prefix: String,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// List all catalogs
    List,
    /// Show one catalog with its compliance roll-up
    Show { id: String },
    /// Delete a catalog and clean up its work-item links
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ReqCommand {
    /// Add a requirement to a catalog
    Add {
        catalog_id: String,
        #[arg(long)]
        heading: String,
        #[arg(long, default_value = "")]
        text: String,
        #[arg(long, default_value_t = 0)]
        important: u8,
        #[arg(long, default_value = "")]
        section: String,
        /// Comma-separated requirement ids this one depends on
        #[arg(long)]
        deps: Option<String>,
    },
    /// Update fields of a requirement (link state is never touched)
    Update {
        catalog_id: String,
        req_id: String,
        #[arg(long)]
        heading: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        important: Option<u8>,
        #[arg(long)]
        section: Option<String>,
    },
    /// Delete a requirement and clean up its work-item links
    Delete { catalog_id: String, req_id: String },
}

#[derive(Subcommand)]
pub enum LinkCommand {
    /// Link a requirement to a work item (starts pending validation)
    Add {
        issue_key: String,
        req_id: String,
        catalog_id: String,
    },
    /// Remove a link from both sides
    Remove {
        issue_key: String,
        req_id: String,
        catalog_id: String,
    },
    /// Set the verification status of a link
    SetStatus {
        issue_key: String,
        req_id: String,
        catalog_id: String,
        #[arg(value_enum)]
        status: StatusArg,
        /// Required for unfulfilled and accept-risk
        #[arg(long)]
        explanation: Option<String>,
    },
    /// List requirements linked to a work item
    List { issue_key: String },
}

#[derive(Subcommand)]
pub enum ImportCommand {
    /// Import a hierarchical CSV into a brand-new catalog
    New {
        /// CSV file path
        file: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        prefix: String,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Append a hierarchical CSV to an existing catalog
    Append {
        catalog_id: String,
        /// CSV file path
        file: PathBuf,
        #[arg(long, default_value = "cli")]
        user: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Delete every document in the store
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StatusArg {
    PendingValidation,
    Validated,
    Unfulfilled,
    AcceptRisk,
}

impl From<StatusArg> for nfr_core::LinkStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::PendingValidation => nfr_core::LinkStatus::PendingValidation,
            StatusArg::Validated => nfr_core::LinkStatus::Validated,
            StatusArg::Unfulfilled => nfr_core::LinkStatus::Unfulfilled,
            StatusArg::AcceptRisk => nfr_core::LinkStatus::AcceptRisk,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FieldArg {
    Heading,
    Text,
    CatalogTitle,
}

impl From<FieldArg> for nfr_core::SearchField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Heading => nfr_core::SearchField::Heading,
            FieldArg::Text => nfr_core::SearchField::Text,
            FieldArg::CatalogTitle => nfr_core::SearchField::CatalogTitle,
        }
    }
}
