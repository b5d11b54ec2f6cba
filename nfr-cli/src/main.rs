mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use nfr_core::{
    derive_status, filter_visible, rollup, DerivedStatus, Engine, FileStore, ImportReport,
    LinkOutcome, RequirementDraft, RequirementPatch, SearchEntry, SearchIndex,
};

use crate::cli::{
    CatalogCommand, Cli, Command, DbCommand, ImportCommand, LinkCommand, ReqCommand,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let store = FileStore::new(store_path(cli.db)?);
    let engine = Engine::new(&store);

    match cli.command {
        Command::Catalog(cmd) => handle_catalog(&engine, cmd)?,
        Command::Req(cmd) => handle_req(&engine, cmd)?,
        Command::Link(cmd) => handle_link(&engine, cmd)?,
        Command::Import(cmd) => handle_import(&engine, cmd)?,
        Command::Search { query, field } => handle_search(&engine, &query, field)?,
        Command::Db(DbCommand::Clear { yes }) => {
            if !yes && !confirm("Delete ALL data in the store?")? {
                return Ok(());
            }
            let deleted = engine.delete_all_data()?;
            println!("Deleted {} documents", deleted);
        }
    }

    Ok(())
}

/// Resolves the store file: explicit flag, then $NFR_DB, then a file
/// in the home directory.
fn store_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(path) = std::env::var("NFR_DB") {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".nfr-catalog.json"))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn handle_catalog(engine: &Engine, cmd: CatalogCommand) -> Result<()> {
    match cmd {
        CatalogCommand::Create {
            title,
            description,
            prefix,
            user,
        } => {
            let id = engine.create_catalog(&user, &title, &description, &prefix)?;
            println!("Created catalog {}", id.green());
        }
        CatalogCommand::List => {
            let summaries = engine.list_catalogs()?;
            if summaries.is_empty() {
                println!("No catalogs");
                return Ok(());
            }
            for summary in summaries {
                let visible = filter_visible(&summary.requirements).len();
                println!(
                    "{}  {} [{}] - {} requirements",
                    summary.id.bold(),
                    summary.title,
                    summary.prefix,
                    visible
                );
            }
        }
        CatalogCommand::Show { id } => {
            let catalog = engine.get_catalog(&id)?;
            println!("{} ({})", catalog.title.bold(), catalog.id);
            if !catalog.description.is_empty() {
                println!("{}", catalog.description);
            }
            println!(
                "prefix: {}  created: {}  updated: {}",
                catalog.prefix, catalog.date_creation, catalog.date_update
            );

            let rollup = rollup(&catalog.requirements);
            println!(
                "\nCompliance: {:.0}% ({} requirements)",
                rollup.progress(),
                rollup.total()
            );
            println!("  validated:           {}", rollup.validated.len());
            println!("  validated with risk: {}", rollup.validated_with_risk.len());
            println!("  pending validation:  {}", rollup.pending_validation.len());
            println!("  unfulfilled:         {}", rollup.unfulfilled.len());
            println!("  without work item:   {}", rollup.without_work_item.len());

            for req in filter_visible(&catalog.requirements) {
                let status = derive_status(&req.issues_linked);
                println!(
                    "  {}  {}  {}",
                    req.id.bold(),
                    req.heading,
                    paint_status(status)
                );
            }

            let issues = engine.get_linked_issues(&id)?;
            if !issues.is_empty() {
                println!("\nLinked work items:");
                for summary in issues {
                    let entries: Vec<String> = summary
                        .entries
                        .iter()
                        .map(|e| format!("{} ({})", e.req_id, e.status))
                        .collect();
                    println!("  {}  {}", summary.issue_key.bold(), entries.join(", "));
                }
            }
        }
        CatalogCommand::Delete { id, yes } => {
            if !yes && !confirm(&format!("Delete catalog {} and its links?", id))? {
                return Ok(());
            }
            engine.delete_catalog(&id)?;
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

fn handle_req(engine: &Engine, cmd: ReqCommand) -> Result<()> {
    match cmd {
        ReqCommand::Add {
            catalog_id,
            heading,
            text,
            important,
            section,
            deps,
        } => {
            let dependencies = deps
                .map(|d| d.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            let req = engine.add_requirement(
                &catalog_id,
                RequirementDraft {
                    heading,
                    text,
                    important,
                    section,
                    dependencies,
                },
            )?;
            println!("Added requirement {}", req.id.green());
        }
        ReqCommand::Update {
            catalog_id,
            req_id,
            heading,
            text,
            important,
            section,
        } => {
            engine.update_requirement(
                &catalog_id,
                &req_id,
                RequirementPatch {
                    heading,
                    text,
                    important,
                    section,
                    ..Default::default()
                },
            )?;
            println!("Updated {}", req_id);
        }
        ReqCommand::Delete { catalog_id, req_id } => {
            engine.delete_requirement(&catalog_id, &req_id)?;
            println!("Deleted {}", req_id);
        }
    }
    Ok(())
}

fn handle_link(engine: &Engine, cmd: LinkCommand) -> Result<()> {
    match cmd {
        LinkCommand::Add {
            issue_key,
            req_id,
            catalog_id,
        } => match engine.link_requirement_to_issue(&issue_key, &req_id, &catalog_id)? {
            LinkOutcome::Linked => println!("Linked {} to {}", req_id, issue_key),
            LinkOutcome::AlreadyLinked => {
                println!("{}", "Already linked, nothing to do".yellow())
            }
        },
        LinkCommand::Remove {
            issue_key,
            req_id,
            catalog_id,
        } => {
            engine.unlink_requirement(&issue_key, &req_id, &catalog_id)?;
            println!("Unlinked {} from {}", req_id, issue_key);
        }
        LinkCommand::SetStatus {
            issue_key,
            req_id,
            catalog_id,
            status,
            explanation,
        } => {
            engine.set_status_requirement(
                &issue_key,
                &req_id,
                &catalog_id,
                status.into(),
                explanation,
            )?;
            println!("Status updated for {} on {}", req_id, issue_key);
        }
        LinkCommand::List { issue_key } => {
            let linked = engine.get_linked_requirements(&issue_key)?;
            if linked.is_empty() {
                println!("No requirements linked to {}", issue_key);
                return Ok(());
            }
            for item in linked {
                println!(
                    "{}  {}  [{}]  {}",
                    item.req_id.bold(),
                    item.requirement.heading,
                    item.catalog_title,
                    paint_link_status(item.status)
                );
            }
        }
    }
    Ok(())
}

fn handle_import(engine: &Engine, cmd: ImportCommand) -> Result<()> {
    let report = match cmd {
        ImportCommand::New {
            file,
            name,
            description,
            prefix,
            user,
        } => {
            let csv_text = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            engine.import_hierarchical_csv(&name, &description, &prefix, &csv_text, &user)?
        }
        ImportCommand::Append {
            catalog_id,
            file,
            user,
        } => {
            let csv_text = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            engine.import_csv(&catalog_id, &csv_text, &user)?
        }
    };
    print_report(&report);
    Ok(())
}

fn print_report(report: &ImportReport) {
    println!(
        "Imported {} of {} rows",
        report.success.to_string().green(),
        report.total
    );
    if let Some(catalog_id) = &report.catalog_id {
        println!("New catalog: {}", catalog_id);
    }
    for error in &report.errors {
        println!("  {} row {}: {}", "error".red(), error.row, error.message);
    }
}

fn handle_search(engine: &Engine, query: &str, field: Option<cli::FieldArg>) -> Result<()> {
    // The index is rebuilt per invocation over whatever the store holds.
    let mut entries = Vec::new();
    for summary in engine.list_catalogs()? {
        for req in &summary.requirements {
            entries.push(SearchEntry {
                catalog_id: summary.id.clone(),
                catalog_title: summary.title.clone(),
                requirement: req.clone(),
            });
        }
    }
    let index = SearchIndex::build(entries);

    let mut results = index.query(query, field.map(Into::into));
    results.sort_by(|a, b| a.requirement.id.cmp(&b.requirement.id));
    if results.is_empty() {
        println!("No results for \"{}\"", query);
        return Ok(());
    }
    for entry in results {
        let status = derive_status(&entry.requirement.issues_linked);
        println!(
            "{}  {}  [{}]  {}",
            entry.requirement.id.bold(),
            entry.requirement.heading,
            entry.catalog_title,
            paint_status(status)
        );
    }
    Ok(())
}

fn paint_status(status: DerivedStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        DerivedStatus::Validated => text.green(),
        DerivedStatus::ValidatedWithRisk => text.cyan(),
        DerivedStatus::PendingValidation => text.yellow(),
        DerivedStatus::Unfulfilled => text.red(),
        DerivedStatus::NoStatus | DerivedStatus::Unknown => text.dimmed(),
    }
}

fn paint_link_status(status: nfr_core::LinkStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        nfr_core::LinkStatus::Validated => text.green(),
        nfr_core::LinkStatus::PendingValidation => text.yellow(),
        nfr_core::LinkStatus::Unfulfilled => text.red(),
        nfr_core::LinkStatus::AcceptRisk => text.cyan(),
    }
}
