//! CSV hierarchy import: delimiter parsing, tree reconstruction from
//! dotted section identifiers, and flattening back into a flat,
//! catalog-ready requirement list.
//!
//! Row-level problems accumulate into the report instead of aborting
//! the import; only a missing header or missing required columns fail
//! the whole parse.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::Requirement;

/// Columns every import must provide, in any order.
pub const REQUIRED_COLUMNS: [&str; 7] =
    ["id", "level", "section", "heading", "text", "important", "dependencies"];

/// Field delimiter. Quoted fields follow RFC4180-style rules: a quote
/// toggles the in-quotes state and a doubled quote inside quotes is a
/// literal quote.
const DELIMITER: char = ';';

/// Whole-input parse failure, raised before any row is processed.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("CSV must contain a header row and at least one data row")]
    Empty,
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// A row-numbered problem. Row numbers are 1-based over the raw input,
/// so the first data row is row 2.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// One successfully parsed data row.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRecord {
    pub id: String,
    pub level: u32,
    pub section: String,
    pub heading: String,
    pub text: String,
    pub important: u8,
    pub dependencies: Vec<String>,
}

/// Parse output: good records plus accumulated row errors.
#[derive(Debug, Default)]
pub struct ParsedCsv {
    pub records: Vec<CsvRecord>,
    pub errors: Vec<RowError>,
    /// Number of non-blank data rows seen.
    pub total_rows: usize,
}

/// A node of the reconstructed section hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub record: CsvRecord,
    pub children: Vec<TreeNode>,
}

/// Splits one line into fields, honoring quoting.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                current.push('"');
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if ch == DELIMITER && !in_quotes {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    fields.push(current);
    fields
}

/// Parses semicolon-delimited text with a header row.
///
/// Fails up front when the header is missing or lacks required
/// columns (the error names every missing one); everything else is a
/// per-row error in the result.
pub fn parse_csv(text: &str) -> Result<ParsedCsv, CsvError> {
    let mut lines = text.trim().lines();
    let header_line = lines.next().ok_or(CsvError::Empty)?;

    let headers: Vec<String> = parse_csv_line(header_line)
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CsvError::MissingColumns(missing));
    }

    let mut parsed = ParsedCsv::default();
    let mut saw_data_row = false;

    for (idx, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        saw_data_row = true;
        parsed.total_rows += 1;
        let row = idx + 2;

        let values = parse_csv_line(line.trim());
        if values.len() != headers.len() {
            parsed.errors.push(RowError {
                row,
                message: "incorrect number of fields".to_string(),
            });
            continue;
        }

        let fields: HashMap<&str, &str> = headers
            .iter()
            .map(String::as_str)
            .zip(values.iter().map(|v| v.trim()))
            .collect();

        let level = match fields["level"].parse::<i64>() {
            Ok(n) => n.max(0) as u32,
            Err(_) => {
                parsed.errors.push(RowError {
                    row,
                    message: "'level' must be a number".to_string(),
                });
                continue;
            }
        };
        let important = match fields["important"].parse::<i64>() {
            Ok(n) => n.clamp(0, 100) as u8,
            Err(_) => {
                parsed.errors.push(RowError {
                    row,
                    message: "'important' must be a number".to_string(),
                });
                continue;
            }
        };
        let dependencies = fields["dependencies"]
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();

        parsed.records.push(CsvRecord {
            id: fields["id"].to_string(),
            level,
            section: fields["section"].to_string(),
            heading: fields["heading"].to_string(),
            text: fields["text"].to_string(),
            important,
            dependencies,
        });
    }

    if !saw_data_row {
        return Err(CsvError::Empty);
    }
    Ok(parsed)
}

/// Reconstructs the parent/child forest from dotted section ids.
///
/// A record's parent is the record whose section equals its own with
/// the last dot-component removed; records without such a parent are
/// roots. The whole forest is then sorted recursively by plain string
/// comparison of sections, which deliberately orders "1.10" before
/// "1.2".
pub fn build_hierarchy(records: Vec<CsvRecord>) -> Vec<TreeNode> {
    struct Slot {
        record: Option<CsvRecord>,
        children: Vec<usize>,
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut slots: Vec<Slot> = Vec::new();
    for record in records {
        match index.get(&record.section) {
            // Duplicate sections keep their original position, last
            // record wins.
            Some(&i) => slots[i].record = Some(record),
            None => {
                index.insert(record.section.clone(), slots.len());
                slots.push(Slot {
                    record: Some(record),
                    children: Vec::new(),
                });
            }
        }
    }

    let mut roots: Vec<usize> = Vec::new();
    for i in 0..slots.len() {
        let section = slots[i]
            .record
            .as_ref()
            .map(|r| r.section.clone())
            .unwrap_or_default();
        let parent_section = match section.rfind('.') {
            Some(pos) => &section[..pos],
            None => "",
        };
        match index.get(parent_section) {
            Some(&p) if !parent_section.is_empty() => slots[p].children.push(i),
            _ => roots.push(i),
        }
    }

    fn assemble(i: usize, slots: &mut [Slot]) -> TreeNode {
        let record = slots[i].record.take().expect("slot assembled twice");
        let children_idx = std::mem::take(&mut slots[i].children);
        TreeNode {
            record,
            children: children_idx
                .into_iter()
                .map(|c| assemble(c, slots))
                .collect(),
        }
    }

    fn sort_tree(nodes: &mut [TreeNode]) {
        nodes.sort_by(|a, b| a.record.section.cmp(&b.record.section));
        for node in nodes {
            sort_tree(&mut node.children);
        }
    }

    let mut forest: Vec<TreeNode> = roots
        .into_iter()
        .map(|i| assemble(i, &mut slots))
        .collect();
    sort_tree(&mut forest);
    forest
}

/// Flattens a forest into a catalog-ready requirement list in
/// document order: each parent immediately precedes its children's
/// subtree. Assigns `parentId`/`childrenIds` back-references, derives
/// `isContainer` from whitespace-only text and tags every node with
/// the catalog title.
pub fn flatten(nodes: &[TreeNode], catalog_title: &str) -> Vec<Requirement> {
    fn walk(
        nodes: &[TreeNode],
        parent_id: Option<&str>,
        catalog_title: &str,
        out: &mut Vec<Requirement>,
    ) {
        for node in nodes {
            let record = &node.record;
            out.push(Requirement {
                id: record.id.clone(),
                heading: record.heading.clone(),
                text: record.text.clone(),
                important: record.important,
                section: record.section.clone(),
                level: record.level,
                parent_id: parent_id.map(str::to_string),
                children_ids: node.children.iter().map(|c| c.record.id.clone()).collect(),
                dependencies: record.dependencies.clone(),
                is_container: Requirement::is_container_text(&record.text),
                issues_linked: Vec::new(),
                correlation: None,
                catalog_title: catalog_title.to_string(),
            });
            walk(&node.children, Some(&record.id), catalog_title, out);
        }
    }

    let mut out = Vec::new();
    walk(nodes, None, catalog_title, &mut out);
    out
}

/// Counts every node in the forest. Iterative on purpose: deep
/// hierarchies must not recurse the stack away.
pub fn count_requirements(nodes: &[TreeNode]) -> usize {
    let mut count = 0;
    let mut stack: Vec<&TreeNode> = nodes.iter().collect();
    while let Some(node) = stack.pop() {
        count += 1;
        stack.extend(node.children.iter());
    }
    count
}
