use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Selector};

use super::Registration;
use crate::document::element_text;
use crate::entry::EntryType;
use crate::error::ExtractError;

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));
static DATA_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static CODE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("code").expect("valid selector"));

static DIRECTIVE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@[A-Za-z_][A-Za-z0-9_.]*$").expect("valid regex"));
static CALL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\(")
        .expect("valid regex")
});
static PARAMETERIZED_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Z0-9_]*)\s*<.*>$").expect("valid regex"));
static IDENTIFIER_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid regex")
});

/// How a table-scan rule reads the table it finds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableSpec {
    /// Accepted header labels for the scanned column, lowercase.
    pub labels: &'static [&'static str],
    /// Type given to bare identifiers.
    pub bare: EntryType,
    /// Raise when the section has no labeled table.
    pub required: bool,
}

pub(crate) const FUNCTION_TABLE: TableSpec = TableSpec {
    labels: &["name", "function", "syntax"],
    bare: EntryType::Function,
    required: true,
};

pub(crate) const LEAD_FUNCTION_TABLE: TableSpec = TableSpec {
    required: false,
    ..FUNCTION_TABLE
};

pub(crate) const TYPE_TABLE: TableSpec = TableSpec {
    labels: &["name", "syntax"],
    bare: EntryType::Type,
    required: false,
};

pub(crate) const OPTION_TABLE: TableSpec = TableSpec {
    labels: &["name", "options"],
    bare: EntryType::Option,
    required: true,
};

pub(crate) const VARIABLE_TABLE: TableSpec = TableSpec {
    labels: &["name"],
    bare: EntryType::Directive,
    required: false,
};

pub(crate) const SYNTAX_LABELS: &[&str] = &["syntax"];

pub(crate) const OPERATOR_LABELS: &[&str] = &["operator"];

/// A table whose header row labels the column to read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LabeledTable<'a> {
    pub table: ElementRef<'a>,
    pub column: usize,
    pub label: &'static str,
}

impl<'a> LabeledTable<'a> {
    /// First candidate whose first or second header cell carries one of `labels`.
    pub fn find(
        candidates: impl IntoIterator<Item = ElementRef<'a>>,
        labels: &'static [&'static str],
    ) -> Option<Self> {
        candidates.into_iter().find_map(|table| {
            let header = table.select(&ROW).next()?;
            header
                .select(&CELL)
                .take(2)
                .enumerate()
                .find_map(|(column, cell)| {
                    let text = element_text(cell).to_ascii_lowercase();
                    labels
                        .iter()
                        .find(|label| **label == text)
                        .map(|label| Self {
                            table,
                            column,
                            label: *label,
                        })
                })
        })
    }

    /// Body cells of the labeled column, skipping header-only rows.
    pub fn cells(&self) -> Vec<ElementRef<'a>> {
        self.table
            .select(&ROW)
            .skip(1)
            .filter(|row| row.select(&DATA_CELL).next().is_some())
            .filter_map(|row| row.select(&CELL).nth(self.column))
            .collect()
    }
}

/// First cell of every body row, for tables read without a label.
pub(crate) fn first_column(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    table
        .select(&ROW)
        .filter(|row| row.select(&DATA_CELL).next().is_some())
        .filter_map(|row| row.select(&CELL).next())
        .collect()
}

/// Text a row is classified by: the cell's first non-empty `<code>`, else its full text.
pub(crate) fn cell_text(cell: ElementRef<'_>) -> String {
    cell.select(&CODE)
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| element_text(cell))
}

/// Entries named by one table cell, or `None` when the shape is unknown.
pub fn classify_cell(text: &str, bare: EntryType) -> Option<Vec<(EntryType, String)>> {
    let text = text.trim();
    if let Some(captures) = CALL_SHAPE.captures(text) {
        return Some(vec![(EntryType::Function, captures[1].to_string())]);
    }

    let mut entries = Vec::new();
    for piece in text.split(',').map(str::trim) {
        if DIRECTIVE_SHAPE.is_match(piece) {
            entries.push((EntryType::Directive, piece.to_string()));
        } else if let Some(captures) = PARAMETERIZED_SHAPE.captures(piece)
            && bare == EntryType::Type
        {
            entries.push((EntryType::Type, captures[1].to_string()));
        } else if IDENTIFIER_SHAPE.is_match(piece) {
            entries.push((bare, piece.to_string()));
        } else {
            return None;
        }
    }
    Some(entries)
}

/// Register every body row of `table`; unknown shapes are fatal.
pub(crate) fn scan_rows(
    page: &str,
    table: &LabeledTable<'_>,
    bare: EntryType,
) -> Result<Vec<Registration>> {
    let mut registrations = Vec::new();
    for cell in table.cells() {
        let text = cell_text(cell);
        if text.is_empty() {
            continue;
        }
        let Some(entries) = classify_cell(&text, bare) else {
            return Err(unknown_row(page, table.label, bare, text).into());
        };
        registrations.extend(
            entries
                .into_iter()
                .map(|(entry_type, name)| Registration::new(cell.id(), entry_type, name)),
        );
    }
    Ok(registrations)
}

fn unknown_row(page: &str, label: &str, bare: EntryType, text: String) -> ExtractError {
    let page = page.to_string();
    if label == "function" || bare == EntryType::Function {
        ExtractError::UnknownFunction { page, text }
    } else if bare == EntryType::Type {
        ExtractError::UnknownType { page, text }
    } else {
        ExtractError::UnknownShape {
            page,
            context: "table row",
            text,
        }
    }
}
