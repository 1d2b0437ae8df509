//! Entry extraction: classify a page's headings and table rows into index
//! entries, anchor each one in the page and record it in the index.

mod pages;
pub mod rules;
mod tables;

use std::sync::LazyLock;

use anyhow::Result;
use ego_tree::NodeId;
use itertools::Itertools;
use scraper::{ElementRef, Selector};
use serde::Serialize;
use tracing::debug;

use crate::anchor::make_anchor;
use crate::document::{Document, heading_text, normalize_spaces};
use crate::entry::{EntryType, IndexEntry};
use crate::error::ExtractError;
use crate::index::IndexStore;

pub use tables::classify_cell;

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static HEADING_OR_TABLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h2, h3, h4, h5, h6, table").expect("valid selector")
});

/// An entry derived from one element, not yet anchored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Registration {
    pub target: NodeId,
    pub entry_type: EntryType,
    pub name: String,
}

impl Registration {
    pub fn new(target: NodeId, entry_type: EntryType, name: impl Into<String>) -> Self {
        Self {
            target,
            entry_type,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub shape: &'static str,
    /// Anchors inserted into the page.
    pub registered: usize,
    /// Rows that were new to the index.
    pub inserted: usize,
}

/// A scanned heading and the elements up to the next heading.
pub(crate) struct HeadingScope<'a> {
    pub page: &'a str,
    pub heading: ElementRef<'a>,
    pub title: &'a str,
}

impl<'a> HeadingScope<'a> {
    pub fn register(&self, entry_type: EntryType, name: impl Into<String>) -> Registration {
        Registration::new(self.heading.id(), entry_type, name)
    }

    /// First element in the section matching `selector`, nested ones included.
    pub fn find(&self, selector: &Selector) -> Option<ElementRef<'a>> {
        section_elements(self.heading).find_map(|element| {
            if selector.matches(&element) {
                Some(element)
            } else {
                element.select(selector).next()
            }
        })
    }

    /// Every table in the section, in document order.
    pub fn tables(&self) -> Vec<ElementRef<'a>> {
        section_elements(self.heading)
            .flat_map(|element| {
                if TABLE.matches(&element) {
                    vec![element]
                } else {
                    element.select(&TABLE).collect()
                }
            })
            .collect()
    }

    pub fn missing(&self, expected: &'static str) -> anyhow::Error {
        ExtractError::MissingElement {
            page: self.page.to_string(),
            heading: self.title.to_string(),
            expected,
        }
        .into()
    }

    pub fn unknown(&self, context: &'static str, text: &str) -> anyhow::Error {
        ExtractError::UnknownShape {
            page: self.page.to_string(),
            context,
            text: normalize_spaces(text),
        }
        .into()
    }
}

fn is_heading(element: &ElementRef<'_>) -> bool {
    matches!(
        element.value().name(),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

/// Following siblings of `heading` up to (not including) the next heading.
fn section_elements<'a>(heading: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take_while(|element| !is_heading(element))
}

/// Name of the page shape that handles `file_name`.
pub fn shape_name(file_name: &str) -> &'static str {
    pages::shape_for(file_name).name
}

/// Classify one preprocessed document, anchor its entries and insert them.
///
/// The top-level heading becomes a `Section` pointing at the page itself;
/// every scanned heading becomes a `Section` pointing at its anchor, plus
/// whatever the page's rules derive from it.
pub fn extract(document: &mut Document, store: &IndexStore) -> Result<ExtractReport> {
    let shape = pages::shape_for(document.file_name());
    let mut inserted = 0usize;

    let title = document
        .html()
        .select(&H1)
        .next()
        .map(heading_text)
        .filter(|title| !title.is_empty());
    if let Some(title) = title
        && store.insert(&IndexEntry::new(title, EntryType::Section, document.path()))?
    {
        inserted += 1;
    }

    let registrations = collect(document, shape)?
        .into_iter()
        .unique()
        .collect::<Vec<_>>();
    let registered = registrations.len();
    for registration in registrations {
        let anchor = make_anchor(registration.entry_type, &registration.name, document.path());
        document.prepend_anchor(registration.target, &anchor.id);
        debug!(
            page = document.path(),
            entry_type = %registration.entry_type,
            name = %registration.name,
            "registered entry"
        );
        if store.insert(&IndexEntry::new(
            registration.name,
            registration.entry_type,
            anchor.path,
        ))? {
            inserted += 1;
        }
    }

    debug!(
        page = document.path(),
        shape = shape.name,
        registered,
        inserted,
        "extracted document"
    );
    Ok(ExtractReport {
        shape: shape.name,
        registered,
        inserted,
    })
}

fn collect(document: &Document, shape: &pages::PageShape) -> Result<Vec<Registration>> {
    let page = document.path();
    let mut registrations = Vec::new();

    if let Some(spec) = shape.lead_table
        && let Some(first) = document.html().select(&HEADING_OR_TABLE).next()
        && TABLE.matches(&first)
        && let Some(table) = tables::LabeledTable::find([first], spec.labels)
    {
        registrations.extend(tables::scan_rows(page, &table, spec.bare)?);
    }

    for heading in document.html().select(shape.levels.selector()) {
        let title = heading_text(heading);
        if title.is_empty() {
            continue;
        }
        registrations.push(Registration::new(
            heading.id(),
            EntryType::Section,
            title.as_str(),
        ));
        let scope = HeadingScope {
            page,
            heading,
            title: &title,
        };
        registrations.extend(shape.apply(&scope)?);
    }
    Ok(registrations)
}
