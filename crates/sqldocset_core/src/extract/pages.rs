//! Page shapes: which headings each reference page scans and the ordered
//! rules tried against every heading title.

use std::sync::LazyLock;

use anyhow::Result;
use scraper::Selector;
use tracing::debug;

use super::rules::{self, Classified, CodeToken};
use super::tables::{
    self, FUNCTION_TABLE, LEAD_FUNCTION_TABLE, LabeledTable, OPERATOR_LABELS, OPTION_TABLE,
    SYNTAX_LABELS, TYPE_TABLE, TableSpec, VARIABLE_TABLE,
};
use super::{HeadingScope, Registration};
use crate::document::element_text;
use crate::entry::EntryType;
use crate::error::ExtractError;
use crate::expand::expand;

static H2: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2").expect("valid selector"));
static H2_TO_H3: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2, h3").expect("valid selector"));
static H2_TO_H4: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2, h3, h4").expect("valid selector"));
static PRE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("pre").expect("valid selector"));
static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid selector"));
static CODE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("code").expect("valid selector"));

/// Heading levels a page shape scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Levels {
    H2,
    H2ToH3,
    H2ToH4,
}

impl Levels {
    pub fn selector(self) -> &'static Selector {
        match self {
            Self::H2 => &H2,
            Self::H2ToH3 => &H2_TO_H3,
            Self::H2ToH4 => &H2_TO_H4,
        }
    }
}

type ScopeHandler = fn(&HeadingScope<'_>) -> Result<Vec<Registration>>;

/// One heading rule; the first rule that matches a title decides it.
#[derive(Clone, Copy)]
pub(crate) enum Rule {
    /// Known to carry nothing beyond its section entry.
    Skip(fn(&str) -> bool),
    /// Pure title classification; matches when it yields names.
    Title(fn(&str) -> Option<Classified>),
    /// Reads the elements that follow the heading.
    Scope(fn(&str) -> bool, ScopeHandler),
}

pub(crate) struct PageShape {
    pub name: &'static str,
    matches: fn(&str) -> bool,
    pub levels: Levels,
    pub rules: &'static [Rule],
    /// Table read when it precedes every scanned heading.
    pub lead_table: Option<TableSpec>,
}

impl PageShape {
    /// Registrations from the first matching rule, in addition to the section entry.
    pub fn apply(&self, scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
        for rule in self.rules {
            match *rule {
                Rule::Skip(matches) => {
                    if matches(scope.title) {
                        debug!(page = scope.page, heading = scope.title, "skipped heading");
                        return Ok(Vec::new());
                    }
                }
                Rule::Title(classify) => {
                    if let Some(classified) = classify(scope.title) {
                        return Ok(classified
                            .names
                            .into_iter()
                            .map(|name| scope.register(classified.entry_type, name))
                            .collect());
                    }
                }
                Rule::Scope(matches, handler) => {
                    if matches(scope.title) {
                        return handler(scope);
                    }
                }
            }
        }
        Ok(Vec::new())
    }
}

const QUERY_SYNTAX_RULES: &[Rule] = &[
    Rule::Scope(is_window_frame, window_frame),
    Rule::Scope(rules::is_keyword_syntax, query_keywords),
    Rule::Title(rules::word_class_title),
];

const OPERATOR_RULES: &[Rule] = &[
    Rule::Skip(is_operator_precedence),
    Rule::Scope(is_logical_operators, logical_operators),
    Rule::Scope(is_element_access, element_access),
    Rule::Scope(is_operator_group, operator_group),
    Rule::Scope(is_function_list, function_list),
    Rule::Title(rules::function_heading),
];

const CONVERSION_RULES: &[Rule] = &[
    Rule::Scope(is_casting, casting),
    Rule::Scope(is_function_list, function_list),
    Rule::Title(rules::function_heading),
];

const WINDOW_CALL_RULES: &[Rule] = &[
    Rule::Scope(is_window_frame, window_frame),
    Rule::Scope(is_function_list, function_list),
    Rule::Title(rules::function_heading),
];

const FUNCTION_RULES: &[Rule] = &[
    Rule::Scope(is_function_list, function_list),
    Rule::Title(rules::function_heading),
];

const DATA_TYPE_RULES: &[Rule] = &[Rule::Scope(is_type_heading, type_table)];

const STATEMENT_RULES: &[Rule] = &[
    Rule::Scope(is_option_list, option_table),
    Rule::Title(rules::word_class_title),
    Rule::Scope(rules::is_keyword_syntax, statement_keywords),
];

const PROCEDURAL_RULES: &[Rule] = &[
    Rule::Scope(rules::is_keyword_syntax, procedural_keywords),
    Rule::Title(rules::word_class_title),
];

const SYSTEM_VARIABLE_RULES: &[Rule] = &[Rule::Scope(any_title, variable_table)];

const ML_RULES: &[Rule] = &[
    Rule::Title(rules::ml_function_title),
    Rule::Title(rules::word_class_title),
    Rule::Scope(is_option_list, option_table),
    Rule::Scope(rules::is_keyword_syntax, ml_keywords),
];

const STATEMENT_PAGES: &[&str] = &[
    "data-definition-language.html",
    "dml-syntax.html",
    "data-control-language.html",
    "debugging-statements.html",
    "other-statements.html",
    "load-statements.html",
    "export-statements.html",
    "transactions.html",
];

static SHAPES: &[PageShape] = &[
    PageShape {
        name: "query-syntax",
        matches: is_query_syntax_page,
        levels: Levels::H2ToH4,
        rules: QUERY_SYNTAX_RULES,
        lead_table: None,
    },
    PageShape {
        name: "operators",
        matches: is_operators_page,
        levels: Levels::H2ToH3,
        rules: OPERATOR_RULES,
        lead_table: None,
    },
    PageShape {
        name: "conversion-functions",
        matches: is_conversion_page,
        levels: Levels::H2ToH3,
        rules: CONVERSION_RULES,
        lead_table: Some(LEAD_FUNCTION_TABLE),
    },
    PageShape {
        name: "window-function-calls",
        matches: is_window_calls_page,
        levels: Levels::H2ToH3,
        rules: WINDOW_CALL_RULES,
        lead_table: None,
    },
    PageShape {
        name: "functions",
        matches: is_functions_page,
        levels: Levels::H2ToH3,
        rules: FUNCTION_RULES,
        lead_table: Some(LEAD_FUNCTION_TABLE),
    },
    PageShape {
        name: "data-types",
        matches: is_data_types_page,
        levels: Levels::H2ToH3,
        rules: DATA_TYPE_RULES,
        lead_table: None,
    },
    PageShape {
        name: "statements",
        matches: is_statement_page,
        levels: Levels::H2ToH3,
        rules: STATEMENT_RULES,
        lead_table: None,
    },
    PageShape {
        name: "procedural-language",
        matches: is_procedural_page,
        levels: Levels::H2ToH4,
        rules: PROCEDURAL_RULES,
        lead_table: None,
    },
    PageShape {
        name: "system-variables",
        matches: is_system_variables_page,
        levels: Levels::H2,
        rules: SYSTEM_VARIABLE_RULES,
        lead_table: None,
    },
    PageShape {
        name: "bigqueryml-syntax",
        matches: is_ml_page,
        levels: Levels::H2ToH4,
        rules: ML_RULES,
        lead_table: None,
    },
];

static DEFAULT_SHAPE: PageShape = PageShape {
    name: "default",
    matches: any_title,
    levels: Levels::H2ToH3,
    rules: &[],
    lead_table: None,
};

pub(crate) fn shape_for(file_name: &str) -> &'static PageShape {
    SHAPES
        .iter()
        .find(|shape| (shape.matches)(file_name))
        .unwrap_or(&DEFAULT_SHAPE)
}

fn is_query_syntax_page(file_name: &str) -> bool {
    file_name == "query-syntax.html"
}

fn is_operators_page(file_name: &str) -> bool {
    matches!(file_name, "operators.html" | "functions-and-operators.html")
}

fn is_conversion_page(file_name: &str) -> bool {
    file_name == "conversion_functions.html"
}

fn is_window_calls_page(file_name: &str) -> bool {
    file_name == "window-function-calls.html"
}

fn is_functions_page(file_name: &str) -> bool {
    file_name.ends_with("_functions.html") || file_name.ends_with("-functions.html")
}

fn is_data_types_page(file_name: &str) -> bool {
    file_name == "data-types.html"
}

fn is_statement_page(file_name: &str) -> bool {
    STATEMENT_PAGES.contains(&file_name)
}

fn is_procedural_page(file_name: &str) -> bool {
    file_name == "procedural-language.html"
}

fn is_system_variables_page(file_name: &str) -> bool {
    file_name == "system-variables.html"
}

fn is_ml_page(file_name: &str) -> bool {
    file_name.starts_with("bigqueryml-syntax-") && file_name.ends_with(".html")
}

fn any_title(_: &str) -> bool {
    true
}

fn is_window_frame(title: &str) -> bool {
    title.eq_ignore_ascii_case("Defining the window frame clause")
}

fn is_operator_precedence(title: &str) -> bool {
    title.eq_ignore_ascii_case("Operator precedence")
}

fn is_logical_operators(title: &str) -> bool {
    title.eq_ignore_ascii_case("Logical operators")
}

fn is_element_access(title: &str) -> bool {
    title.eq_ignore_ascii_case("Element access operators")
}

fn is_operator_group(title: &str) -> bool {
    rules::strip_operator_suffix(title).is_some()
}

fn is_casting(title: &str) -> bool {
    title.eq_ignore_ascii_case("Casting")
}

fn is_function_list(title: &str) -> bool {
    title.eq_ignore_ascii_case("Function list")
}

fn is_type_heading(title: &str) -> bool {
    let lower = title.to_ascii_lowercase();
    lower.ends_with(" type") || lower.ends_with(" types")
}

fn is_option_list(title: &str) -> bool {
    let lower = title.to_ascii_lowercase();
    lower.ends_with("option_list") || lower.ends_with("option list")
}

fn table_scan(scope: &HeadingScope<'_>, spec: TableSpec) -> Result<Vec<Registration>> {
    match LabeledTable::find(scope.tables(), spec.labels) {
        Some(table) => tables::scan_rows(scope.page, &table, spec.bare),
        None if spec.required => Err(scope.missing("labeled table")),
        None => {
            debug!(page = scope.page, heading = scope.title, "no labeled table");
            Ok(Vec::new())
        }
    }
}

fn function_list(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    table_scan(scope, FUNCTION_TABLE)
}

fn type_table(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    table_scan(scope, TYPE_TABLE)
}

fn option_table(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    table_scan(scope, OPTION_TABLE)
}

fn variable_table(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    table_scan(scope, VARIABLE_TABLE)
}

fn syntax_block(scope: &HeadingScope<'_>) -> Result<String> {
    let block = scope
        .find(&PRE)
        .ok_or_else(|| scope.missing("syntax block"))?;
    Ok(block.text().collect())
}

fn window_frame(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    let text = syntax_block(scope)?;
    let keywords = rules::frame_keywords(&text);
    if keywords.is_empty() {
        return Err(scope.unknown("window frame syntax", &text));
    }
    Ok(keywords
        .into_iter()
        .map(|keyword| scope.register(EntryType::Query, keyword))
        .collect())
}

fn casting(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    let text = syntax_block(scope)?;
    let names = rules::call_names(&text);
    if names.is_empty() {
        return Err(scope.unknown("casting syntax", &text));
    }
    Ok(names
        .into_iter()
        .map(|name| scope.register(EntryType::Function, name))
        .collect())
}

fn logical_operators(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    let paragraph = scope
        .find(&PARAGRAPH)
        .ok_or_else(|| scope.missing("paragraph"))?;
    let mut registrations = Vec::new();
    for code in paragraph.select(&CODE) {
        let text = element_text(code);
        match rules::logical_token(&text) {
            Some(CodeToken::Operator(name)) => {
                registrations.push(scope.register(EntryType::Operator, name));
            }
            Some(CodeToken::Skip) => {}
            None => {
                return Err(ExtractError::UnknownOperator {
                    page: scope.page.to_string(),
                    text,
                }
                .into());
            }
        }
    }
    Ok(registrations)
}

fn element_access(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    let table = scope
        .tables()
        .into_iter()
        .next()
        .ok_or_else(|| scope.missing("table"))?;
    Ok(tables::first_column(table)
        .into_iter()
        .filter_map(|cell| {
            let name = element_text(cell);
            (!name.is_empty()).then(|| Registration::new(cell.id(), EntryType::Operator, name))
        })
        .collect())
}

/// `… operator(s)` sections: a syntax (or operator) table, else a keyword
/// title, else the syntax block. A section none of them explains is fatal.
fn operator_group(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    let candidates = scope.tables();
    let table = LabeledTable::find(candidates.iter().copied(), SYNTAX_LABELS)
        .or_else(|| LabeledTable::find(candidates.iter().copied(), OPERATOR_LABELS));
    if let Some(table) = table {
        return operator_rows(scope, &table);
    }

    if let Some(classified) = rules::operator_title(scope.title) {
        return Ok(classified
            .names
            .into_iter()
            .map(|name| scope.register(EntryType::Operator, name))
            .collect());
    }

    if let Some(block) = scope.find(&PRE) {
        let forms = rules::syntax_block_operators(&block.text().collect::<String>());
        if !forms.is_empty() {
            return Ok(forms
                .into_iter()
                .map(|form| Registration::new(block.id(), EntryType::Operator, form))
                .collect());
        }
    }

    Err(ExtractError::UnknownOperator {
        page: scope.page.to_string(),
        text: scope.title.to_string(),
    }
    .into())
}

fn operator_rows(scope: &HeadingScope<'_>, table: &LabeledTable<'_>) -> Result<Vec<Registration>> {
    let mut registrations = Vec::new();
    for cell in table.cells() {
        let text = element_text(cell);
        if text.is_empty() || text.to_ascii_lowercase().contains("see below") {
            continue;
        }
        let forms = rules::operator_forms(&text).ok_or_else(|| ExtractError::UnknownOperator {
            page: scope.page.to_string(),
            text: text.clone(),
        })?;
        registrations.extend(
            forms
                .into_iter()
                .map(|form| Registration::new(cell.id(), EntryType::Operator, form)),
        );
    }
    Ok(registrations)
}

fn expanded_keywords(
    scope: &HeadingScope<'_>,
    classify: fn(&str) -> Option<EntryType>,
    fallback: Option<EntryType>,
) -> Result<Vec<Registration>> {
    let mut registrations = Vec::new();
    for form in expand(scope.title) {
        if form.is_empty() {
            continue;
        }
        let Some(entry_type) = classify(&form).or(fallback) else {
            return Err(ExtractError::UnknownDirective {
                page: scope.page.to_string(),
                text: form,
            }
            .into());
        };
        registrations.push(scope.register(entry_type, form));
    }
    Ok(registrations)
}

fn query_keywords(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    expanded_keywords(scope, rules::classify_form, None)
}

fn statement_keywords(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    expanded_keywords(scope, rules::classify_form, None)
}

fn procedural_keywords(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    expanded_keywords(scope, rules::procedural_form, None)
}

/// Model option headings (`MODEL_TYPE`) are indexed as options.
fn ml_keywords(scope: &HeadingScope<'_>) -> Result<Vec<Registration>> {
    expanded_keywords(scope, rules::classify_form, Some(EntryType::Option))
}
