//! Pure classifiers over heading titles and syntax snippets.
//!
//! Nothing here touches the document tree: every function maps text to
//! zero or more `(type, name)` candidates so each rule can be tested alone.

use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use crate::entry::EntryType;
use crate::expand::{expand, has_groups};

/// Keywords that open a standalone SQL statement.
pub const STATEMENT_LEADING: &[&str] = &[
    "SELECT", "CREATE", "DROP", "ASSERT", "ALTER", "INSERT", "UPDATE", "DELETE", "MERGE",
    "TRUNCATE", "BEGIN", "COMMIT", "ROLLBACK", "DECLARE", "SET", "EXECUTE", "CALL", "RAISE",
    "EXPORT", "LOAD", "GRANT", "REVOKE", "RETURN", "UNDROP",
];

/// Keywords that open a clause or set operation inside a query.
pub const QUERY_LEADING: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "QUALIFY", "WINDOW", "LIMIT", "OFFSET", "WITH",
    "UNION", "INTERSECT", "EXCEPT", "UNNEST", "PIVOT", "UNPIVOT", "TABLESAMPLE", "ON", "USING",
    "PARTITION", "OVER", "MATCH_RECOGNIZE",
];

/// Control-flow keywords of the procedural language.
pub const PROCEDURAL: &[&str] = &[
    "IF", "ELSEIF", "ELSE", "LOOP", "WHILE", "REPEAT", "BREAK", "LEAVE", "CONTINUE", "ITERATE",
    "CASE", "FOR",
];

/// Code literals in the logical-operator prose that are not operators.
pub const LOGICAL_SKIP: &[&str] = &["TRUE", "FALSE", "NULL", "BOOL"];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]\b").expect("valid regex"));
static OPERATOR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[^\sA-Za-z0-9_()]+(?: [^\sA-Za-z0-9_()]+)?|[A-Z]+(?: [A-Z]+)*)$")
        .expect("valid regex")
});
static OPERAND_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z_][a-z0-9_]*\b").expect("valid regex"));
static FUNCTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Z0-9_]*(?:\.[A-Z][A-Z0-9_]*)*)(?:\s*\([^)]*\))?$")
        .expect("valid regex")
});
static ML_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(ML\.[A-Z][A-Z0-9_]*) function$").expect("valid regex"));
static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][A-Z0-9_]*(?:\.[A-Z][A-Z0-9_]*)*)\s*\(").expect("valid regex")
});
static FRAME_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(UNBOUNDED PRECEDING|UNBOUNDED FOLLOWING|CURRENT ROW|ROWS|RANGE|PRECEDING|FOLLOWING)\b",
    )
    .expect("valid regex")
});
static CAPS_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]+$").expect("valid regex"));

/// Result of a title rule: one type, one or more names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub entry_type: EntryType,
    pub names: Vec<String>,
}

impl Classified {
    fn new(entry_type: EntryType, names: Vec<String>) -> Option<Self> {
        if names.is_empty() {
            None
        } else {
            Some(Self { entry_type, names })
        }
    }
}

/// Token found in the prose of a logical-operators section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeToken {
    Operator(String),
    Skip,
}

/// Every maximal run of consecutive all-caps words, in title order.
pub fn all_caps_runs(title: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in title.split_whitespace() {
        let word = word.trim_matches(|c: char| matches!(c, ',' | ':' | ';' | '(' | ')'));
        if CAPS_WORD.is_match(word) {
            current.push(word);
        } else if !current.is_empty() {
            runs.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        runs.push(current.join(" "));
    }
    runs
}

/// True for titles written purely as keyword syntax, e.g. `LEFT [OUTER] JOIN`.
pub fn is_keyword_syntax(title: &str) -> bool {
    title.starts_with(|c: char| c.is_ascii_uppercase() || c == '[')
        && title.chars().any(|c| c.is_ascii_uppercase())
        && title.chars().all(|c| {
            c.is_ascii_uppercase()
                || c.is_ascii_digit()
                || matches!(c, '_' | ' ' | '[' | ']' | '|' | '.')
        })
}

/// `SELECT statement`, `GROUP BY clause`, `LIMIT and OFFSET clause`.
pub fn word_class_title(title: &str) -> Option<Classified> {
    let (head, class) = title.trim().rsplit_once(' ')?;
    let entry_type = match class.to_ascii_lowercase().as_str() {
        "statement" | "statements" => EntryType::Statement,
        "clause" | "clauses" | "keyword" | "keywords" | "operator" | "operators" => {
            EntryType::Query
        }
        _ => return None,
    };
    let head = head.trim();
    let names = if has_groups(head) && is_keyword_syntax(head) {
        expand(head).collect()
    } else {
        all_caps_runs(head)
    };
    Classified::new(entry_type, names)
}

/// Title without its trailing ` operator(s)`, any case.
pub fn strip_operator_suffix(title: &str) -> Option<&str> {
    let lower = title.to_ascii_lowercase();
    [" operators", " operator"]
        .into_iter()
        .find(|suffix| lower.ends_with(suffix))
        .map(|suffix| title[..title.len() - suffix.len()].trim())
}

/// `EXISTS operator`, `IS DISTINCT FROM operator`, `[NOT] IN operators`.
///
/// Only titles whose head is pure keyword syntax name their operator;
/// `JSON subscript operator` does not.
pub fn operator_title(title: &str) -> Option<Classified> {
    let head = strip_operator_suffix(title)?;
    if !is_keyword_syntax(head) {
        return None;
    }
    let names = if has_groups(head) {
        expand(head).collect()
    } else {
        vec![crate::document::normalize_spaces(head)]
    };
    Classified::new(EntryType::Operator, names)
}

/// Operators shown in a syntax block, where operands are lowercase words.
///
/// `expression || expression` gives `||`; lines that read as prose are ignored.
pub fn syntax_block_operators(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| OPERAND_WORD.replace_all(line.trim(), "X"))
        .filter(|line| !line.is_empty())
        .filter_map(|line| operator_forms(&line))
        .flatten()
        .unique()
        .collect()
}

/// A heading that is just a function name: `ABS`, `NET.HOST`, `CONCAT(value1[, ...])`.
pub fn function_heading(title: &str) -> Option<Classified> {
    let captures = FUNCTION_HEADING.captures(title.trim())?;
    Classified::new(EntryType::Function, vec![captures[1].to_string()])
}

/// `ML.EVALUATE function`.
pub fn ml_function_title(title: &str) -> Option<Classified> {
    let captures = ML_FUNCTION.captures(title.trim())?;
    Classified::new(EntryType::Function, vec![captures[1].to_string()])
}

/// Statement or query keyword form, by its leading word.
pub fn classify_form(form: &str) -> Option<EntryType> {
    let first = form.split_whitespace().next()?;
    if STATEMENT_LEADING.contains(&first) {
        Some(EntryType::Statement)
    } else if form.ends_with("JOIN") || QUERY_LEADING.contains(&first) {
        Some(EntryType::Query)
    } else {
        None
    }
}

/// Procedural blocks (`BEGIN...END`, `LOOP`) are directives; embedded statements stay statements.
pub fn procedural_form(form: &str) -> Option<EntryType> {
    if form.contains("...") || PROCEDURAL.contains(&form) {
        return Some(EntryType::Directive);
    }
    match classify_form(form) {
        Some(EntryType::Statement) => Some(EntryType::Statement),
        _ => None,
    }
}

pub fn logical_token(code: &str) -> Option<CodeToken> {
    let code = code.trim();
    if LOGICAL_SKIP.contains(&code) || (code.len() == 1 && PLACEHOLDER.is_match(code)) {
        return Some(CodeToken::Skip);
    }
    if code.len() >= 2 && code.chars().all(|c| c.is_ascii_uppercase()) {
        return Some(CodeToken::Operator(code.to_string()));
    }
    None
}

/// Window-frame keywords mentioned in a syntax block, first occurrence order.
pub fn frame_keywords(text: &str) -> Vec<String> {
    let text = crate::document::normalize_spaces(text);
    FRAME_KEYWORD
        .find_iter(&text)
        .map(|found| found.as_str().to_string())
        .unique()
        .collect()
}

/// Names used in call position (`CAST(`) in a syntax block.
pub fn call_names(text: &str) -> Vec<String> {
    CALL.captures_iter(text)
        .map(|captures| captures[1].to_string())
        .unique()
        .collect()
}

/// Operator names denoted by one operator-table syntax cell.
///
/// Single uppercase letters are operand placeholders. `X [NOT] LIKE Y` gives
/// `LIKE` and `NOT LIKE`; `-X` gives `- (Unary)`; `X IS NULL` gives `IS NULL`.
/// `None` when any alternative has no recognizable operator.
pub fn operator_forms(syntax: &str) -> Option<Vec<String>> {
    let mut forms = Vec::new();
    for alternative in split_alternatives(syntax) {
        forms.extend(alternative_forms(&alternative)?);
    }
    if forms.is_empty() { None } else { Some(forms) }
}

fn split_alternatives(syntax: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in syntax.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current);

    // `X != Y X <> Y` lists two forms: placeholders with nothing between them split
    let mut out = Vec::new();
    for part in parts {
        let marks = PLACEHOLDER.find_iter(&part).collect::<Vec<_>>();
        let mut start = 0usize;
        for (left, right) in marks.iter().tuple_windows() {
            if part[left.end()..right.start()].trim().is_empty() {
                out.push(part[start..right.start()].to_string());
                start = right.start();
            }
        }
        out.push(part[start..].to_string());
    }
    out.into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn alternative_forms(alternative: &str) -> Option<Vec<String>> {
    let marks = PLACEHOLDER.find_iter(alternative).collect::<Vec<_>>();
    let first = marks.first()?;
    let prefix = alternative[..first.start()].trim();
    let (phrase, unary) = if !prefix.is_empty() {
        (prefix, true)
    } else if let Some(second) = marks.get(1) {
        (&alternative[first.end()..second.start()], false)
    } else {
        (&alternative[first.end()..], false)
    };
    let phrase = phrase.trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace());
    if phrase.is_empty() {
        return None;
    }
    // subscripts: `X[Y]` is the `[ ]` operator
    if let Some(second) = marks.get(1)
        && !unary
        && phrase == "["
        && alternative[second.end()..].trim() == "]"
    {
        return Some(vec!["[ ]".to_string()]);
    }
    if !phrase.chars().any(|c| c.is_ascii_alphabetic()) {
        if !OPERATOR_TOKEN.is_match(phrase) {
            return None;
        }
        return Some(vec![if unary {
            format!("{phrase} (Unary)")
        } else {
            phrase.to_string()
        }]);
    }

    let mut forms = Vec::new();
    for form in expand(phrase) {
        if !OPERATOR_TOKEN.is_match(&form) {
            return None;
        }
        forms.push(if unary { format!("{form} (Unary)") } else { form });
    }
    Some(forms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(classified: Option<Classified>) -> (Option<EntryType>, Vec<String>) {
        match classified {
            Some(classified) => (Some(classified.entry_type), classified.names),
            None => (None, Vec::new()),
        }
    }

    #[test]
    fn caps_runs_split_on_lowercase_words() {
        assert_eq!(all_caps_runs("LIMIT and OFFSET"), vec!["LIMIT", "OFFSET"]);
        assert_eq!(all_caps_runs("GROUP BY"), vec!["GROUP BY"]);
        assert_eq!(all_caps_runs("Modifiers for * operator"), Vec::<String>::new());
        assert_eq!(all_caps_runs("Using the WITH clause"), vec!["WITH"]);
    }

    #[test]
    fn word_class_titles_pick_statement_or_query() {
        assert_eq!(
            names(word_class_title("SELECT statement")),
            (Some(EntryType::Statement), vec!["SELECT".to_string()])
        );
        assert_eq!(
            names(word_class_title("LIMIT and OFFSET clause")),
            (
                Some(EntryType::Query),
                vec!["LIMIT".to_string(), "OFFSET".to_string()]
            )
        );
        assert_eq!(
            names(word_class_title("CREATE [OR REPLACE] VIEW statement")),
            (
                Some(EntryType::Statement),
                vec!["CREATE VIEW".to_string(), "CREATE OR REPLACE VIEW".to_string()]
            )
        );
        assert_eq!(word_class_title("Join operation"), None);
        assert_eq!(word_class_title("Modifiers for * operator"), None);
    }

    #[test]
    fn operator_and_function_titles() {
        assert_eq!(
            names(operator_title("IS operators")),
            (Some(EntryType::Operator), vec!["IS".to_string()])
        );
        assert_eq!(
            names(operator_title("IS DISTINCT FROM operator")),
            (Some(EntryType::Operator), vec!["IS DISTINCT FROM".to_string()])
        );
        assert_eq!(
            names(operator_title("EXISTS Operator")),
            (Some(EntryType::Operator), vec!["EXISTS".to_string()])
        );
        assert_eq!(operator_title("Concatenation operator"), None);
        assert_eq!(operator_title("JSON subscript operator"), None);
        assert_eq!(strip_operator_suffix("Bitwise Operators"), Some("Bitwise"));
        assert_eq!(
            names(function_heading("NET.IP_FROM_STRING")),
            (Some(EntryType::Function), vec!["NET.IP_FROM_STRING".to_string()])
        );
        assert_eq!(
            names(function_heading("CONCAT(value1[, ...])")),
            (Some(EntryType::Function), vec!["CONCAT".to_string()])
        );
        assert_eq!(function_heading("Description"), None);
        assert_eq!(
            names(ml_function_title("ML.EVALUATE function")),
            (Some(EntryType::Function), vec!["ML.EVALUATE".to_string()])
        );
    }

    #[test]
    fn keyword_syntax_and_form_classes() {
        assert!(is_keyword_syntax("LEFT [OUTER] JOIN"));
        assert!(is_keyword_syntax("BEGIN...END"));
        assert!(!is_keyword_syntax("SELECT *"));
        assert!(!is_keyword_syntax("CASE search_expression"));

        assert_eq!(classify_form("CREATE TABLE"), Some(EntryType::Statement));
        assert_eq!(classify_form("FULL OUTER JOIN"), Some(EntryType::Query));
        assert_eq!(classify_form("UNION"), Some(EntryType::Query));
        assert_eq!(classify_form("MODEL_TYPE"), None);

        assert_eq!(procedural_form("BEGIN...END"), Some(EntryType::Directive));
        assert_eq!(procedural_form("WHILE"), Some(EntryType::Directive));
        assert_eq!(procedural_form("BEGIN TRANSACTION"), Some(EntryType::Statement));
        assert_eq!(procedural_form("WHERE"), None);
    }

    #[test]
    fn operator_cells_strip_placeholders() {
        assert_eq!(operator_forms("X + Y"), Some(vec!["+".to_string()]));
        assert_eq!(operator_forms("-X"), Some(vec!["- (Unary)".to_string()]));
        assert_eq!(operator_forms("~ X"), Some(vec!["~ (Unary)".to_string()]));
        assert_eq!(
            operator_forms("X [NOT] LIKE Y"),
            Some(vec!["LIKE".to_string(), "NOT LIKE".to_string()])
        );
        assert_eq!(
            operator_forms("X [NOT] BETWEEN Y AND Z"),
            Some(vec!["BETWEEN".to_string(), "NOT BETWEEN".to_string()])
        );
        assert_eq!(
            operator_forms("X IS [NOT] NULL"),
            Some(vec!["IS NULL".to_string(), "IS NOT NULL".to_string()])
        );
        assert_eq!(
            operator_forms("X != Y X <> Y"),
            Some(vec!["!=".to_string(), "<>".to_string()])
        );
        assert_eq!(
            operator_forms("X < Y, X <= Y"),
            Some(vec!["<".to_string(), "<=".to_string()])
        );
        assert_eq!(operator_forms("X [NOT] IN (Y, Z)"), Some(vec!["IN".to_string(), "NOT IN".to_string()]));
        assert_eq!(operator_forms("X[Y]"), Some(vec!["[ ]".to_string()]));
        assert_eq!(operator_forms("expression.fieldname"), None);
        assert_eq!(operator_forms("X foo Y"), None);
        assert_eq!(operator_forms("X 1 Y"), None);
    }

    #[test]
    fn syntax_blocks_name_their_operators() {
        assert_eq!(syntax_block_operators("expression || expression"), vec!["||"]);
        assert_eq!(
            syntax_block_operators("json_expression[array_element_id]\njson_expression[field_name]"),
            vec!["[ ]"]
        );
        assert_eq!(
            syntax_block_operators("left IS [NOT] DISTINCT FROM right"),
            vec!["IS DISTINCT FROM", "IS NOT DISTINCT FROM"]
        );
        assert!(syntax_block_operators("returns the value of the field").is_empty());
    }

    #[test]
    fn logical_tokens_skip_literals() {
        assert_eq!(logical_token("AND"), Some(CodeToken::Operator("AND".to_string())));
        assert_eq!(logical_token("NULL"), Some(CodeToken::Skip));
        assert_eq!(logical_token("X"), Some(CodeToken::Skip));
        assert_eq!(logical_token("x > 1"), None);
    }

    #[test]
    fn syntax_blocks_yield_frame_keywords_and_calls() {
        assert_eq!(
            frame_keywords("{ ROWS | RANGE }\n  UNBOUNDED\n PRECEDING | CURRENT ROW | ROWS"),
            vec!["ROWS", "RANGE", "UNBOUNDED PRECEDING", "CURRENT ROW"]
        );
        assert_eq!(
            call_names("CAST(expression AS typename)\nSAFE_CAST(x AS t) CAST(y)"),
            vec!["CAST", "SAFE_CAST"]
        );
    }
}
