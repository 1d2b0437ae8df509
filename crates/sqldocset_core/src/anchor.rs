use url::form_urlencoded::byte_serialize;

use crate::entry::EntryType;

const ANCHOR_PREFIX: &str = "//apple_ref/cpp";

/// Anchor identifier plus the index path pointing at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub id: String,
    pub path: String,
}

/// `//apple_ref/cpp/{type}/{name}` with both parts form-encoded and spaces as `%20`.
pub fn anchor_id(entry_type: EntryType, name: &str) -> String {
    format!(
        "{ANCHOR_PREFIX}/{}/{}",
        encode_component(entry_type.as_str()),
        encode_component(name)
    )
}

pub fn make_anchor(entry_type: EntryType, name: &str, document_path: &str) -> Anchor {
    let id = anchor_id(entry_type, name);
    let path = format!("{document_path}#{id}");
    Anchor { id, path }
}

/// Form encoding with the quote_plus safe set (`_.-~` plus alphanumerics).
fn encode_component(value: &str) -> String {
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%7E", "~")
}

#[cfg(test)]
mod tests {
    use super::{anchor_id, make_anchor};
    use crate::entry::EntryType;

    #[test]
    fn spaces_render_as_percent_twenty() {
        let id = anchor_id(EntryType::Statement, "CREATE TABLE");
        assert_eq!(id, "//apple_ref/cpp/Statement/CREATE%20TABLE");
        assert!(!id.contains('+'));
    }

    #[test]
    fn operators_are_percent_encoded() {
        assert_eq!(
            anchor_id(EntryType::Operator, "+"),
            "//apple_ref/cpp/Operator/%2B"
        );
        assert_eq!(
            anchor_id(EntryType::Operator, "- (Unary)"),
            "//apple_ref/cpp/Operator/-%20%28Unary%29"
        );
        assert_eq!(
            anchor_id(EntryType::Operator, "*"),
            "//apple_ref/cpp/Operator/%2A"
        );
        assert_eq!(
            anchor_id(EntryType::Operator, "~ (Unary)"),
            "//apple_ref/cpp/Operator/~%20%28Unary%29"
        );
        assert_eq!(
            anchor_id(EntryType::Directive, "@@current_job_id"),
            "//apple_ref/cpp/Directive/%40%40current_job_id"
        );
    }

    #[test]
    fn anchors_are_deterministic_and_path_carries_document() {
        let first = make_anchor(EntryType::Function, "ABS", "mathematical_functions.html");
        let second = make_anchor(EntryType::Function, "ABS", "mathematical_functions.html");
        assert_eq!(first, second);
        assert_eq!(
            first.path,
            "mathematical_functions.html#//apple_ref/cpp/Function/ABS"
        );

        let elsewhere = make_anchor(EntryType::Function, "ABS", "functions-and-operators.html");
        assert_eq!(elsewhere.id, first.id);
        assert_ne!(elsewhere.path, first.path);
    }
}
