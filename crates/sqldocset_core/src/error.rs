use thiserror::Error;

use crate::entry::EntryType;

/// Fatal classification and validation failures.
///
/// Every variant names the page and the text that failed to classify so the
/// offending rule can be found without re-running the build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("{page}: unknown function `{text}`")]
    UnknownFunction { page: String, text: String },
    #[error("{page}: unknown type `{text}`")]
    UnknownType { page: String, text: String },
    #[error("{page}: unknown operator `{text}`")]
    UnknownOperator { page: String, text: String },
    #[error("{page}: unknown directive `{text}`")]
    UnknownDirective { page: String, text: String },
    #[error("{page}: unrecognized {context} `{text}`")]
    UnknownShape {
        page: String,
        context: &'static str,
        text: String,
    },
    #[error("{page}: heading `{heading}` has no {expected}")]
    MissingElement {
        page: String,
        heading: String,
        expected: &'static str,
    },
    #[error("expected {entry_type} entry `{name}` is missing from the index")]
    MissingEntry { entry_type: EntryType, name: String },
}
