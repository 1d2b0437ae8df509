use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Kind of a searchable term, rendered with the docset viewer's type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryType {
    Section,
    Statement,
    Query,
    Function,
    Operator,
    Type,
    Directive,
    Option,
}

impl EntryType {
    pub const ALL: [EntryType; 8] = [
        Self::Section,
        Self::Statement,
        Self::Query,
        Self::Function,
        Self::Operator,
        Self::Type,
        Self::Directive,
        Self::Option,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Section => "Section",
            Self::Statement => "Statement",
            Self::Query => "Query",
            Self::Function => "Function",
            Self::Operator => "Operator",
            Self::Type => "Type",
            Self::Directive => "Directive",
            Self::Option => "Option",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        for entry_type in Self::ALL {
            if entry_type.as_str().eq_ignore_ascii_case(value.trim()) {
                return Ok(entry_type);
            }
        }
        bail!("unknown entry type `{value}`")
    }
}

/// One row of the search index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IndexEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub path: String,
}

impl IndexEntry {
    pub fn new(name: impl Into<String>, entry_type: EntryType, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type,
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EntryType;

    #[test]
    fn entry_type_names_parse_back() {
        for entry_type in EntryType::ALL {
            let parsed: EntryType = entry_type.as_str().parse().expect("parse");
            assert_eq!(parsed, entry_type);
        }
        assert_eq!("function".parse::<EntryType>().expect("parse"), EntryType::Function);
        assert!("Keyword".parse::<EntryType>().is_err());
    }
}
