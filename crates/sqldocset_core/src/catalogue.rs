use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::DocsetConfig;
use crate::entry::EntryType;
use crate::error::ExtractError;
use crate::index::{EntryCriteria, IndexStore};

const EMBEDDED_CATALOGUE: &str = include_str!("../../../config/expected-entries.toml");

/// Entries every full build must produce, keyed by type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalogue {
    entries: BTreeMap<EntryType, BTreeSet<String>>,
}

impl Catalogue {
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_CATALOGUE).context("embedded expected-entries catalogue is invalid")
    }

    /// Parse `Type = ["name", ...]` tables.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<String>> =
            toml::from_str(content).context("failed to parse expected-entries TOML")?;
        let mut catalogue = Self::default();
        for (key, names) in raw {
            let entry_type = key
                .parse::<EntryType>()
                .with_context(|| format!("catalogue key `{key}` is not an entry type"))?;
            for name in names {
                catalogue.insert(entry_type, name);
            }
        }
        Ok(catalogue)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid catalogue {}", path.display()))
    }

    /// The configured catalogue file, or the embedded one.
    pub fn resolve(config: &DocsetConfig, project_root: &Path) -> Result<Self> {
        match config.catalogue_path(project_root) {
            Some(path) => Self::load(&path),
            None => Self::embedded(),
        }
    }

    pub fn insert(&mut self, entry_type: EntryType, name: impl Into<String>) {
        self.entries.entry(entry_type).or_default().insert(name.into());
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pairs(&self) -> impl Iterator<Item = (EntryType, &str)> {
        self.entries.iter().flat_map(|(entry_type, names)| {
            names.iter().map(move |name| (*entry_type, name.as_str()))
        })
    }
}

/// Every catalogued pair with no matching row.
pub fn missing_entries(store: &IndexStore, catalogue: &Catalogue) -> Result<Vec<(EntryType, String)>> {
    let mut missing = Vec::new();
    for (entry_type, name) in catalogue.pairs() {
        if store.count(&EntryCriteria::name_and_type(name, entry_type))? == 0 {
            missing.push((entry_type, name.to_string()));
        }
    }
    Ok(missing)
}

/// Fail on the first catalogued pair that the index does not contain.
pub fn validate(store: &IndexStore, catalogue: &Catalogue) -> Result<usize> {
    for (entry_type, name) in catalogue.pairs() {
        if store.count(&EntryCriteria::name_and_type(name, entry_type))? == 0 {
            return Err(ExtractError::MissingEntry {
                entry_type,
                name: name.to_string(),
            }
            .into());
        }
    }
    info!(checked = catalogue.len(), "expected entries present");
    Ok(catalogue.len())
}
