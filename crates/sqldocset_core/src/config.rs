use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str =
    "https://cloud.google.com/bigquery/docs/reference/standard-sql/";
pub const DEFAULT_INDEX_PAGE: &str = "index.html";
pub const DEFAULT_DOCSET_NAME: &str = "BigQuery";
pub const DEFAULT_STYLESHEET: &str = "docset.css";
const DEFAULT_REDIRECT_ALIASES: [&str; 2] = ["enabling-standard-sql", "migrating-from-legacy-sql"];
const DEFAULT_PROBE_SUFFIXES: [&str; 3] = ["", "/index.html", ".html"];

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DocsetConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub docset: DocsetSection,
    #[serde(default)]
    pub validation: ValidationSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteSection {
    pub base_url: String,
    pub index_page: String,
    /// Site paths (relative to `base_url`) that redirect to the index page.
    pub redirect_aliases: Vec<String>,
    /// Suffixes tried in order when mapping a link onto a mirrored file.
    pub probe_suffixes: Vec<String>,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            index_page: DEFAULT_INDEX_PAGE.to_string(),
            redirect_aliases: DEFAULT_REDIRECT_ALIASES.map(str::to_string).to_vec(),
            probe_suffixes: DEFAULT_PROBE_SUFFIXES.map(str::to_string).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocsetSection {
    pub name: String,
    pub stylesheet: String,
}

impl Default for DocsetSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_DOCSET_NAME.to_string(),
            stylesheet: DEFAULT_STYLESHEET.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationSection {
    pub catalogue: String,
}

impl DocsetConfig {
    /// Site root URL: env SQLDOCSET_BASE_URL > config, always with a trailing slash.
    pub fn base_url(&self) -> Result<Url> {
        let raw = match env::var("SQLDOCSET_BASE_URL") {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => self.site.base_url.trim().to_string(),
        };
        let with_slash = if raw.ends_with('/') {
            raw
        } else {
            format!("{raw}/")
        };
        Url::parse(&with_slash).with_context(|| format!("invalid site base_url `{with_slash}`"))
    }

    /// Alternative expected-entries file, resolved against the project root.
    pub fn catalogue_path(&self, project_root: &Path) -> Option<PathBuf> {
        let value = self.validation.catalogue.trim();
        if value.is_empty() {
            return None;
        }
        let path = Path::new(value);
        Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_root.join(path)
        })
    }
}

/// Load and parse a DocsetConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<DocsetConfig> {
    if !config_path.exists() {
        return Ok(DocsetConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: DocsetConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
