use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalogue::{Catalogue, validate};
use crate::config::DocsetConfig;
use crate::document::{Document, absolute_path};
use crate::dump::UNVERSIONED;
use crate::extract::extract;
use crate::index::IndexStore;
use crate::rewrite::{SiteLayout, preprocess};
use crate::runtime::{ResolvedPaths, ensure_runtime_ready_for_build, inspect_runtime};

const EMBEDDED_STYLESHEET: &str = include_str!("../../../config/docset.css");
const STAGED_SUFFIX: &str = ".sqldocset-staged";

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub skip_validation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub inserted: usize,
    pub rewritten_links: usize,
    pub simplified: usize,
    pub counts_by_type: BTreeMap<String, usize>,
    pub last_updated: Option<String>,
    /// Catalogue entries checked; `None` when validation was skipped.
    pub validated: Option<usize>,
    pub wrote_stylesheet: bool,
    pub db_path: PathBuf,
}

impl BuildReport {
    /// Version label for dumps and archives: the newest page stamp.
    pub fn version(&self) -> &str {
        self.last_updated.as_deref().unwrap_or(UNVERSIONED)
    }
}

/// Rewrite and index every page under `docs/`, then validate.
///
/// Index rows and page rewrites are only persisted once every page was
/// classified and the catalogue check passed. Pages are staged beside their
/// originals, the index is committed, and only then are the staged pages
/// moved into place; any earlier error rolls the index back and leaves the
/// pages untouched.
pub fn build_docset(
    paths: &ResolvedPaths,
    config: &DocsetConfig,
    catalogue: &Catalogue,
    options: &BuildOptions,
) -> Result<BuildReport> {
    let status = inspect_runtime(paths)?;
    ensure_runtime_ready_for_build(paths, &status)?;

    let wrote_stylesheet = ensure_stylesheet(&paths.docs_dir, &config.docset.stylesheet)?;
    let site = SiteLayout::new(config, &paths.docs_dir)?;
    let documents = collect_documents(&paths.docs_dir)?;
    if documents.is_empty() {
        warn!(docs_dir = %paths.docs_dir.display(), "no HTML documents to index");
    }
    info!(documents = documents.len(), "building docset index");

    let store = IndexStore::open(&paths.db_path)?;
    let transaction = store.begin()?;
    store.clear()?;

    let mut report = BuildReport {
        documents: 0,
        inserted: 0,
        rewritten_links: 0,
        simplified: 0,
        counts_by_type: BTreeMap::new(),
        last_updated: None,
        validated: None,
        wrote_stylesheet,
        db_path: paths.db_path.clone(),
    };
    let mut rendered = Vec::with_capacity(documents.len());

    for relative in &documents {
        let mut document = Document::load(&paths.docs_dir, relative)?;
        let preprocessed = preprocess(&mut document, &site);
        let extracted = extract(&mut document, &store)
            .with_context(|| format!("failed to index {relative}"))?;

        report.documents += 1;
        report.inserted += extracted.inserted;
        report.rewritten_links += preprocessed.rewritten_links;
        if preprocessed.simplified {
            report.simplified += 1;
        }
        if let Some(date) = preprocessed.last_updated
            && report.last_updated.as_ref().is_none_or(|newest| *newest < date)
        {
            report.last_updated = Some(date);
        }
        debug!(
            page = relative.as_str(),
            shape = extracted.shape,
            entries = extracted.registered,
            "indexed document"
        );
        rendered.push(document);
    }
    info!(inserted = report.inserted, "extraction finished");

    if options.skip_validation {
        warn!("catalogue validation skipped");
    } else {
        report.validated = Some(validate(&store, catalogue)?);
    }
    report.counts_by_type = store.counts_by_type()?;

    let staged = stage_documents(&paths.docs_dir, &rendered)?;
    if let Err(error) = transaction.commit() {
        discard_staged(&staged);
        return Err(error).context("failed to commit index transaction");
    }
    for page in &staged {
        fs::rename(&page.temp, &page.target).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                page.temp.display(),
                page.target.display()
            )
        })?;
    }
    info!(
        documents = report.documents,
        version = report.version(),
        db = %report.db_path.display(),
        "docset built"
    );
    Ok(report)
}

/// Site-relative paths of every `.html` file, in stable file-name order.
pub fn collect_documents(docs_dir: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(docs_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", docs_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("html") {
            continue;
        }
        let relative = path
            .strip_prefix(docs_dir)
            .with_context(|| format!("{} is outside {}", path.display(), docs_dir.display()))?;
        let relative = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(relative);
    }
    Ok(out)
}

/// A rewritten page written next to its original, waiting to replace it.
#[derive(Debug)]
struct StagedPage {
    temp: PathBuf,
    target: PathBuf,
}

/// Write every page to a hidden sibling; on failure nothing is left behind.
fn stage_documents(docs_dir: &Path, documents: &[Document]) -> Result<Vec<StagedPage>> {
    let mut staged = Vec::with_capacity(documents.len());
    for document in documents {
        match stage_document(docs_dir, document) {
            Ok(page) => staged.push(page),
            Err(error) => {
                discard_staged(&staged);
                return Err(error);
            }
        }
    }
    Ok(staged)
}

fn stage_document(docs_dir: &Path, document: &Document) -> Result<StagedPage> {
    let target = absolute_path(docs_dir, document.path());
    let temp = target.with_file_name(format!(".{}{STAGED_SUFFIX}", document.file_name()));
    fs::write(&temp, document.to_html())
        .with_context(|| format!("failed to stage document {}", temp.display()))?;
    Ok(StagedPage { temp, target })
}

fn discard_staged(staged: &[StagedPage]) {
    for page in staged {
        if let Err(error) = fs::remove_file(&page.temp) {
            warn!(path = %page.temp.display(), %error, "failed to remove staged page");
        }
    }
}

fn ensure_stylesheet(docs_dir: &Path, stylesheet: &str) -> Result<bool> {
    let path = absolute_path(docs_dir, stylesheet);
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, EMBEDDED_STYLESHEET)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{BuildOptions, STAGED_SUFFIX, build_docset, collect_documents, stage_documents};
    use crate::catalogue::Catalogue;
    use crate::config::DocsetConfig;
    use crate::document::Document;
    use crate::entry::EntryType;
    use crate::error::ExtractError;
    use crate::index::{EntryCriteria, IndexStore};
    use crate::runtime::ResolvedPaths;

    fn page(title: &str, date: &str, article: &str) -> String {
        format!(
            r#"<!doctype html><html><head><title>{title}</title>
<script src="/bq.js"></script></head><body>
<devsite-header>Google Cloud</devsite-header>
<article class="devsite-article"><h1>{title}</h1>{article}</article>
<devsite-content-footer><p>Last updated {date} UTC.</p></devsite-content-footer>
</body></html>"#
        )
    }

    fn write_mirror(docs: &Path) {
        fs::create_dir_all(docs.join("guide")).expect("create docs");
        fs::write(
            docs.join("query-syntax.html"),
            page(
                "Query syntax",
                "2024-05-13",
                r#"<h2>SELECT statement</h2><p>See <a href="/bigquery/docs/reference/standard-sql/operators">operators</a>.</p>
<h2>FROM clause</h2>"#,
            ),
        )
        .expect("write page");
        fs::write(
            docs.join("operators.html"),
            page(
                "Operators",
                "2024-06-01",
                r#"<h2>Arithmetic operators</h2>
<table><tr><th>Name</th><th>Syntax</th></tr><tr><td>Addition</td><td>X + Y</td></tr></table>"#,
            ),
        )
        .expect("write page");
        fs::write(
            docs.join("mathematical_functions.html"),
            page(
                "Mathematical functions",
                "2024-01-02",
                r#"<h2>Function list</h2>
<table><tr><th>Name</th><th>Summary</th></tr><tr><td><code>ABS</code></td><td>abs</td></tr></table>"#,
            ),
        )
        .expect("write page");
        fs::write(docs.join("guide").join("index.html"), page("Guide", "2023-01-01", "<p>x</p>"))
            .expect("write page");
    }

    fn catalogue() -> Catalogue {
        let mut catalogue = Catalogue::default();
        catalogue.insert(EntryType::Statement, "SELECT");
        catalogue.insert(EntryType::Operator, "+");
        catalogue.insert(EntryType::Function, "ABS");
        catalogue.insert(EntryType::Section, "Query syntax");
        catalogue
    }

    #[test]
    fn documents_are_listed_in_stable_order() {
        let temp = tempdir().expect("tempdir");
        let docs = temp.path().join("docs");
        write_mirror(&docs);
        fs::write(docs.join("notes.txt"), "x").expect("write");

        assert_eq!(
            collect_documents(&docs).expect("collect"),
            vec![
                "guide/index.html",
                "mathematical_functions.html",
                "operators.html",
                "query-syntax.html"
            ]
        );
    }

    #[test]
    fn build_indexes_rewrites_and_validates() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        write_mirror(&paths.docs_dir);

        let report = build_docset(
            &paths,
            &DocsetConfig::default(),
            &catalogue(),
            &BuildOptions::default(),
        )
        .expect("build");
        assert_eq!(report.documents, 4);
        assert_eq!(report.simplified, 4);
        assert_eq!(report.validated, Some(4));
        assert_eq!(report.version(), "2024-06-01");
        assert!(report.wrote_stylesheet);
        assert!(paths.docs_dir.join("docset.css").is_file());
        assert_eq!(report.counts_by_type.get("Function"), Some(&1));

        let rewritten =
            fs::read_to_string(paths.docs_dir.join("query-syntax.html")).expect("read page");
        assert!(rewritten.contains(r#"href="operators.html""#));
        assert!(rewritten.contains(r#"href="docset.css""#));
        assert!(rewritten.contains(r#"name="//apple_ref/cpp/Statement/SELECT""#));
        assert!(rewritten.contains(r#"data-last-updated="2024-05-13""#));
        assert!(!rewritten.contains("Google Cloud"));
        assert!(!rewritten.contains("<script"));
        let guide = fs::read_to_string(paths.docs_dir.join("guide/index.html")).expect("read");
        assert!(guide.contains(r#"href="../docset.css""#));

        let first_rows = IndexStore::open_existing(&paths.db_path)
            .expect("open")
            .expect("index exists")
            .entries()
            .expect("entries");

        // a rebuild over the rewritten pages is stable
        let again = build_docset(
            &paths,
            &DocsetConfig::default(),
            &catalogue(),
            &BuildOptions::default(),
        )
        .expect("rebuild");
        assert_eq!(again.inserted, report.inserted);
        assert_eq!(again.version(), "2024-06-01");
        let rebuilt =
            fs::read_to_string(paths.docs_dir.join("query-syntax.html")).expect("read page");
        assert_eq!(rebuilt.matches("dashAnchor").count(), rewritten.matches("dashAnchor").count());
        assert_eq!(rebuilt.matches("docset.css").count(), 1);
        let second_rows = IndexStore::open_existing(&paths.db_path)
            .expect("open")
            .expect("index exists")
            .entries()
            .expect("entries");
        assert_eq!(first_rows, second_rows);
        assert!(staged_leftovers(&paths.docs_dir).is_empty());
    }

    fn staged_leftovers(dir: &Path) -> Vec<String> {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(STAGED_SUFFIX))
            .collect()
    }

    #[test]
    fn failed_staging_removes_earlier_staged_pages() {
        let temp = tempdir().expect("tempdir");
        let docs = temp.path().join("docs");
        fs::create_dir_all(&docs).expect("create docs");
        fs::write(docs.join("operators.html"), "<p>old</p>").expect("write page");

        let documents = [
            Document::parse("operators.html", "<p>new</p>"),
            Document::parse("missing/dir/page.html", "<p>new</p>"),
        ];
        assert!(stage_documents(&docs, &documents).is_err());
        assert!(staged_leftovers(&docs).is_empty());
        assert_eq!(
            fs::read_to_string(docs.join("operators.html")).expect("read page"),
            "<p>old</p>"
        );

        let staged = stage_documents(&docs, &documents[..1]).expect("stage");
        assert_eq!(staged.len(), 1);
        assert_eq!(
            staged_leftovers(&docs),
            vec![format!(".operators.html{STAGED_SUFFIX}")]
        );
        // staging alone never touches the page itself
        assert_eq!(
            fs::read_to_string(docs.join("operators.html")).expect("read page"),
            "<p>old</p>"
        );
    }

    #[test]
    fn failed_validation_rolls_back_and_leaves_pages() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        write_mirror(&paths.docs_dir);
        let original =
            fs::read_to_string(paths.docs_dir.join("operators.html")).expect("read page");

        let mut expected = catalogue();
        expected.insert(EntryType::Function, "SQRT");
        let error = build_docset(
            &paths,
            &DocsetConfig::default(),
            &expected,
            &BuildOptions::default(),
        )
        .expect_err("validation must fail");
        assert_eq!(
            error.downcast_ref::<ExtractError>(),
            Some(&ExtractError::MissingEntry {
                entry_type: EntryType::Function,
                name: "SQRT".to_string()
            })
        );

        let store = IndexStore::open_existing(&paths.db_path)
            .expect("open")
            .expect("schema exists");
        assert_eq!(store.count(&EntryCriteria::default()).expect("count"), 0);
        assert_eq!(
            fs::read_to_string(paths.docs_dir.join("operators.html")).expect("read page"),
            original
        );

        let skipped = build_docset(
            &paths,
            &DocsetConfig::default(),
            &expected,
            &BuildOptions {
                skip_validation: true,
            },
        )
        .expect("build without validation");
        assert_eq!(skipped.validated, None);
    }

    #[test]
    fn build_requires_a_mirror() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        assert!(
            build_docset(
                &paths,
                &DocsetConfig::default(),
                &Catalogue::default(),
                &BuildOptions::default()
            )
            .is_err()
        );
    }
}
