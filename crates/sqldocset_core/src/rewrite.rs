//! Offline rewriting applied to every page before extraction.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::Selector;
use tracing::debug;
use url::Url;

use crate::config::DocsetConfig;
use crate::document::{Document, element_text};

pub const LAST_UPDATED_ATTR: &str = "data-last-updated";

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid regex"));

static STRIPPED: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "script",
        "noscript",
        "iframe",
        "template",
        "meta:not([charset])",
        "link:not([rel~=stylesheet])",
        "a.dashAnchor",
    ]
    .into_iter()
    .map(|css| Selector::parse(css).expect("valid selector"))
    .collect()
});

static LINK_ATTRIBUTES: LazyLock<Vec<(Selector, &'static str)>> = LazyLock::new(|| {
    [
        ("a[href]", "href"),
        ("img[src]", "src"),
        ("link[href]", "href"),
        ("script[src]", "src"),
    ]
    .into_iter()
    .map(|(css, attribute)| (Selector::parse(css).expect("valid selector"), attribute))
    .collect()
});

static ARTICLE_CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["article.devsite-article", "div.devsite-article-body"]
        .into_iter()
        .map(|css| Selector::parse(css).expect("valid selector"))
        .collect()
});

static FOOTERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["devsite-content-footer", ".devsite-content-footer", "footer"]
        .into_iter()
        .map(|css| Selector::parse(css).expect("valid selector"))
        .collect()
});

static STYLESHEET_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("link[rel~=stylesheet]").expect("valid selector"));

/// Maps site URLs onto the mirrored tree.
#[derive(Debug, Clone)]
pub struct SiteLayout<'a> {
    base: Url,
    docs_dir: &'a Path,
    index_page: &'a str,
    redirect_aliases: &'a [String],
    probe_suffixes: &'a [String],
    stylesheet: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessReport {
    pub stripped: usize,
    pub rewritten_links: usize,
    pub simplified: bool,
    pub last_updated: Option<String>,
}

impl<'a> SiteLayout<'a> {
    pub fn new(config: &'a DocsetConfig, docs_dir: &'a Path) -> Result<Self> {
        Ok(Self {
            base: config.base_url()?,
            docs_dir,
            index_page: &config.site.index_page,
            redirect_aliases: &config.site.redirect_aliases,
            probe_suffixes: &config.site.probe_suffixes,
            stylesheet: &config.docset.stylesheet,
        })
    }

    /// Public URL a mirrored file was fetched from.
    pub fn document_url(&self, document_path: &str) -> Result<Url> {
        let site_path = if document_path == self.index_page {
            String::new()
        } else if let Some(directory) = document_path.strip_suffix(&format!("/{}", self.index_page))
        {
            format!("{directory}/")
        } else {
            document_path
                .strip_suffix(".html")
                .unwrap_or(document_path)
                .to_string()
        };
        self.base
            .join(&site_path)
            .with_context(|| format!("failed to derive site URL for {document_path}"))
    }

    /// New value for a link attribute, or `None` to leave it untouched.
    pub fn rewrite_target(&self, document_path: &str, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let resolved = self.document_url(document_path).ok()?.join(trimmed).ok()?;
        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }

        let Some(site_relative) = resolved.as_str().strip_prefix(self.base.as_str()) else {
            // same host outside the mirror, or another site: keep it absolute
            return changed(raw, resolved.to_string());
        };
        let site_relative = site_relative
            .split(['#', '?'])
            .next()
            .unwrap_or_default()
            .trim_matches('/');

        let Some(local) = self.local_file(site_relative) else {
            return changed(raw, resolved.to_string());
        };
        let mut target = relative_path(document_path, &local);
        if let Some(fragment) = resolved.fragment() {
            target.push('#');
            target.push_str(fragment);
        }
        changed(raw, target)
    }

    fn local_file(&self, site_relative: &str) -> Option<String> {
        if self
            .redirect_aliases
            .iter()
            .any(|alias| alias.trim_matches('/') == site_relative)
        {
            return Some(self.index_page.to_string());
        }
        for suffix in self.probe_suffixes {
            let candidate = format!("{site_relative}{suffix}");
            let candidate = candidate.trim_start_matches('/');
            if candidate.is_empty() {
                continue;
            }
            if crate::document::absolute_path(self.docs_dir, candidate).is_file() {
                return Some(candidate.to_string());
            }
        }
        None
    }

    /// Path of the shared stylesheet relative to `document_path`.
    pub fn stylesheet_href(&self, document_path: &str) -> String {
        relative_path(document_path, self.stylesheet)
    }
}

fn changed(raw: &str, value: String) -> Option<String> {
    if value == raw { None } else { Some(value) }
}

/// `/`-separated path from the directory of `from_document` to `target`.
pub fn relative_path(from_document: &str, target: &str) -> String {
    let from_dir = from_document
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    let from_dir = &from_dir[..from_dir.len().saturating_sub(1)];
    let target = target
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();

    let common = from_dir
        .iter()
        .zip(target.iter())
        .take_while(|(left, right)| left == right)
        .count();
    let mut parts = vec![".."; from_dir.len() - common];
    parts.extend(target[common..].iter().copied());
    parts.join("/")
}

/// Strip, relink, simplify and stamp one document (steps 1–3 of the pass).
pub fn preprocess(document: &mut Document, site: &SiteLayout<'_>) -> PreprocessReport {
    let mut report = PreprocessReport {
        last_updated: find_last_updated(document),
        ..PreprocessReport::default()
    };

    for selector in STRIPPED.iter() {
        report.stripped += document.remove(selector);
    }

    report.rewritten_links = rewrite_links(document, site);

    if let Some(container) = ARTICLE_CONTAINERS
        .iter()
        .find_map(|selector| document.first_id(selector))
    {
        report.simplified = document.replace_body_with(container);
    }

    let href = site.stylesheet_href(document.path());
    let already_linked = document
        .html()
        .select(&STYLESHEET_LINKS)
        .any(|link| link.value().attr("href") == Some(href.as_str()));
    if !already_linked {
        document.append_stylesheet(&href);
    }

    if let Some(date) = &report.last_updated {
        document.set_root_attr(LAST_UPDATED_ATTR, date);
    }

    debug!(
        page = document.path(),
        stripped = report.stripped,
        links = report.rewritten_links,
        simplified = report.simplified,
        "preprocessed document"
    );
    report
}

fn rewrite_links(document: &mut Document, site: &SiteLayout<'_>) -> usize {
    let mut edits = Vec::new();
    for (selector, attribute) in LINK_ATTRIBUTES.iter() {
        for element in document.html().select(selector) {
            let Some(raw) = element.value().attr(attribute) else {
                continue;
            };
            if let Some(target) = site.rewrite_target(document.path(), raw) {
                edits.push((element.id(), *attribute, target));
            }
        }
    }

    let count = edits.len();
    for (id, attribute, target) in edits {
        document.set_attr(id, attribute, &target);
    }
    count
}

fn find_last_updated(document: &Document) -> Option<String> {
    for selector in FOOTERS.iter() {
        for footer in document.html().select(selector) {
            if let Some(found) = DATE_RE.captures(&element_text(footer)) {
                return Some(found[1].to_string());
            }
        }
    }
    // a previous run already moved the date onto the root element
    document
        .html()
        .root_element()
        .value()
        .attr(LAST_UPDATED_ATTR)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{SiteLayout, preprocess, relative_path};
    use crate::config::DocsetConfig;
    use crate::document::Document;

    fn mirror() -> (tempfile::TempDir, DocsetConfig) {
        let temp = tempdir().expect("tempdir");
        let docs = temp.path().join("docs");
        fs::create_dir_all(docs.join("guide")).expect("create docs");
        for file in [
            "index.html",
            "operators.html",
            "guide/index.html",
            "data-types.html",
            "docset.css",
        ] {
            fs::write(docs.join(file), "<html></html>").expect("write file");
        }
        let mut config = DocsetConfig::default();
        config.site.base_url = "https://cloud.google.com/bigquery/docs/reference/standard-sql/".to_string();
        (temp, config)
    }

    #[test]
    fn relative_paths_walk_up_and_down() {
        assert_eq!(relative_path("operators.html", "data-types.html"), "data-types.html");
        assert_eq!(relative_path("guide/index.html", "operators.html"), "../operators.html");
        assert_eq!(relative_path("a/b/c.html", "a/d.html"), "../d.html");
        assert_eq!(relative_path("index.html", "guide/index.html"), "guide/index.html");
    }

    #[test]
    fn links_into_the_mirror_become_relative() {
        let (temp, config) = mirror();
        let docs = temp.path().join("docs");
        let site = SiteLayout::new(&config, &docs).expect("layout");

        assert_eq!(
            site.rewrite_target(
                "operators.html",
                "/bigquery/docs/reference/standard-sql/data-types#integer_types"
            ),
            Some("data-types.html#integer_types".to_string())
        );
        assert_eq!(
            site.rewrite_target("operators.html", "guide"),
            Some("guide/index.html".to_string())
        );
        assert_eq!(
            site.rewrite_target("guide/index.html", "../operators"),
            Some("../operators.html".to_string())
        );
        assert_eq!(
            site.rewrite_target("guide/index.html", "/bigquery/docs/reference/standard-sql/enabling-standard-sql"),
            Some("../index.html".to_string())
        );
        assert_eq!(site.rewrite_target("operators.html", "#local"), None);
        assert_eq!(site.rewrite_target("operators.html", "mailto:a@b.c"), None);
    }

    #[test]
    fn links_outside_the_mirror_become_absolute() {
        let (temp, config) = mirror();
        let docs = temp.path().join("docs");
        let site = SiteLayout::new(&config, &docs).expect("layout");

        assert_eq!(
            site.rewrite_target("operators.html", "/bigquery/docs/quotas"),
            Some("https://cloud.google.com/bigquery/docs/quotas".to_string())
        );
        assert_eq!(
            site.rewrite_target("operators.html", "not-mirrored"),
            Some(
                "https://cloud.google.com/bigquery/docs/reference/standard-sql/not-mirrored"
                    .to_string()
            )
        );
        assert_eq!(
            site.rewrite_target("operators.html", "https://example.com/x"),
            None
        );
    }

    #[test]
    fn preprocess_simplifies_and_stamps_the_page() {
        let (temp, config) = mirror();
        let docs = temp.path().join("docs");
        let site = SiteLayout::new(&config, &docs).expect("layout");
        let source = r#"<html><head><meta name="viewport" content="x"><meta charset="utf-8">
<script src="/x.js"></script><link rel="preload" href="/font.woff"></head>
<body><devsite-header>chrome</devsite-header>
<article class="devsite-article"><h1>Operators</h1>
<p><a href="/bigquery/docs/reference/standard-sql/data-types">types</a></p></article>
<devsite-content-footer><p>Last updated 2024-05-13 UTC.</p></devsite-content-footer>
</body></html>"#;
        let mut document = Document::parse("guide/index.html", source);

        let report = preprocess(&mut document, &site);
        assert!(report.simplified);
        assert_eq!(report.rewritten_links, 1);
        assert_eq!(report.last_updated.as_deref(), Some("2024-05-13"));

        let html = document.to_html();
        assert!(html.contains(r#"href="../data-types.html""#));
        assert!(html.contains(r#"href="../docset.css""#));
        assert!(html.contains(r#"data-last-updated="2024-05-13""#));
        assert!(html.contains(r#"charset="utf-8""#));
        assert!(!html.contains("viewport"));
        assert!(!html.contains("<script"));
        assert!(!html.contains("font.woff"));
        assert!(!html.contains("chrome"));
        assert!(!html.contains("Last updated"));

        let mut again = Document::parse("guide/index.html", &html);
        let second = preprocess(&mut again, &site);
        assert!(!second.simplified);
        assert_eq!(second.last_updated.as_deref(), Some("2024-05-13"));
        assert_eq!(again.to_html().matches("docset.css").count(), 1);
    }
}
