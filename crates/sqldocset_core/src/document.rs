use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use ego_tree::NodeId;
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Node};
use scraper::{ElementRef, Html, Selector};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("valid selector"));
static HEAD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("head").expect("valid selector"));

/// One mirrored HTML page, owned exclusively by the stage working on it.
pub struct Document {
    path: String,
    html: Html,
}

impl Document {
    pub fn parse(path: impl Into<String>, source: &str) -> Self {
        Self {
            path: path.into(),
            html: Html::parse_document(source),
        }
    }

    /// Load `relative` (a `/`-separated path) from under `root`.
    pub fn load(root: &Path, relative: &str) -> Result<Self> {
        let absolute = absolute_path(root, relative);
        let source = fs::read_to_string(&absolute)
            .with_context(|| format!("failed to read document {}", absolute.display()))?;
        Ok(Self::parse(relative, &source))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name component of the document path.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn to_html(&self) -> String {
        self.html.html()
    }

    pub fn select_ids(&self, selector: &Selector) -> Vec<NodeId> {
        self.html.select(selector).map(|element| element.id()).collect()
    }

    pub fn first_id(&self, selector: &Selector) -> Option<NodeId> {
        self.html.select(selector).next().map(|element| element.id())
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    /// Detach every element matching `selector`; returns how many were removed.
    pub fn remove(&mut self, selector: &Selector) -> usize {
        let ids = self.select_ids(selector);
        let mut removed = 0usize;
        for id in ids {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.detach();
                removed += 1;
            }
        }
        removed
    }

    /// Detach the given elements (for filters a selector cannot express).
    pub fn remove_ids(&mut self, ids: &[NodeId]) {
        for id in ids {
            if let Some(mut node) = self.html.tree.get_mut(*id) {
                node.detach();
            }
        }
    }

    /// Set (or replace) one attribute on the element `id`.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        let Some(current) = self.element(id) else {
            return false;
        };
        let tag = current.value().name().to_string();
        let mut attributes: Vec<(String, String)> = Vec::new();
        let mut replaced = false;
        for (key, existing) in current.value().attrs() {
            if key == name {
                attributes.push((key.to_string(), value.to_string()));
                replaced = true;
            } else {
                attributes.push((key.to_string(), existing.to_string()));
            }
        }
        if !replaced {
            attributes.push((name.to_string(), value.to_string()));
        }

        let Some(mut node) = self.html.tree.get_mut(id) else {
            return false;
        };
        let pairs = attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect::<Vec<_>>();
        *node.value() = new_element(&tag, &pairs);
        true
    }

    pub fn set_root_attr(&mut self, name: &str, value: &str) {
        let root = self.html.root_element().id();
        self.set_attr(root, name, value);
    }

    /// Replace the body's children with the children of `container`.
    pub fn replace_body_with(&mut self, container: NodeId) -> bool {
        let Some(body) = self.first_id(&BODY) else {
            return false;
        };
        if body == container {
            return false;
        }
        let Some(container_node) = self.html.tree.get(container) else {
            return false;
        };
        let keep = container_node
            .children()
            .map(|child| child.id())
            .collect::<Vec<_>>();
        let Some(body_node) = self.html.tree.get(body) else {
            return false;
        };
        let drop_ids = body_node
            .children()
            .map(|child| child.id())
            .collect::<Vec<_>>();

        for id in drop_ids {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.detach();
            }
        }
        let Some(mut body_node) = self.html.tree.get_mut(body) else {
            return false;
        };
        for id in keep {
            body_node.append_id(id);
        }
        true
    }

    pub fn append_stylesheet(&mut self, href: &str) {
        let parent = self
            .first_id(&HEAD)
            .unwrap_or_else(|| self.html.root_element().id());
        if let Some(mut node) = self.html.tree.get_mut(parent) {
            node.append(new_element("link", &[("rel", "stylesheet"), ("href", href)]));
        }
    }

    /// Prepend `<a name="{anchor}" class="dashAnchor"></a>` as the first child of `target`.
    pub fn prepend_anchor(&mut self, target: NodeId, anchor: &str) -> bool {
        match self.html.tree.get_mut(target) {
            Some(mut node) => {
                node.prepend(new_element("a", &[("name", anchor), ("class", "dashAnchor")]));
                true
            }
            None => false,
        }
    }
}

fn new_element(tag: &str, attributes: &[(&str, &str)]) -> Node {
    let attributes = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(*name)),
            value: StrTendril::from_slice(value),
        })
        .collect();
    Node::Element(Element::new(
        QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag)),
        attributes,
    ))
}

pub fn absolute_path(root: &Path, relative: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in relative.split('/') {
        if !segment.is_empty() {
            out.push(segment);
        }
    }
    out
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_spaces(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_was_space = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }

    output.trim().to_string()
}

pub fn element_text(element: ElementRef<'_>) -> String {
    normalize_spaces(&element.text().collect::<String>())
}

/// Heading title as rendered; devsite keeps the clean title in `data-text`.
pub fn heading_text(element: ElementRef<'_>) -> String {
    match element.value().attr("data-text") {
        Some(text) if !text.trim().is_empty() => normalize_spaces(text),
        _ => element_text(element),
    }
}
