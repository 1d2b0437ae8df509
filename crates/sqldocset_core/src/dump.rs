//! Sorted text dumps of the index, for reviewing what a rebuild changed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};

use crate::index::IndexStore;
use crate::runtime::ResolvedPaths;

pub const UNVERSIONED: &str = "unversioned";

#[derive(Debug, Clone, Serialize)]
pub struct DumpReport {
    pub path: PathBuf,
    pub rows: usize,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unified: String,
}

impl IndexDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// One `name\ttype\tpath` line per row, sorted by `(name, type, path)`.
pub fn dump_index(store: &IndexStore) -> Result<String> {
    let mut out = String::new();
    for entry in store.entries()? {
        out.push_str(&entry.name);
        out.push('\t');
        out.push_str(entry.entry_type.as_str());
        out.push('\t');
        out.push_str(&entry.path);
        out.push('\n');
    }
    Ok(out)
}

pub fn dump_fingerprint(dump: &str) -> String {
    let digest = Sha256::digest(dump.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// File name used for a version's dump; anything path-like is flattened.
pub fn dump_file_name(version: &str) -> String {
    let version = version.trim();
    let safe = version
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let safe = safe.trim_matches('.');
    if safe.is_empty() {
        format!("{UNVERSIONED}.tsv")
    } else {
        format!("{safe}.tsv")
    }
}

pub fn write_dump(paths: &ResolvedPaths, store: &IndexStore, version: &str) -> Result<DumpReport> {
    let dump = dump_index(store)?;
    fs::create_dir_all(&paths.dumps_dir)
        .with_context(|| format!("failed to create {}", paths.dumps_dir.display()))?;
    let path = paths.dumps_dir.join(dump_file_name(version));
    fs::write(&path, &dump).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(DumpReport {
        path,
        rows: dump.lines().count(),
        fingerprint: dump_fingerprint(&dump),
    })
}

pub fn read_dump(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read dump {}", path.display()))
}

/// Line-level difference between two dumps.
pub fn diff_dumps(old: &str, new: &str) -> IndexDiff {
    let diff = TextDiff::from_lines(old, new);
    let mut out = IndexDiff::default();
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches('\n').to_string();
        match change.tag() {
            ChangeTag::Insert => out.added.push(line),
            ChangeTag::Delete => out.removed.push(line),
            ChangeTag::Equal => {}
        }
    }
    if !out.is_empty() {
        out.unified = diff
            .unified_diff()
            .context_radius(2)
            .header("previous", "current")
            .to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{diff_dumps, dump_file_name, dump_index, read_dump, write_dump};
    use crate::entry::{EntryType, IndexEntry};
    use crate::index::IndexStore;
    use crate::runtime::ResolvedPaths;

    #[test]
    fn dumps_are_sorted_tab_separated_rows() {
        let store = IndexStore::open_in_memory().expect("store");
        store
            .insert(&IndexEntry::new("WHERE", EntryType::Query, "q.html#w"))
            .expect("insert");
        store
            .insert(&IndexEntry::new("ABS", EntryType::Function, "f.html#a"))
            .expect("insert");

        assert_eq!(
            dump_index(&store).expect("dump"),
            "ABS\tFunction\tf.html#a\nWHERE\tQuery\tq.html#w\n"
        );
    }

    #[test]
    fn write_dump_uses_version_file_name() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::under(temp.path());
        let store = IndexStore::open_in_memory().expect("store");
        store
            .insert(&IndexEntry::new("ABS", EntryType::Function, "f.html#a"))
            .expect("insert");

        let report = write_dump(&paths, &store, "2024-05-13").expect("write");
        assert_eq!(report.rows, 1);
        assert_eq!(report.fingerprint.len(), 16);
        assert!(report.path.ends_with("2024-05-13.tsv"));
        assert_eq!(
            read_dump(&report.path).expect("read"),
            "ABS\tFunction\tf.html#a\n"
        );
        assert_eq!(dump_file_name("../evil"), "_evil.tsv");
        assert_eq!(dump_file_name(""), "unversioned.tsv");
    }

    #[test]
    fn diff_reports_added_and_removed_rows() {
        let old = "ABS\tFunction\tf.html#a\nFROM\tQuery\tq.html#f\n";
        let new = "ABS\tFunction\tf.html#a\nWHERE\tQuery\tq.html#w\n";
        let diff = diff_dumps(old, new);
        assert_eq!(diff.added, vec!["WHERE\tQuery\tq.html#w"]);
        assert_eq!(diff.removed, vec!["FROM\tQuery\tq.html#f"]);
        assert!(diff.unified.contains("-FROM\tQuery"));
        assert!(diff.unified.contains("+WHERE\tQuery"));

        assert!(diff_dumps(old, old).is_empty());
    }
}
