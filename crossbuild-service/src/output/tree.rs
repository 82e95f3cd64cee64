// Output Tree
// Append-only mapping from relative output path to the subtrees built for it

use crate::runners::environment::Directory;

use std::collections::BTreeMap;

/// Aggregated build outputs, keyed by path relative to the export destination.
///
/// Attaching a subtree never removes anything: a second subtree at the same
/// path becomes a new layer on top of the first, and export applies layers in
/// the order they were attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTree {
    entries: BTreeMap<String, Vec<Directory>>,
}

impl OutputTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a tree with `subtree` layered at `path`
    pub fn with_subtree(mut self, path: impl Into<String>, subtree: Directory) -> Self {
        self.entries
            .entry(normalize(&path.into()))
            .or_default()
            .push(subtree);
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize(path))
    }

    /// The most recently attached subtree at `path`
    pub fn latest(&self, path: &str) -> Option<&Directory> {
        self.entries.get(&normalize(path)).and_then(|layers| layers.last())
    }

    /// All subtrees attached at `path`, oldest first
    pub fn layers(&self, path: &str) -> &[Directory] {
        self.entries
            .get(&normalize(path))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Distinct paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Directory])> {
        self.entries
            .iter()
            .map(|(path, layers)| (path.as_str(), layers.as_slice()))
    }

    /// Number of distinct paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `build/linux/amd64/` and `build/linux/amd64` name the same entry
fn normalize(path: &str) -> String {
    path.trim_start_matches("./").trim_matches('/').to_string()
}
