//! Project file trees in the shape the external mount API expects.
//!
//! A tree maps a path segment to either a file with inline contents or a
//! nested directory. The serialized form matches the wire shape consumed by
//! the sandbox mount call:
//!
//! ```json
//! {
//!   "package.json": { "file": { "contents": "{...}" } },
//!   "src": { "directory": { "index.ts": { "file": { "contents": "..." } } } }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One level of a mounted project tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree(BTreeMap<String, TreeEntry>);

/// A single tree entry: inline file contents or a nested directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntry {
    File { contents: String },
    Directory(FileTree),
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file at the top level, replacing any existing entry.
    pub fn insert_file(&mut self, name: impl Into<String>, contents: impl Into<String>) {
        self.0.insert(
            name.into(),
            TreeEntry::File {
                contents: contents.into(),
            },
        );
    }

    /// Insert a directory at the top level, replacing any existing entry.
    pub fn insert_dir(&mut self, name: impl Into<String>, tree: FileTree) {
        self.0.insert(name.into(), TreeEntry::Directory(tree));
    }

    /// Contents of a top-level file, if present (and a file, not a directory).
    pub fn file_contents(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(TreeEntry::File { contents }) => Some(contents.as_str()),
            _ => None,
        }
    }

    /// Whether a top-level entry with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeEntry)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, TreeEntry)> for FileTree {
    fn from_iter<I: IntoIterator<Item = (K, TreeEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
