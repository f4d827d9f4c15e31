//! File-tree manifests: the per-component list of directories and files.

use std::path::{Component as PathComponent, Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{ManifestError, ManifestResult};

const FILES_KEY: &str = "files";

/// What a tree entry asks the expander to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Ensure a directory exists.
    Directory,
    /// Ensure a file exists with the given SHA-1, fetching it from `url`.
    File { hash: String, url: String },
    /// A `file` entry without a usable descriptor, or an entry whose path is
    /// not a safe relative path. Counted toward progress, never acted on.
    Malformed { reason: String },
}

/// One counted entry of a file-tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the component's output directory, as written in the
    /// manifest.
    pub name: String,
    /// The entry's action.
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Target path of this entry under `root`.
    pub fn target(&self, root: &Path) -> PathBuf {
        root.join(&self.name)
    }
}

/// A parsed file-tree manifest.
///
/// Only `directory` and `file` entries are kept; entries with any other type
/// (or that are not objects) are dropped during parsing so that the entry
/// count always equals the number of progress increments the tree produces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileTree {
    entries: Vec<TreeEntry>,
    ignored: usize,
}

#[derive(Deserialize)]
struct Downloads {
    raw: RawDownload,
}

#[derive(Deserialize)]
struct RawDownload {
    sha1: String,
    url: String,
}

impl FileTree {
    /// Parse a file-tree document from raw bytes.
    pub fn parse(bytes: &[u8]) -> ManifestResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let root = value.as_object().ok_or(ManifestError::NotAnObject)?;
        Self::from_map(root)
    }

    /// Build a tree from a document root containing a `files` object.
    pub fn from_map(root: &Map<String, Value>) -> ManifestResult<Self> {
        let files = root
            .get(FILES_KEY)
            .and_then(Value::as_object)
            .ok_or(ManifestError::MissingFiles)?;

        let mut tree = Self::default();
        for (name, value) in files {
            match classify(name, value) {
                Some(kind) => tree.entries.push(TreeEntry {
                    name: name.clone(),
                    kind,
                }),
                None => tree.ignored += 1,
            }
        }

        Ok(tree)
    }

    /// Counted entries in document order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Number of counted entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tree has no counted entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries dropped because of an unrecognized type.
    pub fn ignored(&self) -> usize {
        self.ignored
    }
}

impl IntoIterator for FileTree {
    type Item = TreeEntry;
    type IntoIter = std::vec::IntoIter<TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn classify(name: &str, value: &Value) -> Option<EntryKind> {
    let object = value.as_object()?;
    let entry_type = object.get("type")?.as_str()?;

    let kind = if entry_type.eq_ignore_ascii_case("directory") {
        EntryKind::Directory
    } else if entry_type.eq_ignore_ascii_case("file") {
        match object
            .get("downloads")
            .map(Downloads::deserialize)
            .transpose()
        {
            Ok(Some(downloads)) => EntryKind::File {
                hash: downloads.raw.sha1,
                url: downloads.raw.url,
            },
            Ok(None) => EntryKind::Malformed {
                reason: "file entry has no downloads".to_string(),
            },
            Err(e) => EntryKind::Malformed {
                reason: format!("invalid downloads.raw descriptor: {}", e),
            },
        }
    } else {
        return None;
    };

    if !is_safe_relative(name) {
        return Some(EntryKind::Malformed {
            reason: "path escapes the output directory".to_string(),
        });
    }

    Some(kind)
}

/// True if `name` is non-empty and made only of normal path components.
pub(crate) fn is_safe_relative(name: &str) -> bool {
    let path = Path::new(name);
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, PathComponent::Normal(_) | PathComponent::CurDir))
}
