//! Manifest documents and their parsed forms.
//!
//! Two JSON shapes are accepted at the top level:
//!
//! - **Index form**: component name → array of descriptors, each carrying a
//!   nested `manifest` object with the `sha1` and `url` of the component's
//!   own file-tree manifest.
//! - **Flat form**: an object with a `files` key, i.e. a single file-tree
//!   that is already expanded.
//!
//! ```text
//! ManifestDocument
//!         ├── Index(ManifestIndex) ──► Component ──► ManifestDescriptor
//!         └── Flat(FileTree) ──► TreeEntry (Directory | File | Malformed)
//! ```
//!
//! Parsing is tolerant in the places the wire format is loose: components
//! with an unexpected shape are skipped and tree entries with an unknown
//! `type` are ignored, so neither ever counts toward progress.

mod error;
mod index;
mod tree;

pub use error::{ManifestError, ManifestResult};
pub use index::{Component, ManifestDescriptor, ManifestDocument, ManifestIndex};
pub use tree::{EntryKind, FileTree, TreeEntry};
