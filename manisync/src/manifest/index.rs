//! Top-level manifest index.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{ManifestError, ManifestResult};
use super::tree::{is_safe_relative, FileTree};

/// Key that marks a document as an already expanded file-tree.
const FILES_KEY: &str = "files";

/// Location and expected hash of a component's file-tree manifest.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ManifestDescriptor {
    /// SHA-1 of the manifest bytes, as hex.
    #[serde(rename = "sha1")]
    pub hash: String,
    /// Absolute URL of the manifest.
    pub url: String,
}

/// A named component of the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component {
    /// Component name, also its directory name under the output root.
    pub name: String,
    /// The first descriptor listed for the component.
    pub descriptor: ManifestDescriptor,
}

/// Parsed index form of a top-level manifest.
///
/// Components keep document order. Only the first descriptor of each
/// component is consulted; further entries (other versions) are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestIndex {
    components: Vec<Component>,
    skipped: Vec<String>,
}

#[derive(Deserialize)]
struct DescriptorEnvelope {
    manifest: ManifestDescriptor,
}

impl ManifestIndex {
    /// Build an index from the root object of a manifest document.
    pub fn from_map(root: &Map<String, Value>) -> Self {
        let mut index = Self::default();

        for (name, value) in root {
            if !is_safe_relative(name) {
                tracing::warn!(component = %name, "Skipping component with unsafe name");
                index.skipped.push(name.clone());
                continue;
            }

            match first_descriptor(value) {
                Some(descriptor) => index.components.push(Component {
                    name: name.clone(),
                    descriptor,
                }),
                None => {
                    tracing::debug!(component = %name, "Skipping component with unexpected shape");
                    index.skipped.push(name.clone());
                }
            }
        }

        index
    }

    /// Components that resolved to a descriptor, in document order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Names of keys that were not usable components: unexpected shape, or a
    /// name that is not a plain relative path.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Number of usable components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if no component resolved.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl IntoIterator for ManifestIndex {
    type Item = Component;
    type IntoIter = std::vec::IntoIter<Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.into_iter()
    }
}

/// Element `[0]` of a non-empty array, if it carries a `manifest` object
/// with string `sha1` and `url` fields.
fn first_descriptor(value: &Value) -> Option<ManifestDescriptor> {
    let first = value.as_array()?.first()?;
    DescriptorEnvelope::deserialize(first)
        .ok()
        .map(|envelope| envelope.manifest)
}

/// A parsed top-level manifest document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestDocument {
    /// Component index whose entries point at file-tree manifests.
    Index(ManifestIndex),
    /// A single, already expanded file-tree.
    Flat(FileTree),
}

impl ManifestDocument {
    /// Parse a top-level document from raw bytes.
    pub fn parse(bytes: &[u8]) -> ManifestResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let root = value.as_object().ok_or(ManifestError::NotAnObject)?;

        if root.contains_key(FILES_KEY) {
            return FileTree::from_map(root).map(Self::Flat);
        }

        Ok(Self::Index(ManifestIndex::from_map(root)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    fn parse_index(json: &str) -> ManifestIndex {
        match ManifestDocument::parse(json.as_bytes()).unwrap() {
            ManifestDocument::Index(index) => index,
            other => panic!("expected index, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_index_first_descriptor_only() {
        let index = parse_index(&format!(
            r#"{{"client": [
                {{"manifest": {{"sha1": "{HASH}", "url": "https://example.com/client-1.json"}}}},
                {{"manifest": {{"sha1": "ffff", "url": "https://example.com/client-2.json"}}}}
            ]}}"#
        ));

        assert_eq!(index.len(), 1);
        let component = &index.components()[0];
        assert_eq!(component.name, "client");
        assert_eq!(component.descriptor.hash, HASH);
        assert_eq!(component.descriptor.url, "https://example.com/client-1.json");
    }

    #[test]
    fn test_parse_index_preserves_order() {
        let index = parse_index(
            r#"{
                "zeta": [{"manifest": {"sha1": "a", "url": "u1"}}],
                "alpha": [{"manifest": {"sha1": "b", "url": "u2"}}],
                "mid": [{"manifest": {"sha1": "c", "url": "u3"}}]
            }"#,
        );

        let names: Vec<_> = index.components().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_index_skips_bad_shapes() {
        let index = parse_index(
            r#"{
                "empty": [],
                "scalar": 42,
                "no_manifest": [{"other": {}}],
                "numeric_hash": [{"manifest": {"sha1": 12, "url": "u"}}],
                "missing_url": [{"manifest": {"sha1": "abc"}}],
                "first_not_object": ["text", {"manifest": {"sha1": "a", "url": "u"}}],
                "good": [{"manifest": {"sha1": "abc", "url": "https://example.com/m.json"}}]
            }"#,
        );

        assert_eq!(index.len(), 1);
        assert_eq!(index.components()[0].name, "good");
        assert_eq!(index.skipped().len(), 6);
    }

    #[test]
    fn test_parse_index_skips_unsafe_names() {
        let index = parse_index(
            r#"{
                "../escaped": [{"manifest": {"sha1": "a", "url": "u1"}}],
                "/abs": [{"manifest": {"sha1": "b", "url": "u2"}}],
                "": [{"manifest": {"sha1": "c", "url": "u3"}}],
                "nested/../../up": [{"manifest": {"sha1": "d", "url": "u4"}}],
                "assets/common": [{"manifest": {"sha1": "e", "url": "u5"}}]
            }"#,
        );

        assert_eq!(index.len(), 1);
        assert_eq!(index.components()[0].name, "assets/common");
        assert_eq!(index.skipped(), &["../escaped", "/abs", "", "nested/../../up"]);
    }

    #[test]
    fn test_parse_flat_document() {
        let doc = ManifestDocument::parse(br#"{"files": {"bin": {"type": "directory"}}}"#).unwrap();
        match doc {
            ManifestDocument::Flat(tree) => assert_eq!(tree.len(), 1),
            other => panic!("expected flat tree, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = ManifestDocument::parse(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ManifestError::NotAnObject));
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = ManifestDocument::parse(b"not json").unwrap_err();
        assert!(matches!(err, ManifestError::Json(_)));
    }

    #[test]
    fn test_empty_index() {
        let index = parse_index("{}");
        assert!(index.is_empty());
        assert_eq!(index.into_iter().count(), 0);
    }
}
