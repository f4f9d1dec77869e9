/// Core domain types: identifiers, content hashes, and tree positions.
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Longest accepted document or record id.
const MAX_ID_LEN: usize = 128;

/// Opaque annotation identifier, a UUID v4 string for new records.
/// Also names the record's file in the store, so it is validated on every
/// way in, deserialization included.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnnotationId(String);

impl AnnotationId {
    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        return &self.0;
    }

    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        return Self(uuid::Uuid::new_v4().to_string());
    }

    /// Validate an identifier read from the command line or a record.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecordId` unless the id is safe to use as a file name.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if !is_slug(raw) {
            return Err(Error::InvalidRecordId { id: raw.to_string() });
        }
        return Ok(Self(raw.to_string()));
    }
}

impl fmt::Display for AnnotationId {
    /// Print the raw identifier.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

impl From<AnnotationId> for String {
    /// Unwrap into the raw identifier for serialization.
    fn from(id: AnnotationId) -> Self {
        return id.0;
    }
}

impl TryFrom<String> for AnnotationId {
    type Error = Error;

    /// Validate on deserialization.
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        return Self::parse(&raw);
    }
}

/// Identifier of a general comment; names its record file like `AnnotationId`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommentId(String);

impl CommentId {
    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        return &self.0;
    }

    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        return Self(uuid::Uuid::new_v4().to_string());
    }
}

impl fmt::Display for CommentId {
    /// Print the raw identifier.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

impl From<CommentId> for String {
    /// Unwrap into the raw identifier for serialization.
    fn from(id: CommentId) -> Self {
        return id.0;
    }
}

impl TryFrom<String> for CommentId {
    type Error = Error;

    /// Validate on deserialization.
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if !is_slug(&raw) {
            return Err(Error::InvalidRecordId { id: raw });
        }
        return Ok(Self(raw));
    }
}

/// How a selection's offsets were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Located by searching for the selected literal text; unique but not node-verified.
    Degraded,
    /// Both selection points matched text nodes by identity.
    Exact,
}

/// A SHA-256 digest of a plain-text projection: 64 lowercase hex chars.
/// Newtype prevents mixing with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHash(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

/// Identifier of a stored essay. Used as a directory name, so it is validated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        return &self.0;
    }

    /// Validate and wrap a document id.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocumentId` unless the id is 1-128 ASCII
    /// alphanumerics, `-` or `_`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if !is_slug(raw) {
            return Err(Error::InvalidDocumentId { id: raw.to_string() });
        }
        return Ok(Self(raw.to_string()));
    }
}

impl fmt::Display for DocumentId {
    /// Print the raw identifier.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

impl From<DocumentId> for String {
    /// Unwrap into the raw identifier for serialization.
    fn from(id: DocumentId) -> Self {
        return id.0;
    }
}

impl TryFrom<String> for DocumentId {
    type Error = Error;

    /// Validate on deserialization.
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        return Self::parse(&raw);
    }
}

/// Index of a node in a markup tree arena. Stable for the life of the tree;
/// splitting a text node keeps the original id on the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(
    /// Arena slot.
    pub usize,
);

/// A point inside a text node: the node and a char offset within its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePosition {
    /// Text node holding the point.
    pub node: NodeId,
    /// Char offset inside the node's text.
    pub offset: usize,
}

/// A global range resolved from a live selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    /// Whether the offsets were matched by node identity or by text search.
    pub confidence: Confidence,
    /// Plain-text range, start < end.
    pub range: Range<usize>,
}

/// A live selection as a host UI would report it: two boundary points plus
/// the literal text the user sees as selected. Points may sit in element
/// containers (offset = child index) rather than text nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSelection {
    /// Where the selection ends (focus).
    pub end: NodePosition,
    /// Where the selection starts (anchor). May come after `end` for backwards selections.
    pub start: NodePosition,
    /// The selected text as displayed.
    pub text: String,
}

/// 1-128 ASCII alphanumerics, `-` or `_`: safe as a single path segment.
fn is_slug(raw: &str) -> bool {
    return !raw.is_empty()
        && raw.len() <= MAX_ID_LEN
        && raw.chars().all(|c| return c.is_ascii_alphanumeric() || c == '-' || c == '_');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_accepts_slugs() {
        assert_eq!(DocumentId::parse("essay-2024_01").unwrap().as_str(), "essay-2024_01");
    }

    #[test]
    fn document_id_rejects_path_segments() {
        assert!(DocumentId::parse("../etc").is_err());
        assert!(DocumentId::parse("a/b").is_err());
        assert!(DocumentId::parse("").is_err());
    }

    #[test]
    fn document_id_rejects_invalid_json() {
        let parsed: Result<DocumentId, _> = serde_json::from_str("\"no spaces\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn generated_annotation_ids_parse_back() {
        let id = AnnotationId::generate();
        assert_eq!(AnnotationId::parse(id.as_str()).unwrap(), id);
        assert!(AnnotationId::parse("x.json").is_err());
    }

    #[test]
    fn record_ids_are_validated_on_deserialization() {
        let escaping: Result<AnnotationId, _> = serde_json::from_str("\"../document\"");
        assert!(escaping.is_err());
        let comment: Result<CommentId, _> = serde_json::from_str("\"a/b\"");
        assert!(comment.is_err());

        let id = CommentId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<CommentId>(&json).unwrap(), id);
    }

    #[test]
    fn generated_annotation_ids_differ() {
        assert_ne!(AnnotationId::generate(), AnnotationId::generate());
    }
}
