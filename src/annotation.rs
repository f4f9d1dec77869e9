//! Reviewer annotations, general comments, and the legacy list import format.

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{AnnotationId, CommentId, ContentHash};

/// A reviewer comment anchored to a plain-text range of a document.
///
/// Offsets count chars of the document's projection; `highlighted_text` is
/// the text at those offsets when the annotation was made. Records are never
/// edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Reviewer who wrote the comment.
    pub author_name: String,
    /// The comment itself.
    pub comment_text: String,
    /// Fingerprint of the projection the offsets were measured against.
    /// Absent on imported records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentHash>,
    /// Creation time. Absent on imported records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Exclusive end offset.
    pub end_offset: usize,
    /// Snapshot of the covered text.
    pub highlighted_text: String,
    /// Unique id.
    pub id: AnnotationId,
    /// Inclusive start offset.
    pub start_offset: usize,
}

impl Annotation {
    /// The stored range. May be empty or reversed on imported records.
    pub const fn range(&self) -> Range<usize> {
        return self.start_offset..self.end_offset;
    }

    /// Hover text for the highlight.
    pub fn tooltip(&self) -> String {
        return format!("{}: {}", self.author_name, self.comment_text);
    }
}

/// A comment on the document as a whole, not anchored to any text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralComment {
    /// Commenter.
    pub author_name: String,
    /// The comment itself.
    pub comment_text: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Unique id, also the record's file name.
    pub id: CommentId,
}

impl GeneralComment {
    /// Build a new comment with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyComment` if the text is blank.
    pub fn new(author_name: &str, comment_text: &str, now: DateTime<Utc>) -> Result<Self, Error> {
        let text = comment_text.trim();
        if text.is_empty() {
            return Err(Error::EmptyComment);
        }
        return Ok(Self {
            author_name: author_name.to_string(),
            comment_text: text.to_string(),
            created_at: now,
            id: CommentId::generate(),
        });
    }
}

/// One entry of the list-shaped annotation export the platform used before
/// annotations became individual records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyInlineComment {
    /// Commenter, when the export recorded one.
    #[serde(default)]
    pub author: Option<String>,
    /// The comment itself.
    pub comment: String,
    /// Exclusive end offset.
    pub end: usize,
    /// Inclusive start offset.
    pub start: usize,
    /// Snapshot of the covered text.
    pub text: String,
}

impl LegacyInlineComment {
    /// Convert to an annotation with a fresh id. Ranges are carried as-is; the
    /// renderer decides later whether they can still be placed.
    pub fn into_annotation(self, fallback_author: &str) -> Annotation {
        return Annotation {
            author_name: self.author.unwrap_or_else(|| return fallback_author.to_string()),
            comment_text: self.comment,
            content_hash: None,
            created_at: None,
            end_offset: self.end,
            highlighted_text: self.text,
            id: AnnotationId::generate(),
            start_offset: self.start,
        };
    }
}

/// Order annotations by start offset, ties broken by id.
pub fn sort_by_position(annotations: &mut [Annotation]) {
    annotations.sort_by(|a, b| return a.start_offset.cmp(&b.start_offset).then_with(|| return a.id.cmp(&b.id)));
}

/// Order comments newest first, ties broken by id.
pub fn sort_by_recency(comments: &mut [GeneralComment]) {
    comments.sort_by(|a, b| return b.created_at.cmp(&a.created_at).then_with(|| return a.id.cmp(&b.id)));
}
