//! Essays and their Draft → Submitted → Reviewed lifecycle.

use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::markup::{Fragment, NodeSpan, Wrapper};
use crate::projection::Projection;
use crate::types::DocumentId;

/// Where a document is in review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Being written; only the author may change it.
    Draft,
    /// Review finished.
    Reviewed,
    /// Handed in; open for annotations, closed for edits.
    Submitted,
}

impl fmt::Display for DocumentStatus {
    /// Lowercase status name, as stored.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Reviewed => "reviewed",
            Self::Submitted => "submitted",
        };
        return f.write_str(name);
    }
}

/// Inline formatting an author can apply to a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// `<b>`
    Bold,
    /// `<i>`
    Italic,
    /// `<u>`
    Underline,
}

impl Format {
    /// Element name of the wrapper.
    pub const fn tag(self) -> &'static str {
        return match self {
            Self::Bold => "b",
            Self::Italic => "i",
            Self::Underline => "u",
        };
    }
}

/// An essay: sanitized markup plus lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichDocument {
    /// Who wrote the essay.
    pub author_name: String,
    /// Sanitized markup. Never contains highlight wrappers.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Store key.
    pub id: DocumentId,
    /// Lifecycle state.
    pub status: DocumentStatus,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Time of the last content or status change.
    pub updated_at: DateTime<Utc>,
}

impl RichDocument {
    /// Whether reviewers may annotate the document in its current state.
    pub const fn accepts_annotations(&self) -> bool {
        return matches!(self.status, DocumentStatus::Submitted | DocumentStatus::Reviewed);
    }

    /// Append plain text to the last paragraph, starting one if there is none.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentLocked` unless the document is a draft.
    pub fn append_text(&mut self, text: &str, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_draft()?;
        let mut fragment = Fragment::parse(&self.content);
        let root = fragment.root();
        let paragraph = match fragment.last_element("p") {
            Some(p) => Some(p),
            None => fragment.append_element(root, Wrapper::plain("p")),
        };
        if let Some(paragraph) = paragraph {
            let _ = fragment.append_text(paragraph, text);
        }
        self.store_fragment(&fragment, now);
        return Ok(());
    }

    /// Remove the text in a plain-text range, leaving formatting around it intact.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentLocked` unless the document is a draft, or
    /// `Error::InvalidRange` if the range is empty or out of bounds.
    pub fn delete_range(&mut self, range: Range<usize>, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_draft()?;
        let mut fragment = Fragment::parse(&self.content);
        let projection = Projection::build(&fragment);
        let range = projection.checked_range(range)?;

        for (node, piece) in projection.segments_in(range).into_iter().rev() {
            let Some(text) = fragment.text(node) else {
                continue;
            };
            let kept: String = text
                .chars()
                .enumerate()
                .filter(|(i, _)| return !piece.contains(i))
                .map(|(_, c)| return c)
                .collect();
            fragment.replace_text(node, kept);
        }
        self.store_fragment(&fragment, now);
        return Ok(());
    }

    /// Fail with `DocumentLocked` unless the author may still edit.
    fn ensure_draft(&self) -> Result<(), Error> {
        if self.status != DocumentStatus::Draft {
            return Err(Error::DocumentLocked {
                id: self.id.clone(),
                status: self.status,
            });
        }
        return Ok(());
    }

    /// Wrap every text piece in a plain-text range with a formatting element.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentLocked` unless the document is a draft, or
    /// `Error::InvalidRange` if the range is empty or out of bounds.
    pub fn format_range(&mut self, range: Range<usize>, format: Format, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_draft()?;
        let mut fragment = Fragment::parse(&self.content);
        let projection = Projection::build(&fragment);
        let range = projection.checked_range(range)?;

        let spans: Vec<NodeSpan> = projection
            .segments_in(range)
            .into_iter()
            .map(|(node, piece)| {
                return NodeSpan {
                    node,
                    range: piece,
                    wrapper: Wrapper::plain(format.tag()),
                };
            })
            .collect();
        fragment.wrap_spans(&spans);
        self.store_fragment(&fragment, now);
        return Ok(());
    }

    /// Mark a submitted document as reviewed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTransition` unless the document is submitted.
    pub fn mark_reviewed(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        return self.transition(DocumentStatus::Submitted, DocumentStatus::Reviewed, now);
    }

    /// A new, empty draft.
    pub fn new(id: DocumentId, author_name: &str, title: &str, now: DateTime<Utc>) -> Self {
        return Self {
            author_name: author_name.to_string(),
            content: String::new(),
            created_at: now,
            id,
            status: DocumentStatus::Draft,
            title: title.to_string(),
            updated_at: now,
        };
    }

    /// Parse the stored content and project it to plain text.
    pub fn projection(&self) -> Projection {
        return Projection::build(&Fragment::parse(&self.content));
    }

    /// Replace the whole content with sanitized markup.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentLocked` unless the document is a draft.
    pub fn replace_content(&mut self, markup: &str, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_draft()?;
        self.store_fragment(&Fragment::parse(markup), now);
        return Ok(());
    }

    /// Serialize an edited tree back into the content.
    fn store_fragment(&mut self, fragment: &Fragment, now: DateTime<Utc>) {
        self.content = fragment.to_html();
        self.updated_at = now;
    }

    /// Hand a draft in for review.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyDocument` if the draft has no text, or
    /// `Error::InvalidTransition` unless the document is a draft.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status == DocumentStatus::Draft && self.projection().text().trim().is_empty() {
            return Err(Error::EmptyDocument { id: self.id.clone() });
        }
        return self.transition(DocumentStatus::Draft, DocumentStatus::Submitted, now);
    }

    /// Move from `from` to `to`, failing if the current status is not `from`.
    fn transition(&mut self, from: DocumentStatus, to: DocumentStatus, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status != from {
            return Err(Error::InvalidTransition {
                from: self.status,
                id: self.id.clone(),
                to,
            });
        }
        tracing::info!(document = %self.id, %from, %to, "status changed");
        self.status = to;
        self.updated_at = now;
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(markup: &str) -> RichDocument {
        let mut doc = RichDocument::new(DocumentId::parse("essay").unwrap(), "Ada", "On Foxes", Utc::now());
        doc.replace_content(markup, Utc::now()).unwrap();
        doc
    }

    #[test]
    fn content_is_sanitized_on_write() {
        let doc = draft("<p onclick=\"x()\">The <mark class=\"annotation-highlight\">quick</mark> fox<script>1</script></p>");
        assert_eq!(doc.content, "<p>The quick fox</p>");
    }

    #[test]
    fn append_extends_last_paragraph() {
        let mut doc = draft("<p>one</p><p>two</p>");
        doc.append_text(" more", Utc::now()).unwrap();
        assert_eq!(doc.content, "<p>one</p><p>two more</p>");
    }

    #[test]
    fn append_to_empty_draft_starts_paragraph() {
        let mut doc = draft("");
        doc.append_text("first words", Utc::now()).unwrap();
        assert_eq!(doc.content, "<p>first words</p>");
    }

    #[test]
    fn delete_range_spans_formatting() {
        let mut doc = draft("<p>The quick <b>brown</b> fox</p>");
        doc.delete_range(8..12, Utc::now()).unwrap();
        assert_eq!(doc.projection().text(), "The quicown fox");
        assert_eq!(doc.content, "<p>The quic<b>own</b> fox</p>");
    }

    #[test]
    fn format_range_wraps_each_piece() {
        let mut doc = draft("<p>The quick <b>brown</b> fox</p>");
        doc.format_range(4..15, Format::Italic, Utc::now()).unwrap();
        assert_eq!(doc.content, "<p>The <i>quick </i><b><i>brown</i></b> fox</p>");
        assert_eq!(doc.projection().text(), "The quick brown fox");
    }

    #[test]
    fn format_range_rejects_out_of_bounds() {
        let mut doc = draft("<p>abc</p>");
        let err = doc.format_range(1..9, Format::Bold, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { len: 3, .. }));
    }

    #[test]
    fn submitted_document_is_locked() {
        let mut doc = draft("<p>text</p>");
        doc.submit(Utc::now()).unwrap();
        assert!(doc.accepts_annotations());
        let err = doc.append_text("more", Utc::now()).unwrap_err();
        assert!(matches!(err, Error::DocumentLocked { status: DocumentStatus::Submitted, .. }));
    }

    #[test]
    fn empty_draft_cannot_be_submitted() {
        let mut doc = draft("<p> </p>");
        assert!(matches!(doc.submit(Utc::now()), Err(Error::EmptyDocument { .. })));
        assert_eq!(doc.status, DocumentStatus::Draft);
    }

    #[test]
    fn review_requires_submission() {
        let mut doc = draft("<p>text</p>");
        assert!(matches!(doc.mark_reviewed(Utc::now()), Err(Error::InvalidTransition { .. })));
        doc.submit(Utc::now()).unwrap();
        doc.mark_reviewed(Utc::now()).unwrap();
        assert_eq!(doc.status, DocumentStatus::Reviewed);
        assert!(matches!(doc.submit(Utc::now()), Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DocumentStatus::Submitted).unwrap(), "\"submitted\"");
    }
}
