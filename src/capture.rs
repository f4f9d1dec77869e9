//! Reviewer selection capture: turns a live selection plus a comment into a
//! stored annotation.
//!
//! ```text
//! Idle -> Selecting -> AwaitingComment -> (confirm | cancel) -> Idle
//! ```

use chrono::{DateTime, Utc};

use crate::annotation::Annotation;
use crate::document::RichDocument;
use crate::error::Error;
use crate::hasher;
use crate::projection::Projection;
use crate::store::AnnotationStore;
use crate::types::{AnnotationId, Confidence, ContentHash, DocumentId, LiveSelection};

/// Whether text-search captures are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePolicy {
    /// Accept selections that could only be located by searching for their text.
    pub accept_degraded: bool,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        return Self { accept_degraded: true };
    }
}

/// A capture session bound to one document and one reviewer.
#[derive(Debug)]
pub struct CaptureSession {
    /// Document selections are taken from.
    document: DocumentId,
    /// Degraded-capture policy.
    policy: CapturePolicy,
    /// Name recorded as the annotation author.
    reviewer: String,
    /// Current state.
    state: CaptureState,
}

/// Where the session is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    /// A selection resolved; waiting for the reviewer's comment.
    AwaitingComment(Draft),
    /// Nothing selected.
    Idle,
    /// The reviewer is dragging out a selection.
    Selecting,
}

impl CaptureState {
    /// Short name for diagnostics.
    const fn label(&self) -> &'static str {
        return match self {
            Self::AwaitingComment(_) => "awaiting a comment",
            Self::Idle => "idle",
            Self::Selecting => "selecting",
        };
    }
}

/// A resolved selection waiting for its comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Exact or text-search match.
    pub confidence: Confidence,
    /// Fingerprint of the projection the offsets refer to.
    pub content_hash: ContentHash,
    /// Exclusive end offset.
    pub end_offset: usize,
    /// Text at the offsets.
    pub highlighted_text: String,
    /// Inclusive start offset.
    pub start_offset: usize,
}

impl CaptureSession {
    /// Start a selection. Any pending draft is discarded.
    pub fn begin_selection(&mut self) {
        if let CaptureState::AwaitingComment(draft) = &self.state {
            tracing::debug!(start = draft.start_offset, end = draft.end_offset, "pending draft discarded");
        }
        self.state = CaptureState::Selecting;
    }

    /// Drop the pending draft, if any. Returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        let had_draft = matches!(self.state, CaptureState::AwaitingComment(_));
        self.state = CaptureState::Idle;
        return had_draft;
    }

    /// Commit the pending draft with a comment as a new annotation record.
    ///
    /// On success the session returns to `Idle`. A blank comment or a failed
    /// store write keeps the draft so the reviewer can retry.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCaptureState` without a pending draft,
    /// `Error::EmptyComment` for a blank comment, `Error::DocumentNotSubmitted`
    /// or `Error::SelfReview` when the reviewer may not annotate this
    /// document, or store errors from the append.
    pub fn confirm(
        &mut self,
        comment: &str,
        document: &RichDocument,
        store: &impl AnnotationStore,
        now: DateTime<Utc>,
    ) -> Result<Annotation, Error> {
        let CaptureState::AwaitingComment(draft) = &self.state else {
            return Err(Error::InvalidCaptureState {
                action: "confirm",
                state: self.state.label(),
            });
        };
        if document.id != self.document {
            return Err(Error::InvalidCaptureState {
                action: "confirm",
                state: "bound to another document",
            });
        }
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(Error::EmptyComment);
        }
        if !document.accepts_annotations() {
            self.state = CaptureState::Idle;
            return Err(Error::DocumentNotSubmitted {
                id: document.id.clone(),
                status: document.status,
            });
        }
        if document.author_name == self.reviewer {
            self.state = CaptureState::Idle;
            return Err(Error::SelfReview {
                id: document.id.clone(),
                reviewer: self.reviewer.clone(),
            });
        }

        let annotation = Annotation {
            author_name: self.reviewer.clone(),
            comment_text: comment.to_string(),
            content_hash: Some(draft.content_hash.clone()),
            created_at: Some(now),
            end_offset: draft.end_offset,
            highlighted_text: draft.highlighted_text.clone(),
            id: AnnotationId::generate(),
            start_offset: draft.start_offset,
        };
        store.append_annotation(&self.document, &annotation)?;
        tracing::info!(document = %self.document, annotation = %annotation.id, "annotation committed");
        self.state = CaptureState::Idle;
        return Ok(annotation);
    }

    /// End the selection and resolve it against the document's projection.
    ///
    /// A collapsed selection returns to `Idle` with no draft. Any resolution
    /// failure also returns to `Idle` and is surfaced so the reviewer can
    /// select again.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCaptureState` unless a selection was begun,
    /// `Error::SelectionNotFound` / `Error::SelectionAmbiguous` when the
    /// selection cannot be located, and `Error::SelectionDegraded` when it was
    /// located only by text search and the policy rejects that.
    pub fn finish_selection(
        &mut self,
        projection: &Projection,
        selection: &LiveSelection,
    ) -> Result<Option<&Draft>, Error> {
        if self.state != CaptureState::Selecting {
            return Err(Error::InvalidCaptureState {
                action: "finish a selection",
                state: self.state.label(),
            });
        }
        self.state = CaptureState::Idle;

        if selection.start == selection.end && selection.text.is_empty() {
            return Ok(None);
        }

        let resolved = projection.resolve_selection_to_offsets(selection)?;
        if resolved.confidence == Confidence::Degraded && !self.policy.accept_degraded {
            return Err(Error::SelectionDegraded {
                text: selection.text.clone(),
            });
        }
        let highlighted_text = projection
            .slice(resolved.range.clone())
            .unwrap_or_default()
            .to_string();

        self.state = CaptureState::AwaitingComment(Draft {
            confidence: resolved.confidence,
            content_hash: hasher::fingerprint(projection),
            end_offset: resolved.range.end,
            highlighted_text,
            start_offset: resolved.range.start,
        });
        let CaptureState::AwaitingComment(draft) = &self.state else {
            return Ok(None);
        };
        return Ok(Some(draft));
    }

    /// A new idle session.
    pub const fn new(document: DocumentId, reviewer: String, policy: CapturePolicy) -> Self {
        return Self {
            document,
            policy,
            reviewer,
            state: CaptureState::Idle,
        };
    }
}

#[cfg(test)]
impl CaptureSession {
    /// Current state.
    pub const fn state(&self) -> &CaptureState {
        return &self.state;
    }

    /// Rebind to another document, dropping whatever was in progress.
    pub fn switch_document(&mut self, document: DocumentId) {
        self.document = document;
        self.state = CaptureState::Idle;
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::markup::Fragment;
    use crate::types::NodePosition;

    /// Append-only in-memory store.
    #[derive(Default)]
    struct MemoryStore {
        records: RefCell<Vec<Annotation>>,
    }

    impl AnnotationStore for MemoryStore {
        fn append_annotation(&self, _: &DocumentId, annotation: &Annotation) -> Result<(), Error> {
            self.records.borrow_mut().push(annotation.clone());
            Ok(())
        }

        fn load_annotations(&self, _: &DocumentId) -> Result<Vec<Annotation>, Error> {
            Ok(self.records.borrow().clone())
        }

        fn remove_annotation(&self, _: &DocumentId, id: &AnnotationId) -> Result<(), Error> {
            self.records.borrow_mut().retain(|a| &a.id != id);
            Ok(())
        }

        fn save_annotations(&self, _: &DocumentId, annotations: &[Annotation]) -> Result<(), Error> {
            *self.records.borrow_mut() = annotations.to_vec();
            Ok(())
        }
    }

    const MARKUP: &str = "<p>The quick <b>brown</b> fox</p>";

    fn submitted() -> RichDocument {
        let mut doc = RichDocument::new(DocumentId::parse("essay").unwrap(), "Ada", "", Utc::now());
        doc.replace_content(MARKUP, Utc::now()).unwrap();
        doc.submit(Utc::now()).unwrap();
        doc
    }

    fn session(policy: CapturePolicy) -> CaptureSession {
        CaptureSession::new(DocumentId::parse("essay").unwrap(), "Grace".to_string(), policy)
    }

    /// Selection of "brown fox" with both points in text nodes.
    fn exact_selection(fragment: &Fragment) -> LiveSelection {
        let nodes = fragment.text_nodes();
        LiveSelection {
            end: NodePosition { node: nodes[2], offset: 4 },
            start: NodePosition { node: nodes[1], offset: 0 },
            text: "brown fox".to_string(),
        }
    }

    /// Selection whose points sit on the root container.
    fn container_selection(fragment: &Fragment, text: &str) -> LiveSelection {
        let root = fragment.root();
        LiveSelection {
            end: NodePosition { node: root, offset: 1 },
            start: NodePosition { node: root, offset: 0 },
            text: text.to_string(),
        }
    }

    #[test]
    fn full_capture_appends_one_record() {
        let doc = submitted();
        let fragment = Fragment::parse(&doc.content);
        let projection = Projection::build(&fragment);
        let store = MemoryStore::default();
        let mut session = session(CapturePolicy::default());

        session.begin_selection();
        let draft = session.finish_selection(&projection, &exact_selection(&fragment)).unwrap().unwrap();
        assert_eq!(draft.confidence, Confidence::Exact);
        assert_eq!((draft.start_offset, draft.end_offset), (10, 19));

        let annotation = session.confirm("  tighten this  ", &doc, &store, Utc::now()).unwrap();
        assert_eq!(annotation.highlighted_text, "brown fox");
        assert_eq!(annotation.comment_text, "tighten this");
        assert_eq!(annotation.author_name, "Grace");
        assert_eq!(annotation.content_hash, Some(hasher::fingerprint(&projection)));
        assert_eq!(session.state(), &CaptureState::Idle);
        assert_eq!(store.load_annotations(&doc.id).unwrap(), vec![annotation]);
    }

    #[test]
    fn degraded_capture_is_flagged() {
        let doc = submitted();
        let fragment = Fragment::parse(&doc.content);
        let projection = Projection::build(&fragment);
        let mut session = session(CapturePolicy::default());

        session.begin_selection();
        let draft = session
            .finish_selection(&projection, &container_selection(&fragment, "quick"))
            .unwrap()
            .unwrap();
        assert_eq!(draft.confidence, Confidence::Degraded);
        assert_eq!((draft.start_offset, draft.end_offset), (4, 9));
    }

    #[test]
    fn strict_policy_rejects_degraded_capture() {
        let doc = submitted();
        let fragment = Fragment::parse(&doc.content);
        let projection = Projection::build(&fragment);
        let mut session = session(CapturePolicy { accept_degraded: false });

        session.begin_selection();
        let err = session
            .finish_selection(&projection, &container_selection(&fragment, "quick"))
            .unwrap_err();
        assert!(matches!(err, Error::SelectionDegraded { .. }));
        assert_eq!(session.state(), &CaptureState::Idle);
    }

    #[test]
    fn ambiguous_selection_returns_to_idle() {
        let fragment = Fragment::parse("<p>to be or not to be</p>");
        let projection = Projection::build(&fragment);
        let mut session = session(CapturePolicy::default());

        session.begin_selection();
        let err = session
            .finish_selection(&projection, &container_selection(&fragment, "to be"))
            .unwrap_err();
        assert!(matches!(err, Error::SelectionAmbiguous { count: 2, .. }));
        assert_eq!(session.state(), &CaptureState::Idle);
    }

    #[test]
    fn collapsed_selection_yields_no_draft() {
        let fragment = Fragment::parse(MARKUP);
        let projection = Projection::build(&fragment);
        let node = fragment.text_nodes()[0];
        let point = NodePosition { node, offset: 2 };
        let mut session = session(CapturePolicy::default());

        session.begin_selection();
        let selection = LiveSelection {
            end: point,
            start: point,
            text: String::new(),
        };
        assert!(session.finish_selection(&projection, &selection).unwrap().is_none());
        assert_eq!(session.state(), &CaptureState::Idle);
    }

    #[test]
    fn blank_comment_keeps_draft() {
        let doc = submitted();
        let fragment = Fragment::parse(&doc.content);
        let projection = Projection::build(&fragment);
        let store = MemoryStore::default();
        let mut session = session(CapturePolicy::default());

        session.begin_selection();
        session.finish_selection(&projection, &exact_selection(&fragment)).unwrap();
        assert!(matches!(session.confirm(" ", &doc, &store, Utc::now()), Err(Error::EmptyComment)));
        assert!(matches!(session.state(), CaptureState::AwaitingComment(_)));
        assert!(session.cancel());
        assert!(store.load_annotations(&doc.id).unwrap().is_empty());
    }

    #[test]
    fn author_cannot_annotate_own_essay() {
        let doc = submitted();
        let fragment = Fragment::parse(&doc.content);
        let projection = Projection::build(&fragment);
        let store = MemoryStore::default();
        let mut session = CaptureSession::new(doc.id.clone(), "Ada".to_string(), CapturePolicy::default());

        session.begin_selection();
        session.finish_selection(&projection, &exact_selection(&fragment)).unwrap();
        let err = session.confirm("mine", &doc, &store, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::SelfReview { .. }));
    }

    #[test]
    fn drafts_cannot_be_annotated() {
        let mut doc = RichDocument::new(DocumentId::parse("essay").unwrap(), "Ada", "", Utc::now());
        doc.replace_content(MARKUP, Utc::now()).unwrap();
        let fragment = Fragment::parse(&doc.content);
        let projection = Projection::build(&fragment);
        let store = MemoryStore::default();
        let mut session = session(CapturePolicy::default());

        session.begin_selection();
        session.finish_selection(&projection, &exact_selection(&fragment)).unwrap();
        let err = session.confirm("early", &doc, &store, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::DocumentNotSubmitted { .. }));
    }

    #[test]
    fn confirm_without_selection_is_rejected() {
        let doc = submitted();
        let store = MemoryStore::default();
        let mut session = session(CapturePolicy::default());
        let err = session.confirm("hi", &doc, &store, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidCaptureState { state: "idle", .. }));
    }

    #[test]
    fn switching_documents_resets_state() {
        let doc = submitted();
        let fragment = Fragment::parse(&doc.content);
        let projection = Projection::build(&fragment);
        let mut session = session(CapturePolicy::default());

        session.begin_selection();
        session.finish_selection(&projection, &exact_selection(&fragment)).unwrap();
        session.switch_document(DocumentId::parse("other").unwrap());
        assert_eq!(session.state(), &CaptureState::Idle);
    }
}
