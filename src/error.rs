/// Crate-level error types for marginalia diagnostics.
use std::path::PathBuf;

use crate::document::DocumentStatus;
use crate::types::{AnnotationId, DocumentId};

/// All errors in marginalia carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the document, annotation, or path involved.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No annotation with this id is stored for the document.
    #[error("annotation not found: `{id}` on document `{document}`")]
    AnnotationNotFound {
        /// Document that was searched.
        document: DocumentId,
        /// Annotation id that was not found.
        id: AnnotationId,
    },

    /// The config file exists but a key could not be edited.
    #[error("config edit failed: {}: {reason}", path.display())]
    ConfigEdit {
        /// Path to the config file.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// Author edits are only allowed while the document is a draft.
    #[error("document `{id}` is {status} and can no longer be edited by its author")]
    DocumentLocked {
        /// Locked document.
        id: DocumentId,
        /// Current lifecycle status.
        status: DocumentStatus,
    },

    /// No document with this id exists in the store.
    #[error("document not found: `{id}`")]
    DocumentNotFound {
        /// Document id that was not found.
        id: DocumentId,
    },

    /// Annotations require a submitted or reviewed document.
    #[error("document `{id}` is {status}; annotations need a submitted document")]
    DocumentNotSubmitted {
        /// Document that is still a draft.
        id: DocumentId,
        /// Current lifecycle status.
        status: DocumentStatus,
    },

    /// A document with this id already exists in the store.
    #[error("document already exists: `{id}`")]
    DuplicateDocument {
        /// Document id that is taken.
        id: DocumentId,
    },

    /// An annotation record with this id is already stored.
    #[error("annotation already exists: `{id}`")]
    DuplicateRecord {
        /// Annotation or comment id that is taken.
        id: String,
    },

    /// Confirming an annotation or comment requires non-empty text.
    #[error("comment text is empty")]
    EmptyComment,

    /// A document without text cannot be submitted.
    #[error("document `{id}` has no text to submit")]
    EmptyDocument {
        /// Document that is empty.
        id: DocumentId,
    },

    /// The capture session is not in the state this operation needs.
    #[error("cannot {action} while {state}")]
    InvalidCaptureState {
        /// Operation that was attempted.
        action: &'static str,
        /// Current state label.
        state: &'static str,
    },

    /// Document ids become directory names, so they are restricted.
    #[error("invalid document id `{id}`: use 1-128 ASCII letters, digits, `-` or `_`")]
    InvalidDocumentId {
        /// Rejected id.
        id: String,
    },

    /// A plain-text range is empty, reversed, or past the end of the document.
    #[error("invalid range {start}..{end} for a document of {len} characters")]
    InvalidRange {
        /// Exclusive end offset.
        end: usize,
        /// Plain-text length of the document.
        len: usize,
        /// Start offset.
        start: usize,
    },

    /// Annotation and comment ids become file names, so they are restricted.
    #[error("invalid record id `{id}`: use ASCII letters, digits, `-` or `_`")]
    InvalidRecordId {
        /// Rejected id.
        id: String,
    },

    /// A `--from`/`--to` selection point could not be parsed.
    #[error("invalid selection point `{input}`: expected NODE:OFFSET")]
    InvalidSelectionPoint {
        /// Raw argument.
        input: String,
    },

    /// A lifecycle transition that the document status does not allow.
    #[error("document `{id}` cannot go from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: DocumentStatus,
        /// Document being transitioned.
        id: DocumentId,
        /// Requested status.
        to: DocumentStatus,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization of a store record failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped serde_json error.
        #[from]
        serde_json::Error,
    ),

    /// An annotation needs a reviewer identity and none was configured.
    #[error("no reviewer configured")]
    MissingReviewer,

    /// A store record exists but cannot be parsed.
    #[error("record corrupt: {}: {reason}", path.display())]
    RecordCorrupt {
        /// Path to the corrupt record.
        path: PathBuf,
        /// Description of the corruption.
        reason: String,
    },

    /// The selected text occurs more than once, so its position cannot be recovered.
    #[error("selection `{text}` is ambiguous: it occurs {count} times")]
    SelectionAmbiguous {
        /// Number of occurrences found.
        count: usize,
        /// Selected literal text.
        text: String,
    },

    /// The selection could only be located by text search and the policy rejects that.
    #[error("selection `{text}` could only be located approximately")]
    SelectionDegraded {
        /// Selected literal text.
        text: String,
    },

    /// The selected text could not be located in the document.
    #[error("selection `{text}` not found in the document")]
    SelectionNotFound {
        /// Selected literal text.
        text: String,
    },

    /// Reviewers cannot annotate their own essays.
    #[error("`{reviewer}` wrote document `{id}` and cannot review it")]
    SelfReview {
        /// Document being reviewed.
        id: DocumentId,
        /// Reviewer name that equals the author.
        reviewer: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// `config set` was given a key marginalia does not know.
    #[error("unknown config key: `{key}`")]
    UnknownConfigKey {
        /// Rejected key.
        key: String,
    },

    /// The change watcher could not be started.
    #[error("watch failed: {reason}")]
    WatchFailed {
        /// Description of the failure.
        reason: String,
    },
}
