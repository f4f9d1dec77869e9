//! Persistence of documents, annotations, and general comments.
//!
//! On disk every record is its own JSON file:
//!
//! ```text
//! <root>/documents/<doc-id>/document.json
//! <root>/documents/<doc-id>/annotations/<annotation-id>.json
//! <root>/documents/<doc-id>/comments/<comment-id>.json
//! ```
//!
//! New records are staged in a dot-prefixed temporary file and persisted
//! without clobbering, which fails instead of overwriting when the id is
//! taken. Two reviewers appending at the same time therefore never lose each
//! other's annotations.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::annotation::{self, Annotation, GeneralComment};
use crate::document::RichDocument;
use crate::error::Error;
use crate::types::{AnnotationId, DocumentId};

/// Per-document directory of annotation records.
const ANNOTATIONS_DIR: &str = "annotations";

/// Per-document directory of general comment records.
const COMMENTS_DIR: &str = "comments";

/// Directory under the store root holding one directory per document.
const DOCUMENTS_DIR: &str = "documents";

/// Document metadata and content.
const DOCUMENT_FILE: &str = "document.json";

/// Extension of every record file.
const RECORD_EXT: &str = "json";

/// Where annotations live. The renderer and capturer only see this trait.
pub trait AnnotationStore {
    /// Store one new annotation without touching any other record.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateRecord` if the id is already stored.
    fn append_annotation(&self, document: &DocumentId, annotation: &Annotation) -> Result<(), Error>;

    /// Every annotation of a document, ordered by start offset then id.
    ///
    /// # Errors
    ///
    /// Returns store-specific read errors.
    fn load_annotations(&self, document: &DocumentId) -> Result<Vec<Annotation>, Error>;

    /// Delete one annotation.
    ///
    /// # Errors
    ///
    /// Returns `Error::AnnotationNotFound` if no such annotation is stored.
    fn remove_annotation(&self, document: &DocumentId, id: &AnnotationId) -> Result<(), Error>;

    /// Replace the whole annotation list of a document.
    ///
    /// # Errors
    ///
    /// Returns store-specific write errors.
    fn save_annotations(&self, document: &DocumentId, annotations: &[Annotation]) -> Result<(), Error>;
}

/// File-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    /// Store root; created lazily.
    root: PathBuf,
}

impl FsStore {
    /// Record path of one annotation.
    fn annotation_path(&self, document: &DocumentId, id: &AnnotationId) -> PathBuf {
        return self
            .document_dir(document)
            .join(ANNOTATIONS_DIR)
            .join(format!("{id}.{RECORD_EXT}"));
    }

    /// Store a general comment as a new record.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` for an unknown document, or write errors.
    pub fn append_comment(&self, document: &DocumentId, comment: &GeneralComment) -> Result<(), Error> {
        self.ensure_document(document)?;
        let path = self
            .document_dir(document)
            .join(COMMENTS_DIR)
            .join(format!("{}.{RECORD_EXT}", comment.id));
        return write_new(&path, &to_json(comment)?, comment.id.as_str());
    }

    /// Create the directory and metadata file of a new document.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateDocument` if the id is taken, or `Error::Io`.
    pub fn create_document(&self, document: &RichDocument) -> Result<(), Error> {
        let dir = self.document_dir(&document.id);
        std::fs::create_dir_all(self.root.join(DOCUMENTS_DIR))?;
        match std::fs::create_dir(&dir) {
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::DuplicateDocument { id: document.id.clone() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(()) => {},
        }
        std::fs::create_dir(dir.join(ANNOTATIONS_DIR))?;
        std::fs::create_dir(dir.join(COMMENTS_DIR))?;
        write_atomic(&dir.join(DOCUMENT_FILE), &to_json(document)?)?;
        tracing::info!(document = %document.id, "document created");
        return Ok(());
    }

    /// Delete a document together with its annotations and comments.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` for an unknown document, or `Error::Io`.
    pub fn delete_document(&self, document: &DocumentId) -> Result<(), Error> {
        self.ensure_document(document)?;
        std::fs::remove_dir_all(self.document_dir(document))?;
        tracing::info!(%document, "document deleted");
        return Ok(());
    }

    /// Directory holding one document's records.
    pub fn document_dir(&self, document: &DocumentId) -> PathBuf {
        return self.root.join(DOCUMENTS_DIR).join(document.as_str());
    }

    /// Fail with `DocumentNotFound` unless the document's metadata exists.
    fn ensure_document(&self, document: &DocumentId) -> Result<(), Error> {
        if !self.document_dir(document).join(DOCUMENT_FILE).is_file() {
            return Err(Error::DocumentNotFound { id: document.clone() });
        }
        return Ok(());
    }

    /// Every stored document, ordered by id. Directories whose names are not
    /// valid ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` or `Error::RecordCorrupt` for unreadable documents.
    pub fn list_documents(&self) -> Result<Vec<RichDocument>, Error> {
        let dir = self.root.join(DOCUMENTS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut documents = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let Ok(id) = DocumentId::parse(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            documents.push(self.load_document(&id)?);
        }
        return Ok(documents);
    }

    /// General comments on a document, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` for an unknown document, or read errors.
    pub fn load_comments(&self, document: &DocumentId) -> Result<Vec<GeneralComment>, Error> {
        self.ensure_document(document)?;
        let mut comments: Vec<GeneralComment> = read_records(&self.document_dir(document).join(COMMENTS_DIR))?
            .into_iter()
            .map(|(_, comment)| return comment)
            .collect();
        annotation::sort_by_recency(&mut comments);
        return Ok(comments);
    }

    /// Read a document's metadata and content.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound`, `Error::Io`, or `Error::RecordCorrupt`.
    pub fn load_document(&self, document: &DocumentId) -> Result<RichDocument, Error> {
        let path = self.document_dir(document).join(DOCUMENT_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DocumentNotFound { id: document.clone() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return parse_record(&path, &content);
    }

    /// A store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        return Self { root: root.into() };
    }

    /// Overwrite an existing document's metadata and content.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` for an unknown document, or write errors.
    pub fn save_document(&self, document: &RichDocument) -> Result<(), Error> {
        self.ensure_document(&document.id)?;
        let path = self.document_dir(&document.id).join(DOCUMENT_FILE);
        return write_atomic(&path, &to_json(document)?);
    }
}

impl AnnotationStore for FsStore {
    fn append_annotation(&self, document: &DocumentId, annotation: &Annotation) -> Result<(), Error> {
        self.ensure_document(document)?;
        let path = self.annotation_path(document, &annotation.id);
        write_new(&path, &to_json(annotation)?, annotation.id.as_str())?;
        tracing::debug!(%document, annotation = %annotation.id, "annotation appended");
        return Ok(());
    }

    fn load_annotations(&self, document: &DocumentId) -> Result<Vec<Annotation>, Error> {
        self.ensure_document(document)?;
        let mut annotations: Vec<Annotation> = read_records(&self.document_dir(document).join(ANNOTATIONS_DIR))?
            .into_iter()
            .map(|(_, annotation)| return annotation)
            .collect();
        annotation::sort_by_position(&mut annotations);
        return Ok(annotations);
    }

    /// Records are looked up by file name first. A record whose file was
    /// renamed is found by scanning for its id.
    fn remove_annotation(&self, document: &DocumentId, id: &AnnotationId) -> Result<(), Error> {
        self.ensure_document(document)?;
        let not_found = || {
            return Error::AnnotationNotFound {
                document: document.clone(),
                id: id.clone(),
            };
        };
        match std::fs::remove_file(self.annotation_path(document, id)) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(Error::Io(e)),
            Ok(()) => return Ok(()),
        }

        let records: Vec<(PathBuf, Annotation)> = read_records(&self.document_dir(document).join(ANNOTATIONS_DIR))?;
        let (path, _) = records
            .into_iter()
            .find(|(_, annotation)| return annotation.id == *id)
            .ok_or_else(not_found)?;
        return match std::fs::remove_file(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(Error::Io(e)),
            Ok(()) => Ok(()),
        };
    }

    /// Everything is checked before the first write: duplicate ids in the new
    /// list and every existing record, which must parse. Stale records are then
    /// removed by the path they were read from.
    fn save_annotations(&self, document: &DocumentId, annotations: &[Annotation]) -> Result<(), Error> {
        self.ensure_document(document)?;
        let mut targets: Vec<PathBuf> = Vec::with_capacity(annotations.len());
        for annotation in annotations {
            let path = self.annotation_path(document, &annotation.id);
            if targets.contains(&path) {
                return Err(Error::DuplicateRecord {
                    id: annotation.id.to_string(),
                });
            }
            targets.push(path);
        }
        let existing: Vec<(PathBuf, Annotation)> = read_records(&self.document_dir(document).join(ANNOTATIONS_DIR))?;
        let payloads = annotations.iter().map(to_json).collect::<Result<Vec<_>, _>>()?;

        for (path, json) in targets.iter().zip(&payloads) {
            write_atomic(path, json)?;
        }
        for (path, _) in existing {
            if !targets.contains(&path) {
                std::fs::remove_file(&path)?;
            }
        }
        tracing::info!(%document, count = annotations.len(), "annotation list replaced");
        return Ok(());
    }
}

/// Deserialize a record, reporting the path on failure.
fn parse_record<T: DeserializeOwned>(path: &Path, content: &str) -> Result<T, Error> {
    return serde_json::from_str(content).map_err(|e| {
        return Error::RecordCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
    });
}

/// Read every record file directly inside `dir`, in file-name order, paired
/// with the path it was read from. Dotfiles are in-flight temporaries and are
/// skipped.
fn read_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<(PathBuf, T)>, Error> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !entry.file_type().is_file() || path.extension().is_none_or(|ext| return ext != RECORD_EXT) {
            continue;
        }
        let content = std::fs::read_to_string(path)?;
        records.push((path.to_path_buf(), parse_record(path, &content)?));
    }
    return Ok(records);
}

/// Write `contents` to a hidden temporary next to `path`. The temporary is
/// deleted on drop unless it is persisted.
fn stage(path: &Path, contents: &str) -> Result<NamedTempFile, Error> {
    let dir = path.parent().unwrap_or_else(|| return Path::new("."));
    let mut staged = tempfile::Builder::new().prefix(".").suffix(".tmp").tempfile_in(dir)?;
    staged.write_all(contents.as_bytes())?;
    staged.as_file().sync_all()?;
    return Ok(staged);
}

/// Pretty JSON with a trailing newline.
fn to_json<T: Serialize>(record: &T) -> Result<String, Error> {
    let mut json = serde_json::to_string_pretty(record)?;
    json.push('\n');
    return Ok(json);
}

/// Replace `path` atomically: readers see the old or the new content, never a mix.
fn write_atomic(path: &Path, contents: &str) -> Result<(), Error> {
    stage(path, contents)?.persist(path).map_err(|e| return Error::Io(e.error))?;
    return Ok(());
}

/// Create `path` with `contents`, failing with `DuplicateRecord` if it exists.
fn write_new(path: &Path, contents: &str, id: &str) -> Result<(), Error> {
    return match stage(path, contents)?.persist_noclobber(path) {
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::DuplicateRecord { id: id.to_string() }),
        Err(e) => Err(Error::Io(e.error)),
        Ok(_) => Ok(()),
    };
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use std::thread;

    use chrono::{Duration, Utc};

    use super::*;

    fn store_with_essay() -> (tempfile::TempDir, FsStore, DocumentId) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join(".marginalia"));
        let id = DocumentId::parse("essay").unwrap();
        let mut doc = RichDocument::new(id.clone(), "Ada", "On Foxes", Utc::now());
        doc.replace_content("<p>The quick brown fox</p>", Utc::now()).unwrap();
        store.create_document(&doc).unwrap();
        (dir, store, id)
    }

    fn note(start: usize, end: usize, text: &str) -> Annotation {
        Annotation {
            author_name: "Grace".to_string(),
            comment_text: "hm".to_string(),
            content_hash: None,
            created_at: Some(Utc::now()),
            end_offset: end,
            highlighted_text: text.to_string(),
            id: AnnotationId::generate(),
            start_offset: start,
        }
    }

    #[test]
    fn document_round_trips() {
        let (_dir, store, id) = store_with_essay();
        let loaded = store.load_document(&id).unwrap();
        assert_eq!(loaded.title, "On Foxes");
        assert_eq!(loaded.content, "<p>The quick brown fox</p>");
        assert!(store.document_dir(&id).join("annotations").is_dir());
    }

    #[test]
    fn duplicate_document_is_rejected() {
        let (_dir, store, id) = store_with_essay();
        let again = RichDocument::new(id, "Bob", "", Utc::now());
        assert!(matches!(store.create_document(&again), Err(Error::DuplicateDocument { .. })));
    }

    #[test]
    fn missing_document_is_reported() {
        let (_dir, store, _) = store_with_essay();
        let other = DocumentId::parse("other").unwrap();
        assert!(matches!(store.load_document(&other), Err(Error::DocumentNotFound { .. })));
        assert!(matches!(store.load_annotations(&other), Err(Error::DocumentNotFound { .. })));
    }

    #[test]
    fn annotations_load_in_position_order() {
        let (_dir, store, id) = store_with_essay();
        store.append_annotation(&id, &note(16, 19, "fox")).unwrap();
        store.append_annotation(&id, &note(4, 9, "quick")).unwrap();
        let starts: Vec<usize> = store.load_annotations(&id).unwrap().iter().map(|a| a.start_offset).collect();
        assert_eq!(starts, [4, 16]);
    }

    #[test]
    fn appending_an_existing_id_fails() {
        let (_dir, store, id) = store_with_essay();
        let annotation = note(4, 9, "quick");
        store.append_annotation(&id, &annotation).unwrap();
        let err = store.append_annotation(&id, &annotation).unwrap_err();
        assert!(matches!(err, Error::DuplicateRecord { .. }));
        assert_eq!(store.load_annotations(&id).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_appends_keep_every_record() {
        let (_dir, store, id) = store_with_essay();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let id = id.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        store.append_annotation(&id, &note(i, i + 1, "x")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.load_annotations(&id).unwrap().len(), 40);
    }

    #[test]
    fn remove_reports_unknown_ids() {
        let (_dir, store, id) = store_with_essay();
        let annotation = note(4, 9, "quick");
        store.append_annotation(&id, &annotation).unwrap();
        store.remove_annotation(&id, &annotation.id).unwrap();
        let err = store.remove_annotation(&id, &annotation.id).unwrap_err();
        assert!(matches!(err, Error::AnnotationNotFound { .. }));
    }

    /// Write a record under a file name of our choosing, with `id` patched in.
    fn plant_record(store: &FsStore, doc: &DocumentId, file: &str, id: &str) {
        let mut json = serde_json::to_value(note(4, 9, "quick")).unwrap();
        json["id"] = serde_json::Value::String(id.to_string());
        let path = store.document_dir(doc).join("annotations").join(file);
        std::fs::write(path, json.to_string()).unwrap();
    }

    fn annotation_files(store: &FsStore, doc: &DocumentId) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(store.document_dir(doc).join("annotations"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn record_with_escaping_id_blocks_save_before_any_write() {
        let (_dir, store, id) = store_with_essay();
        plant_record(&store, &id, "copied.json", "../document");

        let err = store.save_annotations(&id, &[note(0, 3, "The")]).unwrap_err();
        assert!(matches!(err, Error::RecordCorrupt { .. }));
        assert!(store.document_dir(&id).join("document.json").is_file());
        assert_eq!(annotation_files(&store, &id), ["copied.json"]);
    }

    #[test]
    fn renamed_record_is_replaced_by_save() {
        let (_dir, store, id) = store_with_essay();
        plant_record(&store, &id, "backup-copy.json", "abc");

        let replacement = vec![note(10, 15, "brown")];
        store.save_annotations(&id, &replacement).unwrap();
        assert_eq!(store.load_annotations(&id).unwrap(), replacement);
        assert_eq!(annotation_files(&store, &id).len(), 1);
    }

    #[test]
    fn renamed_record_can_be_removed() {
        let (_dir, store, id) = store_with_essay();
        plant_record(&store, &id, "backup-copy.json", "abc");

        store.remove_annotation(&id, &AnnotationId::parse("abc").unwrap()).unwrap();
        assert!(store.load_annotations(&id).unwrap().is_empty());
    }

    #[test]
    fn rejected_writes_leave_no_temporaries() {
        let (_dir, store, id) = store_with_essay();
        let annotation = note(4, 9, "quick");
        store.append_annotation(&id, &annotation).unwrap();
        assert!(store.append_annotation(&id, &annotation).is_err());
        assert_eq!(annotation_files(&store, &id), [format!("{}.json", annotation.id)]);
    }

    #[test]
    fn save_replaces_whole_list() {
        let (_dir, store, id) = store_with_essay();
        store.append_annotation(&id, &note(0, 3, "The")).unwrap();
        let replacement = vec![note(4, 9, "quick"), note(10, 15, "brown")];
        store.save_annotations(&id, &replacement).unwrap();
        let loaded = store.load_annotations(&id).unwrap();
        assert_eq!(loaded, replacement);
    }

    #[test]
    fn temporaries_are_ignored_and_corruption_reported() {
        let (_dir, store, id) = store_with_essay();
        let dir = store.document_dir(&id).join("annotations");
        std::fs::write(dir.join(".half-written.json.tmp"), "{").unwrap();
        std::fs::write(dir.join(".hidden.json"), "{").unwrap();
        assert!(store.load_annotations(&id).unwrap().is_empty());

        std::fs::write(dir.join("broken.json"), "{").unwrap();
        assert!(matches!(store.load_annotations(&id), Err(Error::RecordCorrupt { .. })));
    }

    #[test]
    fn comments_list_newest_first() {
        let (_dir, store, id) = store_with_essay();
        let now = Utc::now();
        let older = GeneralComment::new("Grace", "first pass", now - Duration::hours(1)).unwrap();
        let newer = GeneralComment::new("Grace", "second pass", now).unwrap();
        store.append_comment(&id, &older).unwrap();
        store.append_comment(&id, &newer).unwrap();
        let loaded = store.load_comments(&id).unwrap();
        assert_eq!(loaded, vec![newer, older]);
    }

    #[test]
    fn delete_removes_everything() {
        let (_dir, store, id) = store_with_essay();
        store.append_annotation(&id, &note(4, 9, "quick")).unwrap();
        store.delete_document(&id).unwrap();
        assert!(!store.document_dir(&id).exists());
        assert!(store.list_documents().unwrap().is_empty());
    }

    #[test]
    fn list_documents_in_id_order() {
        let (_dir, store, _) = store_with_essay();
        let id = DocumentId::parse("another").unwrap();
        store.create_document(&RichDocument::new(id, "Bob", "", Utc::now())).unwrap();
        let ids: Vec<String> = store.list_documents().unwrap().into_iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, ["another", "essay"]);
    }
}
