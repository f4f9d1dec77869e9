//! CLI commands for marginalia: authoring, reviewing, rendering, and checking.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;

use crate::annotation::{GeneralComment, LegacyInlineComment};
use crate::capture::CaptureSession;
use crate::config::{self, Config};
use crate::document::{Format, RichDocument};
use crate::error::Error;
use crate::freshness::{self, CheckResult};
use crate::hasher;
use crate::highlight;
use crate::markup::Fragment;
use crate::projection::Projection;
use crate::store::AnnotationStore as _;
use crate::types::{AnnotationId, Confidence, DocumentId, LiveSelection, NodePosition};

/// How an annotation's range is picked on the command line.
pub struct Selector<'a> {
    /// Start point as `NODE:OFFSET`.
    pub from: Option<&'a str>,
    /// Selected text as displayed.
    pub text: Option<&'a str>,
    /// End point as `NODE:OFFSET`.
    pub to: Option<&'a str>,
}

/// What `show` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowMode {
    /// The stored markup.
    Markup,
    /// Numbered text nodes with their global ranges.
    Nodes,
    /// The plain-text projection.
    Plain,
}

/// Capture a selection and commit it as an annotation. A dry run stops after
/// resolving the selection and stores nothing.
///
/// # Errors
///
/// Returns `Error::MissingReviewer` without a reviewer, selection errors, or
/// the capture errors of `CaptureSession::confirm`.
pub fn annotate(
    config: &Config,
    document: &DocumentId,
    comment: &str,
    selector: &Selector<'_>,
    reviewer: Option<&str>,
    dry_run: bool,
) -> Result<(), Error> {
    let store = config.open_store();
    let doc = store.load_document(document)?;
    let reviewer = reviewer.or_else(|| return config.reviewer()).ok_or(Error::MissingReviewer)?;

    let fragment = Fragment::parse(&doc.content);
    let projection = Projection::build(&fragment);
    let selection = live_selection(&fragment, &projection, selector)?;

    let mut session = CaptureSession::new(doc.id.clone(), reviewer.to_string(), config.capture_policy());
    session.begin_selection();
    let Some(draft) = session.finish_selection(&projection, &selection)? else {
        println!("Nothing selected");
        return Ok(());
    };
    if draft.confidence == Confidence::Degraded {
        eprintln!(
            "warning: `{}` was located by text search at {}..{}; check the highlight",
            draft.highlighted_text, draft.start_offset, draft.end_offset
        );
    }

    if dry_run {
        println!(
            "Would annotate {}..{} \"{}\"",
            draft.start_offset, draft.end_offset, draft.highlighted_text
        );
        session.cancel();
        return Ok(());
    }

    let annotation = session.confirm(comment, &doc, &store, Utc::now())?;
    println!(
        "Annotated {}..{} \"{}\" as {}",
        annotation.start_offset, annotation.end_offset, annotation.highlighted_text, annotation.id
    );
    return Ok(());
}

/// Append text to the last paragraph of a draft.
///
/// # Errors
///
/// Returns store errors or `Error::DocumentLocked`.
pub fn append(config: &Config, document: &DocumentId, text: &str) -> Result<(), Error> {
    return edit(config, document, |doc| return doc.append_text(text, Utc::now()));
}

/// Report how every annotation fares against the current text.
///
/// # Errors
///
/// Returns store errors.
pub fn check(config: &Config, document: &DocumentId) -> Result<ExitCode, Error> {
    let store = config.open_store();
    let doc = store.load_document(document)?;
    let annotations = store.load_annotations(document)?;
    let projection = doc.projection();
    let current = hasher::fingerprint(&projection);

    let mut broken_count = 0_u32;
    let mut relocated_count = 0_u32;
    let mut drifted_count = 0_u32;
    let mut worst = 0_u8;

    for annotation in &annotations {
        let result = freshness::check_annotation(annotation, &projection, &current);
        let detail = match &result {
            CheckResult::Broken(reason) => {
                broken_count = broken_count.saturating_add(1);
                format!(" ({reason})")
            },
            CheckResult::Drifted => {
                drifted_count = drifted_count.saturating_add(1);
                String::new()
            },
            CheckResult::Fresh => String::new(),
            CheckResult::Relocated(to) => {
                relocated_count = relocated_count.saturating_add(1);
                format!(" (now {}..{})", to.start, to.end)
            },
        };
        worst = worst.max(result.exit_code());
        println!(
            "{:<9} {} {}..{} {:?}{detail}",
            result.label(),
            annotation.id,
            annotation.start_offset,
            annotation.end_offset,
            annotation.highlighted_text
        );
    }

    // Exit code priority: broken (2) > relocated (1) > fresh or drifted (0).
    if worst > 0 {
        println!();
        println!("{broken_count} broken, {relocated_count} relocated, {drifted_count} drifted");
    } else {
        let total = annotations.len();
        println!("All {total} annotations in place ({drifted_count} drifted)");
    }
    return Ok(ExitCode::from(worst));
}

/// Add a general comment to a document.
///
/// # Errors
///
/// Returns `Error::MissingReviewer` without an author, `Error::EmptyComment`,
/// or store errors.
pub fn comment(config: &Config, document: &DocumentId, text: &str, author: Option<&str>) -> Result<(), Error> {
    let author = author.or_else(|| return config.reviewer()).ok_or(Error::MissingReviewer)?;
    let comment = GeneralComment::new(author, text, Utc::now())?;
    config.open_store().append_comment(document, &comment)?;
    println!("Commented as {}", comment.id);
    return Ok(());
}

/// Print a document's general comments, newest first.
///
/// # Errors
///
/// Returns store errors.
pub fn comments(config: &Config, document: &DocumentId) -> Result<(), Error> {
    let comments = config.open_store().load_comments(document)?;
    if comments.is_empty() {
        println!("No comments.");
        return Ok(());
    }
    for comment in comments {
        println!(
            "{}  {}: {}",
            comment.created_at.format("%Y-%m-%d %H:%M"),
            comment.author_name,
            comment.comment_text
        );
    }
    return Ok(());
}

/// Set one key in `.marginalia.toml`.
///
/// # Errors
///
/// Returns errors from `config::set_value`.
pub fn config_set(key: &str, value: &str) -> Result<(), Error> {
    let root = PathBuf::from(".");
    let path = config::set_value(&root, key, value)?;
    println!("Set {key} = {value} in {}", path.display());
    return Ok(());
}

/// Create an empty draft.
///
/// # Errors
///
/// Returns `Error::DuplicateDocument` or store errors.
pub fn create(config: &Config, document: &DocumentId, author: &str, title: &str) -> Result<(), Error> {
    let doc = RichDocument::new(document.clone(), author, title, Utc::now());
    config.open_store().create_document(&doc)?;
    println!("Created draft {document}");
    return Ok(());
}

/// Delete a plain-text range from a draft.
///
/// # Errors
///
/// Returns store errors, `Error::DocumentLocked`, or `Error::InvalidRange`.
pub fn delete(config: &Config, document: &DocumentId, start: usize, end: usize) -> Result<(), Error> {
    return edit(config, document, |doc| return doc.delete_range(start..end, Utc::now()));
}

/// Delete a document with all its records.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` or store errors.
pub fn destroy(config: &Config, document: &DocumentId) -> Result<(), Error> {
    config.open_store().delete_document(document)?;
    println!("Deleted {document}");
    return Ok(());
}

/// Load, change, and save a document.
fn edit(
    config: &Config,
    document: &DocumentId,
    change: impl FnOnce(&mut RichDocument) -> Result<(), Error>,
) -> Result<(), Error> {
    let store = config.open_store();
    let mut doc = store.load_document(document)?;
    change(&mut doc)?;
    store.save_document(&doc)?;
    println!("{}", doc.projection().text());
    return Ok(());
}

/// Apply inline formatting to a plain-text range of a draft.
///
/// # Errors
///
/// Returns store errors, `Error::DocumentLocked`, or `Error::InvalidRange`.
pub fn format(config: &Config, document: &DocumentId, start: usize, end: usize, style: Format) -> Result<(), Error> {
    return edit(config, document, |doc| return doc.format_range(start..end, style, Utc::now()));
}

/// Replace a document's annotations with a legacy list export.
///
/// # Errors
///
/// Returns `Error::Io` or `Error::RecordCorrupt` for an unreadable export, or store errors.
pub fn import(config: &Config, document: &DocumentId, file: &Path, author: Option<&str>) -> Result<(), Error> {
    let content = std::fs::read_to_string(file)?;
    let entries: Vec<LegacyInlineComment> = serde_json::from_str(&content).map_err(|e| {
        return Error::RecordCorrupt {
            path: file.to_path_buf(),
            reason: e.to_string(),
        };
    })?;
    let fallback = author.or_else(|| return config.reviewer()).unwrap_or("unknown");
    let annotations: Vec<_> = entries.into_iter().map(|e| return e.into_annotation(fallback)).collect();

    config.open_store().save_annotations(document, &annotations)?;
    println!("Imported {} annotations into {document}", annotations.len());
    return Ok(());
}

/// Output the marginalia reference document.
pub fn info(config: &Config, json: bool) {
    return crate::info::run(config, json);
}

/// List every stored document.
///
/// # Errors
///
/// Returns store errors.
pub fn list(config: &Config) -> Result<(), Error> {
    let store = config.open_store();
    let documents = store.list_documents()?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in documents {
        let count = store.load_annotations(&doc.id)?.len();
        println!("{:<24} {:<9} {count:>3} annotations  {}", doc.id.as_str(), doc.status.to_string(), doc.title);
    }
    return Ok(());
}

/// Build the live selection a `Selector` describes.
///
/// Node indices count text nodes in document order, as printed by
/// `show --nodes`. An index past the last node becomes a point on the root
/// container, which forces capture to fall back to text search.
fn live_selection(fragment: &Fragment, projection: &Projection, selector: &Selector<'_>) -> Result<LiveSelection, Error> {
    let nodes = fragment.text_nodes();
    let point = |raw: &str| -> Result<NodePosition, Error> {
        let (index, offset) = parse_point(raw)?;
        return Ok(nodes.get(index).map_or(
            NodePosition {
                node: fragment.root(),
                offset,
            },
            |&node| return NodePosition { node, offset },
        ));
    };

    return match (selector.from, selector.to) {
        (Some(from), Some(to)) => {
            let start = point(from)?;
            let end = point(to)?;
            let text = match selector.text {
                Some(text) => text.to_string(),
                None => projection
                    .position_of(start)
                    .zip(projection.position_of(end))
                    .and_then(|(a, b)| return projection.slice(a.min(b)..a.max(b)))
                    .unwrap_or_default()
                    .to_string(),
            };
            Ok(LiveSelection { end, start, text })
        },
        (None, None) => {
            let Some(text) = selector.text else {
                return Err(Error::InvalidSelectionPoint { input: String::new() });
            };
            let anchor = NodePosition {
                node: fragment.root(),
                offset: 0,
            };
            Ok(LiveSelection {
                end: anchor,
                start: anchor,
                text: text.to_string(),
            })
        },
        (Some(only), None) | (None, Some(only)) => Err(Error::InvalidSelectionPoint { input: only.to_string() }),
    };
}

/// Parse `NODE:OFFSET`.
fn parse_point(raw: &str) -> Result<(usize, usize), Error> {
    let invalid = || return Error::InvalidSelectionPoint { input: raw.to_string() };
    let (index, offset) = raw.split_once(':').ok_or_else(invalid)?;
    let index = index.trim().parse().map_err(|_err| return invalid())?;
    let offset = offset.trim().parse().map_err(|_err| return invalid())?;
    return Ok((index, offset));
}

/// Delete one annotation.
///
/// # Errors
///
/// Returns `Error::InvalidRecordId`, `Error::AnnotationNotFound`, or store errors.
pub fn remove(config: &Config, document: &DocumentId, id: &str) -> Result<(), Error> {
    let id = AnnotationId::parse(id)?;
    config.open_store().remove_annotation(document, &id)?;
    println!("Removed {id}");
    return Ok(());
}

/// Render a document with highlights to a file or stdout.
///
/// # Errors
///
/// Returns store errors or `Error::Io` when the output cannot be written.
pub fn render(config: &Config, document: &DocumentId, out: Option<&Path>) -> Result<ExitCode, Error> {
    let store = config.open_store();
    let doc = store.load_document(document)?;
    let annotations = store.load_annotations(document)?;
    let view = highlight::render(&doc.content, &annotations, &config.highlight_style());

    match out {
        Some(path) => {
            std::fs::write(path, format!("{}\n", view.html))?;
            eprintln!("Wrote {}", path.display());
        },
        None => println!("{}", view.html),
    }

    let report = &view.report;
    eprintln!(
        "{} highlighted, {} relocated, {} skipped",
        report.applied.len(),
        report.relocated.len(),
        report.skipped.len()
    );
    for (id, reason) in &report.skipped {
        eprintln!("  skipped {id}: {reason}");
    }
    return Ok(ExitCode::SUCCESS);
}

/// Mark a submitted document as reviewed.
///
/// # Errors
///
/// Returns store errors or `Error::InvalidTransition`.
pub fn review(config: &Config, document: &DocumentId) -> Result<(), Error> {
    let store = config.open_store();
    let mut doc = store.load_document(document)?;
    doc.mark_reviewed(Utc::now())?;
    store.save_document(&doc)?;
    println!("{document} is {}", doc.status);
    return Ok(());
}

/// Print a document as markup, plain text, or numbered text nodes.
///
/// # Errors
///
/// Returns store errors.
pub fn show(config: &Config, document: &DocumentId, mode: ShowMode) -> Result<(), Error> {
    let doc = config.open_store().load_document(document)?;
    match mode {
        ShowMode::Markup => println!("{}", doc.content),
        ShowMode::Nodes => {
            let fragment = Fragment::parse(&doc.content);
            let mut offset = 0_usize;
            for (index, node) in fragment.text_nodes().into_iter().enumerate() {
                let text = fragment.text(node).unwrap_or("");
                let end = offset.saturating_add(text.chars().count());
                println!("{index:>3}  {offset}..{end}  {text:?}");
                offset = end;
            }
        },
        ShowMode::Plain => {
            let projection = doc.projection();
            if projection.is_empty() {
                eprintln!("{document} has no text yet");
            }
            println!("{}", projection.text());
        },
    }
    return Ok(());
}

/// Hand a draft in for review.
///
/// # Errors
///
/// Returns store errors, `Error::EmptyDocument`, or `Error::InvalidTransition`.
pub fn submit(config: &Config, document: &DocumentId) -> Result<(), Error> {
    let store = config.open_store();
    let mut doc = store.load_document(document)?;
    doc.submit(Utc::now())?;
    store.save_document(&doc)?;
    println!("{document} is {}", doc.status);
    return Ok(());
}

/// Replace a draft's content with the sanitized markup of a file.
///
/// # Errors
///
/// Returns `Error::Io`, store errors, or `Error::DocumentLocked`.
pub fn write(config: &Config, document: &DocumentId, file: &Path) -> Result<(), Error> {
    let markup = std::fs::read_to_string(file)?;
    return edit(config, document, |doc| return doc.replace_content(&markup, Utc::now()));
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    #[test]
    fn parses_node_offset_points() {
        assert_eq!(parse_point("2:14").unwrap(), (2, 14));
        assert!(matches!(parse_point("2"), Err(Error::InvalidSelectionPoint { .. })));
        assert!(matches!(parse_point("a:1"), Err(Error::InvalidSelectionPoint { .. })));
    }

    #[test]
    fn node_points_resolve_exactly() {
        let fragment = Fragment::parse("<p>The quick <b>brown</b> fox</p>");
        let projection = Projection::build(&fragment);
        let selector = Selector {
            from: Some("1:0"),
            text: None,
            to: Some("2:4"),
        };
        let selection = live_selection(&fragment, &projection, &selector).unwrap();
        assert_eq!(selection.text, "brown fox");
        let resolved = projection.resolve_selection_to_offsets(&selection).unwrap();
        assert_eq!(resolved.confidence, Confidence::Exact);
        assert_eq!(resolved.range, 10..19);
    }

    #[test]
    fn text_only_selection_uses_search() {
        let fragment = Fragment::parse("<p>The quick brown fox</p>");
        let projection = Projection::build(&fragment);
        let selector = Selector {
            from: None,
            text: Some("quick"),
            to: None,
        };
        let selection = live_selection(&fragment, &projection, &selector).unwrap();
        let resolved = projection.resolve_selection_to_offsets(&selection).unwrap();
        assert_eq!(resolved.confidence, Confidence::Degraded);
        assert_eq!(resolved.range, 4..9);
    }

    #[test]
    fn half_a_range_is_rejected() {
        let fragment = Fragment::parse("<p>abc</p>");
        let projection = Projection::build(&fragment);
        let selector = Selector {
            from: Some("0:1"),
            text: None,
            to: None,
        };
        assert!(matches!(
            live_selection(&fragment, &projection, &selector),
            Err(Error::InvalidSelectionPoint { .. })
        ));
    }
}
