use std::fmt::Write as _;

use crate::config::KNOWN_KEYS;
use crate::error::Error;
use crate::types::DocumentId;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened, why, and how to fix it.
/// Readable by humans and by agents driving the CLI.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::DocumentLocked { id, status } => render_document_locked(id, &status.to_string()),
        Error::DocumentNotFound { id } => render_document_not_found(id),
        Error::DocumentNotSubmitted { id, status } => render_document_not_submitted(id, &status.to_string()),
        Error::InvalidRange { end, len, start } => render_invalid_range(*start, *end, *len),
        Error::MissingReviewer => render_missing_reviewer(),
        Error::SelectionAmbiguous { count, text } => render_selection_ambiguous(text, *count),
        Error::SelectionDegraded { text } => render_selection_degraded(text),
        Error::SelectionNotFound { text } => render_selection_not_found(text),
        Error::SelfReview { id, reviewer } => render_self_review(id, reviewer),
        Error::UnknownConfigKey { key } => render_unknown_config_key(key),
        _ => render_generic(e),
    };
}

fn render_generic(e: &Error) -> String {
    return match e {
        Error::AnnotationNotFound { document, id } => format!("\
# Error: Annotation Not Found

`{document}` has no annotation `{id}`.

## Fix

List the annotation ids with:

    marginalia check {document}
"),

        Error::DuplicateDocument { id } => format!("\
# Error: Document Exists

A document named `{id}` is already stored.

## Fix

Pick another id, or remove the old one first:

    marginalia destroy {id}
"),

        Error::InvalidDocumentId { id } => format!("\
# Error: Invalid Document Id

`{id}` cannot be used as a document id. Ids name directories, so they are
limited to 1-128 ASCII letters, digits, `-` and `_`.
"),

        Error::InvalidSelectionPoint { input } => format!("\
# Error: Invalid Selection Point

`{input}` is not a `NODE:OFFSET` pair.

## Fix

Number the text nodes with:

    marginalia show <doc> --nodes

and pass e.g. `--from 1:0 --to 2:4`.
"),

        Error::RecordCorrupt { path, reason } => format!("\
# Error: Record Corrupt

Could not parse `{}`: {reason}

## Fix

Repair or delete the file; every other record is unaffected.
", path.display()),

        Error::Io(e) => format!("\
# Error: I/O

{e}
"),
        Error::TomlDe(e) => format!("\
# Error: Invalid TOML

{e}
"),
        _ => format!("\
# Error

{e}
"),
    };
}

fn render_document_locked(id: &DocumentId, status: &str) -> String {
    return format!("\
# Error: Document Locked

`{id}` is {status}. Authors can only edit drafts; the text reviewers annotate
must not move under them.
");
}

fn render_document_not_found(id: &DocumentId) -> String {
    return format!("\
# Error: Document Not Found

No document named `{id}` is stored.

## Fix

See what exists:

    marginalia list

or create it:

    marginalia create {id} --author <name>
");
}

fn render_document_not_submitted(id: &DocumentId, status: &str) -> String {
    return format!("\
# Error: Document Not Submitted

`{id}` is still a {status}. Annotations anchor to offsets, so the author must
hand the text in first.

## Fix

    marginalia submit {id}
");
}

fn render_invalid_range(start: usize, end: usize, len: usize) -> String {
    return format!("\
# Error: Invalid Range

`{start}..{end}` is not a non-empty range inside a document of {len} characters.
Offsets count characters of the plain text, end exclusive.

## Fix

Inspect the plain text with:

    marginalia show <doc> --plain
");
}

fn render_missing_reviewer() -> String {
    return "\
# Error: No Reviewer

Annotations record who wrote them and no reviewer was given.

## Fix

Pass `--reviewer <name>`, or set a default:

    marginalia config set reviewer <name>
"
    .to_string();
}

fn render_selection_ambiguous(text: &str, count: usize) -> String {
    return format!("\
# Error: Ambiguous Selection

`{text}` occurs {count} times, so its position cannot be recovered from the
text alone.

## Fix

Select by node position instead. Number the text nodes with:

    marginalia show <doc> --nodes

then annotate with `--from NODE:OFFSET --to NODE:OFFSET`.
");
}

fn render_selection_degraded(text: &str) -> String {
    return format!("\
# Error: Approximate Selection Rejected

`{text}` could only be located by searching the text, and
`capture.accept_degraded` is `false`.

## Fix

Select by node position with `--from`/`--to`, or allow text-search captures:

    marginalia config set capture.accept_degraded true
");
}

fn render_selection_not_found(text: &str) -> String {
    return format!("\
# Error: Selection Not Found

`{text}` does not occur in the document's plain text.

## Fix

Compare against:

    marginalia show <doc> --plain
");
}

fn render_self_review(id: &DocumentId, reviewer: &str) -> String {
    return format!("\
# Error: Self Review

`{reviewer}` wrote `{id}` and cannot annotate it.
");
}

fn render_unknown_config_key(key: &str) -> String {
    let mut out = format!("\
# Error: Unknown Config Key

`{key}` is not a marginalia setting.
");
    if let Some(suggestion) = find_closest_key(key) {
        let _ = write!(out, "\n## Did you mean `{suggestion}`?\n");
    }
    out.push_str("\n## Known keys\n\n");
    for known in KNOWN_KEYS {
        let _ = writeln!(out, "- `{known}`");
    }
    return out;
}

/// A known key whose last dotted segment matches the last segment of `key`.
fn find_closest_key(key: &str) -> Option<&'static str> {
    let leaf = |k: &str| return k.rsplit('.').next().unwrap_or(k).to_ascii_lowercase();
    let wanted = leaf(key);
    return KNOWN_KEYS.iter().copied().find(|k| return leaf(*k) == wanted);
}
