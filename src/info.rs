use std::path::PathBuf;

use serde::Serialize;

use crate::config::{CONFIG_FILE, Config, KNOWN_KEYS};

/// Output the comprehensive marginalia reference document.
pub fn run(config: &Config, json: bool) {
    let root = PathBuf::from(".");
    let state = gather_state(&root, config);

    if json {
        print_json(&state);
    } else {
        print_markdown(&state);
    }
}

// ── State gathering ───────────────────────────────────────────────────

/// What the working directory currently holds.
struct CurrentState {
    /// Whether `.marginalia.toml` exists.
    config_found: bool,
    /// Stored documents, `None` if the store cannot be read.
    documents: Option<usize>,
    /// Default reviewer, if configured.
    reviewer: Option<String>,
    /// Store root.
    store: String,
}

/// Inspect config and store without failing.
fn gather_state(root: &std::path::Path, config: &Config) -> CurrentState {
    let config_found = root.join(CONFIG_FILE).exists();
    let documents = config.open_store().list_documents().ok().map(|d| return d.len());

    return CurrentState {
        config_found,
        documents,
        reviewer: config.reviewer().map(str::to_string),
        store: config.store_path().display().to_string(),
    };
}

// ── Markdown output ───────────────────────────────────────────────────

/// Header, usage, and state as markdown.
fn print_markdown(state: &CurrentState) {
    let version = env!("CARGO_PKG_VERSION");
    print_markdown_header(version);
    print_markdown_state(state);
    println!();
    print_markdown_exit_codes();
}

/// Static part of the reference.
fn print_markdown_header(version: &str) {
    print!(
        "\
# marginalia {version}

Inline essay annotations anchored to plain-text character offsets, replayed
as highlights over the rendered markup.

## Offsets

Offsets count characters (not bytes) of the document's plain text: the text
of every text node concatenated in document order, markup removed. Ranges are
`start..end`, end exclusive.

## Workflow

    marginalia create <doc> --author <name>        Start a draft
    marginalia write <doc> --file essay.html       Replace the draft's markup
    marginalia submit <doc>                        Lock the text for review
    marginalia show <doc> --nodes                  Number the text nodes
    marginalia annotate <doc> --comment <c> --from 1:0 --to 2:4
    marginalia annotate <doc> --comment <c> --text \"brown fox\"
    marginalia render <doc> --out review.html      Highlight every annotation
    marginalia check <doc>                         Staleness report (exit 0/1/2)
    marginalia review <doc>                        Finish the review

## Check Results

| Result    | Meaning |
|-----------|---------|
| FRESH     | Stored offsets still cover the stored text |
| DRIFTED   | Offsets still match, but the text changed elsewhere |
| RELOCATED | Only found by searching for the stored text |
| BROKEN    | Cannot be placed |

## Configuration ({CONFIG_FILE})

    store = \".marginalia\"                 # store directory
    reviewer = \"Grace\"                    # default --reviewer
    log = \"warn\"                          # tracing filter; RUST_LOG wins

    [render]
    class = \"annotation-highlight\"        # class on <mark> wrappers

    [capture]
    accept_degraded = true                # allow text-search selections

## Current State

"
    );
}

/// Dynamic part of the reference.
fn print_markdown_state(state: &CurrentState) {
    if state.config_found {
        println!("Config:    {CONFIG_FILE} (found)");
    } else {
        println!("Config:    {CONFIG_FILE} (not found, using defaults)");
    }

    match state.documents {
        Some(n) => println!("Store:     {} ({n} documents)", state.store),
        None => println!("Store:     {} (unreadable)", state.store),
    }

    match &state.reviewer {
        Some(name) => println!("Reviewer:  {name}"),
        None => println!("Reviewer:  (none)"),
    }
}

/// Exit code table.
fn print_markdown_exit_codes() {
    print!(
        "\
## Exit Codes

| Code | Meaning |
|------|---------|
| 0    | Success / all annotations fresh or drifted |
| 1    | Relocated annotations found |
| 2    | Broken annotations found |
| 3    | Runtime error |
"
    );
}

// ── JSON output ───────────────────────────────────────────────────────

/// Top-level JSON document.
#[derive(Serialize)]
struct InfoJson {
    /// Keys accepted by `config set`.
    config_keys: Vec<String>,
    /// Current working-directory state.
    current_state: StateJson,
    /// Exit code table.
    exit_codes: Vec<ExitCodeInfo>,
    /// Crate version.
    version: String,
}

/// One exit code.
#[derive(Serialize)]
struct ExitCodeInfo {
    /// Process exit code.
    code: u8,
    /// What it signals.
    meaning: String,
}

/// Current state as JSON.
#[derive(Serialize)]
struct StateJson {
    /// Whether `.marginalia.toml` exists.
    config_found: bool,
    /// Stored documents, null if unreadable.
    documents: Option<usize>,
    /// Default reviewer.
    reviewer: Option<String>,
    /// Store root.
    store: String,
}

/// Print the reference as JSON.
fn print_json(state: &CurrentState) {
    let info = InfoJson {
        config_keys: KNOWN_KEYS.iter().map(|k| return (*k).to_string()).collect(),
        current_state: StateJson {
            config_found: state.config_found,
            documents: state.documents,
            reviewer: state.reviewer.clone(),
            store: state.store.clone(),
        },
        exit_codes: vec![
            ExitCodeInfo { code: 0, meaning: "Success / all annotations fresh or drifted".to_string() },
            ExitCodeInfo { code: 1, meaning: "Relocated annotations found".to_string() },
            ExitCodeInfo { code: 2, meaning: "Broken annotations found".to_string() },
            ExitCodeInfo { code: 3, meaning: "Runtime error".to_string() },
        ],
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    // serde_json::to_string_pretty won't fail on this structure.
    let json = serde_json::to_string_pretty(&info).unwrap_or_default();
    println!("{json}");
}
