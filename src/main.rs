mod annotation;
mod capture;
mod commands;
mod config;
mod diagnostics;
mod document;
mod error;
mod freshness;
mod hasher;
mod highlight;
mod info;
mod markup;
mod projection;
mod store;
mod types;
mod watch;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{Selector, ShowMode};
use crate::config::Config;
use crate::document::Format;
use crate::error::Error;
use crate::types::DocumentId;

/// Command-line interface.
#[derive(Parser)]
#[command(name = "marginalia", version, about = "Inline essay annotations anchored to plain-text offsets")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Every subcommand.
#[derive(Subcommand)]
enum Commands {
    /// Capture a selection and store it as an annotation
    Annotate {
        /// The reviewer's comment
        #[arg(long)]
        comment: String,
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Resolve and print the selection without storing anything
        #[arg(long)]
        dry_run: bool,
        /// Selection start as NODE:OFFSET (see `show --nodes`)
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Reviewer name (default: `reviewer` from config)
        #[arg(long)]
        reviewer: Option<String>,
        /// Selected text; alone it is located by searching the document
        #[arg(long, required_unless_present = "from")]
        text: Option<String>,
        /// Selection end as NODE:OFFSET
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
    /// Append text to the last paragraph of a draft
    Append {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Text to append
        text: String,
    },
    /// Report annotation staleness (exit 0 fresh, 1 relocated, 2 broken)
    Check {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
    },
    /// Add a general comment
    Comment {
        /// Commenter (default: `reviewer` from config)
        #[arg(long)]
        author: Option<String>,
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Comment text
        text: String,
    },
    /// List general comments, newest first
    Comments {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
    },
    /// Edit .marginalia.toml
    Config {
        /// Config action.
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Create an empty draft
    Create {
        /// Essay author
        #[arg(long)]
        author: String,
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Display title
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Delete a plain-text range from a draft
    Delete {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Exclusive end offset
        #[arg(long)]
        end: usize,
        /// Start offset
        #[arg(long)]
        start: usize,
    },
    /// Delete a document with its annotations and comments
    Destroy {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
    },
    /// Apply bold, italic, or underline to a plain-text range of a draft
    Format {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Exclusive end offset
        #[arg(long)]
        end: usize,
        /// Start offset
        #[arg(long)]
        start: usize,
        /// Formatting to apply
        #[arg(long, value_enum)]
        style: Format,
    },
    /// Replace annotations from a legacy JSON list export
    Import {
        /// Author for entries that carry none (default: `reviewer` from config)
        #[arg(long)]
        author: Option<String>,
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// JSON file with `[{start, end, text, comment, author?}]`
        file: PathBuf,
    },
    /// Print the reference document and current state
    Info {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List documents with status and annotation counts
    List,
    /// Delete an annotation
    Remove {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Annotation id
        id: String,
    },
    /// Render highlighted markup
    Render {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Mark a submitted document as reviewed
    Review {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
    },
    /// Print a document
    Show {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Numbered text nodes with their offsets
        #[arg(long, conflicts_with = "plain")]
        nodes: bool,
        /// Plain text only
        #[arg(long)]
        plain: bool,
    },
    /// Hand a draft in for review
    Submit {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
    },
    /// Re-render whenever the document's records change
    Watch {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace a draft's content with the markup in a file
    Write {
        /// Document id
        #[arg(value_parser = parse_document_id)]
        document: DocumentId,
        /// Markup file
        #[arg(long)]
        file: PathBuf,
    },
}

/// `config` subcommands.
#[derive(Subcommand)]
enum ConfigAction {
    /// Set a key, e.g. `render.class hl`
    Set {
        /// Dotted key
        key: String,
        /// New value
        value: String,
    },
}

/// Dispatch a parsed command.
fn dispatch(command: Commands, config: &Config) -> Result<ExitCode, Error> {
    match command {
        Commands::Annotate {
            comment,
            document,
            dry_run,
            from,
            reviewer,
            text,
            to,
        } => {
            let selector = Selector {
                from: from.as_deref(),
                text: text.as_deref(),
                to: to.as_deref(),
            };
            commands::annotate(config, &document, &comment, &selector, reviewer.as_deref(), dry_run)?;
        },
        Commands::Append { document, text } => commands::append(config, &document, &text)?,
        Commands::Check { document } => return commands::check(config, &document),
        Commands::Comment { author, document, text } => {
            commands::comment(config, &document, &text, author.as_deref())?;
        },
        Commands::Comments { document } => commands::comments(config, &document)?,
        Commands::Config {
            action: ConfigAction::Set { key, value },
        } => commands::config_set(&key, &value)?,
        Commands::Create { author, document, title } => commands::create(config, &document, &author, &title)?,
        Commands::Delete { document, end, start } => commands::delete(config, &document, start, end)?,
        Commands::Destroy { document } => commands::destroy(config, &document)?,
        Commands::Format { document, end, start, style } => {
            commands::format(config, &document, start, end, style)?;
        },
        Commands::Import { author, document, file } => {
            commands::import(config, &document, &file, author.as_deref())?;
        },
        Commands::Info { json } => commands::info(config, json),
        Commands::List => commands::list(config)?,
        Commands::Remove { document, id } => commands::remove(config, &document, &id)?,
        Commands::Render { document, out } => return commands::render(config, &document, out.as_deref()),
        Commands::Review { document } => commands::review(config, &document)?,
        Commands::Show { document, nodes, plain } => {
            let mode = if nodes {
                ShowMode::Nodes
            } else if plain {
                ShowMode::Plain
            } else {
                ShowMode::Markup
            };
            commands::show(config, &document, mode)?;
        },
        Commands::Submit { document } => commands::submit(config, &document)?,
        Commands::Watch { document, out } => return watch::run(config, &document, out.as_deref()),
        Commands::Write { document, file } => commands::write(config, &document, &file)?,
    }
    return Ok(ExitCode::SUCCESS);
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the configured filter.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_err| return EnvFilter::new(config.log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&PathBuf::from(".")) {
        Ok(config) => config,
        Err(e) => {
            diagnostics::print_error(&e);
            return ExitCode::from(3);
        },
    };
    init_tracing(&config);

    return match dispatch(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            diagnostics::print_error(&e);
            ExitCode::from(3)
        },
    };
}

/// Validate a document id argument.
fn parse_document_id(raw: &str) -> Result<DocumentId, String> {
    return DocumentId::parse(raw).map_err(|e| return e.to_string());
}
