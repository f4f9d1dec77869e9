//! Project configuration: loading `.marginalia.toml` and editing it in place.

use std::path::{Path, PathBuf};

use crate::capture::CapturePolicy;
use crate::error::Error;
use crate::highlight::{DEFAULT_CLASS, HighlightStyle};
use crate::store::FsStore;

/// Config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".marginalia.toml";

/// Log filter used when neither `RUST_LOG` nor the config sets one.
const DEFAULT_LOG: &str = "warn";

/// Store directory used when the config does not set one.
const DEFAULT_STORE: &str = ".marginalia";

/// Keys `config set` accepts, in dotted form.
pub const KNOWN_KEYS: &[&str] = &["capture.accept_degraded", "log", "render.class", "reviewer", "store"];

/// Project configuration loaded from `.marginalia.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether text-search selections may be captured.
    accept_degraded: bool,
    /// Class on highlight wrappers.
    highlight_class: String,
    /// Tracing filter directive.
    log: String,
    /// Default reviewer identity for `annotate`.
    reviewer: Option<String>,
    /// Store root, already joined onto the project root.
    store: PathBuf,
}

/// Raw TOML structure for `.marginalia.toml`.
#[derive(serde::Deserialize)]
struct MarginaliaTomlConfig {
    /// `[capture]` table.
    #[serde(default)]
    capture: CaptureTable,
    /// Tracing filter directive.
    log: Option<String>,
    /// `[render]` table.
    #[serde(default)]
    render: RenderTable,
    /// Default reviewer name.
    reviewer: Option<String>,
    /// Store directory, relative to the project root unless absolute.
    store: Option<PathBuf>,
}

/// Raw `[capture]` table.
#[derive(serde::Deserialize, Default)]
struct CaptureTable {
    /// Accept text-search selections.
    accept_degraded: Option<bool>,
}

/// Raw `[render]` table.
#[derive(serde::Deserialize, Default)]
struct RenderTable {
    /// Highlight wrapper class.
    class: Option<String>,
}

impl Config {
    /// Capture policy from `[capture]`.
    pub const fn capture_policy(&self) -> CapturePolicy {
        return CapturePolicy {
            accept_degraded: self.accept_degraded,
        };
    }

    /// Defaults for a project with no config file.
    fn defaults(root: &Path) -> Self {
        return Self {
            accept_degraded: CapturePolicy::default().accept_degraded,
            highlight_class: DEFAULT_CLASS.to_string(),
            log: DEFAULT_LOG.to_string(),
            reviewer: None,
            store: root.join(DEFAULT_STORE),
        };
    }

    /// Highlight style from `[render]`.
    pub fn highlight_style(&self) -> HighlightStyle {
        return HighlightStyle {
            class: self.highlight_class.clone(),
        };
    }

    /// Load config from `.marginalia.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. Returns an error if the file
    /// exists but is malformed; a config the user wrote is never silently
    /// replaced by defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::defaults(root)),
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };

        let raw: MarginaliaTomlConfig = toml::from_str(&content)?;
        let defaults = Self::defaults(root);
        return Ok(Self {
            accept_degraded: raw.capture.accept_degraded.unwrap_or(defaults.accept_degraded),
            highlight_class: raw.render.class.unwrap_or(defaults.highlight_class),
            log: raw.log.unwrap_or(defaults.log),
            reviewer: raw.reviewer.filter(|r| return !r.trim().is_empty()),
            store: raw.store.map_or(defaults.store, |s| return root.join(s)),
        });
    }

    /// Tracing filter directive.
    pub fn log_filter(&self) -> &str {
        return &self.log;
    }

    /// The configured file store.
    pub fn open_store(&self) -> FsStore {
        return FsStore::new(self.store.clone());
    }

    /// Default reviewer, if configured.
    pub fn reviewer(&self) -> Option<&str> {
        return self.reviewer.as_deref();
    }

    /// Store root.
    pub fn store_path(&self) -> &Path {
        return &self.store;
    }
}

/// Parse `.marginalia.toml` into a format-preserving document.
/// Returns an empty document if the file doesn't exist.
///
/// # Errors
///
/// Returns `Error::Io` on read failure or `Error::ConfigEdit` on parse failure.
fn read_config_doc(root: &Path) -> Result<(PathBuf, toml_edit::DocumentMut), Error> {
    let config_path = root.join(CONFIG_FILE);
    let content = match std::fs::read_to_string(&config_path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::Io(e)),
        Ok(c) => c,
    };

    let doc: toml_edit::DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| {
        return Error::ConfigEdit {
            path: config_path.clone(),
            reason: e.to_string(),
        };
    })?;

    return Ok((config_path, doc));
}

/// Insert `key = item` into a sub-table, creating the table if missing.
///
/// # Errors
///
/// Returns `Error::ConfigEdit` if the name is already used by a non-table value.
fn set_in_table(
    doc: &mut toml_edit::DocumentMut,
    path: &Path,
    table: &str,
    key: &str,
    item: toml_edit::Item,
) -> Result<(), Error> {
    let entry = doc.entry(table).or_insert(toml_edit::table());
    let Some(table_like) = entry.as_table_like_mut() else {
        return Err(Error::ConfigEdit {
            path: path.to_path_buf(),
            reason: format!("`{table}` is not a table"),
        });
    };
    table_like.insert(key, item);
    return Ok(());
}

/// Set one dotted key in `.marginalia.toml`, keeping comments and layout.
/// Creates the file if it doesn't exist. Returns the file path.
///
/// # Errors
///
/// Returns `Error::UnknownConfigKey` for keys outside `KNOWN_KEYS`,
/// `Error::ConfigEdit` for unparseable files or values, or `Error::Io`.
pub fn set_value(root: &Path, key: &str, value: &str) -> Result<PathBuf, Error> {
    let (config_path, mut doc) = read_config_doc(root)?;

    match key {
        "capture.accept_degraded" => {
            let flag: bool = value.parse().map_err(|_err| {
                return Error::ConfigEdit {
                    path: config_path.clone(),
                    reason: format!("`{key}` takes `true` or `false`, got `{value}`"),
                };
            })?;
            set_in_table(&mut doc, &config_path, "capture", "accept_degraded", toml_edit::value(flag))?;
        },
        "log" | "reviewer" | "store" => {
            doc.insert(key, toml_edit::value(value));
        },
        "render.class" => {
            set_in_table(&mut doc, &config_path, "render", "class", toml_edit::value(value))?;
        },
        _ => return Err(Error::UnknownConfigKey { key: key.to_string() }),
    }

    std::fs::write(&config_path, doc.to_string())?;
    tracing::info!(key, value, path = %config_path.display(), "config updated");
    return Ok(config_path);
}
