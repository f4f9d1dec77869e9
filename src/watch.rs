//! Change subscription on a document's store directory, and the `watch`
//! command that re-renders on every change.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};

use crate::commands;
use crate::config::Config;
use crate::diagnostics;
use crate::error::Error;
use crate::types::DocumentId;

/// Quiet period that ends a burst of filesystem events.
const DEBOUNCE_MS: u64 = 100;

/// A live subscription to changes under one directory. Dropping it stops the
/// watcher.
pub struct Subscription {
    /// One message per relevant filesystem event.
    events: crossbeam_channel::Receiver<()>,
    /// Watched directory.
    path: PathBuf,
    /// Underlying watcher, kept alive for the subscription's lifetime.
    watcher: notify::RecommendedWatcher,
}

impl Subscription {
    /// Block until a change arrives, then swallow the rest of its burst.
    /// Returns `false` if `timeout` elapses first or the watcher stopped.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let received = match timeout {
            Some(limit) => self.events.recv_timeout(limit).is_ok(),
            None => self.events.recv().is_ok(),
        };
        if !received {
            return false;
        }
        let debounce = Duration::from_millis(DEBOUNCE_MS);
        while self.events.recv_timeout(debounce).is_ok() {}
        return true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Err(e) = self.watcher.unwatch(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "unwatch failed");
        }
    }
}

/// Create a filesystem watcher that sends events on the given channel.
///
/// # Errors
///
/// Returns `Error::WatchFailed` if the watcher cannot be created.
fn create_watcher(tx: crossbeam_channel::Sender<()>) -> Result<notify::RecommendedWatcher, Error> {
    return notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        if let Ok(event) = res
            && matches!(
                event.kind,
                notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
            )
        {
            let _ = tx.send(());
        }
    })
    .map_err(|e| {
        return Error::WatchFailed {
            reason: format!("watcher setup failed: {e}"),
        };
    });
}

/// Entry point for the watch command.
///
/// Renders once, then re-renders after every change to the document's records
/// until the process is interrupted.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` for an unknown document, or
/// `Error::WatchFailed` if the watcher cannot be started.
pub fn run(config: &Config, document: &DocumentId, out: Option<&Path>) -> Result<ExitCode, Error> {
    let store = config.open_store();
    store.load_document(document)?;

    eprintln!("watch: initial render");
    let mut last_code = render_once(config, document, out);

    let subscription = subscribe(&store.document_dir(document))?;
    eprintln!("watch: monitoring `{document}`, press Ctrl+C to stop");

    while subscription.wait(None) {
        eprintln!("watch: change detected, re-rendering...");
        last_code = render_once(config, document, out);
    }

    return Ok(last_code);
}

/// Render once, printing any error as a diagnostic.
fn render_once(config: &Config, document: &DocumentId, out: Option<&Path>) -> ExitCode {
    return match commands::render(config, document, out) {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(3_u8)
        },
    };
}

/// Watch a directory tree for record changes.
///
/// # Errors
///
/// Returns `Error::WatchFailed` if the directory cannot be watched.
pub fn subscribe(path: &Path) -> Result<Subscription, Error> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = create_watcher(tx)?;
    watcher.watch(path, RecursiveMode::Recursive).map_err(|e| {
        return Error::WatchFailed {
            reason: format!("cannot watch {}: {e}", path.display()),
        };
    })?;
    tracing::debug!(path = %path.display(), "subscribed to changes");
    return Ok(Subscription {
        events: rx,
        path: path.to_path_buf(),
        watcher,
    });
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    #[test]
    fn quiet_directory_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let subscription = subscribe(dir.path()).unwrap();
        assert!(!subscription.wait(Some(Duration::from_millis(200))));
    }

    #[test]
    fn new_record_wakes_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let subscription = subscribe(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        assert!(subscription.wait(Some(Duration::from_secs(5))));
    }

    #[test]
    fn dropped_subscription_stops_delivering() {
        let dir = tempfile::tempdir().unwrap();
        let subscription = subscribe(dir.path()).unwrap();
        let events = subscription.events.clone();
        drop(subscription);

        std::fs::write(dir.path().join("late.json"), "{}").unwrap();
        assert!(events.recv_timeout(Duration::from_millis(500)).is_err());
    }

    #[test]
    fn missing_directory_cannot_be_watched() {
        let dir = tempfile::tempdir().unwrap();
        let result = subscribe(&dir.path().join("absent"));
        assert!(matches!(result, Err(Error::WatchFailed { .. })));
    }
}
