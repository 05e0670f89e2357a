use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::JoinHandle,
    time::Duration,
};

use ferry_config::{
    validation::{check_string_parameter, validate_int_parameter},
    ParameterGroup as _, ValidationResult, ValidationStatus,
};
use ferry_core::{
    decoding::NotificationDecoder,
    reception::{ArtifactReception, Dispatcher, ReceptionContext},
};
use ferry_error::{generic_error, ErrorContext as _, GenericError};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::decoders::JsonNotificationDecoder;

const fn default_poll_interval_ms() -> i64 {
    1000
}

#[derive(Deserialize)]
#[serde(default)]
struct FileDropConfiguration {
    watch_directory: String,
    poll_interval_ms: i64,
    artifact_types: Vec<String>,
}

impl Default for FileDropConfiguration {
    fn default() -> Self {
        Self {
            watch_directory: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            artifact_types: Vec::new(),
        }
    }
}

impl FileDropConfiguration {
    fn validate(&self, name: &str) -> ValidationResult {
        let mut result = ValidationResult::new(name);
        check_string_parameter(&mut result, "watch_directory", self.watch_directory.as_str());
        if !self.watch_directory.trim().is_empty() && !Path::new(&self.watch_directory).is_dir() {
            result.set_result(
                "watch_directory",
                ValidationStatus::Invalid,
                format!("'{}' is not a directory", self.watch_directory),
            );
        }
        if !validate_int_parameter(self.poll_interval_ms) {
            result.set_result("poll_interval_ms", ValidationStatus::Invalid, "must be a positive integer");
        }
        result
    }
}

struct Watcher {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// File-drop reception.
///
/// Polls a directory for notification documents. Every `*.json` file found is decoded and dispatched, in file name
/// order, and then renamed with a `.done` suffix, or a `.failed` suffix if it could not be decoded.
///
/// A `*.json` file is read as soon as it is seen, so writers must not create it in place: write the document under
/// another name, such as `*.json.tmp`, and rename it once complete. Hidden files are ignored.
#[derive(Default)]
pub struct FileDropReception {
    watcher: Option<Watcher>,
}

impl ArtifactReception for FileDropReception {
    fn initialize_reception(&mut self, context: ReceptionContext) -> Result<(), GenericError> {
        let configuration = context
            .configuration()
            .typed_parameters::<FileDropConfiguration>()
            .with_error_context(|| {
                format!(
                    "Invalid file_drop configuration for reception handler '{}'.",
                    context.handler_name()
                )
            })?;

        let validation = configuration.validate(context.configuration().name());
        if !validation.is_valid() {
            return Err(generic_error!("Invalid file_drop configuration:\n{}", validation));
        }

        let mut scanner = DirectoryScanner::new(&configuration.watch_directory);
        let poll_interval = Duration::from_millis(configuration.poll_interval_ms.unsigned_abs());
        let decoder = JsonNotificationDecoder::new().with_artifact_types(configuration.artifact_types);
        let dispatcher = context.dispatcher().clone();

        let (stop, stop_rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name(format!("ferry-file-drop-{}", context.handler_name()))
            .spawn(move || {
                info!(
                    reception_handler = dispatcher.handler_name(),
                    watch_directory = %scanner.directory.display(),
                    "File drop reception started."
                );
                loop {
                    scanner.scan(&decoder, &dispatcher);
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!(reception_handler = dispatcher.handler_name(), "File drop reception stopped.");
            })
            .error_context("Failed to spawn file drop watcher thread.")?;

        self.watcher = Some(Watcher { stop, handle });
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.stop.send(());
            if watcher.handle.join().is_err() {
                warn!("File drop watcher thread panicked.");
            }
        }
    }
}

/// Outcome of scanning the watch directory once.
#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct ScanSummary {
    pub dispatched: usize,
    pub failed: usize,
}

/// Scans the watch directory for notification files.
pub(crate) struct DirectoryScanner {
    directory: PathBuf,

    // Files already dispatched that could not be renamed.
    unrenamed: HashSet<PathBuf>,
}

impl DirectoryScanner {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            unrenamed: HashSet::new(),
        }
    }

    /// Processes every pending notification file once.
    pub fn scan(&mut self, decoder: &dyn NotificationDecoder, dispatcher: &Dispatcher) -> ScanSummary {
        let mut summary = ScanSummary::default();

        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(watch_directory = %self.directory.display(), error = %e, "Failed to read watch directory.");
                return summary;
            }
        };

        let mut pending = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_notification_file(path))
            .collect::<Vec<_>>();
        pending.sort();

        // Forget files that have since been moved away.
        self.unrenamed.retain(|path| pending.contains(path));

        for path in pending {
            if self.unrenamed.contains(&path) {
                continue;
            }

            let raw = match std::fs::read(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to read notification file.");
                    continue;
                }
            };

            let suffix = match dispatcher.receive(decoder, &raw) {
                Ok(report) => {
                    debug!(
                        file = %path.display(),
                        delivered = report.delivered.len(),
                        failed = report.failed.len(),
                        "Dispatched notification file."
                    );
                    summary.dispatched += 1;
                    "json.done"
                }
                Err(_) => {
                    summary.failed += 1;
                    "json.failed"
                }
            };

            if let Err(e) = std::fs::rename(&path, path.with_extension(suffix)) {
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Failed to rename processed notification file. It will not be processed again."
                );
                self.unrenamed.insert(path);
            }
        }

        summary
    }
}

fn is_notification_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    !hidden && path.is_file() && path.extension().is_some_and(|ext| ext == "json")
}
