#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for transaction progress in pkgd
//!
//! Every observable step of a transaction is a [`ProgressEvent`]. The
//! transaction layer appends events to the operation registry, which fans
//! them out to attached observers; engines report intra-phase progress
//! through the [`ProgressReporter`] trait without knowing who listens.

pub mod event;
pub mod meta;

pub use event::{EventKind, Outcome, ProgressEvent};
pub use meta::EventLevel;

use pkgd_types::{PackageId, Progress};
use tracing::{debug, error, info, trace, warn};

/// Sink for progress reported from inside a phase
///
/// Implementations stamp the operation id and current phase; callers only
/// describe what happened.
pub trait ProgressReporter: Send + Sync {
    /// Report one progress step
    fn report(&self, kind: EventKind, progress: Progress, detail: String);

    /// A download batch started
    fn download_started(&self, files: usize, bytes: u64) {
        self.report(
            EventKind::DownloadStarted { files, bytes },
            Progress::percent(0.0),
            format!("downloading {files} packages ({bytes} bytes)"),
        );
    }

    /// Progress of one payload within the batch
    fn download_progress(
        &self,
        package: &PackageId,
        fraction: f32,
        total_fraction: f32,
        total_files: usize,
    ) {
        self.report(
            EventKind::DownloadProgress {
                package: package.clone(),
                fraction,
                total_fraction,
                total_files,
            },
            Progress::percent(total_fraction * 100.0),
            format!("downloading {}", package.name),
        );
    }

    /// One payload finished, successfully or not
    fn download_finished(&self, package: &PackageId, error: Option<String>) {
        let detail = match &error {
            Some(message) => format!("download of {} failed: {message}", package.name),
            None => format!("downloaded {}", package.name),
        };
        self.report(
            EventKind::DownloadFinished {
                package: package.clone(),
                ok: error.is_none(),
                message: error,
            },
            Progress::None,
            detail,
        );
    }

    /// Per-package progress while a transaction set is applied
    fn package_progress(
        &self,
        package: &PackageId,
        action: &str,
        element: (u64, u64),
        set: (u64, u64),
    ) {
        self.report(
            EventKind::PackageProgress {
                package: package.clone(),
                action: action.to_string(),
                element_current: element.0,
                element_total: element.1,
                set_current: set.0,
                set_total: set.1,
            },
            Progress::step(set.0, set.1),
            format!("{action} {}", package.name),
        );
    }
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _kind: EventKind, _progress: Progress, _detail: String) {}
}

/// Level an event is mirrored to the log at
#[must_use]
pub fn event_level(event: &ProgressEvent) -> EventLevel {
    match &event.kind {
        EventKind::Terminal {
            outcome: Outcome::Failed { .. },
        } => EventLevel::Error,
        EventKind::DownloadFinished { ok: false, .. } => EventLevel::Warn,
        EventKind::DownloadProgress { .. } | EventKind::PackageProgress { .. } => {
            EventLevel::Debug
        }
        EventKind::LockBusy { .. } => EventLevel::Trace,
        _ => EventLevel::Info,
    }
}

/// Mirror a progress event into the tracing subscriber
pub fn log_event(event: &ProgressEvent) {
    macro_rules! emit {
        ($macro:ident) => {
            $macro!(
                target: "pkgd::events",
                operation = %event.operation,
                seq = event.sequence,
                phase = %event.phase,
                kind = event.kind.name(),
                "{}",
                event.detail
            )
        };
    }

    match event_level(event) {
        EventLevel::Trace => emit!(trace),
        EventLevel::Debug => emit!(debug),
        EventLevel::Info => emit!(info),
        EventLevel::Warn => emit!(warn),
        EventLevel::Error => emit!(error),
    }
}
