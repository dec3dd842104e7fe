//! Bridges engine progress callbacks into the operation log

use crate::control::Control;
use pkgd_events::{EventKind, ProgressEvent, ProgressReporter};
use pkgd_registry::OperationRegistry;
use pkgd_types::{OperationId, Progress};
use std::sync::Arc;

/// Stamps engine progress with the operation and its current phase
pub(crate) struct PhaseReporter {
    operation: OperationId,
    registry: Arc<OperationRegistry>,
    control: Arc<Control>,
}

impl PhaseReporter {
    pub(crate) fn new(
        operation: OperationId,
        registry: Arc<OperationRegistry>,
        control: Arc<Control>,
    ) -> Self {
        Self {
            operation,
            registry,
            control,
        }
    }
}

impl ProgressReporter for PhaseReporter {
    fn report(&self, kind: EventKind, progress: Progress, detail: String) {
        let event = ProgressEvent::new(
            self.operation,
            self.control.phase(),
            kind,
            progress,
            detail,
        );
        if let Err(error) = self.registry.dispatch(self.operation, event) {
            tracing::warn!(operation = %self.operation, %error, "dropping progress event");
        }
    }
}
