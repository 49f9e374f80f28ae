//! One-for-one fault policy
//!
//! The directive for a failing child depends only on the kind of fault, and
//! only the failing child is affected.

use chrono::{DateTime, Utc};
use thiserror::Error;
use vidlens_common::supervision::{Directive, FaultKind};

/// Select the recovery action for a fault
pub fn directive_for(kind: FaultKind) -> Directive {
    match kind {
        FaultKind::Transient => Directive::Resume,
        FaultKind::InvalidArgument => Directive::Restart,
        FaultKind::InvariantViolation => Directive::Stop,
        FaultKind::Unclassified => Directive::Restart,
    }
}

/// Failure raised by a worker's message handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} fault: {detail}")]
pub struct WorkerFault {
    pub kind: FaultKind,
    pub detail: String,
}

impl WorkerFault {
    pub fn new(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::Transient, detail)
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidArgument, detail)
    }

    pub fn invariant_violation(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::InvariantViolation, detail)
    }

    pub fn unclassified(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::Unclassified, detail)
    }
}

/// A fault as seen by the supervisor; consumed as soon as a directive is chosen
#[derive(Debug, Clone, PartialEq)]
pub struct FaultEvent {
    pub worker: String,
    pub kind: FaultKind,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl FaultEvent {
    pub fn new(worker: impl Into<String>, fault: WorkerFault) -> Self {
        Self {
            worker: worker.into(),
            kind: fault.kind,
            detail: fault.detail,
            timestamp: Utc::now(),
        }
    }
}
