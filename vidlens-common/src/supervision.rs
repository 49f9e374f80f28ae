//! Supervision vocabulary shared between the worker tree and its observers
//!
//! The fault taxonomy is a closed enumeration so the supervisor's directive
//! selection can be written as an exhaustive `match`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failure raised inside a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Recoverable glitch (including a panic caught at the message boundary)
    Transient,
    /// The worker was handed an argument it cannot process
    InvalidArgument,
    /// Internal contract breach; the worker cannot be trusted any more
    InvariantViolation,
    /// Anything not classified above
    Unclassified,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultKind::Transient => "transient",
            FaultKind::InvalidArgument => "invalid_argument",
            FaultKind::InvariantViolation => "invariant_violation",
            FaultKind::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

/// Recovery action chosen by the supervisor for a failing child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// Keep the child and its state; process the next message normally
    Resume,
    /// Discard the child's state and recreate it
    Restart,
    /// Remove the child permanently
    Stop,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Directive::Resume => "resume",
            Directive::Restart => "restart",
            Directive::Stop => "stop",
        };
        f.write_str(s)
    }
}
