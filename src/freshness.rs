//! Staleness checking of stored annotations against the current document.

use std::ops::Range;

use crate::annotation::Annotation;
use crate::highlight::{self, Placement, SkipReason};
use crate::projection::Projection;
use crate::types::ContentHash;

/// Result of checking a single annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// The annotation cannot be placed anywhere.
    Broken(SkipReason),
    /// Placed at its stored offsets, but the document text changed since it was made.
    Drifted,
    /// Placed at its stored offsets and the document text is unchanged, or no
    /// fingerprint was recorded.
    Fresh,
    /// Placed only by finding its text elsewhere.
    Relocated(Range<usize>),
}

impl CheckResult {
    /// Process exit code this result contributes: 0 fresh or drifted, 1 relocated, 2 broken.
    pub const fn exit_code(&self) -> u8 {
        return match self {
            Self::Broken(_) => 2,
            Self::Drifted | Self::Fresh => 0,
            Self::Relocated(_) => 1,
        };
    }

    /// Upper-case label used in reports.
    pub const fn label(&self) -> &'static str {
        return match self {
            Self::Broken(_) => "BROKEN",
            Self::Drifted => "DRIFTED",
            Self::Fresh => "FRESH",
            Self::Relocated(_) => "RELOCATED",
        };
    }
}

/// Check one annotation against the current projection and its fingerprint.
pub fn check_annotation(annotation: &Annotation, projection: &Projection, current: &ContentHash) -> CheckResult {
    return match highlight::place(annotation, projection) {
        Placement::Exact(_) => match &annotation.content_hash {
            Some(stored) if stored != current => CheckResult::Drifted,
            _ => CheckResult::Fresh,
        },
        Placement::Relocated { to, .. } => CheckResult::Relocated(to),
        Placement::Unplaced(reason) => CheckResult::Broken(reason),
    };
}
