//! Frame-interval validation
//!
//! Annotation files can be produced at different sampling strides (every
//! frame, every 5th frame, ...). Frame-aligned comparison only makes sense when
//! every file uses the same stride, so the stride of each file is inferred as
//! the most frequent gap between its consecutive annotated frames and the
//! batch is rejected when the inferred strides disagree.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::rater::RaterFile;

/// One file whose stride differs from the batch's reference stride
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntervalMismatch {
    pub file: String,
    pub detected: u32,
    pub expected: u32,
}

/// Outcome of [`validate_intervals`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntervalValidation {
    Valid {
        interval: u32,
        /// Files with fewer than two annotated frames, excluded from voting
        undetermined: Vec<String>,
    },
    Invalid {
        error: String,
        mismatches: Vec<IntervalMismatch>,
        undetermined: Vec<String>,
    },
}

impl IntervalValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, IntervalValidation::Valid { .. })
    }

    pub fn interval(&self) -> Option<u32> {
        match self {
            IntervalValidation::Valid { interval, .. } => Some(*interval),
            IntervalValidation::Invalid { .. } => None,
        }
    }
}

/// Modal gap between consecutive frames
///
/// Input order does not matter and duplicates are ignored. Returns `None` for
/// fewer than two distinct frames. Equally frequent gaps resolve to the
/// smallest one.
pub fn detect_interval(frames: &[u32]) -> Option<u32> {
    let mut sorted = frames.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut gaps: BTreeMap<u32, usize> = BTreeMap::new();
    for pair in sorted.windows(2) {
        *gaps.entry(pair[1] - pair[0]).or_insert(0) += 1;
    }

    // BTreeMap iterates ascending, so keeping only strictly greater counts
    // leaves the smallest gap among ties.
    let mut best: Option<(u32, usize)> = None;
    for (gap, count) in gaps {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((gap, count));
        }
    }
    best.map(|(gap, _)| gap)
}

/// Check that all files share one sampling stride
///
/// The first file with a determinable stride sets the expected value; every
/// other file with a different stride is reported.
pub fn validate_intervals<R: AsRef<RaterFile>>(raters: &[R]) -> IntervalValidation {
    let mut undetermined = Vec::new();
    let mut detected: Vec<(&str, u32)> = Vec::new();

    for rater in raters {
        let rater: &RaterFile = rater.as_ref();
        match rater.detected_interval() {
            Some(interval) => {
                if let Some(declared) = rater.declared_interval {
                    if declared != interval {
                        warn!(
                            file = %rater.name,
                            declared,
                            detected = interval,
                            "declared frame interval differs from annotated frames"
                        );
                    }
                }
                detected.push((rater.name.as_str(), interval));
            }
            None => {
                debug!(file = %rater.name, "frame interval undetermined, excluded from validation");
                undetermined.push(rater.name.clone());
            }
        }
    }

    let Some(&(_, expected)) = detected.first() else {
        return IntervalValidation::Invalid {
            error: "No frame interval could be detected in any file".to_string(),
            mismatches: Vec::new(),
            undetermined,
        };
    };

    let mismatches: Vec<IntervalMismatch> = detected
        .iter()
        .filter(|(_, interval)| *interval != expected)
        .map(|(file, interval)| IntervalMismatch {
            file: file.to_string(),
            detected: *interval,
            expected,
        })
        .collect();

    if mismatches.is_empty() {
        IntervalValidation::Valid {
            interval: expected,
            undetermined,
        }
    } else {
        let listing = mismatches
            .iter()
            .map(|m| format!("{} (interval {})", m.file, m.detected))
            .collect::<Vec<_>>()
            .join(", ");
        IntervalValidation::Invalid {
            error: format!(
                "Frame interval mismatch: expected {} but found {}",
                expected, listing
            ),
            mismatches,
            undetermined,
        }
    }
}
