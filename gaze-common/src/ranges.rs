//! Range-to-sequence conversion
//!
//! Turns an annotation file's inclusive `[startFrame, endFrame]` ranges into
//! per-frame category values, in two shapes:
//!
//! - [`SparseSequence`]: frame → category for frames covered by some range
//! - [`AlignedSequence`]: one value per entry of the batch's master frame list,
//!   so sequences from different raters line up positionally
//!
//! Conversion back to ranges ([`collapse`], [`to_ranges`]) merges contiguous
//! equal-valued frames, and [`RangeIndex`] answers containment queries by
//! binary search instead of scanning every range per frame.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::annotation_file::AnnotationFile;
use crate::model::{AnnotationRange, Subject, SubjectScheme};
use crate::{Error, Result};

/// Upper bound on frame indices accepted during expansion
pub const DEFAULT_MAX_FRAME: u32 = 10_000_000;

/// What to do when two categories of one subject claim the same frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Fail the file with [`Error::OverlappingRanges`]
    #[default]
    Reject,
    /// Later category in scheme order silently wins
    PriorityOverride,
}

/// How aligned sequences represent master-list frames a rater did not annotate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFramePolicy {
    /// Fill with category 0 ("no annotation"), which then counts as a category
    #[default]
    ZeroFill,
    /// Leave the position undefined
    Absent,
}

/// Options for [`expand`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    pub overlap: OverlapPolicy,
    pub max_frame: u32,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            overlap: OverlapPolicy::default(),
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

/// Per-frame values a pairwise comparison can walk
///
/// Positions are frame numbers for sparse sequences and master-list indices
/// for aligned ones. Both sides of a comparison must use the same shape.
pub trait FrameValues {
    /// Annotated positions with a non-zero category, ascending
    fn annotated(&self) -> Box<dyn Iterator<Item = (usize, u8)> + '_>;

    /// Non-zero category at a position
    fn annotated_at(&self, position: usize) -> Option<u8>;
}

/// Frame → category mapping holding only covered frames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseSequence {
    frames: BTreeMap<u32, u8>,
}

impl SparseSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frame: u32, code: u8) -> Option<u8> {
        self.frames.insert(frame, code)
    }

    pub fn get(&self, frame: u32) -> Option<u8> {
        self.frames.get(&frame).copied()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Covered frames, ascending
    pub fn frames(&self) -> impl Iterator<Item = u32> + '_ {
        self.frames.keys().copied()
    }

    /// (frame, code) pairs, ascending by frame
    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.frames.iter().map(|(&f, &c)| (f, c))
    }

    /// Number of frames carrying `code`
    pub fn count(&self, code: u8) -> usize {
        self.frames.values().filter(|&&c| c == code).count()
    }
}

impl FromIterator<(u32, u8)> for SparseSequence {
    fn from_iter<I: IntoIterator<Item = (u32, u8)>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl FrameValues for SparseSequence {
    fn annotated(&self) -> Box<dyn Iterator<Item = (usize, u8)> + '_> {
        Box::new(
            self.frames
                .iter()
                .filter(|(_, code)| **code != 0)
                .map(|(&f, &c)| (f as usize, c)),
        )
    }

    fn annotated_at(&self, position: usize) -> Option<u8> {
        let frame = u32::try_from(position).ok()?;
        self.get(frame).filter(|&c| c != 0)
    }
}

/// Values over the master frame list, position `i` is master frame `i`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedSequence {
    values: Vec<Option<u8>>,
}

impl AlignedSequence {
    pub fn new(values: Vec<Option<u8>>) -> Self {
        Self { values }
    }

    /// Fully defined sequence, convenient for tests and fixed-length inputs
    pub fn from_codes(codes: &[u8]) -> Self {
        Self {
            values: codes.iter().map(|&c| Some(c)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<u8> {
        self.values.get(position).copied().flatten()
    }

    pub fn values(&self) -> &[Option<u8>] {
        &self.values
    }
}

impl FrameValues for AlignedSequence {
    fn annotated(&self) -> Box<dyn Iterator<Item = (usize, u8)> + '_> {
        Box::new(
            self.values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.filter(|&c| c != 0).map(|c| (i, c))),
        )
    }

    fn annotated_at(&self, position: usize) -> Option<u8> {
        self.get(position).filter(|&c| c != 0)
    }
}

/// Maximal block of consecutive frames sharing one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub start: u32,
    pub end: u32,
    pub code: u8,
}

/// Sort ranges and merge the ones that overlap or touch
pub fn merge_ranges(ranges: &[AnnotationRange]) -> Vec<AnnotationRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable_by_key(|r| (r.start_frame, r.end_frame));

    let mut merged: Vec<AnnotationRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start_frame <= last.end_frame.saturating_add(1) => {
                last.end_frame = last.end_frame.max(range.end_frame);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Expand one subject's ranges into a sparse sequence
///
/// Categories are applied in scheme order. Under [`OverlapPolicy::Reject`] a
/// frame claimed by two different categories fails the whole file; ranges of
/// the same category may overlap freely. Each category's ranges are merged
/// first, so every covered frame is visited once per category.
pub fn expand(
    file: &AnnotationFile,
    subject: Subject,
    scheme: &SubjectScheme,
    options: &ExpandOptions,
) -> Result<SparseSequence> {
    let mut sequence = SparseSequence::new();

    for def in &scheme.categories {
        let ranges = file.ranges(subject, def.code);
        if let Some(range) = ranges.iter().find(|r| r.end_frame > options.max_frame) {
            return Err(Error::malformed(
                &file.name,
                format!(
                    "{} range {}-{} exceeds the frame limit {}",
                    def.key, range.start_frame, range.end_frame, options.max_frame
                ),
            ));
        }

        for range in merge_ranges(ranges) {
            for frame in range.start_frame..=range.end_frame {
                let previous = sequence.insert(frame, def.code);
                match previous {
                    Some(prev) if prev != def.code && options.overlap == OverlapPolicy::Reject => {
                        return Err(Error::OverlappingRanges {
                            file: file.name.clone(),
                            subject,
                            frame,
                            first: scheme.label(prev),
                            second: def.label.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(sequence)
}

/// Merge contiguous equal-valued frames into runs
pub fn collapse(sequence: &SparseSequence) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (frame, code) in sequence.iter() {
        match runs.last_mut() {
            Some(run) if run.code == code && run.end.checked_add(1) == Some(frame) => {
                run.end = frame;
            }
            _ => runs.push(Run {
                start: frame,
                end: frame,
                code,
            }),
        }
    }
    runs
}

/// Collapse back into per-category range lists
pub fn to_ranges(sequence: &SparseSequence) -> BTreeMap<u8, Vec<AnnotationRange>> {
    let mut ranges: BTreeMap<u8, Vec<AnnotationRange>> = BTreeMap::new();
    for run in collapse(sequence) {
        ranges
            .entry(run.code)
            .or_default()
            .push(AnnotationRange::new(run.start, run.end));
    }
    ranges
}

/// Sorted, disjoint runs with logarithmic frame lookup
#[derive(Debug, Clone, Default)]
pub struct RangeIndex {
    runs: Vec<Run>,
}

impl RangeIndex {
    pub fn new(sequence: &SparseSequence) -> Self {
        Self {
            runs: collapse(sequence),
        }
    }

    pub fn lookup(&self, frame: u32) -> Option<u8> {
        let idx = self.runs.partition_point(|run| run.end < frame);
        self.runs
            .get(idx)
            .filter(|run| run.start <= frame)
            .map(|run| run.code)
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }
}

/// Sorted union of every frame annotated by any sequence
pub fn master_frame_list(sequences: &[&SparseSequence]) -> Vec<u32> {
    let frames: BTreeSet<u32> = sequences.iter().flat_map(|s| s.frames()).collect();
    frames.into_iter().collect()
}

/// Align sequences onto the master frame list
pub fn align(
    sequences: &[&SparseSequence],
    master: &[u32],
    missing: MissingFramePolicy,
) -> Vec<AlignedSequence> {
    sequences
        .iter()
        .map(|sequence| {
            let index = RangeIndex::new(sequence);
            let values = master
                .iter()
                .map(|&frame| match index.lookup(frame) {
                    Some(code) => Some(code),
                    None => match missing {
                        MissingFramePolicy::ZeroFill => Some(0),
                        MissingFramePolicy::Absent => None,
                    },
                })
                .collect();
            AlignedSequence::new(values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CategoryScheme;

    fn file_with(doctor: &[(u8, &[(u32, u32)])]) -> AnnotationFile {
        let mut file = AnnotationFile::new("test.json");
        for (code, ranges) in doctor {
            file.insert_ranges(
                Subject::Doctor,
                *code,
                ranges.iter().map(|&(s, e)| AnnotationRange::new(s, e)).collect(),
            );
        }
        file
    }

    #[test]
    fn test_expand_inclusive_ranges() {
        let scheme = CategoryScheme::default();
        let file = file_with(&[(1, &[(0, 2)]), (2, &[(5, 5)])]);
        let seq = expand(&file, Subject::Doctor, &scheme.doctor, &ExpandOptions::default()).unwrap();

        assert_eq!(seq.len(), 4);
        assert_eq!(seq.get(0), Some(1));
        assert_eq!(seq.get(2), Some(1));
        assert_eq!(seq.get(3), None);
        assert_eq!(seq.get(5), Some(2));
    }

    #[test]
    fn test_overlap_rejected_by_default() {
        let scheme = CategoryScheme::default();
        let file = file_with(&[(1, &[(0, 5)]), (3, &[(5, 8)])]);
        let err = expand(&file, Subject::Doctor, &scheme.doctor, &ExpandOptions::default()).unwrap_err();

        match err {
            Error::OverlappingRanges { frame, subject, .. } => {
                assert_eq!(frame, 5);
                assert_eq!(subject, Subject::Doctor);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_overlap_priority_override_last_category_wins() {
        let scheme = CategoryScheme::default();
        let file = file_with(&[(3, &[(4, 6)]), (1, &[(0, 5)])]);
        let options = ExpandOptions {
            overlap: OverlapPolicy::PriorityOverride,
            ..ExpandOptions::default()
        };
        let seq = expand(&file, Subject::Doctor, &scheme.doctor, &options).unwrap();

        // Scheme order is 1, 2, 3 regardless of insertion order, so 3 wins
        assert_eq!(seq.get(4), Some(3));
        assert_eq!(seq.get(5), Some(3));
        assert_eq!(seq.get(3), Some(1));
        assert_eq!(seq.get(6), Some(3));
    }

    #[test]
    fn test_same_category_overlap_is_not_a_conflict() {
        let scheme = CategoryScheme::default();
        let file = file_with(&[(2, &[(0, 5), (3, 9)])]);
        let seq = expand(&file, Subject::Doctor, &scheme.doctor, &ExpandOptions::default()).unwrap();
        assert_eq!(seq.len(), 10);
        assert_eq!(seq.count(2), 10);
    }

    #[test]
    fn test_merge_ranges() {
        let ranges = [
            AnnotationRange::new(20, 25),
            AnnotationRange::new(0, 5),
            AnnotationRange::new(6, 9),
            AnnotationRange::new(3, 4),
            AnnotationRange::new(24, 30),
        ];
        assert_eq!(
            merge_ranges(&ranges),
            vec![AnnotationRange::new(0, 9), AnnotationRange::new(20, 30)]
        );
        assert!(merge_ranges(&[]).is_empty());
    }

    #[test]
    fn test_duplicate_wide_ranges_expand_once() {
        let scheme = CategoryScheme::default();
        let duplicates: Vec<(u32, u32)> = vec![(0, 199_999); 2_000];
        let file = file_with(&[(1, &duplicates[..])]);

        let start = std::time::Instant::now();
        let seq = expand(&file, Subject::Doctor, &scheme.doctor, &ExpandOptions::default()).unwrap();

        assert_eq!(seq.len(), 200_000);
        assert_eq!(seq.count(1), 200_000);
        // 2,000 passes over 200,000 frames would take minutes
        assert!(start.elapsed() < std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_frame_limit() {
        let scheme = CategoryScheme::default();
        let file = file_with(&[(1, &[(0, 50)])]);
        let options = ExpandOptions {
            max_frame: 20,
            ..ExpandOptions::default()
        };
        let err = expand(&file, Subject::Doctor, &scheme.doctor, &options).unwrap_err();
        assert!(matches!(err, Error::MalformedFile { .. }));
    }

    #[test]
    fn test_collapse_round_trip() {
        let scheme = CategoryScheme::default();
        let original: &[(u8, &[(u32, u32)])] = &[
            (1, &[(0, 9), (30, 31)]),
            (2, &[(10, 19), (40, 40)]),
            (3, &[(20, 29)]),
        ];
        let file = file_with(original);
        let seq = expand(&file, Subject::Doctor, &scheme.doctor, &ExpandOptions::default()).unwrap();
        let ranges = to_ranges(&seq);

        for (code, expected) in original {
            let expected: Vec<AnnotationRange> =
                expected.iter().map(|&(s, e)| AnnotationRange::new(s, e)).collect();
            assert_eq!(ranges[code], expected, "category {}", code);
        }
    }

    #[test]
    fn test_collapse_splits_on_gap_and_code_change() {
        let seq: SparseSequence = [(0, 1), (1, 1), (3, 1), (4, 2)].into_iter().collect();
        let runs = collapse(&seq);
        assert_eq!(
            runs,
            vec![
                Run { start: 0, end: 1, code: 1 },
                Run { start: 3, end: 3, code: 1 },
                Run { start: 4, end: 4, code: 2 },
            ]
        );
    }

    #[test]
    fn test_range_index_lookup() {
        let seq: SparseSequence = (10..20).map(|f| (f, 1)).chain((30..35).map(|f| (f, 2))).collect();
        let index = RangeIndex::new(&seq);
        assert_eq!(index.runs().len(), 2);
        assert_eq!(index.lookup(9), None);
        assert_eq!(index.lookup(10), Some(1));
        assert_eq!(index.lookup(19), Some(1));
        assert_eq!(index.lookup(25), None);
        assert_eq!(index.lookup(34), Some(2));
        assert_eq!(index.lookup(35), None);
    }

    #[test]
    fn test_master_list_and_alignment() {
        let a: SparseSequence = [(0, 1), (1, 1), (2, 2)].into_iter().collect();
        let b: SparseSequence = [(2, 2), (5, 3)].into_iter().collect();
        let master = master_frame_list(&[&a, &b]);
        assert_eq!(master, vec![0, 1, 2, 5]);

        let zero = align(&[&a, &b], &master, MissingFramePolicy::ZeroFill);
        assert_eq!(zero[0].values(), &[Some(1), Some(1), Some(2), Some(0)]);
        assert_eq!(zero[1].values(), &[Some(0), Some(0), Some(2), Some(3)]);

        let absent = align(&[&a, &b], &master, MissingFramePolicy::Absent);
        assert_eq!(absent[1].values(), &[None, None, Some(2), Some(3)]);
    }

    #[test]
    fn test_frame_values_skip_zero() {
        let aligned = AlignedSequence::from_codes(&[0, 2, 0, 1]);
        let annotated: Vec<_> = aligned.annotated().collect();
        assert_eq!(annotated, vec![(1, 2), (3, 1)]);
        assert_eq!(aligned.annotated_at(0), None);
        assert_eq!(aligned.annotated_at(1), Some(2));
        assert_eq!(aligned.annotated_at(10), None);
    }
}
