//! Pairwise agreement (Cohen's kappa)
//!
//! Compares two raters over the frames both of them annotated with a non-zero
//! category. Frames annotated by only one rater never count as comparisons.
//!
//! # Expected agreement
//!
//! Chance agreement is built from each rater's marginal category frequencies.
//! Two conventions exist for the marginals' denominator and both are exposed
//! through [`ExpectedBasis`]:
//!
//! - [`ExpectedBasis::Overlap`]: frequencies over the compared (overlapping)
//!   frames, the textbook shared-N formula
//! - [`ExpectedBasis::OwnTotal`]: frequencies over each rater's own annotated
//!   frames, overlapping or not
//!
//! # Degenerate cases
//!
//! - no comparisons: kappa 0, agreement 0
//! - expected agreement within [`DEGENERATE_EPSILON`] of 1: kappa 1 when the
//!   observed agreement is also ~1, otherwise 0
//!
//! Results are clamped to [-1, 1] and never NaN.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ranges::FrameValues;

/// Tolerance for treating an agreement level as 1.0
pub const DEGENERATE_EPSILON: f64 = 1e-4;

/// Denominator used for marginal frequencies in expected agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedBasis {
    #[default]
    Overlap,
    OwnTotal,
}

/// Agreement statistic for a set of compared items
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementResult {
    pub kappa: f64,
    pub observed_agreement: f64,
    pub expected_agreement: f64,
    pub comparisons: usize,
}

impl AgreementResult {
    /// Result for zero comparisons
    pub fn empty() -> Self {
        Self {
            kappa: 0.0,
            observed_agreement: 0.0,
            expected_agreement: 0.0,
            comparisons: 0,
        }
    }

    /// Apply `(po - pe) / (1 - pe)` with the degenerate-case policy
    pub fn from_agreement(observed: f64, expected: f64, comparisons: usize) -> Self {
        if comparisons == 0 {
            return Self::empty();
        }

        let kappa = if expected >= 1.0 - DEGENERATE_EPSILON {
            if observed >= 1.0 - DEGENERATE_EPSILON {
                1.0
            } else {
                0.0
            }
        } else {
            (observed - expected) / (1.0 - expected)
        };

        Self::sanitized(kappa, observed, expected, comparisons)
    }

    /// Build a result, replacing NaN with 0 and clamping into range
    pub fn sanitized(kappa: f64, observed: f64, expected: f64, comparisons: usize) -> Self {
        let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            kappa: finite(kappa).clamp(-1.0, 1.0),
            observed_agreement: finite(observed).clamp(0.0, 1.0),
            expected_agreement: finite(expected).clamp(0.0, 1.0),
            comparisons,
        }
    }
}

/// Per-category tallies for one rater
struct Tally {
    counts: [usize; 256],
    total: usize,
}

impl Tally {
    fn new() -> Self {
        Self {
            counts: [0; 256],
            total: 0,
        }
    }

    fn add(&mut self, code: u8) {
        self.counts[code as usize] += 1;
        self.total += 1;
    }

    fn own<V: FrameValues + ?Sized>(values: &V) -> Self {
        let mut tally = Self::new();
        for (_, code) in values.annotated() {
            tally.add(code);
        }
        tally
    }

    fn proportion(&self, code: u8) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.counts[code as usize] as f64 / self.total as f64
        }
    }
}

/// Overlap statistics shared by both kappa variants
struct Overlap {
    /// (rater A value, rater B value) per compared position
    pairs: Vec<(u8, u8)>,
    a: Tally,
    b: Tally,
}

fn overlap<A, B>(a: &A, b: &B) -> Overlap
where
    A: FrameValues + ?Sized,
    B: FrameValues + ?Sized,
{
    let mut result = Overlap {
        pairs: Vec::new(),
        a: Tally::new(),
        b: Tally::new(),
    };
    for (position, va) in a.annotated() {
        if let Some(vb) = b.annotated_at(position) {
            result.pairs.push((va, vb));
            result.a.add(va);
            result.b.add(vb);
        }
    }
    result
}

/// Cohen's kappa over the category universe `categories`
pub fn cohen_kappa<A, B>(a: &A, b: &B, categories: &[u8], basis: ExpectedBasis) -> AgreementResult
where
    A: FrameValues + ?Sized,
    B: FrameValues + ?Sized,
{
    let shared = overlap(a, b);
    let comparisons = shared.pairs.len();
    if comparisons == 0 {
        return AgreementResult::empty();
    }

    let agreements = shared.pairs.iter().filter(|(va, vb)| va == vb).count();
    let observed = agreements as f64 / comparisons as f64;

    let (marg_a, marg_b) = match basis {
        ExpectedBasis::Overlap => (shared.a, shared.b),
        ExpectedBasis::OwnTotal => (Tally::own(a), Tally::own(b)),
    };
    let expected: f64 = categories
        .iter()
        .map(|&c| marg_a.proportion(c) * marg_b.proportion(c))
        .sum();

    trace!(comparisons, agreements, observed, expected, "cohen kappa");
    AgreementResult::from_agreement(observed, expected, comparisons)
}

/// Kappa for "is `category`" versus "is any other category"
///
/// Compared positions are those both raters annotated with any category.
/// Expected agreement is `p1*p2 + (1-p1)*(1-p2)`.
pub fn cohen_category_kappa<A, B>(a: &A, b: &B, category: u8, basis: ExpectedBasis) -> AgreementResult
where
    A: FrameValues + ?Sized,
    B: FrameValues + ?Sized,
{
    let shared = overlap(a, b);
    let comparisons = shared.pairs.len();
    if comparisons == 0 {
        return AgreementResult::empty();
    }

    let agreements = shared
        .pairs
        .iter()
        .filter(|(va, vb)| (*va == category) == (*vb == category))
        .count();
    let observed = agreements as f64 / comparisons as f64;

    let (p1, p2) = match basis {
        ExpectedBasis::Overlap => (shared.a.proportion(category), shared.b.proportion(category)),
        ExpectedBasis::OwnTotal => (
            Tally::own(a).proportion(category),
            Tally::own(b).proportion(category),
        ),
    };
    let expected = p1 * p2 + (1.0 - p1) * (1.0 - p2);

    AgreementResult::from_agreement(observed, expected, comparisons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::{AlignedSequence, SparseSequence};

    const CATS: [u8; 3] = [1, 2, 3];

    fn seq(codes: &[u8]) -> AlignedSequence {
        AlignedSequence::from_codes(codes)
    }

    #[test]
    fn test_textbook_two_by_two() {
        // 20 yes/yes, 5 yes/no, 10 no/yes, 15 no/no
        let mut a = Vec::new();
        let mut b = Vec::new();
        for (va, vb, n) in [(1, 1, 20), (1, 2, 5), (2, 1, 10), (2, 2, 15)] {
            for _ in 0..n {
                a.push(va);
                b.push(vb);
            }
        }
        let result = cohen_kappa(&seq(&a), &seq(&b), &[1, 2], ExpectedBasis::Overlap);
        assert_eq!(result.comparisons, 50);
        assert!((result.observed_agreement - 0.7).abs() < 1e-12);
        assert!((result.expected_agreement - 0.5).abs() < 1e-12);
        assert!((result.kappa - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_symmetry() {
        let a = seq(&[1, 2, 3, 1, 1, 2, 0, 3, 3, 1]);
        let b = seq(&[1, 1, 3, 2, 1, 2, 2, 0, 3, 3]);
        for basis in [ExpectedBasis::Overlap, ExpectedBasis::OwnTotal] {
            let ab = cohen_kappa(&a, &b, &CATS, basis);
            let ba = cohen_kappa(&b, &a, &CATS, basis);
            assert!((ab.kappa - ba.kappa).abs() < 1e-12, "{:?}", basis);
            assert_eq!(ab.comparisons, ba.comparisons);

            for c in CATS {
                let ab = cohen_category_kappa(&a, &b, c, basis);
                let ba = cohen_category_kappa(&b, &a, c, basis);
                assert!((ab.kappa - ba.kappa).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_identity_is_one() {
        let a = seq(&[1, 2, 3, 3, 2, 1]);
        assert_eq!(cohen_kappa(&a, &a, &CATS, ExpectedBasis::Overlap).kappa, 1.0);

        // Single category: pe = 1 resolves to 1 through the degenerate policy
        let single = seq(&[2, 2, 2]);
        let result = cohen_kappa(&single, &single, &CATS, ExpectedBasis::Overlap);
        assert_eq!(result.kappa, 1.0);
        assert_eq!(result.observed_agreement, 1.0);
    }

    #[test]
    fn test_zero_overlap() {
        let a: SparseSequence = (0..10).map(|f| (f, 1)).collect();
        let b: SparseSequence = (20..30).map(|f| (f, 1)).collect();
        let result = cohen_kappa(&a, &b, &CATS, ExpectedBasis::Overlap);
        assert_eq!(result, AgreementResult::empty());
        assert_eq!(cohen_category_kappa(&a, &b, 1, ExpectedBasis::OwnTotal).kappa, 0.0);
    }

    #[test]
    fn test_single_rater_frames_excluded_from_comparisons() {
        let a: SparseSequence = (0..20).map(|f| (f, if f < 10 { 1 } else { 2 })).collect();
        let b: SparseSequence = (0..10).map(|f| (f, if f < 5 { 1 } else { 2 })).collect();
        let result = cohen_kappa(&a, &b, &CATS, ExpectedBasis::Overlap);
        assert_eq!(result.comparisons, 10);
        assert!((result.observed_agreement - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_own_total_basis_uses_each_raters_frames() {
        // Overlap 0..4; a also annotates 4..8 with category 2
        let a: SparseSequence = (0..8).map(|f| (f, if f < 4 { 1 } else { 2 })).collect();
        let b: SparseSequence = (0..4).map(|f| (f, if f < 2 { 1 } else { 2 })).collect();

        let overlap = cohen_kappa(&a, &b, &CATS, ExpectedBasis::Overlap);
        // overlap marginals: a = {1: 1.0}, b = {1: .5, 2: .5} -> pe = .5, po = .5
        assert!((overlap.expected_agreement - 0.5).abs() < 1e-12);
        assert!(overlap.kappa.abs() < 1e-12);

        let own = cohen_kappa(&a, &b, &CATS, ExpectedBasis::OwnTotal);
        // own marginals: a = {1: .5, 2: .5}, b = {1: .5, 2: .5} -> pe = .5
        assert!((own.expected_agreement - 0.5).abs() < 1e-12);
        assert_eq!(own.comparisons, 4);
    }

    #[test]
    fn test_zero_values_are_not_annotations() {
        let a = seq(&[0, 0, 1, 2]);
        let b = seq(&[1, 2, 1, 2]);
        let result = cohen_kappa(&a, &b, &CATS, ExpectedBasis::Overlap);
        assert_eq!(result.comparisons, 2);
        assert_eq!(result.kappa, 1.0);
    }

    #[test]
    fn test_degenerate_expected_agreement() {
        let disagree = AgreementResult::from_agreement(0.5, 1.0, 10);
        assert_eq!(disagree.kappa, 0.0);
        let agree = AgreementResult::from_agreement(1.0, 0.99995, 10);
        assert_eq!(agree.kappa, 1.0);
    }

    #[test]
    fn test_sanitized_never_nan_and_clamped() {
        let nan = AgreementResult::sanitized(f64::NAN, f64::NAN, 0.2, 3);
        assert_eq!(nan.kappa, 0.0);
        assert_eq!(nan.observed_agreement, 0.0);
        assert_eq!(AgreementResult::sanitized(-3.0, 0.0, 0.9, 1).kappa, -1.0);
    }

    #[test]
    fn test_kappa_in_range_for_total_disagreement() {
        let a = seq(&[1, 2, 1, 2]);
        let b = seq(&[2, 1, 2, 1]);
        let result = cohen_kappa(&a, &b, &CATS, ExpectedBasis::Overlap);
        assert_eq!(result.observed_agreement, 0.0);
        assert!((result.kappa + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_category_kappa() {
        // Category 2 present: a at positions 1,2; b at positions 2,3
        let a = seq(&[1, 2, 2, 1, 3, 3]);
        let b = seq(&[1, 1, 2, 2, 3, 3]);
        let result = cohen_category_kappa(&a, &b, 2, ExpectedBasis::Overlap);
        // agreement on is/isn't 2: positions 0,2,4,5 -> 4/6
        assert!((result.observed_agreement - 4.0 / 6.0).abs() < 1e-12);
        // p1 = p2 = 1/3 -> pe = 1/9 + 4/9 = 5/9
        assert!((result.expected_agreement - 5.0 / 9.0).abs() < 1e-12);
        let expected_kappa = (4.0 / 6.0 - 5.0 / 9.0) / (1.0 - 5.0 / 9.0);
        assert!((result.kappa - expected_kappa).abs() < 1e-12);

        // Category 3 agrees perfectly
        let exact = cohen_category_kappa(&a, &b, 3, ExpectedBasis::Overlap);
        assert!((exact.kappa - 1.0).abs() < 1e-12);
    }
}
