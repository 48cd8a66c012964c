//! Multi-rater agreement (Fleiss' kappa)
//!
//! Works on [`AlignedSequence`]s laid over the same master frame list, so
//! position `i` of every sequence refers to the same frame. An item is only
//! counted when every rater has a defined value there; with zero-filled
//! alignment the "no annotation" code 0 is a category like any other.

use tracing::debug;

use crate::cohen::{AgreementResult, DEGENERATE_EPSILON};
use crate::ranges::AlignedSequence;
use crate::{Error, Result};

/// Category counts for one item (frame)
type ItemCounts = [u32; 256];

/// Fleiss' kappa across all raters
///
/// `observed_agreement` is P̄ (mean per-item agreement) and
/// `expected_agreement` is P̄e (sum of squared marginal proportions).
pub fn fleiss_kappa(sequences: &[AlignedSequence]) -> Result<AgreementResult> {
    let raters = sequences.len();
    if raters < 2 {
        return Err(Error::InvalidInput(format!(
            "Fleiss' kappa needs at least 2 raters, got {}",
            raters
        )));
    }

    let length = sequences[0].len();
    if let Some(other) = sequences.iter().find(|s| s.len() != length) {
        return Err(Error::InvalidInput(format!(
            "aligned sequences differ in length ({} vs {})",
            length,
            other.len()
        )));
    }

    let n = raters as f64;
    let mut totals = [0u64; 256];
    let mut counts: ItemCounts = [0; 256];
    let mut items = 0usize;
    let mut agreement_sum = 0.0;

    for position in 0..length {
        if !tally_item(sequences, position, &mut counts) {
            continue;
        }
        items += 1;

        let mut pairs = 0u64;
        for (code, &count) in counts.iter().enumerate() {
            let count = u64::from(count);
            totals[code] += count;
            pairs += count * count.saturating_sub(1);
        }
        agreement_sum += pairs as f64 / (n * (n - 1.0));
    }

    if items == 0 {
        debug!(raters, "no frame rated by every rater");
        return Ok(AgreementResult::empty());
    }

    let p_bar = agreement_sum / items as f64;
    let assignments = items as f64 * n;
    let p_e: f64 = totals
        .iter()
        .filter(|&&t| t > 0)
        .map(|&t| {
            let p = t as f64 / assignments;
            p * p
        })
        .sum();

    let kappa = if (1.0 - p_e).abs() > DEGENERATE_EPSILON {
        (p_bar - p_e) / (1.0 - p_e)
    } else {
        1.0
    };

    debug!(raters, items, p_bar, p_e, kappa, "fleiss kappa");
    Ok(AgreementResult::sanitized(kappa, p_bar, p_e, items))
}

/// Fill `counts` for one position, false when some rater has no value there
fn tally_item(sequences: &[AlignedSequence], position: usize, counts: &mut ItemCounts) -> bool {
    counts.fill(0);
    for sequence in sequences {
        match sequence.values()[position] {
            Some(code) => counts[code as usize] += 1,
            None => return false,
        }
    }
    true
}
