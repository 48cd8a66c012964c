//! Result aggregation
//!
//! Runs the full comparison for a batch of rater files: rater-count checks,
//! the frame-interval gate, pairwise Cohen's kappa for every pair of files,
//! category-binarized kappa averaged over pairs, Fleiss' kappa for three or
//! more raters, and interpretation buckets for display.
//!
//! Every call builds a fresh report from its inputs; nothing is cached between
//! calls.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::cohen::{cohen_category_kappa, cohen_kappa, AgreementResult};
use crate::config::AnalysisConfig;
use crate::fleiss::fleiss_kappa;
use crate::interval::{validate_intervals, IntervalValidation};
use crate::model::{CategoryScheme, Subject, SubjectScheme};
use crate::ranges::{align, master_frame_list, SparseSequence};
use crate::rater::RaterFile;
use crate::Result;

/// Landis & Koch style reading of a kappa value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Interpretation {
    Poor,
    Slight,
    Fair,
    Moderate,
    Substantial,
    AlmostPerfect,
    /// Kappa was not a number
    NotAvailable,
}

impl Interpretation {
    /// Bucket a kappa value after rounding it to two decimals
    pub fn from_kappa(kappa: f64) -> Self {
        if kappa.is_nan() {
            return Interpretation::NotAvailable;
        }
        let value = round2(kappa);
        if value <= 0.0 {
            Interpretation::Poor
        } else if value <= 0.20 {
            Interpretation::Slight
        } else if value <= 0.40 {
            Interpretation::Fair
        } else if value <= 0.60 {
            Interpretation::Moderate
        } else if value <= 0.80 {
            Interpretation::Substantial
        } else {
            Interpretation::AlmostPerfect
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Interpretation::Poor => "Poor",
            Interpretation::Slight => "Slight",
            Interpretation::Fair => "Fair",
            Interpretation::Moderate => "Moderate",
            Interpretation::Substantial => "Substantial",
            Interpretation::AlmostPerfect => "Almost Perfect",
            Interpretation::NotAvailable => "N/A",
        }
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn round2(value: f64) -> f64 {
    // `+ 0.0` turns -0.0 into 0.0
    (value * 100.0).round() / 100.0 + 0.0
}

/// Value safe to display: NaN becomes 0 with the `N/A` bucket
pub fn display_kappa(kappa: f64) -> (f64, Interpretation) {
    if kappa.is_nan() {
        (0.0, Interpretation::NotAvailable)
    } else {
        (round2(kappa), Interpretation::from_kappa(kappa))
    }
}

/// Human-readable kappa, e.g. `0.43 (Moderate)`; NaN yields `N/A`
pub fn format_kappa(kappa: f64) -> String {
    if kappa.is_nan() {
        return Interpretation::NotAvailable.label().to_string();
    }
    let (value, interpretation) = display_kappa(kappa);
    format!("{:.2} ({})", value, interpretation)
}

/// Cohen's kappa for one pair of files
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairwiseKappa {
    pub file1: String,
    pub file2: String,
    #[serde(flatten)]
    pub result: AgreementResult,
    pub interpretation: Interpretation,
}

/// Category-binarized kappa averaged over pairs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryKappa {
    pub code: u8,
    /// Annotation-file key of the category
    pub name: String,
    pub label: String,
    pub kappa: f64,
    pub agreement: f64,
    /// Pairs with at least one compared frame (the averaging base)
    pub pairs: usize,
    pub interpretation: Interpretation,
}

/// All statistics for one subject
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReport {
    pub subject: Subject,
    /// Category universe size K
    pub category_count: usize,
    pub pairwise: Vec<PairwiseKappa>,
    pub categories: Vec<CategoryKappa>,
    /// Mean of pairwise Cohen's kappa (Light's kappa)
    pub mean_pairwise: AgreementResult,
    pub mean_interpretation: Interpretation,
    pub fleiss: Option<AgreementResult>,
    pub fleiss_interpretation: Option<Interpretation>,
    /// Size of the master frame list used for Fleiss alignment
    pub master_frames: usize,
}

/// Complete agreement report for a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementReport {
    pub raters: Vec<String>,
    /// Shared frame interval, `None` when validation was disabled
    pub interval: Option<u32>,
    pub doctor: SubjectReport,
    pub patient: SubjectReport,
}

impl AgreementReport {
    pub fn subject(&self, subject: Subject) -> &SubjectReport {
        match subject {
            Subject::Doctor => &self.doctor,
            Subject::Patient => &self.patient,
        }
    }
}

/// Result state of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Not enough files for the configured mode
    InsufficientRaters { required: usize, provided: usize },
    /// More files than the configured mode accepts
    TooManyRaters { allowed: usize, provided: usize },
    /// Files disagree on sampling stride, nothing was computed
    IntervalMismatch { validation: IntervalValidation },
    Complete { report: AgreementReport },
}

impl AnalysisOutcome {
    pub fn report(&self) -> Option<&AgreementReport> {
        match self {
            AnalysisOutcome::Complete { report } => Some(report),
            _ => None,
        }
    }

    pub fn into_report(self) -> Option<AgreementReport> {
        match self {
            AnalysisOutcome::Complete { report } => Some(report),
            _ => None,
        }
    }

    /// Short status line for logs and CLI output
    pub fn summary(&self) -> String {
        match self {
            AnalysisOutcome::InsufficientRaters { required, provided } => format!(
                "Need {} more file(s): {} provided, {} required",
                required.saturating_sub(*provided),
                provided,
                required
            ),
            AnalysisOutcome::TooManyRaters { allowed, provided } => format!(
                "Too many files: {} provided, at most {} allowed",
                provided, allowed
            ),
            AnalysisOutcome::IntervalMismatch { validation } => match validation {
                IntervalValidation::Invalid { error, .. } => error.clone(),
                IntervalValidation::Valid { .. } => "Frame interval mismatch".to_string(),
            },
            AnalysisOutcome::Complete { report } => {
                format!("Agreement computed for {} files", report.raters.len())
            }
        }
    }
}

/// Compare a batch of rater files
pub fn analyze<R: AsRef<RaterFile>>(
    raters: &[R],
    config: &AnalysisConfig,
    scheme: &CategoryScheme,
) -> Result<AnalysisOutcome> {
    let raters: Vec<&RaterFile> = raters.iter().map(AsRef::as_ref).collect();
    let provided = raters.len();
    let mode = config.rater_mode;

    if provided < mode.min_raters() {
        debug!(provided, required = mode.min_raters(), "insufficient raters");
        return Ok(AnalysisOutcome::InsufficientRaters {
            required: mode.min_raters(),
            provided,
        });
    }
    if let Some(allowed) = mode.max_raters() {
        if provided > allowed {
            return Ok(AnalysisOutcome::TooManyRaters { allowed, provided });
        }
    }

    warn_on_batch_inconsistencies(&raters);

    let interval = if config.validate_intervals {
        let validation = validate_intervals(&raters);
        if !validation.is_valid() {
            warn!("{}", describe_invalid(&validation));
            return Ok(AnalysisOutcome::IntervalMismatch { validation });
        }
        validation.interval()
    } else {
        None
    };

    let doctor = subject_report(&raters, Subject::Doctor, &scheme.doctor, config)?;
    let patient = subject_report(&raters, Subject::Patient, &scheme.patient, config)?;

    info!(
        raters = provided,
        doctor_kappa = doctor.mean_pairwise.kappa,
        patient_kappa = patient.mean_pairwise.kappa,
        "agreement analysis complete"
    );

    Ok(AnalysisOutcome::Complete {
        report: AgreementReport {
            raters: raters.iter().map(|r| r.name.clone()).collect(),
            interval,
            doctor,
            patient,
        },
    })
}

fn describe_invalid(validation: &IntervalValidation) -> String {
    match validation {
        IntervalValidation::Invalid { error, .. } => error.clone(),
        IntervalValidation::Valid { interval, .. } => format!("interval {}", interval),
    }
}

fn warn_on_batch_inconsistencies(raters: &[&RaterFile]) {
    let mut names = HashSet::new();
    for rater in raters {
        if !names.insert(rater.name.as_str()) {
            warn!(file = %rater.name, "same file name appears twice in the batch");
        }
    }

    let videos: HashSet<&str> = raters.iter().filter_map(|r| r.video.as_deref()).collect();
    if videos.len() > 1 {
        warn!(videos = ?videos, "files reference different videos");
    }
}

fn subject_report(
    raters: &[&RaterFile],
    subject: Subject,
    scheme: &SubjectScheme,
    config: &AnalysisConfig,
) -> Result<SubjectReport> {
    let codes = scheme.codes();
    let sequences: Vec<&SparseSequence> = raters.iter().map(|r| r.sequence(subject)).collect();

    let mut pairwise = Vec::new();
    let mut category_sums: Vec<(f64, f64, usize)> = vec![(0.0, 0.0, 0); scheme.len()];

    for i in 0..sequences.len() {
        for j in (i + 1)..sequences.len() {
            let result = cohen_kappa(sequences[i], sequences[j], &codes, config.overall_basis);
            debug!(
                subject = %subject,
                file1 = %raters[i].name,
                file2 = %raters[j].name,
                kappa = result.kappa,
                comparisons = result.comparisons,
                "pairwise kappa"
            );
            pairwise.push(PairwiseKappa {
                file1: raters[i].name.clone(),
                file2: raters[j].name.clone(),
                result,
                interpretation: Interpretation::from_kappa(result.kappa),
            });

            for (slot, def) in category_sums.iter_mut().zip(&scheme.categories) {
                let category =
                    cohen_category_kappa(sequences[i], sequences[j], def.code, config.category_basis);
                if category.comparisons > 0 {
                    slot.0 += category.kappa;
                    slot.1 += category.observed_agreement;
                    slot.2 += 1;
                }
            }
        }
    }

    let categories = scheme
        .categories
        .iter()
        .zip(&category_sums)
        .map(|(def, &(kappa_sum, agreement_sum, pairs))| {
            let (kappa, agreement) = if pairs == 0 {
                (0.0, 0.0)
            } else {
                (kappa_sum / pairs as f64, agreement_sum / pairs as f64)
            };
            CategoryKappa {
                code: def.code,
                name: def.key.clone(),
                label: def.label.clone(),
                kappa,
                agreement,
                pairs,
                interpretation: Interpretation::from_kappa(kappa),
            }
        })
        .collect();

    let mean_pairwise = mean_of(pairwise.iter().map(|p| &p.result));

    let master = master_frame_list(&sequences);
    let fleiss = if config.rater_mode.wants_fleiss(raters.len()) {
        let aligned = align(&sequences, &master, config.missing_frames);
        Some(fleiss_kappa(&aligned)?)
    } else {
        None
    };

    Ok(SubjectReport {
        subject,
        category_count: codes.len(),
        pairwise,
        categories,
        mean_interpretation: Interpretation::from_kappa(mean_pairwise.kappa),
        mean_pairwise,
        fleiss_interpretation: fleiss.map(|f| Interpretation::from_kappa(f.kappa)),
        fleiss,
        master_frames: master.len(),
    })
}

/// Average over results that compared at least one frame
fn mean_of<'a>(results: impl Iterator<Item = &'a AgreementResult>) -> AgreementResult {
    let informative: Vec<&AgreementResult> = results.filter(|r| r.comparisons > 0).collect();
    if informative.is_empty() {
        return AgreementResult::empty();
    }
    let n = informative.len() as f64;
    AgreementResult::sanitized(
        informative.iter().map(|r| r.kappa).sum::<f64>() / n,
        informative.iter().map(|r| r.observed_agreement).sum::<f64>() / n,
        informative.iter().map(|r| r.expected_agreement).sum::<f64>() / n,
        informative.iter().map(|r| r.comparisons).sum(),
    )
}
