//! # Gaze Common Library
//!
//! Shared code for the gaze annotation tools including:
//! - Gaze category model (doctor/patient subjects, category schemes)
//! - Annotation file parsing
//! - Range-to-sequence conversion and frame alignment
//! - Frame-interval validation
//! - Cohen's and Fleiss' kappa agreement engines
//! - Result aggregation and interpretation
//! - Configuration loading

pub mod aggregate;
pub mod annotation_file;
pub mod cohen;
pub mod config;
pub mod error;
pub mod fleiss;
pub mod interval;
pub mod model;
pub mod ranges;
pub mod rater;

pub use aggregate::{analyze, AgreementReport, AnalysisOutcome, Interpretation};
pub use annotation_file::AnnotationFile;
pub use cohen::AgreementResult;
pub use error::{Error, Result};
pub use model::{CategoryScheme, Subject};
pub use rater::RaterFile;
