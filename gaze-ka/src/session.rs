//! Loaded rater files and the most recent agreement result
//!
//! The rater list is an immutable snapshot behind an `Arc`; every mutation
//! builds a new list and swaps it in, then recalculates. Readers holding the
//! previous snapshot are never affected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use gaze_common::aggregate::{analyze, AgreementReport, AnalysisOutcome};
use gaze_common::config::AnalysisConfig;
use gaze_common::interval::IntervalValidation;
use gaze_common::{CategoryScheme, RaterFile, Result};

/// One loaded rater file
#[derive(Debug, Clone)]
pub struct StoredRater {
    pub id: Uuid,
    pub added_at: DateTime<Utc>,
    pub file: Arc<RaterFile>,
}

/// Rater listing without per-frame data
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaterSummary {
    pub id: Uuid,
    pub name: String,
    pub annotator: Option<String>,
    pub video: Option<String>,
    pub total_frames: u32,
    pub declared_interval: Option<u32>,
    pub detected_interval: Option<u32>,
    pub doctor_frames: usize,
    pub patient_frames: usize,
    pub added_at: DateTime<Utc>,
}

impl From<&StoredRater> for RaterSummary {
    fn from(rater: &StoredRater) -> Self {
        let file = &rater.file;
        Self {
            id: rater.id,
            name: file.name.clone(),
            annotator: file.annotator.clone(),
            video: file.video.clone(),
            total_frames: file.total_frames,
            declared_interval: file.declared_interval,
            detected_interval: file.detected_interval(),
            doctor_frames: file.doctor.len(),
            patient_frames: file.patient.len(),
            added_at: rater.added_at,
        }
    }
}

/// Result kind of a recalculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    InsufficientRaters,
    TooManyRaters,
    IntervalMismatch,
    Complete,
}

impl From<&AnalysisOutcome> for RunState {
    fn from(outcome: &AnalysisOutcome) -> Self {
        match outcome {
            AnalysisOutcome::InsufficientRaters { .. } => RunState::InsufficientRaters,
            AnalysisOutcome::TooManyRaters { .. } => RunState::TooManyRaters,
            AnalysisOutcome::IntervalMismatch { .. } => RunState::IntervalMismatch,
            AnalysisOutcome::Complete { .. } => RunState::Complete,
        }
    }
}

/// Status of the last recalculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub status: RunState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<IntervalValidation>,
    pub calculated_at: Option<DateTime<Utc>>,
}

impl RunStatus {
    fn idle() -> Self {
        Self {
            status: RunState::Idle,
            message: "No calculation yet".to_string(),
            validation: None,
            calculated_at: None,
        }
    }

    fn from_outcome(outcome: &AnalysisOutcome) -> Self {
        let validation = match outcome {
            AnalysisOutcome::IntervalMismatch { validation } => Some(validation.clone()),
            _ => None,
        };
        Self {
            status: RunState::from(outcome),
            message: outcome.summary(),
            validation,
            calculated_at: Some(Utc::now()),
        }
    }
}

/// Session state guarded by the server's lock
#[derive(Debug)]
pub struct Session {
    raters: Arc<Vec<StoredRater>>,
    last_run: RunStatus,
    last_report: Option<AgreementReport>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            raters: Arc::new(Vec::new()),
            last_run: RunStatus::idle(),
            last_report: None,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rater snapshot
    pub fn raters(&self) -> Arc<Vec<StoredRater>> {
        Arc::clone(&self.raters)
    }

    pub fn find(&self, id: Uuid) -> Option<&StoredRater> {
        self.raters.iter().find(|r| r.id == id)
    }

    pub fn last_run(&self) -> &RunStatus {
        &self.last_run
    }

    /// Last complete report, kept while later runs are incomplete
    pub fn last_report(&self) -> Option<&AgreementReport> {
        self.last_report.as_ref()
    }

    /// Append a file, returning its id
    pub fn add(&mut self, file: RaterFile) -> Uuid {
        let id = Uuid::new_v4();
        let mut next = Vec::with_capacity(self.raters.len() + 1);
        next.extend(self.raters.iter().cloned());
        next.push(StoredRater {
            id,
            added_at: Utc::now(),
            file: Arc::new(file),
        });
        self.raters = Arc::new(next);
        debug!(%id, count = self.raters.len(), "rater added");
        id
    }

    /// Remove a file, false when the id is unknown
    pub fn remove(&mut self, id: Uuid) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        let next: Vec<StoredRater> = self.raters.iter().filter(|r| r.id != id).cloned().collect();
        self.raters = Arc::new(next);
        debug!(%id, count = self.raters.len(), "rater removed");
        true
    }

    /// Shared handles to the current files, in upload order
    pub fn files(&self) -> Vec<Arc<RaterFile>> {
        self.raters.iter().map(|r| Arc::clone(&r.file)).collect()
    }

    /// Store the outcome of a run over [`Session::files`]
    pub fn record(&mut self, outcome: AnalysisOutcome) {
        self.last_run = RunStatus::from_outcome(&outcome);
        info!(status = ?self.last_run.status, "{}", self.last_run.message);
        if let Some(report) = outcome.into_report() {
            self.last_report = Some(report);
        }
    }

    /// Re-run the analysis over the current snapshot
    pub fn recalculate(&mut self, config: &AnalysisConfig, scheme: &CategoryScheme) -> Result<()> {
        let outcome = analyze(&self.files(), config, scheme)?;
        self.record(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaze_common::ranges::SparseSequence;

    fn rater(name: &str, codes: &[u8]) -> RaterFile {
        let doctor: SparseSequence = codes
            .iter()
            .enumerate()
            .map(|(frame, &code)| (frame as u32, code))
            .collect();
        RaterFile::from_sequences(name, doctor, SparseSequence::new())
    }

    #[test]
    fn test_add_replaces_snapshot() {
        let mut session = Session::new();
        let before = session.raters();
        let id = session.add(rater("a", &[1, 1]));

        assert!(before.is_empty());
        assert_eq!(session.raters().len(), 1);
        assert_eq!(session.find(id).unwrap().file.name, "a");
    }

    #[test]
    fn test_remove_unknown_id() {
        let mut session = Session::new();
        session.add(rater("a", &[1]));
        assert!(!session.remove(Uuid::new_v4()));
        assert_eq!(session.raters().len(), 1);
    }

    #[test]
    fn test_insufficient_raters_keeps_previous_report() {
        let config = AnalysisConfig::default();
        let scheme = CategoryScheme::default();
        let mut session = Session::new();

        session.add(rater("a", &[1, 1, 2, 2]));
        let b = session.add(rater("b", &[1, 2, 2, 2]));
        session.recalculate(&config, &scheme).unwrap();
        assert_eq!(session.last_run().status, RunState::Complete);
        let report = session.last_report().cloned().unwrap();

        session.remove(b);
        session.recalculate(&config, &scheme).unwrap();
        assert_eq!(session.last_run().status, RunState::InsufficientRaters);
        assert_eq!(session.last_report(), Some(&report));
    }

    #[test]
    fn test_run_state_serializes_snake_case() {
        let session = Session::new();
        let value = serde_json::to_value(session.last_run()).unwrap();
        assert_eq!(value["status"], "idle");
        assert_eq!(
            serde_json::to_value(RunState::InsufficientRaters).unwrap(),
            "insufficient_raters"
        );
    }
}
