//! Rater files: one annotator's per-frame gaze values for a video

use serde::Serialize;
use std::collections::BTreeSet;

use crate::annotation_file::AnnotationFile;
use crate::interval::detect_interval;
use crate::model::{CategoryScheme, Subject};
use crate::ranges::{expand, ExpandOptions, SparseSequence};
use crate::Result;

/// Annotation file converted to per-frame values, read-only once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaterFile {
    /// Display name (the file name)
    pub name: String,
    pub annotator: Option<String>,
    pub video: Option<String>,
    pub total_frames: u32,
    /// `videoInfo.frameInterval` as written by the annotation tool
    pub declared_interval: Option<u32>,
    pub doctor: SparseSequence,
    pub patient: SparseSequence,
}

impl RaterFile {
    /// Expand every category of both subjects
    pub fn from_annotation_file(
        file: &AnnotationFile,
        scheme: &CategoryScheme,
        options: &ExpandOptions,
    ) -> Result<Self> {
        Ok(Self {
            name: file.name.clone(),
            annotator: file.annotator.clone(),
            video: file.video.clone(),
            total_frames: file.video_info.total_frames_or_default(),
            declared_interval: file.video_info.frame_interval,
            doctor: expand(file, Subject::Doctor, &scheme.doctor, options)?,
            patient: expand(file, Subject::Patient, &scheme.patient, options)?,
        })
    }

    /// Build directly from sequences
    pub fn from_sequences(
        name: impl Into<String>,
        doctor: SparseSequence,
        patient: SparseSequence,
    ) -> Self {
        let total_frames = doctor
            .frames()
            .chain(patient.frames())
            .max()
            .map(|f| f.saturating_add(1))
            .unwrap_or(0);
        Self {
            name: name.into(),
            annotator: None,
            video: None,
            total_frames,
            declared_interval: None,
            doctor,
            patient,
        }
    }

    pub fn sequence(&self, subject: Subject) -> &SparseSequence {
        match subject {
            Subject::Doctor => &self.doctor,
            Subject::Patient => &self.patient,
        }
    }

    /// Frames annotated for either subject, ascending
    pub fn annotated_frames(&self) -> Vec<u32> {
        let frames: BTreeSet<u32> = self.doctor.frames().chain(self.patient.frames()).collect();
        frames.into_iter().collect()
    }

    /// Sampling stride inferred from the annotated frames
    pub fn detected_interval(&self) -> Option<u32> {
        detect_interval(&self.annotated_frames())
    }
}

impl AsRef<RaterFile> for RaterFile {
    fn as_ref(&self) -> &RaterFile {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnnotationRange;

    #[test]
    fn test_from_annotation_file() {
        let mut file = AnnotationFile::new("a.json");
        file.insert_ranges(Subject::Doctor, 1, vec![AnnotationRange::new(0, 4)]);
        file.insert_ranges(Subject::Patient, 3, vec![AnnotationRange::new(3, 8)]);

        let rater = RaterFile::from_annotation_file(
            &file,
            &CategoryScheme::default(),
            &ExpandOptions::default(),
        )
        .unwrap();

        assert_eq!(rater.name, "a.json");
        assert_eq!(rater.total_frames, 1000);
        assert_eq!(rater.doctor.len(), 5);
        assert_eq!(rater.patient.count(3), 6);
        assert_eq!(rater.annotated_frames(), (0..=8).collect::<Vec<u32>>());
        assert_eq!(rater.detected_interval(), Some(1));
    }

    #[test]
    fn test_from_sequences_total_frames() {
        let doctor: SparseSequence = [(0, 1), (9, 2)].into_iter().collect();
        let rater = RaterFile::from_sequences("x", doctor, SparseSequence::new());
        assert_eq!(rater.total_frames, 10);
        assert_eq!(rater.sequence(Subject::Patient).len(), 0);
    }
}
