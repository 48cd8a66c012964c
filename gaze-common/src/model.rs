//! Gaze category model
//!
//! Defines the two annotated subjects, their typed gaze categories and the
//! configurable category scheme that maps annotation-file keys to category
//! codes. Code 0 is reserved for "no annotation" and never appears in a scheme.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::{Error, Result};

/// Annotated person in a consultation video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    /// Right-hand person in the video frame
    Doctor,
    /// Left-hand person in the video frame
    Patient,
}

impl Subject {
    pub const ALL: [Subject; 2] = [Subject::Doctor, Subject::Patient];

    /// Prefix used by annotation-file category keys
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Subject::Doctor => "rightPerson",
            Subject::Patient => "leftPerson",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Doctor => "doctor",
            Subject::Patient => "patient",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the doctor is looking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoctorGaze {
    None,
    Patient,
    Screen,
    Elsewhere,
}

impl DoctorGaze {
    /// Annotatable categories in expansion priority order
    pub const ANNOTATED: [DoctorGaze; 3] =
        [DoctorGaze::Patient, DoctorGaze::Screen, DoctorGaze::Elsewhere];

    pub fn code(&self) -> u8 {
        match self {
            DoctorGaze::None => 0,
            DoctorGaze::Patient => 1,
            DoctorGaze::Screen => 2,
            DoctorGaze::Elsewhere => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DoctorGaze::None),
            1 => Some(DoctorGaze::Patient),
            2 => Some(DoctorGaze::Screen),
            3 => Some(DoctorGaze::Elsewhere),
            _ => None,
        }
    }

    /// Annotation-file key, `None` has no key
    pub fn json_key(&self) -> Option<&'static str> {
        match self {
            DoctorGaze::None => None,
            DoctorGaze::Patient => Some("rightPersonGaze"),
            DoctorGaze::Screen => Some("rightPersonScreen"),
            DoctorGaze::Elsewhere => Some("rightPersonElsewhere"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DoctorGaze::None => "No interaction",
            DoctorGaze::Patient => "Looking at patient",
            DoctorGaze::Screen => "Looking at screen",
            DoctorGaze::Elsewhere => "Looking elsewhere",
        }
    }
}

/// Where the patient is looking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatientGaze {
    None,
    Doctor,
    Screen,
    Elsewhere,
}

impl PatientGaze {
    /// Annotatable categories in expansion priority order
    pub const ANNOTATED: [PatientGaze; 3] =
        [PatientGaze::Doctor, PatientGaze::Screen, PatientGaze::Elsewhere];

    pub fn code(&self) -> u8 {
        match self {
            PatientGaze::None => 0,
            PatientGaze::Doctor => 1,
            PatientGaze::Screen => 2,
            PatientGaze::Elsewhere => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PatientGaze::None),
            1 => Some(PatientGaze::Doctor),
            2 => Some(PatientGaze::Screen),
            3 => Some(PatientGaze::Elsewhere),
            _ => None,
        }
    }

    pub fn json_key(&self) -> Option<&'static str> {
        match self {
            PatientGaze::None => None,
            PatientGaze::Doctor => Some("leftPersonGaze"),
            PatientGaze::Screen => Some("leftPersonScreen"),
            PatientGaze::Elsewhere => Some("leftPersonElsewhere"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PatientGaze::None => "No interaction",
            PatientGaze::Doctor => "Looking at doctor",
            PatientGaze::Screen => "Looking at screen",
            PatientGaze::Elsewhere => "Looking elsewhere",
        }
    }
}

/// One category of a subject scheme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDef {
    /// Category code (1-255, 0 is reserved)
    pub code: u8,
    /// Annotation-file key holding this category's ranges
    pub key: String,
    /// Human-readable label
    pub label: String,
}

impl CategoryDef {
    pub fn new(code: u8, key: &str, label: &str) -> Self {
        Self {
            code,
            key: key.to_string(),
            label: label.to_string(),
        }
    }
}

/// Ordered category list for one subject
///
/// List order is the expansion priority order: when ranges of two categories
/// cover the same frame, the later category wins under
/// [`OverlapPolicy::PriorityOverride`](crate::ranges::OverlapPolicy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectScheme {
    pub categories: Vec<CategoryDef>,
}

impl SubjectScheme {
    pub fn doctor_default() -> Self {
        Self {
            categories: DoctorGaze::ANNOTATED
                .iter()
                .filter_map(|g| g.json_key().map(|key| CategoryDef::new(g.code(), key, g.label())))
                .collect(),
        }
    }

    pub fn patient_default() -> Self {
        Self {
            categories: PatientGaze::ANNOTATED
                .iter()
                .filter_map(|g| g.json_key().map(|key| CategoryDef::new(g.code(), key, g.label())))
                .collect(),
        }
    }

    /// Patient scheme for files produced without a patient screen category
    pub fn patient_without_screen() -> Self {
        let mut scheme = Self::patient_default();
        scheme
            .categories
            .retain(|c| c.code != PatientGaze::Screen.code());
        scheme
    }

    /// Category codes in priority order (the category universe, K = len)
    pub fn codes(&self) -> Vec<u8> {
        self.categories.iter().map(|c| c.code).collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn by_key(&self, key: &str) -> Option<&CategoryDef> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn by_code(&self, code: u8) -> Option<&CategoryDef> {
        self.categories.iter().find(|c| c.code == code)
    }

    /// Label for a code, falling back to the code itself
    pub fn label(&self, code: u8) -> String {
        match self.by_code(code) {
            Some(def) => def.label.clone(),
            None if code == 0 => "No annotation".to_string(),
            None => format!("category {}", code),
        }
    }

    /// Reject empty schemes, reserved or duplicated codes and duplicated keys
    pub fn validate(&self, subject: Subject) -> Result<()> {
        if self.categories.is_empty() {
            return Err(Error::Config(format!("{} scheme has no categories", subject)));
        }

        let mut codes = HashSet::new();
        let mut keys = HashSet::new();
        for def in &self.categories {
            if def.code == 0 {
                return Err(Error::Config(format!(
                    "{} category '{}' uses reserved code 0",
                    subject, def.key
                )));
            }
            if !codes.insert(def.code) {
                return Err(Error::Config(format!(
                    "{} scheme repeats code {}",
                    subject, def.code
                )));
            }
            if !keys.insert(def.key.as_str()) {
                return Err(Error::Config(format!(
                    "{} scheme repeats key '{}'",
                    subject, def.key
                )));
            }
        }
        Ok(())
    }
}

/// Category schemes for both subjects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryScheme {
    pub doctor: SubjectScheme,
    pub patient: SubjectScheme,
}

impl Default for CategoryScheme {
    fn default() -> Self {
        Self {
            doctor: SubjectScheme::doctor_default(),
            patient: SubjectScheme::patient_default(),
        }
    }
}

impl CategoryScheme {
    pub fn subject(&self, subject: Subject) -> &SubjectScheme {
        match subject {
            Subject::Doctor => &self.doctor,
            Subject::Patient => &self.patient,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.doctor.validate(Subject::Doctor)?;
        self.patient.validate(Subject::Patient)?;

        let doctor_keys: HashSet<&str> = self.doctor.categories.iter().map(|c| c.key.as_str()).collect();
        if let Some(shared) = self
            .patient
            .categories
            .iter()
            .find(|c| doctor_keys.contains(c.key.as_str()))
        {
            return Err(Error::Config(format!(
                "key '{}' is used by both subjects",
                shared.key
            )));
        }
        Ok(())
    }
}

/// Contiguous inclusive frame interval assigned to one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRange {
    pub start_frame: u32,
    pub end_frame: u32,
}

impl AnnotationRange {
    pub fn new(start_frame: u32, end_frame: u32) -> Self {
        Self {
            start_frame,
            end_frame,
        }
    }

    pub fn contains(&self, frame: u32) -> bool {
        frame >= self.start_frame && frame <= self.end_frame
    }

    /// Number of frames covered (inclusive bounds)
    pub fn frame_count(&self) -> u64 {
        u64::from(self.end_frame) - u64::from(self.start_frame) + 1
    }
}

/// Frames assumed when a file carries no `totalFrames`
pub const DEFAULT_TOTAL_FRAMES: u32 = 1000;

/// Video facts recorded by the annotation tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    #[serde(default)]
    pub total_frames: Option<u32>,
    #[serde(default)]
    pub frame_interval: Option<u32>,
}

impl VideoInfo {
    pub fn total_frames_or_default(&self) -> u32 {
        match self.total_frames {
            Some(total) if total > 0 => total,
            _ => DEFAULT_TOTAL_FRAMES,
        }
    }
}
