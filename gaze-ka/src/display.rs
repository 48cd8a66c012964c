//! Display palette and timeline layout
//!
//! Colours and CSS classes are data handed to the presentation layer; nothing
//! in the agreement engines depends on them.

use serde::Serialize;
use std::collections::BTreeMap;

use gaze_common::model::SubjectScheme;
use gaze_common::ranges::{collapse, SparseSequence};
use gaze_common::{CategoryScheme, Subject};

pub const RED: &str = "#ef4444";
pub const BLUE: &str = "#3b82f6";
pub const GRAY: &str = "#9ca3af";
/// Timeline background (no annotation)
pub const BACKGROUND: &str = "#e5e7eb";
/// Kappa cell class when kappa is undefined
pub const KAPPA_UNAVAILABLE: &str = "bg-gray-100";

/// Inclusive upper bounds and classes for kappa cells, lowest band first
const KAPPA_BANDS: [(Option<f64>, &str); 6] = [
    (Some(0.0), "bg-red-100"),
    (Some(0.2), "bg-red-50"),
    (Some(0.4), "bg-yellow-50"),
    (Some(0.6), "bg-yellow-100"),
    (Some(0.8), "bg-green-100"),
    (None, "bg-green-200"),
];

/// Label and colour for one category code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStyle {
    pub label: String,
    pub color: String,
}

/// Background class for kappa values up to `up_to`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KappaBand {
    /// Inclusive upper bound; `None` for the top band
    pub up_to: Option<f64>,
    pub class: String,
}

/// Category colours for both subjects and kappa cell classes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Palette {
    pub doctor: BTreeMap<u8, CategoryStyle>,
    pub patient: BTreeMap<u8, CategoryStyle>,
    pub background: String,
    /// Colour for codes outside the scheme
    pub fallback: String,
    pub kappa_bands: Vec<KappaBand>,
    pub kappa_unavailable: String,
}

impl Palette {
    /// Code 1 (the other person) red, code 2 (screen) blue, anything else gray
    pub fn for_scheme(scheme: &CategoryScheme) -> Self {
        Self {
            doctor: styles(&scheme.doctor),
            patient: styles(&scheme.patient),
            background: BACKGROUND.to_string(),
            fallback: GRAY.to_string(),
            kappa_bands: KAPPA_BANDS
                .iter()
                .map(|&(up_to, class)| KappaBand {
                    up_to,
                    class: class.to_string(),
                })
                .collect(),
            kappa_unavailable: KAPPA_UNAVAILABLE.to_string(),
        }
    }

    pub fn style(&self, subject: Subject, code: u8) -> Option<&CategoryStyle> {
        match subject {
            Subject::Doctor => self.doctor.get(&code),
            Subject::Patient => self.patient.get(&code),
        }
    }

    pub fn color(&self, subject: Subject, code: u8) -> &str {
        self.style(subject, code)
            .map(|s| s.color.as_str())
            .unwrap_or(self.fallback.as_str())
    }

    /// Background class for a kappa cell, bucketed on the unrounded value
    pub fn kappa_class(&self, kappa: f64) -> &str {
        if kappa.is_nan() {
            return &self.kappa_unavailable;
        }
        self.kappa_bands
            .iter()
            .find(|band| band.up_to.map_or(true, |bound| kappa <= bound))
            .map(|band| band.class.as_str())
            .unwrap_or(self.kappa_unavailable.as_str())
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::for_scheme(&CategoryScheme::default())
    }
}

fn styles(scheme: &SubjectScheme) -> BTreeMap<u8, CategoryStyle> {
    scheme
        .categories
        .iter()
        .map(|def| {
            let color = match def.code {
                1 => RED,
                2 => BLUE,
                _ => GRAY,
            };
            (
                def.code,
                CategoryStyle {
                    label: def.label.clone(),
                    color: color.to_string(),
                },
            )
        })
        .collect()
}

/// One coloured bar of a timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSegment {
    pub start_frame: u32,
    pub end_frame: u32,
    pub code: u8,
    pub color: String,
    pub x: u32,
    pub width: u32,
}

/// Lay out a sequence's runs on a strip `width` pixels wide
///
/// Frames map to `floor(frame / total_frames * width)`; every run gets at
/// least one pixel.
pub fn timeline_segments(
    sequence: &SparseSequence,
    subject: Subject,
    total_frames: u32,
    width: u32,
    palette: &Palette,
) -> Vec<TimelineSegment> {
    if total_frames == 0 || width == 0 {
        return Vec::new();
    }
    let scale = f64::from(width) / f64::from(total_frames);
    let to_x = |frame: u32| (f64::from(frame) * scale).floor() as u32;

    collapse(sequence)
        .into_iter()
        .map(|run| {
            let start_x = to_x(run.start);
            let end_x = to_x(run.end);
            TimelineSegment {
                start_frame: run.start,
                end_frame: run.end,
                code: run.code,
                color: palette.color(subject, run.code).to_string(),
                x: start_x,
                width: end_x.saturating_sub(start_x).max(1),
            }
        })
        .collect()
}
