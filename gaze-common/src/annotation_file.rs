//! Annotation file parsing
//!
//! Reads the two-element JSON array written by the annotation tool:
//!
//! ```json
//! [
//!   { "annotatorName": "A", "videoTitle": "consult-01.mp4" },
//!   { "manualAnnotations": { "rightPersonGaze": [{"startFrame": 0, "endFrame": 9}] },
//!     "videoInfo": { "totalFrames": 1000, "frameInterval": 1 } }
//! ]
//! ```
//!
//! Missing categories (or a missing `manualAnnotations` object) contribute no
//! ranges. A file that cannot be read as this shape at all is rejected with an
//! error naming the file.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::model::{AnnotationRange, CategoryScheme, Subject, VideoInfo};
use crate::{Error, Result};

/// Parsed annotation file, ranges keyed by subject and category code
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationFile {
    /// File name the annotations were loaded from
    pub name: String,
    /// `annotatorName` from the metadata element
    pub annotator: Option<String>,
    /// `videoTitle` or `videoFile` from the metadata element
    pub video: Option<String>,
    pub video_info: VideoInfo,
    doctor: BTreeMap<u8, Vec<AnnotationRange>>,
    patient: BTreeMap<u8, Vec<AnnotationRange>>,
}

impl AnnotationFile {
    /// Empty file, used when building annotations programmatically
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotator: None,
            video: None,
            video_info: VideoInfo::default(),
            doctor: BTreeMap::new(),
            patient: BTreeMap::new(),
        }
    }

    /// Read and parse a file from disk, named by its file name
    pub fn load(path: &Path, scheme: &CategoryScheme) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::malformed(&name, format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&name, &text, scheme)
    }

    /// Parse file contents
    pub fn parse(name: &str, text: &str, scheme: &CategoryScheme) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::malformed(name, format!("not valid JSON: {}", e)))?;
        Self::from_value(name, &value, scheme)
    }

    /// Interpret an already-decoded JSON document
    pub fn from_value(name: &str, value: &Value, scheme: &CategoryScheme) -> Result<Self> {
        let elements = value
            .as_array()
            .ok_or_else(|| Error::malformed(name, "top-level value must be an array"))?;

        let mut file = AnnotationFile::new(name);

        // Metadata element is optional; the annotation element is the first
        // object carrying manualAnnotations or videoInfo, normally index 1.
        if let Some(meta) = elements.first().and_then(Value::as_object) {
            file.annotator = meta
                .get("annotatorName")
                .and_then(Value::as_str)
                .map(str::to_string);
            file.video = meta
                .get("videoTitle")
                .or_else(|| meta.get("videoFile"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        let body = elements
            .iter()
            .filter_map(Value::as_object)
            .find(|obj| obj.contains_key("manualAnnotations") || obj.contains_key("videoInfo"))
            .ok_or_else(|| {
                Error::malformed(name, "no element with manualAnnotations or videoInfo")
            })?;

        if let Some(info) = body.get("videoInfo") {
            file.video_info = parse_video_info(name, info);
        }

        match body.get("manualAnnotations") {
            Some(Value::Object(annotations)) => {
                file.read_annotations(annotations, scheme)?;
            }
            Some(_) => {
                warn!(file = %name, "manualAnnotations is not an object, treating file as empty");
            }
            None => {
                debug!(file = %name, "no manualAnnotations, treating file as empty");
            }
        }

        Ok(file)
    }

    fn read_annotations(&mut self, annotations: &Map<String, Value>, scheme: &CategoryScheme) -> Result<()> {
        for (key, value) in annotations {
            let target = Subject::ALL
                .iter()
                .find_map(|&s| scheme.subject(s).by_key(key).map(|def| (s, def.code)));

            let Some((subject, code)) = target else {
                debug!(file = %self.name, key = %key, "ignoring unknown annotation key");
                continue;
            };

            let Some(entries) = value.as_array() else {
                warn!(file = %self.name, key = %key, "category is not a list, treating as empty");
                continue;
            };

            let mut ranges = Vec::with_capacity(entries.len());
            for (index, entry) in entries.iter().enumerate() {
                ranges.push(parse_range(&self.name, key, index, entry)?);
            }
            self.insert_ranges(subject, code, ranges);
        }
        Ok(())
    }

    /// Append ranges for one category
    pub fn insert_ranges(&mut self, subject: Subject, code: u8, ranges: Vec<AnnotationRange>) {
        let map = match subject {
            Subject::Doctor => &mut self.doctor,
            Subject::Patient => &mut self.patient,
        };
        map.entry(code).or_default().extend(ranges);
    }

    /// Ranges recorded for one category, empty when absent
    pub fn ranges(&self, subject: Subject, code: u8) -> &[AnnotationRange] {
        let map = match subject {
            Subject::Doctor => &self.doctor,
            Subject::Patient => &self.patient,
        };
        map.get(&code).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of ranges across both subjects
    pub fn range_count(&self) -> usize {
        self.doctor.values().chain(self.patient.values()).map(Vec::len).sum()
    }
}

fn parse_video_info(file: &str, value: &Value) -> VideoInfo {
    match serde_json::from_value::<VideoInfo>(value.clone()) {
        Ok(info) => info,
        Err(e) => {
            warn!(file = %file, error = %e, "unreadable videoInfo, using defaults");
            VideoInfo::default()
        }
    }
}

fn parse_range(file: &str, key: &str, index: usize, entry: &Value) -> Result<AnnotationRange> {
    let frame = |field: &str| -> Result<u32> {
        let raw = entry.get(field).ok_or_else(|| {
            Error::malformed(file, format!("{}[{}] is missing {}", key, index, field))
        })?;
        frame_number(raw).ok_or_else(|| {
            Error::malformed(
                file,
                format!("{}[{}].{} is not a frame number: {}", key, index, field, raw),
            )
        })
    };

    let start = frame("startFrame")?;
    let end = frame("endFrame")?;
    if end < start {
        return Err(Error::malformed(
            file,
            format!("{}[{}] ends at {} before it starts at {}", key, index, end, start),
        ));
    }
    Ok(AnnotationRange::new(start, end))
}

/// Accepts non-negative integers, including integral floats such as `12.0`
fn frame_number(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
        Some(f as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scheme() -> CategoryScheme {
        CategoryScheme::default()
    }

    #[test]
    fn test_parse_full_file() {
        let text = json!([
            { "annotatorName": "Ana", "videoTitle": "consult.mp4" },
            {
                "manualAnnotations": {
                    "rightPersonGaze": [{ "startFrame": 0, "endFrame": 9 }],
                    "rightPersonScreen": [{ "startFrame": 10, "endFrame": 19 }],
                    "leftPersonElsewhere": [{ "startFrame": 5, "endFrame": 5 }]
                },
                "videoInfo": { "totalFrames": 300, "frameInterval": 1 }
            }
        ])
        .to_string();

        let file = AnnotationFile::parse("ana.json", &text, &scheme()).unwrap();
        assert_eq!(file.annotator.as_deref(), Some("Ana"));
        assert_eq!(file.video.as_deref(), Some("consult.mp4"));
        assert_eq!(file.video_info.total_frames, Some(300));
        assert_eq!(file.ranges(Subject::Doctor, 1), &[AnnotationRange::new(0, 9)]);
        assert_eq!(file.ranges(Subject::Doctor, 2), &[AnnotationRange::new(10, 19)]);
        assert_eq!(file.ranges(Subject::Patient, 3), &[AnnotationRange::new(5, 5)]);
        assert!(file.ranges(Subject::Patient, 1).is_empty());
        assert_eq!(file.range_count(), 3);
    }

    #[test]
    fn test_video_file_fallback_and_missing_annotations() {
        let text = json!([
            { "videoFile": "clip.mov" },
            { "videoInfo": { "totalFrames": 10 } }
        ])
        .to_string();

        let file = AnnotationFile::parse("b.json", &text, &scheme()).unwrap();
        assert_eq!(file.video.as_deref(), Some("clip.mov"));
        assert_eq!(file.range_count(), 0);
        assert_eq!(file.video_info.frame_interval, None);
    }

    #[test]
    fn test_non_list_category_is_empty() {
        let text = json!([
            {},
            { "manualAnnotations": { "rightPersonGaze": "oops", "leftPersonGaze": [] } }
        ])
        .to_string();

        let file = AnnotationFile::parse("c.json", &text, &scheme()).unwrap();
        assert_eq!(file.range_count(), 0);
    }

    #[test]
    fn test_unparseable_file_names_file() {
        let err = AnnotationFile::parse("broken.json", "{ not json", &scheme()).unwrap_err();
        match err {
            Error::MalformedFile { file, .. } => assert_eq!(file, "broken.json"),
            other => panic!("unexpected error: {:?}", other),
        }

        let err = AnnotationFile::parse("object.json", "{}", &scheme()).unwrap_err();
        assert!(err.to_string().contains("object.json"));

        let err = AnnotationFile::parse("meta-only.json", "[{}]", &scheme()).unwrap_err();
        assert!(matches!(err, Error::MalformedFile { .. }));
    }

    #[test]
    fn test_reversed_range_rejected() {
        let text = json!([
            {},
            { "manualAnnotations": { "rightPersonGaze": [{ "startFrame": 9, "endFrame": 2 }] } }
        ])
        .to_string();

        let err = AnnotationFile::parse("rev.json", &text, &scheme()).unwrap_err();
        assert!(err.to_string().contains("rightPersonGaze[0]"));
    }

    #[test]
    fn test_negative_and_missing_frames_rejected() {
        let negative = json!([
            {},
            { "manualAnnotations": { "leftPersonGaze": [{ "startFrame": -1, "endFrame": 2 }] } }
        ])
        .to_string();
        assert!(AnnotationFile::parse("neg.json", &negative, &scheme()).is_err());

        let missing = json!([
            {},
            { "manualAnnotations": { "leftPersonGaze": [{ "startFrame": 1 }] } }
        ])
        .to_string();
        assert!(AnnotationFile::parse("missing.json", &missing, &scheme()).is_err());
    }

    #[test]
    fn test_integral_float_frames_accepted() {
        let text = json!([
            {},
            { "manualAnnotations": { "rightPersonGaze": [{ "startFrame": 3.0, "endFrame": 4.0 }] } }
        ])
        .to_string();

        let file = AnnotationFile::parse("f.json", &text, &scheme()).unwrap();
        assert_eq!(file.ranges(Subject::Doctor, 1), &[AnnotationRange::new(3, 4)]);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let text = json!([
            {},
            { "manualAnnotations": { "somethingElse": [1, 2, 3] } }
        ])
        .to_string();

        let file = AnnotationFile::parse("u.json", &text, &scheme()).unwrap();
        assert_eq!(file.range_count(), 0);
    }

    #[test]
    fn test_load_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rater-a.json");
        std::fs::write(
            &path,
            json!([{}, { "manualAnnotations": {} }]).to_string(),
        )
        .unwrap();

        let file = AnnotationFile::load(&path, &scheme()).unwrap();
        assert_eq!(file.name, "rater-a.json");
    }

    #[test]
    fn test_unreadable_file_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.json");
        std::fs::write(&path, [b'[', 0xE9, b']']).unwrap();

        match AnnotationFile::load(&path, &scheme()).unwrap_err() {
            Error::MalformedFile { file, .. } => assert_eq!(file, "latin1.json"),
            other => panic!("unexpected error: {:?}", other),
        }

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            AnnotationFile::load(&missing, &scheme()),
            Err(Error::MalformedFile { file, .. }) if file == "missing.json"
        ));
    }
}
