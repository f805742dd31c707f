use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Schema version a dataset conforms to.
///
/// The version tag determines action/observation dimensionality, the
/// camera set, and the file-layout convention (episode-per-file for
/// `v2.1`, size-consolidated files for `v3.0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    V21,
    V30,
}

impl SchemaVersion {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::V21 => "v2.1",
            Self::V30 => "v3.0",
        }
    }

    pub fn parse(tag: &str) -> Result<Self, SchemaError> {
        // Accept patch-level tags like "v2.1.1" which exist in the wild.
        if tag == "v3.0" || tag.starts_with("v3.") {
            Ok(Self::V30)
        } else if tag == "v2.1" || tag.starts_with("v2.") {
            Ok(Self::V21)
        } else {
            Err(SchemaError::UnknownVersion(tag.to_string()))
        }
    }

    /// Expected action/observation dimensionality under this version.
    pub fn expected_dim(&self) -> usize {
        match self {
            Self::V21 => 12,
            Self::V30 => 15,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Self::parse(&tag).map_err(serde::de::Error::custom)
    }
}

/// Data type of a dataset feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Video,
    Image,
    Float32,
    Float64,
    Int64,
    Int16,
    Bool,
    String,
}

/// Names attached to a feature's dimensions.
///
/// `info.json` stores these either as a flat list (`["height", "width",
/// "channels"]`) or as a single-key nested map (`{"motors": [...]}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureNames {
    List(Vec<String>),
    Nested(BTreeMap<String, Vec<String>>),
}

impl FeatureNames {
    /// Flat view of the names regardless of storage form.
    pub fn as_flat(&self) -> Vec<&str> {
        match self {
            Self::List(names) => names.iter().map(String::as_str).collect(),
            Self::Nested(map) => map
                .values()
                .flat_map(|names| names.iter().map(String::as_str))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::List(names) => names.len(),
            Self::Nested(map) => map.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encoding parameters of a video feature, as declared in `info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(rename = "video.height")]
    pub height: u32,
    #[serde(rename = "video.width")]
    pub width: u32,
    #[serde(rename = "video.codec")]
    pub codec: String,
    #[serde(rename = "video.pix_fmt")]
    pub pix_fmt: String,
    #[serde(rename = "video.is_depth_map")]
    pub is_depth_map: bool,
    #[serde(rename = "video.fps")]
    pub fps: u32,
    #[serde(rename = "video.channels")]
    pub channels: u32,
    pub has_audio: bool,
}

impl VideoInfo {
    /// Standard declaration for an RGB camera stream.
    pub fn rgb(width: u32, height: u32, fps: u32, codec: &str) -> Self {
        Self {
            height,
            width,
            codec: codec.to_string(),
            pix_fmt: "yuv420p".to_string(),
            is_depth_map: false,
            fps,
            channels: 3,
            has_audio: false,
        }
    }
}

/// A single feature declaration from `info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub dtype: DType,
    pub shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<FeatureNames>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<VideoInfo>,
}

impl Feature {
    /// Vector feature (action, observation.state) with per-dimension names.
    pub fn vector(names: Vec<String>) -> Self {
        Self {
            dtype: DType::Float32,
            shape: vec![names.len()],
            names: Some(FeatureNames::List(names)),
            info: None,
        }
    }

    /// Camera stream feature at the given resolution.
    pub fn camera(width: u32, height: u32, fps: u32, codec: &str) -> Self {
        Self {
            dtype: DType::Video,
            shape: vec![height as usize, width as usize, 3],
            names: Some(FeatureNames::List(vec![
                "height".to_string(),
                "width".to_string(),
                "channels".to_string(),
            ])),
            info: Some(VideoInfo::rgb(width, height, fps, codec)),
        }
    }

    /// Leading dimension, for vector features this is the dimensionality.
    pub fn dim(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_tags_round_trip() {
        assert_eq!(SchemaVersion::parse("v2.1").unwrap(), SchemaVersion::V21);
        assert_eq!(SchemaVersion::parse("v2.1.1").unwrap(), SchemaVersion::V21);
        assert_eq!(SchemaVersion::parse("v3.0").unwrap(), SchemaVersion::V30);
        assert_eq!(SchemaVersion::V30.as_tag(), "v3.0");
        assert!(SchemaVersion::parse("v1.6").is_err());
    }

    #[test]
    fn version_expected_dims() {
        assert_eq!(SchemaVersion::V21.expected_dim(), 12);
        assert_eq!(SchemaVersion::V30.expected_dim(), 15);
    }

    #[test]
    fn feature_names_deserialize_both_forms() {
        let flat: FeatureNames =
            serde_json::from_str(r#"["height", "width", "channels"]"#).unwrap();
        assert_eq!(flat.len(), 3);

        let nested: FeatureNames =
            serde_json::from_str(r#"{"motors": ["a.pos", "b.pos"]}"#).unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested.as_flat(), vec!["a.pos", "b.pos"]);
    }

    #[test]
    fn video_info_uses_dotted_keys() {
        let info = VideoInfo::rgb(640, 480, 30, "av1");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["video.height"], 480);
        assert_eq!(json["video.width"], 640);
        assert_eq!(json["video.fps"], 30);
        assert_eq!(json["has_audio"], false);
    }

    #[test]
    fn camera_feature_shape_is_hwc() {
        let feature = Feature::camera(1280, 720, 30, "av1");
        assert_eq!(feature.shape, vec![720, 1280, 3]);
        assert_eq!(feature.dtype, DType::Video);
    }
}
