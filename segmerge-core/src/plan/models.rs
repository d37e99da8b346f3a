use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::error::{PlanError, PlanResult};

/// Video quality level, ordered from best to most degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityTier {
    #[serde(rename = "1080p")]
    High,
    #[serde(rename = "720p")]
    Low,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "1080p",
            QualityTier::Low => "720p",
        }
    }

    /// Next tier to try after a playback failure, if any.
    pub fn fallback(&self) -> Option<QualityTier> {
        match self {
            QualityTier::High => Some(QualityTier::Low),
            QualityTier::Low => None,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1080p" | "high" => Ok(QualityTier::High),
            "720p" | "low" => Ok(QualityTier::Low),
            other => Err(PlanError::InvalidTier(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentVariant {
    Main,
    Explanation,
}

impl SegmentVariant {
    pub fn is_explanation(&self) -> bool {
        matches!(self, SegmentVariant::Explanation)
    }
}

/// Identity of one unit of fetch work; repeated occurrences share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub code: String,
    pub variant: SegmentVariant,
}

impl SegmentKey {
    pub fn main(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            variant: SegmentVariant::Main,
        }
    }

    pub fn explanation(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            variant: SegmentVariant::Explanation,
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            SegmentVariant::Main => write!(f, "{}", self.code),
            SegmentVariant::Explanation => write!(f, "{}_explanation", self.code),
        }
    }
}

/// One concrete occurrence in the flattened, repeat-expanded playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRef {
    pub key: SegmentKey,
    pub position: usize,
}

/// Origin documents send `null` for unset fields as often as they omit them.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub asana_code: String,
    #[serde(default)]
    pub asana_name: Option<String>,
    #[serde(default)]
    pub repeat_count: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub show_explanation_video: bool,
    /// Explicit upstream exclusion; the only way an entry contributes nothing.
    #[serde(default, deserialize_with = "null_as_default")]
    pub excluded: bool,
}

impl PlanEntry {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            asana_code: code.into(),
            ..Self::default()
        }
    }

    pub fn with_repeat(mut self, count: i64) -> Self {
        self.repeat_count = Some(count);
        self
    }

    pub fn with_explanation(mut self) -> Self {
        self.show_explanation_video = true;
        self
    }

    pub fn is_mergeable(&self) -> bool {
        !self.excluded && !self.asana_code.trim().is_empty()
    }

    /// Number of playbacks of the main segment; absent or non-positive counts play once.
    pub fn effective_repeat(&self) -> usize {
        match self.repeat_count {
            Some(count) if count > 0 => count as usize,
            _ => 1,
        }
    }
}

/// Personalised plan document as served by the origin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticePlan {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub asana_list: Vec<PlanEntry>,
}

impl PracticePlan {
    pub fn from_json(contents: &str) -> PlanResult<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> PlanResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        Self::from_json(&contents)
    }
}
