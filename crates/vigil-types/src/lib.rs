//! `vigil-types` – shared vocabulary of the observation pipeline.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: the two timestamped record kinds, the knowledge categories, the
//! patient profile, and the global [`VigilError`].

pub mod profile;

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use profile::{MedicalInfo, MonitoringInfo, PatientProfile, PersonalInfo, ProfileError};

// ─────────────────────────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem-safe timestamp used for caption records and snapshot names.
pub const CAPTURE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Canonical timestamp used for analysis records.
pub const ANALYSIS_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format `at` as a capture timestamp, e.g. `2024-03-01_14-05-09`.
pub fn capture_timestamp(at: &NaiveDateTime) -> String {
    at.format(CAPTURE_TIMESTAMP_FORMAT).to_string()
}

/// Format `at` as an analysis timestamp, e.g. `2024-03-01 14:05:09`.
pub fn analysis_timestamp(at: &NaiveDateTime) -> String {
    at.format(ANALYSIS_TIMESTAMP_FORMAT).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Store identifier of the caption log.
pub const CAPTION_STORE: &str = "captions";

/// Store identifier of the behaviour-analysis log.
pub const ANALYSIS_STORE: &str = "behavior_analysis";

/// A timestamped, immutable unit of observation data.
///
/// The timestamp is the natural key of the record inside its store.
pub trait Record: Serialize {
    /// Identifier of the store this record kind lives in.
    const STORE: &'static str;

    /// The record's natural key.
    fn timestamp(&self) -> &str;
}

/// One caption produced from one captured frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub timestamp: String,
    pub caption: String,
    pub image_path: String,
}

impl Record for CaptionRecord {
    const STORE: &'static str = CAPTION_STORE;

    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

/// The five behaviour fields extracted from an analysis response.
///
/// Any field may be empty when the analysis service omitted it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub posture: String,
    #[serde(default)]
    pub emotion: String,
    #[serde(default)]
    pub activity: String,
    #[serde(default)]
    pub medical_relevance: String,
}

impl Behavior {
    /// Output fields the behaviour-analysis prompt asks for, in prompt order.
    pub const FIELDS: [&'static str; 5] =
        ["action", "posture", "emotion", "activity", "medical_relevance"];

    /// Build from a field lookup; missing keys become empty strings.
    pub fn from_lookup<'a>(mut get: impl FnMut(&str) -> Option<&'a str>) -> Self {
        let mut field = |key: &str| get(key).unwrap_or_default().to_string();
        Self {
            action: field("action"),
            posture: field("posture"),
            emotion: field("emotion"),
            activity: field("activity"),
            medical_relevance: field("medical_relevance"),
        }
    }
}

/// One behaviour analysis of one caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub timestamp: String,
    pub behavior: Behavior,
}

impl Record for AnalysisRecord {
    const STORE: &'static str = ANALYSIS_STORE;

    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge categories
// ─────────────────────────────────────────────────────────────────────────────

/// The fixed partitions of the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    Appearance,
    Behaviors,
    Environment,
    MedicalIndicators,
}

impl KnowledgeCategory {
    /// All categories in persisted order.
    pub const ALL: [KnowledgeCategory; 4] = [
        KnowledgeCategory::Appearance,
        KnowledgeCategory::Behaviors,
        KnowledgeCategory::Environment,
        KnowledgeCategory::MedicalIndicators,
    ];

    /// Key of the category in the persisted knowledge base.
    pub fn key(self) -> &'static str {
        match self {
            KnowledgeCategory::Appearance => "appearance",
            KnowledgeCategory::Behaviors => "behaviors",
            KnowledgeCategory::Environment => "environment",
            KnowledgeCategory::MedicalIndicators => "medical_indicators",
        }
    }

    /// Output field the knowledge-extraction prompt uses for this category.
    ///
    /// The prompt asks for the singular `behavior`; the base stores it under
    /// the plural `behaviors`.
    pub fn extraction_field(self) -> &'static str {
        match self {
            KnowledgeCategory::Behaviors => "behavior",
            other => other.key(),
        }
    }

    /// Output fields of the knowledge-extraction prompt, in prompt order.
    pub fn extraction_fields() -> [&'static str; 4] {
        Self::ALL.map(Self::extraction_field)
    }
}

impl fmt::Display for KnowledgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One candidate fact per category, as extracted from a single caption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeFacts {
    #[serde(default)]
    pub appearance: String,
    #[serde(default)]
    pub behaviors: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub medical_indicators: String,
}

impl KnowledgeFacts {
    /// Build from a lookup keyed by [`KnowledgeCategory::extraction_field`].
    pub fn from_lookup<'a>(mut get: impl FnMut(&str) -> Option<&'a str>) -> Self {
        let mut facts = Self::default();
        for category in KnowledgeCategory::ALL {
            if let Some(value) = get(category.extraction_field()) {
                *facts.get_mut(category) = value.to_string();
            }
        }
        facts
    }

    pub fn get(&self, category: KnowledgeCategory) -> &str {
        match category {
            KnowledgeCategory::Appearance => &self.appearance,
            KnowledgeCategory::Behaviors => &self.behaviors,
            KnowledgeCategory::Environment => &self.environment,
            KnowledgeCategory::MedicalIndicators => &self.medical_indicators,
        }
    }

    fn get_mut(&mut self, category: KnowledgeCategory) -> &mut String {
        match category {
            KnowledgeCategory::Appearance => &mut self.appearance,
            KnowledgeCategory::Behaviors => &mut self.behaviors,
            KnowledgeCategory::Environment => &mut self.environment,
            KnowledgeCategory::MedicalIndicators => &mut self.medical_indicators,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observation events
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of one finished cycle, broadcast to dashboard subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationEvent {
    pub cycle_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed {
        caption: String,
        behavior: Behavior,
        facts_added: usize,
    },
    Failed {
        stage: String,
        message: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type spanning capture faults, capability failures and
/// persistence problems.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum VigilError {
    #[error("Capture fault on {device}: {details}")]
    Capture { device: String, details: String },

    #[error("Captioning failed: {0}")]
    CaptionFailed(String),

    #[error("Text analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
