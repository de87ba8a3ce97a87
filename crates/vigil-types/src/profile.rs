//! Patient profile consumed by the analysis prompts.
//!
//! The profile is edited out-of-band (dashboard form or by hand) and read by
//! the pipeline at the start of every cycle.  Deserialisation is lenient:
//! numbers are accepted where strings are expected and malformed list fields
//! collapse to empty lists, so a hand-edited file never blocks observation.

use chrono::NaiveDate;
use serde::de::{Deserializer, IgnoredAny};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures raised when a profile is submitted for saving.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Name and age are required")]
    MissingIdentity,
    #[error("Diagnosis is required")]
    MissingDiagnosis,
    #[error("Reason for monitoring is required")]
    MissingReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub age: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gender: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub height: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub weight: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub diagnosis: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub symptoms: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub medications: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub allergies: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub medical_history: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub concerns: Vec<String>,
}

/// The monitored person's profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProfile {
    #[serde(default)]
    pub personal: PersonalInfo,
    #[serde(default)]
    pub medical: MedicalInfo,
    #[serde(default)]
    pub monitoring: MonitoringInfo,
}

impl PatientProfile {
    /// The blank profile written when none exists yet.  Only the monitoring
    /// start date is filled in.
    pub fn blank(today: NaiveDate) -> Self {
        let mut profile = Self::default();
        profile.monitoring.start_date = today.format("%Y-%m-%d").to_string();
        profile
    }

    /// Check the fields the editing form requires.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.personal.name.trim().is_empty() || self.personal.age.trim().is_empty() {
            return Err(ProfileError::MissingIdentity);
        }
        if self.medical.diagnosis.trim().is_empty() {
            return Err(ProfileError::MissingDiagnosis);
        }
        if self.monitoring.reason.trim().is_empty() {
            return Err(ProfileError::MissingReason);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringLike {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<StringLike>::deserialize(deserializer)? {
        Some(StringLike::Text(s)) => s,
        Some(StringLike::Integer(n)) => n.to_string(),
        Some(StringLike::Float(n)) => n.to_string(),
        Some(StringLike::Flag(b)) => b.to_string(),
        None => String::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListLike {
    List(Vec<String>),
    Other(IgnoredAny),
}

fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match ListLike::deserialize(deserializer)? {
        ListLike::List(items) => items,
        ListLike::Other(_) => Vec::new(),
    })
}
