//! Patient profile persistence (`patient_info.json`).

use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, warn};
use vigil_types::PatientProfile;

use crate::StoreError;
use crate::json_file::{read_json, write_json_atomic};

/// Default file name of the patient profile.
pub const PROFILE_FILE: &str = "patient_info.json";

/// Read the profile at `path`.  `Ok(None)` when the file does not exist.
pub fn load_profile(path: &Path) -> Result<Option<PatientProfile>, StoreError> {
    let Some(value) = read_json(path)? else {
        return Ok(None);
    };
    let profile = serde_json::from_value(value).map_err(|e| StoreError::Malformed {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    Ok(Some(profile))
}

/// Read the profile, creating and persisting the blank default when it is
/// absent.  An unreadable profile yields the default without overwriting the
/// file, so a hand-edited profile with a typo is never clobbered.
pub fn load_or_init_profile(path: &Path, today: NaiveDate) -> PatientProfile {
    match load_profile(path) {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            let profile = PatientProfile::blank(today);
            match save_profile(path, &profile) {
                Ok(()) => info!(path = %path.display(), "created default patient profile"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not persist default patient profile"),
            }
            profile
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "patient profile unreadable; using defaults");
            PatientProfile::blank(today)
        }
    }
}

pub fn save_profile(path: &Path, profile: &PatientProfile) -> Result<(), StoreError> {
    write_json_atomic(path, profile)
}
