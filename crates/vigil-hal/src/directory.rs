//! [`DirectoryCamera`] – reads frames written by an external grabber.
//!
//! Some deployments already run a capture daemon (e.g. `ffmpeg` or
//! `fswebcam` on a cron) that drops image files into a folder.  This driver
//! returns the most recently modified image in that folder and refuses to
//! return the same file twice, so a stalled grabber shows up as a capture
//! fault instead of a stream of identical observations.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;
use vigil_types::VigilError;

use crate::camera::{Camera, CameraFrame};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct DirectoryCamera {
    id: String,
    dir: PathBuf,
    last_seen: Option<(PathBuf, SystemTime)>,
}

impl DirectoryCamera {
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            dir: dir.into(),
            last_seen: None,
        }
    }

    fn fault(&self, details: impl Into<String>) -> VigilError {
        VigilError::Capture {
            device: self.id.clone(),
            details: details.into(),
        }
    }

    async fn newest_image(&self) -> Result<Option<(PathBuf, SystemTime)>, VigilError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| self.fault(format!("cannot read {}: {e}", self.dir.display())))?;

        let mut newest: Option<(PathBuf, SystemTime)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.fault(format!("directory scan failed: {e}")))?
        {
            let path = entry.path();
            if !is_image(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if newest.as_ref().is_none_or(|(_, t)| modified > *t) {
                newest = Some((path, modified));
            }
        }
        Ok(newest)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[async_trait]
impl Camera for DirectoryCamera {
    fn id(&self) -> &str {
        &self.id
    }

    async fn capture(&mut self) -> Result<CameraFrame, VigilError> {
        let Some((path, modified)) = self.newest_image().await? else {
            return Err(self.fault(format!("no images in {}", self.dir.display())));
        };
        if self.last_seen.as_ref() == Some(&(path.clone(), modified)) {
            return Err(self.fault("no new frame since last capture"));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| self.fault(format!("cannot read {}: {e}", path.display())))?;
        let frame = CameraFrame::decode(&self.id, &bytes)?;
        debug!(path = %path.display(), "directory camera picked frame");
        self.last_seen = Some((path, modified));
        Ok(frame)
    }
}
