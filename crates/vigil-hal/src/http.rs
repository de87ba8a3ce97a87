//! [`HttpSnapshotCamera`] – polls an IP camera's still-image endpoint.

use std::time::Duration;

use async_trait::async_trait;
use vigil_types::VigilError;

use crate::camera::{Camera, CameraFrame};

pub struct HttpSnapshotCamera {
    id: String,
    url: String,
    client: reqwest::Client,
}

impl HttpSnapshotCamera {
    /// Create a camera that fetches `url` (e.g. `http://10.0.0.7/snapshot.jpg`)
    /// on every capture.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    fn fault(&self, details: String) -> VigilError {
        VigilError::Capture {
            device: self.id.clone(),
            details,
        }
    }
}

#[async_trait]
impl Camera for HttpSnapshotCamera {
    fn id(&self) -> &str {
        &self.id
    }

    async fn capture(&mut self) -> Result<CameraFrame, VigilError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.fault(format!("snapshot request to {} failed: {e}", self.url)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.fault(format!("snapshot body unreadable: {e}")))?;
        CameraFrame::decode(&self.id, &bytes)
    }
}
