//! Simulated camera for CI and headless runs without capture hardware.

use async_trait::async_trait;
use vigil_types::VigilError;

use crate::camera::{Camera, CameraFrame};

const SIM_WIDTH: u32 = 64;
const SIM_HEIGHT: u32 = 48;

/// A simulated camera that returns a diagonal gradient which shifts by one
/// step on every capture.  Always succeeds.
pub struct SimCamera {
    id: String,
    frame_index: u32,
}

impl SimCamera {
    /// Create a new simulated camera with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            frame_index: 0,
        }
    }

    /// Number of frames produced so far.
    pub fn frames_captured(&self) -> u32 {
        self.frame_index
    }
}

#[async_trait]
impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    async fn capture(&mut self) -> Result<CameraFrame, VigilError> {
        let shift = self.frame_index;
        self.frame_index = self.frame_index.wrapping_add(1);

        let mut data = Vec::with_capacity((SIM_WIDTH * SIM_HEIGHT * 3) as usize);
        for y in 0..SIM_HEIGHT {
            for x in 0..SIM_WIDTH {
                let v = ((x + y).wrapping_add(shift) % 256) as u8;
                data.extend_from_slice(&[v, v / 2, 255 - v]);
            }
        }
        Ok(CameraFrame {
            width: SIM_WIDTH,
            height: SIM_HEIGHT,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sim_frames_are_well_formed() {
        let mut cam = SimCamera::new("sim");
        let frame = cam.capture().await.unwrap();
        assert_eq!(frame.data.len(), (SIM_WIDTH * SIM_HEIGHT * 3) as usize);
        assert!(frame.to_jpeg().is_ok());
    }

    #[tokio::test]
    async fn sim_frames_change_between_captures() {
        let mut cam = SimCamera::new("sim");
        let a = cam.capture().await.unwrap();
        let b = cam.capture().await.unwrap();
        assert_ne!(a.data, b.data);
        assert_eq!(cam.frames_captured(), 2);
    }
}
