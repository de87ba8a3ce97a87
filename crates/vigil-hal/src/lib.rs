//! `vigil-hal` – capture hardware abstraction.
//!
//! # Modules
//!
//! - [`camera`] – the [`Camera`][camera::Camera] trait every capture driver
//!   implements, plus [`CameraFrame`][camera::CameraFrame] and its JPEG codec.
//! - [`sim`] – [`SimCamera`][sim::SimCamera], a synthetic frame source for
//!   headless runs and tests.
//! - [`directory`] – [`DirectoryCamera`][directory::DirectoryCamera], which
//!   picks up the newest image dropped into a folder by an external grabber.
//! - [`http`] – [`HttpSnapshotCamera`][http::HttpSnapshotCamera], which polls
//!   the JPEG snapshot endpoint most IP cameras expose.

pub mod camera;
pub mod directory;
pub mod http;
pub mod sim;

pub use camera::{Camera, CameraFrame};
pub use directory::DirectoryCamera;
pub use http::HttpSnapshotCamera;
pub use sim::SimCamera;
