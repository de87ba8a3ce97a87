//! `vigil-dashboard` – the caregiver web dashboard.
//!
//! Boots a lightweight HTTP + WebSocket server (default port `3000`) that:
//!
//! 1. **Serves** an embedded single-page dashboard at `/`.
//!
//! 2. **Exposes** the stored observations read-only as JSON: captions,
//!    behaviour analyses and the knowledge base, from either the JSON-file
//!    or the SQLite backend via [`StoreView`].
//!
//! 3. **Edits** the patient profile: `GET /patient_info.json` and
//!    `POST /save-patient-info`.  The pipeline re-reads the profile every
//!    cycle, so a saved edit applies from the next one.
//!
//! 4. **Streams** every finished cycle as an
//!    [`ObservationEvent`][vigil_types::ObservationEvent] to connected
//!    WebSocket clients.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tokio::sync::broadcast;
//! use vigil_dashboard::{DashboardServer, StoreView};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (events, _) = broadcast::channel(64);
//!     DashboardServer::new(StoreView::json_dir("."), "patient_info.json", events)
//!         .run()
//!         .await
//!         .expect("dashboard failed");
//! }
//! ```

pub mod server;

pub use server::{DEFAULT_PORT, DashboardError, DashboardServer, StoreView};
