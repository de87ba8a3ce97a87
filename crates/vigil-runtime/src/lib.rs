//! `vigil-runtime` – the observation engine.
//!
//! # Modules
//!
//! - [`pipeline`] – [`ObservationPipeline`][pipeline::ObservationPipeline]:
//!   one capture → caption → behaviour analysis → knowledge merge cycle, with
//!   every external call bounded by a timeout and every write keyed by
//!   timestamp.
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]: runs the pipeline
//!   at a constant interval, isolates failing or panicking cycles, and
//!   broadcasts an [`ObservationEvent`][vigil_types::ObservationEvent] after
//!   each one.
//! - [`extractor`] – [`extract`][extractor::extract]: total `key: value`
//!   parser for model replies.
//! - [`prompts`] – analysis and knowledge-extraction prompt templates.
//! - [`captioner`] – [`Captioner`][captioner::Captioner] capability and the
//!   [`OllamaCaptioner`][captioner::OllamaCaptioner] vision-model client.
//! - [`llm_driver`] – [`TextAnalyzer`][llm_driver::TextAnalyzer] capability
//!   and the OpenAI-compatible [`LlmDriver`][llm_driver::LlmDriver].
//! - [`clock`] – injectable wall clock.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP export
//!   (`OTEL_EXPORTER_OTLP_ENDPOINT`).

pub mod captioner;
pub mod clock;
pub mod extractor;
pub mod llm_driver;
pub mod pipeline;
pub mod prompts;
pub mod scheduler;
pub mod telemetry;

pub use captioner::{CaptionError, Captioner, OllamaCaptioner};
pub use clock::{Clock, FixedClock, SystemClock};
pub use extractor::{Fields, extract};
pub use llm_driver::{AnalysisError, ChatMessage, LlmDriver, Role, TextAnalyzer};
pub use pipeline::{
    Capabilities, CycleError, CycleReport, ObservationPipeline, PipelineConfig, Stage, Stores,
};
pub use scheduler::{RunSummary, Scheduler, SchedulerState};
pub use telemetry::{TracerProviderGuard, init_tracing};
