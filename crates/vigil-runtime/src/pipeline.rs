//! [`ObservationPipeline`] – one capture → caption → analysis → knowledge
//! cycle.
//!
//! Each cycle:
//!
//! 1. **Capture** – take one frame from the [`Camera`] and stamp it with the
//!    filesystem-safe capture timestamp.  The frame is written to
//!    `snapshot_<timestamp>.jpg`.
//! 2. **Caption** – caption the frame twice (unconditioned, then with
//!    [`DETAILED_CAPTION_INSTRUCTION`]) and join the two texts.  An empty
//!    caption or one mentioning `failed` aborts the cycle.
//! 3. Persist the [`CaptionRecord`].
//! 4. **Analysis** – re-read the patient profile, stamp the canonical
//!    analysis timestamp, ask the [`TextAnalyzer`] for the five behaviour
//!    fields and persist the [`AnalysisRecord`].
//! 5. **Knowledge** – ask for the four knowledge fields and merge them into
//!    the knowledge base.
//!
//! Every external call is bounded by the configured call timeout.  A failure
//! at any stage aborts the rest of the cycle but never rolls back records
//! already written: every write is keyed by timestamp, so a retried cycle
//! cannot duplicate them.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use vigil_hal::Camera;
use vigil_memory::profile::load_or_init_profile;
use vigil_memory::{KnowledgeStore, MergeReport, RecordStore, StoreError, append_record};
use vigil_types::{
    AnalysisRecord, Behavior, CaptionRecord, CycleOutcome, KnowledgeCategory, KnowledgeFacts,
    VigilError, analysis_timestamp, capture_timestamp,
};

use crate::captioner::{CaptionError, Captioner};
use crate::clock::Clock;
use crate::extractor::extract;
use crate::llm_driver::{AnalysisError, TextAnalyzer};
use crate::prompts::{DETAILED_CAPTION_INSTRUCTION, analysis_prompt, knowledge_prompt};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// The step of a cycle at which it was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Caption,
    Analysis,
    Knowledge,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Capture => "capture",
            Stage::Caption => "caption",
            Stage::Analysis => "analysis",
            Stage::Knowledge => "knowledge",
        })
    }
}

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("frame capture failed: {0}")]
    Capture(#[source] VigilError),

    #[error("snapshot could not be written to {path}: {source}")]
    Snapshot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encoding failed: {0}")]
    Encode(#[source] VigilError),

    #[error("captioning failed: {0}")]
    Caption(#[from] CaptionError),

    #[error("caption rejected: {0:?}")]
    CaptionRejected(String),

    #[error("{stage} request failed: {source}")]
    Analysis {
        stage: Stage,
        #[source]
        source: AnalysisError,
    },

    #[error("{stage} call timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    #[error("{stage} record could not be stored: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: StoreError,
    },
}

impl CycleError {
    pub fn stage(&self) -> Stage {
        match self {
            CycleError::Capture(_) | CycleError::Snapshot { .. } | CycleError::Encode(_) => {
                Stage::Capture
            }
            CycleError::Caption(_) | CycleError::CaptionRejected(_) => Stage::Caption,
            CycleError::Analysis { stage, .. }
            | CycleError::Timeout { stage, .. }
            | CycleError::Store { stage, .. } => *stage,
        }
    }

    pub fn to_outcome(&self) -> CycleOutcome {
        CycleOutcome::Failed {
            stage: self.stage().to_string(),
            message: self.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Construction
// ─────────────────────────────────────────────────────────────────────────────

/// External capabilities the pipeline drives.
pub struct Capabilities {
    pub camera: Box<dyn Camera>,
    pub captioner: Box<dyn Captioner>,
    pub analyzer: Box<dyn TextAnalyzer>,
}

/// Persistence backends the pipeline writes to.
pub struct Stores {
    pub records: Box<dyn RecordStore>,
    pub knowledge: Box<dyn KnowledgeStore>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory receiving `snapshot_<timestamp>.jpg` files.
    pub snapshot_dir: PathBuf,
    /// Location of `patient_info.json`.
    pub profile_path: PathBuf,
    /// Upper bound on every camera, captioning and analysis call.
    pub call_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("snapshots"),
            profile_path: PathBuf::from("patient_info.json"),
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// What a completed cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub capture_timestamp: String,
    pub analysis_timestamp: String,
    pub caption: String,
    pub behavior: Behavior,
    /// `false` when a record for the same timestamp already existed.
    pub caption_stored: bool,
    pub analysis_stored: bool,
    pub knowledge: MergeReport,
}

impl CycleReport {
    pub fn to_outcome(&self) -> CycleOutcome {
        CycleOutcome::Completed {
            caption: self.caption.clone(),
            behavior: self.behavior.clone(),
            facts_added: self.knowledge.facts_added(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ObservationPipeline
// ─────────────────────────────────────────────────────────────────────────────

pub struct ObservationPipeline {
    camera: Box<dyn Camera>,
    captioner: Box<dyn Captioner>,
    analyzer: Box<dyn TextAnalyzer>,
    records: Box<dyn RecordStore>,
    knowledge: Box<dyn KnowledgeStore>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

/// Await `fut`, failing with [`CycleError::Timeout`] once `limit` elapses.
async fn bounded<F: Future>(limit: Duration, stage: Stage, fut: F) -> Result<F::Output, CycleError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| CycleError::Timeout {
            stage,
            seconds: limit.as_secs(),
        })
}

impl ObservationPipeline {
    pub fn new(
        capabilities: Capabilities,
        stores: Stores,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            camera: capabilities.camera,
            captioner: capabilities.captioner,
            analyzer: capabilities.analyzer,
            records: stores.records,
            knowledge: stores.knowledge,
            clock,
            config,
        }
    }

    pub fn camera_id(&self) -> &str {
        self.camera.id()
    }

    /// Release the capture device.  Called once when the scheduler stops.
    pub fn release_camera(&mut self) {
        self.camera.release();
    }

    /// Run one full cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let limit = self.config.call_timeout;

        // ── 1. Capture ────────────────────────────────────────────────────────
        let frame = bounded(limit, Stage::Capture, self.camera.capture())
            .await?
            .map_err(CycleError::Capture)?;
        let capture_ts = capture_timestamp(&self.clock.now());
        let jpeg = frame.to_jpeg().map_err(CycleError::Encode)?;
        let image_path = self
            .config
            .snapshot_dir
            .join(format!("snapshot_{capture_ts}.jpg"));
        let written = async {
            tokio::fs::create_dir_all(&self.config.snapshot_dir).await?;
            tokio::fs::write(&image_path, &jpeg).await
        };
        written.await.map_err(|source| CycleError::Snapshot {
            path: image_path.display().to_string(),
            source,
        })?;
        info!(timestamp = %capture_ts, path = %image_path.display(), "frame captured");

        // ── 2. Caption ────────────────────────────────────────────────────────
        let basic = bounded(limit, Stage::Caption, self.captioner.caption(&jpeg, None)).await??;
        let detailed = bounded(
            limit,
            Stage::Caption,
            self.captioner.caption(&jpeg, Some(DETAILED_CAPTION_INSTRUCTION)),
        )
        .await??;
        let caption = format!("{basic} {detailed}").trim().to_string();
        if caption.is_empty() || caption.to_lowercase().contains("failed") {
            return Err(CycleError::CaptionRejected(caption));
        }

        // ── 3. Persist caption ────────────────────────────────────────────────
        let caption_record = CaptionRecord {
            timestamp: capture_ts.clone(),
            caption: caption.clone(),
            image_path: image_path.display().to_string(),
        };
        let caption_stored = append_record(self.records.as_mut(), &caption_record).map_err(|source| {
            CycleError::Store {
                stage: Stage::Caption,
                source,
            }
        })?;
        if !caption_stored {
            debug!(timestamp = %capture_ts, "caption record already present");
        }

        // ── 4. Behaviour analysis ─────────────────────────────────────────────
        let started = self.clock.now();
        let analysis_ts = analysis_timestamp(&started);
        let profile = load_or_init_profile(&self.config.profile_path, started.date());

        let reply = bounded(
            limit,
            Stage::Analysis,
            self.analyzer.generate(&analysis_prompt(&profile, &caption)),
        )
        .await?
        .map_err(|source| CycleError::Analysis {
            stage: Stage::Analysis,
            source,
        })?;
        let fields = extract(&reply, &Behavior::FIELDS);
        let behavior = Behavior::from_lookup(|key| fields.get(key));
        let analysis_record = AnalysisRecord {
            timestamp: analysis_ts.clone(),
            behavior: behavior.clone(),
        };
        let analysis_stored = append_record(self.records.as_mut(), &analysis_record).map_err(|source| {
            CycleError::Store {
                stage: Stage::Analysis,
                source,
            }
        })?;

        // ── 5. Knowledge extraction ───────────────────────────────────────────
        let reply = bounded(
            limit,
            Stage::Knowledge,
            self.analyzer.generate(&knowledge_prompt(&profile, &caption)),
        )
        .await?
        .map_err(|source| CycleError::Analysis {
            stage: Stage::Knowledge,
            source,
        })?;
        let fields = extract(&reply, &KnowledgeCategory::extraction_fields());
        let facts = KnowledgeFacts::from_lookup(|key| fields.get(key));
        let knowledge = self.knowledge.merge(&facts);
        if !knowledge.persisted {
            warn!("knowledge merge was not persisted this cycle");
        }
        info!(
            capture = %capture_ts,
            analysis = %analysis_ts,
            facts_added = knowledge.facts_added(),
            "cycle complete"
        );

        Ok(CycleReport {
            capture_timestamp: capture_ts,
            analysis_timestamp: analysis_ts,
            caption,
            behavior,
            caption_stored,
            analysis_stored,
            knowledge,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::{NaiveDate, TimeDelta};
    use vigil_hal::SimCamera;
    use vigil_memory::{JsonFileKnowledgeStore, JsonFileRecordStore};
    use vigil_types::PatientProfile;

    use super::fakes::*;
    use super::*;
    use crate::clock::FixedClock;

    const ANALYSIS_REPLY: &str = "action: [reading a book]\nposture: seated upright\nemotion: calm\nactivity: reading\nmedical_relevance: none observed";
    const KNOWLEDGE_REPLY: &str = "appearance: wearing a blue robe, sitting upright\nbehavior: none\nenvironment: \nmedical_indicators: [visible tremor in left hand]";

    fn clock() -> Arc<dyn Clock> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Arc::new(FixedClock::stepping(start, TimeDelta::seconds(1)))
    }

    fn pipeline_with(
        dir: &Path,
        camera: Box<dyn Camera>,
        analyzer: Box<dyn TextAnalyzer>,
        call_timeout: Duration,
    ) -> ObservationPipeline {
        ObservationPipeline::new(
            Capabilities {
                camera,
                captioner: Box::new(EchoCaptioner {
                    basic: "an elderly woman in a chair".into(),
                    detailed: "she is reading a book in a bright room".into(),
                }),
                analyzer,
            },
            Stores {
                records: Box::new(JsonFileRecordStore::new(dir)),
                knowledge: Box::new(JsonFileKnowledgeStore::in_dir(dir)),
            },
            clock(),
            PipelineConfig {
                snapshot_dir: dir.join("snapshots"),
                profile_path: dir.join("patient_info.json"),
                call_timeout,
            },
        )
    }

    fn read(dir: &Path, file: &str) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(dir.join(file)).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn full_cycle_writes_every_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline_with(
            dir.path(),
            Box::new(SimCamera::new("sim")),
            Box::new(ScriptedAnalyzer::new([Ok(ANALYSIS_REPLY), Ok(KNOWLEDGE_REPLY)])),
            Duration::from_secs(5),
        );

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.capture_timestamp, "2024-03-01_10-00-00");
        assert_eq!(report.analysis_timestamp, "2024-03-01 10:00:01");
        assert_eq!(
            report.caption,
            "an elderly woman in a chair she is reading a book in a bright room"
        );
        assert_eq!(report.behavior.action, "reading a book");
        assert!(report.caption_stored && report.analysis_stored);
        assert_eq!(report.knowledge.facts_added(), 2);

        let captions = read(dir.path(), "captions.json");
        assert_eq!(captions[0]["timestamp"], "2024-03-01_10-00-00");
        let image_path = captions[0]["image_path"].as_str().unwrap();
        assert!(image_path.ends_with("snapshot_2024-03-01_10-00-00.jpg"));
        assert!(Path::new(image_path).exists());

        let analyses = read(dir.path(), "behavior_analysis.json");
        assert_eq!(analyses[0]["behavior"]["posture"], "seated upright");

        let kb = read(dir.path(), "data.json");
        assert_eq!(kb["appearance"][0], "wearing a blue robe, sitting upright");
        assert_eq!(kb["behaviors"], serde_json::json!([]));
        assert_eq!(kb["medical_indicators"][0], "visible tremor in left hand");

        // The default profile was created on first use.
        assert!(dir.path().join("patient_info.json").exists());
    }

    #[tokio::test]
    async fn knowledge_failure_keeps_records_and_leaves_base_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let kb_path = dir.path().join("data.json");
        std::fs::write(&kb_path, "{\"appearance\": [\"grey hair, glasses\"]}").unwrap();
        let before = std::fs::read(&kb_path).unwrap();

        let mut pipeline = pipeline_with(
            dir.path(),
            Box::new(SimCamera::new("sim")),
            Box::new(ScriptedAnalyzer::new([Ok(ANALYSIS_REPLY), Err("quota exceeded")])),
            Duration::from_secs(5),
        );
        let err = pipeline.run_cycle().await.unwrap_err();
        assert_eq!(err.stage(), Stage::Knowledge);

        assert_eq!(read(dir.path(), "captions.json").as_array().unwrap().len(), 1);
        assert_eq!(read(dir.path(), "behavior_analysis.json").as_array().unwrap().len(), 1);
        assert_eq!(std::fs::read(&kb_path).unwrap(), before);
    }

    #[tokio::test]
    async fn analysis_failure_keeps_caption_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline_with(
            dir.path(),
            Box::new(SimCamera::new("sim")),
            Box::new(ScriptedAnalyzer::new([Err("service unavailable")])),
            Duration::from_secs(5),
        );
        let err = pipeline.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Analysis { stage: Stage::Analysis, .. }));
        assert_eq!(read(dir.path(), "captions.json").as_array().unwrap().len(), 1);
        assert!(!dir.path().join("behavior_analysis.json").exists());
        assert!(!dir.path().join("data.json").exists());
    }

    #[tokio::test]
    async fn capture_failure_produces_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline_with(
            dir.path(),
            Box::new(BrokenCamera),
            Box::new(ScriptedAnalyzer::default()),
            Duration::from_secs(5),
        );
        let err = pipeline.run_cycle().await.unwrap_err();
        assert_eq!(err.stage(), Stage::Capture);
        match err.to_outcome() {
            CycleOutcome::Failed { stage, message } => {
                assert_eq!(stage, "capture");
                assert!(message.contains("device unplugged"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!dir.path().join("captions.json").exists());
    }

    #[tokio::test]
    async fn failure_marked_caption_aborts_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ScriptedAnalyzer::default();
        let mut pipeline = ObservationPipeline::new(
            Capabilities {
                camera: Box::new(SimCamera::new("sim")),
                captioner: Box::new(EchoCaptioner {
                    basic: "Caption FAILED".into(),
                    detailed: String::new(),
                }),
                analyzer: Box::new(analyzer),
            },
            Stores {
                records: Box::new(JsonFileRecordStore::new(dir.path())),
                knowledge: Box::new(JsonFileKnowledgeStore::in_dir(dir.path())),
            },
            clock(),
            PipelineConfig {
                snapshot_dir: dir.path().join("snapshots"),
                profile_path: dir.path().join("patient_info.json"),
                call_timeout: Duration::from_secs(5),
            },
        );
        let err = pipeline.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::CaptionRejected(_)));
        assert!(!dir.path().join("captions.json").exists());
    }

    #[tokio::test]
    async fn stalled_analysis_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline_with(
            dir.path(),
            Box::new(SimCamera::new("sim")),
            Box::new(StalledAnalyzer),
            Duration::from_millis(50),
        );
        let err = pipeline.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Timeout { stage: Stage::Analysis, .. }));
    }

    #[tokio::test]
    async fn analysis_prompt_uses_current_profile() {
        let dir = tempfile::tempdir().unwrap();
        let mut profile = PatientProfile::default();
        profile.medical.diagnosis = "early-stage dementia".into();
        vigil_memory::profile::save_profile(&dir.path().join("patient_info.json"), &profile).unwrap();

        let analyzer = std::sync::Arc::new(ScriptedAnalyzer::new([Ok(ANALYSIS_REPLY), Ok(KNOWLEDGE_REPLY)]));
        struct Shared(std::sync::Arc<ScriptedAnalyzer>);
        #[async_trait::async_trait]
        impl TextAnalyzer for Shared {
            async fn generate(&self, prompt: &str) -> Result<String, AnalysisError> {
                self.0.generate(prompt).await
            }
        }

        let mut pipeline = pipeline_with(
            dir.path(),
            Box::new(SimCamera::new("sim")),
            Box::new(Shared(analyzer.clone())),
            Duration::from_secs(5),
        );
        pipeline.run_cycle().await.unwrap();
        let prompts = analyzer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("- Diagnosis: early-stage dementia"));
        assert!(prompts[1].contains("From caption: an elderly woman in a chair"));
    }
}
