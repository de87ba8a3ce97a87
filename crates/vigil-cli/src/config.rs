//! Configuration vault – reads/writes `~/.vigil/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Chat-completions endpoint of Gemini's OpenAI-compatible API.
const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Supported text-analysis providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Ollama,
    OpenAI,
    Gemini,
}

impl AiProvider {
    fn default_model(self) -> &'static str {
        match self {
            AiProvider::Ollama => "llama3",
            AiProvider::OpenAI => "gpt-4o-mini",
            AiProvider::Gemini => "gemini-2.0-flash",
        }
    }
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::Ollama => write!(f, "ollama"),
            AiProvider::OpenAI => write!(f, "openai"),
            AiProvider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Persistence backend for records and the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Synthetic frames, no hardware needed.
    #[default]
    Sim,
    /// Newest image in the `source` directory.
    Directory,
    /// JPEG snapshot fetched from the `source` URL.
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub kind: CameraKind,
    /// Directory or URL, depending on `kind`; unused for `sim`.
    #[serde(default)]
    pub source: String,
}

/// Persisted configuration stored in `~/.vigil/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the stores and the patient profile.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Snapshot directory, relative to `data_dir` unless absolute.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    #[serde(default = "default_capture_interval")]
    pub capture_interval_secs: u64,

    /// Upper bound on any single camera or model call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default)]
    pub storage: StorageKind,

    /// SQLite database file, relative to `data_dir` unless absolute.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default)]
    pub camera: CameraConfig,

    /// Base URL of the Ollama instance serving the vision model.
    #[serde(default = "default_caption_url")]
    pub caption_url: String,

    #[serde(default = "default_caption_model")]
    pub caption_model: String,

    #[serde(default)]
    pub ai_provider: AiProvider,

    /// Base URL (or full `/chat/completions` endpoint) of the analysis
    /// model; empty selects the provider's default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub analysis_url: String,

    /// Empty selects the provider's default model.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub analysis_model: String,

    /// API key for cloud providers (stored as plain text; the file is
    /// written owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    #[serde(default = "default_true")]
    pub dashboard_enabled: bool,

    #[serde(default = "default_dashboard_port")]
    pub dashboard_port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("snapshot_dir", &self.snapshot_dir)
            .field("capture_interval_secs", &self.capture_interval_secs)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("storage", &self.storage)
            .field("sqlite_path", &self.sqlite_path)
            .field("camera", &self.camera)
            .field("caption_url", &self.caption_url)
            .field("caption_model", &self.caption_model)
            .field("ai_provider", &self.ai_provider)
            .field("analysis_url", &self.analysis_url)
            .field("analysis_model", &self.analysis_model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("dashboard_enabled", &self.dashboard_enabled)
            .field("dashboard_port", &self.dashboard_port)
            .finish()
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}
fn default_capture_interval() -> u64 {
    15
}
fn default_call_timeout() -> u64 {
    120
}
fn default_sqlite_path() -> PathBuf {
    PathBuf::from("vigil.db")
}
fn default_caption_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_caption_model() -> String {
    "llava".to_string()
}
fn default_true() -> bool {
    true
}
fn default_dashboard_port() -> u16 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_dir: default_snapshot_dir(),
            capture_interval_secs: default_capture_interval(),
            call_timeout_secs: default_call_timeout(),
            storage: StorageKind::default(),
            sqlite_path: default_sqlite_path(),
            camera: CameraConfig::default(),
            caption_url: default_caption_url(),
            caption_model: default_caption_model(),
            ai_provider: AiProvider::default(),
            analysis_url: String::new(),
            analysis_model: String::new(),
            api_key: String::new(),
            dashboard_enabled: true,
            dashboard_port: default_dashboard_port(),
        }
    }
}

impl Config {
    /// Resolve `path` against `data_dir`; absolute paths are kept as is.
    pub fn data_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.data_dir.join(path)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs(self.capture_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Analysis endpoint after applying the provider default.
    pub fn analysis_url(&self) -> &str {
        if !self.analysis_url.is_empty() {
            return &self.analysis_url;
        }
        match self.ai_provider {
            AiProvider::Ollama => self.caption_url.as_str(),
            AiProvider::OpenAI => OPENAI_BASE_URL,
            AiProvider::Gemini => GEMINI_ENDPOINT,
        }
    }

    /// Analysis model after applying the provider default.
    pub fn analysis_model(&self) -> &str {
        if self.analysis_model.is_empty() {
            self.ai_provider.default_model()
        } else {
            &self.analysis_model
        }
    }
}

/// Return the path to `~/.vigil/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vigil").join("config.toml")
}

/// Load the effective configuration: the file at `path` (or the default
/// location), falling back to defaults when it does not exist, with
/// `VIGIL_*` overrides applied on top.
pub fn load(path: Option<&Path>) -> Result<Config, String> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the config file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `VIGIL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VIGIL_DATA_DIR` | `data_dir` |
/// | `VIGIL_CAPTION_URL` | `caption_url` |
/// | `VIGIL_CAPTION_MODEL` | `caption_model` |
/// | `VIGIL_ANALYSIS_URL` | `analysis_url` |
/// | `VIGIL_ANALYSIS_MODEL` | `analysis_model` |
/// | `VIGIL_API_KEY` | `api_key` |
/// | `VIGIL_INTERVAL_SECS` | `capture_interval_secs` |
/// | `VIGIL_DASHBOARD_PORT` | `dashboard_port` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VIGIL_DATA_DIR") {
        cfg.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("VIGIL_CAPTION_URL") {
        cfg.caption_url = v;
    }
    if let Ok(v) = std::env::var("VIGIL_CAPTION_MODEL") {
        cfg.caption_model = v;
    }
    if let Ok(v) = std::env::var("VIGIL_ANALYSIS_URL") {
        cfg.analysis_url = v;
    }
    if let Ok(v) = std::env::var("VIGIL_ANALYSIS_MODEL") {
        cfg.analysis_model = v;
    }
    if let Ok(v) = std::env::var("VIGIL_API_KEY") {
        cfg.api_key = v;
    }
    if let Ok(v) = std::env::var("VIGIL_INTERVAL_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.capture_interval_secs = secs;
    }
    if let Ok(v) = std::env::var("VIGIL_DASHBOARD_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.dashboard_port = port;
    }
}

/// Save the config to a specific path, creating its directory if needed.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Write the defaults to `path` unless a file is already there.
pub fn init(path: &Path) -> Result<bool, String> {
    if path.exists() {
        return Ok(false);
    }
    save_to(&Config::default(), path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_api_key() {
        let cfg = Config {
            api_key: "sk-super-secret".to_string(),
            ..Config::default()
        };
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("sk-super-secret"));
        assert!(debug_str.contains("<redacted>"));
        assert!(format!("{:?}", Config::default()).contains("<not set>"));
    }

    #[test]
    fn empty_api_key_is_not_serialised() {
        let raw = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(!raw.contains("api_key"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        assert!(init(&path).expect("init"));
        assert!(!init(&path).expect("second init"), "existing file must be kept");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.capture_interval_secs, 15);
        assert_eq!(loaded.call_timeout_secs, 120);
        assert_eq!(loaded.dashboard_port, 3000);
        assert_eq!(loaded.caption_model, "llava");
        assert_eq!(loaded.storage, StorageKind::Json);
        assert_eq!(loaded.camera.kind, CameraKind::Sim);
        assert_eq!(loaded.ai_provider, AiProvider::Ollama);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "storage = \"sqlite\"\nai_provider = \"gemini\"\n\n[camera]\nkind = \"http\"\nsource = \"http://cam/snap.jpg\"\n",
        )
        .unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.storage, StorageKind::Sqlite);
        assert_eq!(cfg.camera.kind, CameraKind::Http);
        assert_eq!(cfg.camera.source, "http://cam/snap.jpg");
        assert_eq!(cfg.analysis_url(), GEMINI_ENDPOINT);
        assert_eq!(cfg.analysis_model(), "gemini-2.0-flash");
        assert_eq!(cfg.snapshot_dir, PathBuf::from("snapshots"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "capture_interval_secs = \"soon\"").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn ollama_analysis_defaults_to_caption_host() {
        let cfg = Config {
            caption_url: "http://gpu-box:11434".into(),
            ..Config::default()
        };
        assert_eq!(cfg.analysis_url(), "http://gpu-box:11434");
        assert_eq!(cfg.analysis_model(), "llama3");
    }

    #[test]
    fn data_path_resolves_relative_paths_only() {
        let cfg = Config {
            data_dir: PathBuf::from("/var/lib/vigil"),
            ..Config::default()
        };
        assert_eq!(cfg.data_path("captions.json"), PathBuf::from("/var/lib/vigil/captions.json"));
        assert_eq!(cfg.data_path("/tmp/snaps"), PathBuf::from("/tmp/snaps"));
    }

    #[test]
    fn config_path_points_to_vigil_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.vigil/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_analysis_model() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("VIGIL_ANALYSIS_MODEL", "gpt-4o") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.analysis_model(), "gpt-4o");
        unsafe { std::env::remove_var("VIGIL_ANALYSIS_MODEL") };
    }

    #[test]
    fn apply_env_overrides_changes_dashboard_port() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("VIGIL_DASHBOARD_PORT", "9999") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.dashboard_port, 9999);
        unsafe { std::env::remove_var("VIGIL_DASHBOARD_PORT") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_interval() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("VIGIL_INTERVAL_SECS", "often") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.capture_interval_secs, 15);
        unsafe { std::env::remove_var("VIGIL_INTERVAL_SECS") };
    }
}
