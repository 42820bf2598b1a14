use std::path::{Path, PathBuf};
use std::{env, fs};

use flux_core::PipelineConfig;

use crate::error::{Result, StoreError};
use crate::store::Store;

pub const DEFAULT_SESSION: &str = "default";
pub const CONFIG_FILE: &str = "flux.toml";

/// Default base directory for all flux storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".flux")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Sanitize a session name for use as a filename.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_SESSION.to_string()
    } else {
        cleaned
    }
}

/// Read `<base>/flux.toml`. A missing file yields the defaults.
pub fn load_config(base: &Path) -> Result<PipelineConfig> {
    let path = base.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
        path: path.clone(),
        source,
    })?;
    let config: PipelineConfig = toml::from_str(&text).map_err(|source| StoreError::Config {
        path: path.clone(),
        source,
    })?;
    config
        .validate()
        .map_err(|e| StoreError::InvalidData(format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// One journal per named session, plus the shared config.
///
/// Layout:
/// ```text
/// ~/.flux/
/// ├── flux.toml
/// └── sessions/
///     ├── default.db
///     └── <name>.db
/// ```
pub struct SessionStore {
    store: Store,
    name: String,
    config: PipelineConfig,
}

impl SessionStore {
    /// Open the session journal, creating directories as needed.
    /// `base_dir` overrides [`default_base_dir`].
    pub fn open(session: Option<&str>, base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        let sessions_dir = base.join("sessions");

        fs::create_dir_all(&sessions_dir).map_err(|source| StoreError::Io {
            path: sessions_dir.clone(),
            source,
        })?;

        let name = sanitize_name(session.unwrap_or(DEFAULT_SESSION));
        let config = load_config(&base)?;
        let store = Store::open(&sessions_dir.join(format!("{name}.db")))?;
        tracing::info!(session = %name, base = %base.display(), "session opened");

        Ok(Self {
            store,
            name,
            config,
        })
    }

    /// In-memory journal with default config (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory()?,
            name: "test".to_string(),
            config: PipelineConfig::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_core::TransitionMode;

    #[test]
    fn test_directory_creation() {
        let dir = tempfile::tempdir().unwrap();
        let ss = SessionStore::open(Some("alpha"), Some(dir.path())).unwrap();
        assert_eq!(ss.name(), "alpha");
        assert!(dir.path().join("sessions/alpha.db").exists());
    }

    #[test]
    fn test_default_session() {
        let dir = tempfile::tempdir().unwrap();
        let ss = SessionStore::open(None, Some(dir.path())).unwrap();
        assert_eq!(ss.name(), DEFAULT_SESSION);
        assert_eq!(ss.config(), &PipelineConfig::default());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let a = SessionStore::open(Some("a"), Some(dir.path())).unwrap();
        let b = SessionStore::open(Some("b"), Some(dir.path())).unwrap();
        a.store().append_capsule(&flux_core::Capsule::new()).unwrap();
        assert_eq!(a.store().count().unwrap(), 1);
        assert_eq!(b.store().count().unwrap(), 0);
    }

    #[test]
    fn test_session_name_sanitization() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_name("valid-name_123"), "valid-name_123");
        assert_eq!(sanitize_name("   "), DEFAULT_SESSION);
    }

    #[test]
    fn test_config_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "entropy_jitter = 0.0\ntransition_mode = \"cyclic\"\ndevice_id = \"lab\"\n",
        )
        .unwrap();
        let cfg = load_config(dir.path()).unwrap();
        assert_eq!(cfg.entropy_jitter, 0.0);
        assert_eq!(cfg.transition_mode, TransitionMode::Cyclic);
        assert_eq!(cfg.device_id, "lab");
        assert_eq!(cfg.history_window, PipelineConfig::default().history_window);
    }

    #[test]
    fn test_out_of_range_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for body in [
            "entropy_jitter = inf",
            "entropy_jitter = 1e308",
            "curvature_damping = -0.5",
            "transition_threshold = nan",
        ] {
            fs::write(dir.path().join(CONFIG_FILE), body).unwrap();
            let err = load_config(dir.path()).unwrap_err();
            assert!(matches!(err, StoreError::InvalidData(_)), "{body}: {err}");
            assert!(err.to_string().contains(CONFIG_FILE));
        }
    }

    #[test]
    fn test_invalid_config_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "entropy_jitter = inf").unwrap();
        assert!(SessionStore::open(None, Some(dir.path())).is_err());
    }

    #[test]
    fn test_bad_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "entropy_jitter = \"loud\"").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}
