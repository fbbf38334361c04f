use crate::config::EngineConfig;
use crate::session::SessionTimeouts;
use kibitz_runtime::{select_factory, HandleFactory, RuntimeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `[engine] path`.
pub const ENGINE_PATH_ENV: &str = "KIBITZ_ENGINE";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unknown analysis preset '{0}'")]
    InvalidPreset(String),
}

/// Contents of `kibitz.toml`. Every section and field is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_engine_path")]
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_engine_path(),
            args: Vec::new(),
        }
    }
}

fn default_backend() -> String {
    "process".to_owned()
}

fn default_engine_path() -> String {
    "stockfish".to_owned()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AnalysisSection {
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_pv: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_mb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<u8>,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            multi_pv: None,
            hash_mb: None,
            threads: None,
            max_depth: None,
            skill_level: None,
        }
    }
}

fn default_preset() -> String {
    "default".to_owned()
}

/// Millisecond overrides for [`SessionTimeouts`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSection {
    pub startup_ms: u64,
    pub poll_interval_ms: u64,
    pub handshake_ms: u64,
    pub sync_ms: u64,
    pub evaluate_ms: u64,
    pub stop_grace_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        let defaults = SessionTimeouts::default();
        Self {
            startup_ms: millis(defaults.startup),
            poll_interval_ms: millis(defaults.poll_interval),
            handshake_ms: millis(defaults.handshake),
            sync_ms: millis(defaults.sync),
            evaluate_ms: millis(defaults.evaluate),
            stop_grace_ms: millis(defaults.stop_grace),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Settings {
    pub fn parse(input: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load `path` when given (it must exist), otherwise the default
    /// location if a file is there, otherwise built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply [`ENGINE_PATH_ENV`] when it is set and non-empty.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(ENGINE_PATH_ENV) {
            if !path.trim().is_empty() {
                self.engine.path = path;
            }
        }
        self
    }

    /// The configured preset with any per-field overrides applied.
    pub fn engine_config(&self, cores: usize) -> Result<EngineConfig, SettingsError> {
        let analysis = &self.analysis;
        let mut config = EngineConfig::preset(&analysis.preset, cores)
            .ok_or_else(|| SettingsError::InvalidPreset(analysis.preset.clone()))?;
        if let Some(multi_pv) = analysis.multi_pv {
            config = config.with_multi_pv(multi_pv);
        }
        if let Some(hash_mb) = analysis.hash_mb {
            config = config.with_hash_mb(hash_mb);
        }
        if let Some(threads) = analysis.threads {
            config = config.with_threads(threads);
        }
        if let Some(max_depth) = analysis.max_depth {
            config = config.with_max_depth(max_depth);
        }
        if analysis.skill_level.is_some() {
            config = config.with_skill_level(analysis.skill_level);
        }
        Ok(config)
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        let t = &self.timeouts;
        SessionTimeouts {
            startup: Duration::from_millis(t.startup_ms),
            poll_interval: Duration::from_millis(t.poll_interval_ms.max(1)),
            handshake: Duration::from_millis(t.handshake_ms),
            sync: Duration::from_millis(t.sync_ms),
            evaluate: Duration::from_millis(t.evaluate_ms),
            stop_grace: Duration::from_millis(t.stop_grace_ms),
        }
    }

    pub fn factory(&self) -> Result<Arc<dyn HandleFactory>, RuntimeError> {
        select_factory(&self.engine.backend, &self.engine.path, &self.engine.args)
    }
}

/// `~/.config/kibitz/kibitz.toml`, or `None` when `HOME` is unset.
pub fn default_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/kibitz/kibitz.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.engine.backend, "process");
        assert_eq!(settings.engine.path, "stockfish");
        assert_eq!(settings.timeouts(), SessionTimeouts::default());
        assert_eq!(settings.engine_config(8).unwrap(), EngineConfig::default());
    }

    #[test]
    fn full_file_parses() {
        let settings = Settings::parse(
            r#"
[engine]
backend = "mock"
path = "/opt/engines/sf"
args = ["--nnue"]

[analysis]
preset = "mobile"
multi_pv = 2
skill_level = 12

[timeouts]
handshake_ms = 2500
stop_grace_ms = 20
"#,
        )
        .unwrap();
        assert_eq!(settings.engine.backend, "mock");
        assert_eq!(settings.engine.args, vec!["--nnue"]);

        let config = settings.engine_config(8).unwrap();
        assert_eq!(config.multi_pv(), 2);
        assert_eq!(config.skill_level(), Some(12));
        assert_eq!(config.max_depth(), EngineConfig::mobile(8).max_depth());

        let timeouts = settings.timeouts();
        assert_eq!(timeouts.handshake, Duration::from_millis(2500));
        assert_eq!(timeouts.stop_grace, Duration::from_millis(20));
        assert_eq!(timeouts.sync, SessionTimeouts::default().sync);
        assert_eq!(settings.factory().unwrap().name(), "mock");
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(matches!(
            Settings::parse("[engine]\nbinary = \"sf\"\n"),
            Err(SettingsError::ParseToml(_))
        ));
        assert!(Settings::parse("[display]\ntheme = \"dark\"\n").is_err());
    }

    #[test]
    fn unknown_preset_rejected() {
        let settings = Settings::parse("[analysis]\npreset = \"bullet\"\n").unwrap();
        assert!(matches!(
            settings.engine_config(4),
            Err(SettingsError::InvalidPreset(name)) if name == "bullet"
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kibitz.toml");
        std::fs::write(&path, "[analysis]\npreset = \"quick-eval\"\n").unwrap();

        let settings = Settings::load_or_default(Some(&path)).unwrap();
        assert_eq!(settings.analysis.preset, "quick-eval");

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Settings::load_or_default(Some(&missing)),
            Err(SettingsError::Io(_))
        ));
    }
}
