use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Safety posture requested for the activated system.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    /// Most conservative behavior.
    Strict,
    /// Default posture.
    #[default]
    Standard,
    /// Fewest restrictions.
    Permissive,
}

/// Immutable configuration handed to the controller once at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivationConfig {
    /// Topics the activated system should favor.
    pub interests: Vec<String>,
    /// Learning rate in `(0, 1]`.
    pub learning_rate: f64,
    /// Reasoning depth, at least one.
    pub reasoning_depth: u32,
    /// Free-form research scope label.
    pub research_scope: String,
    /// Free-form personality style label.
    pub personality_style: String,
    /// Safety posture.
    pub safety_level: SafetyLevel,
    /// Whether the system enters autonomous mode once every phase completes.
    pub autonomous_mode: bool,
    /// Enables debug-level logging.
    pub debug: bool,
    /// Directory searched for component manifests.
    pub components_dir: PathBuf,
    /// JSON-lines activation log.
    pub log_path: PathBuf,
    /// Rotate the activation log past this size.
    pub log_max_bytes: u64,
    /// Rotated log files to keep.
    pub log_keep: usize,
    /// Seconds between autonomous cycle ticks.
    pub cycle_interval_secs: u64,
    /// Pause between phases in milliseconds. Zero disables pacing.
    pub phase_pause_ms: u64,
    /// Upper bound for loading a single component.
    pub load_timeout_ms: u64,
    /// Probe outcomes retained per component for health scoring.
    pub health_window: usize,
    /// Online components whose health drops below this move to `Error`.
    pub health_floor: f32,
    /// Abort activation when a phase fails validation instead of warning.
    pub strict_phase_validation: bool,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            interests: vec![
                "systems".into(),
                "reasoning".into(),
                "research".into(),
            ],
            learning_rate: 0.1,
            reasoning_depth: 3,
            research_scope: "broad".into(),
            personality_style: "balanced".into(),
            safety_level: SafetyLevel::Standard,
            autonomous_mode: true,
            debug: false,
            components_dir: PathBuf::from("components"),
            log_path: PathBuf::from("asis_activation.log"),
            log_max_bytes: 5 * 1024 * 1024,
            log_keep: 3,
            cycle_interval_secs: 5,
            phase_pause_ms: 250,
            load_timeout_ms: 10_000,
            health_window: 8,
            health_floor: 0.7,
            strict_phase_validation: false,
        }
    }
}

impl ActivationConfig {
    /// Loads configuration from a TOML file. Missing keys take their defaults
    /// and relative paths resolve against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading activation config {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.components_dir = resolve(&base, &config.components_dir);
        config.log_path = resolve(&base, &config.log_path);
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            bail!("learning_rate must be in (0, 1], got {}", self.learning_rate);
        }
        if self.reasoning_depth == 0 {
            bail!("reasoning_depth must be at least 1");
        }
        if self.cycle_interval_secs == 0 {
            bail!("cycle_interval_secs must be at least 1");
        }
        if self.load_timeout_ms == 0 {
            bail!("load_timeout_ms must be positive");
        }
        if self.health_window == 0 {
            bail!("health_window must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.health_floor) {
            bail!("health_floor must be within [0, 1], got {}", self.health_floor);
        }
        Ok(())
    }

    /// Interval between autonomous cycle ticks.
    #[must_use]
    pub const fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Cosmetic pause between phases.
    #[must_use]
    pub const fn phase_pause(&self) -> Duration {
        Duration::from_millis(self.phase_pause_ms)
    }

    /// Timeout applied to each component load.
    #[must_use]
    pub const fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

fn resolve(base: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = ActivationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cycle_interval(), Duration::from_secs(5));
        assert!(config.autonomous_mode);
    }

    #[test]
    fn loads_partial_file_and_resolves_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("activation.toml");
        fs::write(
            &path,
            r#"
interests = ["memory"]
safety_level = "strict"
components_dir = "parts"
phase_pause_ms = 0
"#,
        )
        .unwrap();
        let config = ActivationConfig::load(&path).unwrap();
        assert_eq!(config.interests, vec!["memory".to_string()]);
        assert_eq!(config.safety_level, SafetyLevel::Strict);
        assert_eq!(config.components_dir, dir.path().join("parts"));
        assert_eq!(config.log_path, dir.path().join("asis_activation.log"));
        assert_eq!(config.reasoning_depth, 3);
    }

    #[test]
    fn rejects_out_of_range_learning_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "learning_rate = 1.5\n").unwrap();
        let err = ActivationConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("learning_rate"));
    }
}
