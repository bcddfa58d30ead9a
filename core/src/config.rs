//! Engine tuning and its file/environment loading.
//!
//! [`EngineConfig`] is the per-load tuning surface of the jukebox;
//! [`Settings`] wraps it for the cli, loading an `Evermix.toml` plus
//! `EVERMIX_`-prefixed environment overrides.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use std::path::PathBuf;

pub static DEFAULT_CONFIG: &str = include_str!("../Evermix.toml");

/// Tuning knobs for graph construction and branch selection.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Cap on per-beat candidate edges.
    #[serde(default = "default_max_branches")]
    pub max_branches: usize,
    /// Ceiling for candidate acceptance.
    #[serde(default = "default_max_branch_threshold")]
    pub max_branch_threshold: u32,
    /// Active filter threshold; 0 means pick one adaptively.
    #[serde(default)]
    pub current_threshold: u32,
    /// Inject a long anchoring back-edge if none exists.
    #[serde(default = "default_add_last_edge")]
    pub add_last_edge: bool,
    /// Restrict jumps to earlier beats.
    #[serde(default)]
    pub just_backwards: bool,
    /// Restrict to jumps spanning at least `min_long_branch` beats.
    #[serde(default)]
    pub just_long_branches: bool,
    /// Drop edges that duplicate a sibling beat's jump offset.
    #[serde(default)]
    pub remove_sequential_branches: bool,
    /// Floor of the jump probability.
    #[serde(default = "default_min_random_branch_chance")]
    pub min_random_branch_chance: f64,
    /// Ceiling of the jump probability.
    #[serde(default = "default_max_random_branch_chance")]
    pub max_random_branch_chance: f64,
    /// Ramp increment added to the jump probability per non-jumping beat.
    #[serde(default = "default_random_branch_chance_delta")]
    pub random_branch_chance_delta: f64,
    /// Minimum beat span for a branch to count as "long".
    /// Unset means one fifth of the track's beats.
    #[serde(default)]
    pub min_long_branch: Option<usize>,
}

const fn default_max_branches() -> usize {
    4
}

const fn default_max_branch_threshold() -> u32 {
    80
}

const fn default_add_last_edge() -> bool {
    true
}

const fn default_min_random_branch_chance() -> f64 {
    0.18
}

const fn default_max_random_branch_chance() -> f64 {
    0.5
}

const fn default_random_branch_chance_delta() -> f64 {
    0.018
}

impl Default for EngineConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_branches: default_max_branches(),
            max_branch_threshold: default_max_branch_threshold(),
            current_threshold: 0,
            add_last_edge: default_add_last_edge(),
            just_backwards: false,
            just_long_branches: false,
            remove_sequential_branches: false,
            min_random_branch_chance: default_min_random_branch_chance(),
            max_random_branch_chance: default_max_random_branch_chance(),
            random_branch_chance_delta: default_random_branch_chance_delta(),
            min_long_branch: None,
        }
    }
}

impl EngineConfig {
    /// Resolve the "long branch" span threshold for a track.
    #[must_use]
    #[inline]
    pub fn min_long_branch(&self, total_beats: usize) -> usize {
        self.min_long_branch.unwrap_or(total_beats / 5)
    }

    /// Shallow-merge a partial update into this config.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn apply(&mut self, patch: &EngineConfigPatch) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = patch.$field {
                    self.$field = value;
                })*
            };
        }
        merge!(
            max_branches,
            max_branch_threshold,
            current_threshold,
            add_last_edge,
            just_backwards,
            just_long_branches,
            remove_sequential_branches,
            min_random_branch_chance,
            max_random_branch_chance,
            random_branch_chance_delta,
        );
        if let Some(value) = patch.min_long_branch {
            self.min_long_branch = Some(value);
        }
    }
}

/// A partial [`EngineConfig`]; unset fields keep their current value.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
pub struct EngineConfigPatch {
    #[serde(default)]
    pub max_branches: Option<usize>,
    #[serde(default)]
    pub max_branch_threshold: Option<u32>,
    #[serde(default)]
    pub current_threshold: Option<u32>,
    #[serde(default)]
    pub add_last_edge: Option<bool>,
    #[serde(default)]
    pub just_backwards: Option<bool>,
    #[serde(default)]
    pub just_long_branches: Option<bool>,
    #[serde(default)]
    pub remove_sequential_branches: Option<bool>,
    #[serde(default)]
    pub min_random_branch_chance: Option<f64>,
    #[serde(default)]
    pub max_random_branch_chance: Option<f64>,
    #[serde(default)]
    pub random_branch_chance_delta: Option<f64>,
    #[serde(default)]
    pub min_long_branch: Option<usize>,
}

/// Settings for the cli front end.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    /// What level of logging to use. Default is "info".
    #[serde(default = "default_log_level")]
    pub log_level: log::LevelFilter,
}

const fn default_log_level() -> log::LevelFilter {
    log::LevelFilter::Info
}

impl Default for Settings {
    #[inline]
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from the config file and `EVERMIX_`-prefixed
    /// environment variables (e.g. `EVERMIX_ENGINE__MAX_BRANCHES=6`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is missing or invalid.
    #[inline]
    pub fn init(config_path: PathBuf) -> Result<Self, ConfigError> {
        let path = shellexpand::tilde(&config_path.to_string_lossy()).into_owned();
        let s = Config::builder()
            .add_source(File::from(PathBuf::from(path)))
            .add_source(
                Environment::with_prefix("EVERMIX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// The default path to the config file, created with the default config
    /// when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory could not be found or
    /// the file could not be created.
    #[inline]
    pub fn get_config_path() -> Result<PathBuf, std::io::Error> {
        let Some(proj_dirs) = directories_config_dir() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Unable to find the config directory for evermix.",
            ));
        };
        if !proj_dirs.exists() {
            std::fs::create_dir_all(&proj_dirs)?;
        }
        let config_file = proj_dirs.join("Evermix.toml");
        if !config_file.exists() {
            std::fs::write(&config_file, DEFAULT_CONFIG)?;
        }
        Ok(config_file)
    }
}

fn directories_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("EVERMIX_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    directories::ProjectDirs::from("com", "evermix", "evermix")
        .map(|dirs| dirs.config_local_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_branches, 4);
        assert_eq!(config.max_branch_threshold, 80);
        assert_eq!(config.current_threshold, 0);
        assert!(config.add_last_edge);
        assert!(!config.just_backwards);
        assert_eq!(config.min_random_branch_chance, 0.18);
        assert_eq!(config.max_random_branch_chance, 0.5);
    }

    #[rstest]
    #[case::derived(None, 600, 120)]
    #[case::explicit(Some(30), 600, 30)]
    #[case::tiny_track(None, 4, 0)]
    fn test_min_long_branch(
        #[case] setting: Option<usize>,
        #[case] total_beats: usize,
        #[case] expected: usize,
    ) {
        let config = EngineConfig {
            min_long_branch: setting,
            ..EngineConfig::default()
        };
        assert_eq!(config.min_long_branch(total_beats), expected);
    }

    #[test]
    fn test_apply_patch_merges_only_set_fields() {
        let mut config = EngineConfig::default();
        let patch = EngineConfigPatch {
            max_branches: Some(6),
            just_backwards: Some(true),
            ..EngineConfigPatch::default()
        };
        config.apply(&patch);
        assert_eq!(config.max_branches, 6);
        assert!(config.just_backwards);
        // untouched fields keep their defaults
        assert_eq!(config.max_branch_threshold, 80);
        assert_eq!(config.min_random_branch_chance, 0.18);
    }

    #[test]
    fn test_init_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
log_level = "debug"

[engine]
max_branches = 6
just_backwards = true
min_long_branch = 25
            "#,
        )
        .unwrap();

        let settings = Settings::init(config_path).unwrap();

        assert_eq!(settings.log_level, log::LevelFilter::Debug);
        assert_eq!(settings.engine.max_branches, 6);
        assert!(settings.engine.just_backwards);
        assert_eq!(settings.engine.min_long_branch, Some(25));
        // unset keys fall back to defaults
        assert_eq!(settings.engine.max_branch_threshold, 80);
    }

    #[test]
    fn test_default_config_works() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, DEFAULT_CONFIG).unwrap();

        let settings = Settings::init(config_path);

        assert!(settings.is_ok(), "Error: {:?}", settings.err());
        assert_eq!(settings.unwrap(), Settings::default());
    }
}
