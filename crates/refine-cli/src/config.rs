//! Configuration for the refine CLI: output formatting and the handful
//! of global knobs that don't belong on every subcommand's argument list.

use dirs::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RefineCliError, Result};

pub const CONFIG_FILE_NAME: &str = "refine.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Global verbose setting, overridden by `--verbose`.
    #[serde(default)]
    pub verbose: bool,

    /// Pretty-print JSON output instead of compact single-line JSON.
    #[serde(default = "default_true")]
    pub pretty: bool,

    /// Starting value for the evaluator's inference-variable counter.
    /// Fixing this makes a `simplify`/`solve` trace reproducible across
    /// runs instead of depending on incidental call order.
    #[serde(default)]
    pub var_id_seed: u32,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            pretty: true,
            var_id_seed: 0,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Searches, in order: the current directory, the user's home
    /// directory, then the system configuration directory. Falls back to
    /// `Config::default()` if none is found.
    pub fn load() -> Result<Self> {
        match Self::find_config_file()? {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RefineCliError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| RefineCliError::Config(format!("failed to parse configuration: {e}")))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RefineCliError::Config(format!("failed to serialize configuration: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn check_current_dir_config() -> Option<PathBuf> {
        let path = PathBuf::from(CONFIG_FILE_NAME);
        path.exists().then_some(path)
    }

    fn check_home_config() -> Option<PathBuf> {
        home_dir()
            .map(|dir| dir.join(".config").join("refine").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    fn check_system_config() -> Option<PathBuf> {
        config_dir()
            .map(|dir| dir.join("refine").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    fn find_config_file() -> Result<Option<PathBuf>> {
        Ok(Self::check_current_dir_config()
            .or_else(Self::check_home_config)
            .or_else(Self::check_system_config))
    }
}
