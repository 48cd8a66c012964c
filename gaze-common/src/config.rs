//! Configuration loading and config file resolution
//!
//! Configuration file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`~/.config/gaze/<module>.toml`)
//! 4. System config file (`/etc/gaze/<module>.toml`, Linux only)
//! 5. Compiled defaults (fallback)
//!
//! A missing default-location file is not an error; an explicitly named file
//! that does not exist is.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cohen::ExpectedBasis;
use crate::model::CategoryScheme;
use crate::ranges::{ExpandOptions, MissingFramePolicy, OverlapPolicy, DEFAULT_MAX_FRAME};
use crate::{Error, Result};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "GAZE_CONFIG";

/// Which rater counts a batch must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaterMode {
    /// Exactly two files, Cohen's kappa only
    Pairwise,
    /// Exactly three files, Cohen's kappa per pair plus Fleiss' kappa
    Fleiss,
    /// Two or more files, Fleiss' kappa whenever there are at least three
    #[default]
    Open,
}

impl RaterMode {
    /// Minimum number of files for any statistic
    pub fn min_raters(&self) -> usize {
        match self {
            RaterMode::Pairwise => 2,
            RaterMode::Fleiss => 3,
            RaterMode::Open => 2,
        }
    }

    /// Maximum number of files accepted, `None` when unbounded
    pub fn max_raters(&self) -> Option<usize> {
        match self {
            RaterMode::Pairwise => Some(2),
            RaterMode::Fleiss => Some(3),
            RaterMode::Open => None,
        }
    }

    /// Whether Fleiss' kappa is reported for `raters` files
    pub fn wants_fleiss(&self, raters: usize) -> bool {
        match self {
            RaterMode::Pairwise => false,
            RaterMode::Fleiss | RaterMode::Open => raters >= 3,
        }
    }
}

impl std::str::FromStr for RaterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pairwise" | "cohen" => Ok(RaterMode::Pairwise),
            "fleiss" => Ok(RaterMode::Fleiss),
            "open" | "any" => Ok(RaterMode::Open),
            other => Err(Error::Config(format!("unknown rater mode '{}'", other))),
        }
    }
}

/// Settings for the agreement computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub rater_mode: RaterMode,
    pub overlap_policy: OverlapPolicy,
    pub missing_frames: MissingFramePolicy,
    /// Expected-agreement denominator for overall pairwise kappa
    pub overall_basis: ExpectedBasis,
    /// Expected-agreement denominator for category-binarized kappa
    pub category_basis: ExpectedBasis,
    /// Block computation when files disagree on sampling stride
    pub validate_intervals: bool,
    /// Largest frame index a range may reach
    pub max_frame: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rater_mode: RaterMode::default(),
            overlap_policy: OverlapPolicy::default(),
            missing_frames: MissingFramePolicy::default(),
            overall_basis: ExpectedBasis::Overlap,
            category_basis: ExpectedBasis::Overlap,
            validate_intervals: true,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

impl AnalysisConfig {
    pub fn expand_options(&self) -> ExpandOptions {
        ExpandOptions {
            overlap: self.overlap_policy,
            max_frame: self.max_frame,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5790,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete TOML configuration, every section optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    pub scheme: CategoryScheme,
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheme.validate()?;
        if self.analysis.max_frame == 0 {
            return Err(Error::Config("analysis.max_frame must be positive".to_string()));
        }
        if self.server.host.trim().is_empty() {
            return Err(Error::Config("server.host must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Find the config file to load, `None` when only defaults apply
pub fn resolve_config_path(
    module: &str,
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    let file_name = format!("{}.toml", module);
    if let Some(path) = dirs::config_dir().map(|d| d.join("gaze").join(&file_name)) {
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 4: System config (Linux)
    if cfg!(target_os = "linux") {
        let system = PathBuf::from("/etc/gaze").join(&file_name);
        if system.exists() {
            return Some(system);
        }
    }

    None
}

/// Resolve and load configuration, falling back to compiled defaults
pub fn load_config(module: &str, cli_arg: Option<&Path>, env_var_name: &str) -> Result<TomlConfig> {
    match resolve_config_path(module, cli_arg, env_var_name) {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
            })?;
            let config = TomlConfig::from_toml_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => {
            warn!("No config file found for {}, using compiled defaults", module);
            Ok(TomlConfig::default())
        }
    }
}
