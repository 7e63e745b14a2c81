use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "ocrwatch.toml";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub watch: WatchConfig,
    pub stability: StabilityConfig,
    pub command: CommandConfig,
    pub log: LogConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WatchConfig {
    pub dir: PathBuf,
    pub extensions: Vec<String>,
    /// Caps the processed-path set with LRU eviction. Unbounded when absent.
    pub max_tracked_paths: Option<usize>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StabilityConfig {
    pub poll_interval_secs: f64,
    pub required_stable_polls: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CommandConfig {
    /// Program and leading arguments; the image path is appended last.
    pub program: Vec<String>,
    pub timeout_secs: f64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub file: Option<PathBuf>,
    pub level: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Loads `path` if given, else `ocrwatch.toml` from the working directory
    /// when it exists, else the built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.program.is_empty() {
            bail!("command.program must name at least the executable");
        }
        if self.watch.extensions.is_empty() {
            bail!("watch.extensions must not be empty");
        }
        if self.watch.max_tracked_paths == Some(0) {
            bail!("watch.max_tracked_paths must be at least 1");
        }
        if self.stability.required_stable_polls == 0 {
            bail!("stability.required_stable_polls must be at least 1");
        }
        positive_secs("stability.poll_interval_secs", self.stability.poll_interval_secs)?;
        positive_secs("command.timeout_secs", self.command.timeout_secs)?;
        Ok(())
    }
}

fn positive_secs(name: &str, value: f64) -> Result<()> {
    if value <= 0.0 || Duration::try_from_secs_f64(value).is_err() {
        bail!("{} must be a positive number of seconds, got {}", name, value);
    }
    Ok(())
}

impl WatchConfig {
    /// Case-insensitive extension match against the allow-set.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.max_tracked_paths.and_then(NonZeroUsize::new)
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    /// Upper bound on polls for one stabilization attempt.
    pub fn max_polls(&self) -> u32 {
        self.required_stable_polls.saturating_mul(10)
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            dir: PathBuf::from("watch_folder"),
            extensions: ["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_tracked_paths: None,
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        StabilityConfig {
            poll_interval_secs: 2.0,
            required_stable_polls: 5,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        CommandConfig {
            program: vec!["bash".to_string(), "ocr_process.sh".to_string()],
            timeout_secs: 300.0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            file: Some(PathBuf::from("ocrwatch.log")),
            level: "info".to_string(),
        }
    }
}
