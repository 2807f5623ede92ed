//! Runtime configuration, stored as TOML.
//!
//! [`Config`] holds the settings that stay the same from one harvest to the next: where the API
//! lives and how to talk to it, how patient to be with it, and where the corpus and checkpoint are
//! kept. What to harvest is not configuration; that is the
//! [`HarvestRequest`](crate::request::HarvestRequest).
//!
//! ```toml
//! [api]
//! base_url = "http://export.arxiv.org/api/query"
//! user_agent = "harvester/0.1.0"
//! timeout_secs = 60
//!
//! [harvest]
//! politeness_delay_ms = 3000
//!
//! [harvest.retry]
//! max_attempts = 3
//! initial_backoff_ms = 1000
//! multiplier = 2
//! max_backoff_ms = 30000
//!
//! [paths]
//! output = "/home/me/.local/share/harvester/corpus.jsonl"
//! checkpoint = "/home/me/.local/share/harvester/checkpoint.json"
//! ```
//!
//! Every section and key is optional; missing values take their defaults.

use super::*;

/// Default arXiv query endpoint.
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// How to reach the API
  pub api:     ApiConfig,
  /// Pacing and retry behaviour
  pub harvest: HarvestConfig,
  /// Where output and progress are stored
  pub paths:   PathsConfig,
}

/// The `[api]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Query endpoint
  pub base_url:     String,
  /// `User-Agent` sent with every request
  pub user_agent:   String,
  /// Per-request timeout, in seconds
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url:     ARXIV_API_URL.to_string(),
      user_agent:   concat!("harvester/", env!("CARGO_PKG_VERSION")).to_string(),
      timeout_secs: 60,
    }
  }
}

/// The `[harvest]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
  /// Pause between successive requests to the same partition, in milliseconds
  pub politeness_delay_ms: u64,
  /// Backoff for retryable failures
  pub retry:               RetryConfig,
}

impl Default for HarvestConfig {
  fn default() -> Self { Self { politeness_delay_ms: 3_000, retry: RetryConfig::default() } }
}

impl HarvestConfig {
  /// The politeness delay as a [`Duration`].
  pub fn politeness_delay(&self) -> Duration { Duration::from_millis(self.politeness_delay_ms) }
}

/// The `[harvest.retry]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  /// Attempts per request, including the first
  pub max_attempts:       u32,
  /// Wait before the first retry, in milliseconds
  pub initial_backoff_ms: u64,
  /// Factor the wait grows by after each retry
  pub multiplier:         u32,
  /// Upper bound for any single wait, in milliseconds
  pub max_backoff_ms:     u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self { max_attempts: 3, initial_backoff_ms: 1_000, multiplier: 2, max_backoff_ms: 30_000 }
  }
}

/// The `[paths]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
  /// JSON Lines corpus the records are appended to
  pub output:     PathBuf,
  /// Checkpoint document
  pub checkpoint: PathBuf,
}

impl Default for PathsConfig {
  fn default() -> Self {
    Self {
      output:     Config::default_data_dir().join("corpus.jsonl"),
      checkpoint: Config::default_data_dir().join("checkpoint.json"),
    }
  }
}

impl Config {
  /// Returns the default location of the configuration file.
  ///
  /// - On Unix: `~/.config/harvester/config.toml`
  /// - On macOS: `~/Library/Application Support/harvester/config.toml`
  /// - On Windows: `%APPDATA%\harvester\config.toml`
  /// - Fallback: `./harvester/config.toml`
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("harvester").join("config.toml")
  }

  /// Returns the default directory for the corpus and checkpoint.
  ///
  /// - On Unix: `~/.local/share/harvester`
  /// - On macOS: `~/Library/Application Support/harvester`
  /// - On Windows: `%APPDATA%\harvester`
  /// - Fallback: `./harvester`
  pub fn default_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("harvester")
  }

  /// Reads a configuration file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
  }

  /// Reads `path` if it exists, otherwise returns the defaults.
  pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if path.exists() {
      debug!("Loading configuration from {}", path.display());
      Self::load(path)
    } else {
      debug!("No configuration at {}, using defaults", path.display());
      Ok(Self::default())
    }
  }

  /// Writes the configuration to `path`, creating parent directories.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(self)?)?;
    Ok(())
  }

  /// Checks values that would make a harvest misbehave.
  pub fn validate(&self) -> Result<()> {
    if self.api.timeout_secs == 0 {
      return Err(HarvestError::Config("api.timeout_secs must be positive".into()));
    }
    if self.harvest.retry.max_attempts == 0 {
      return Err(HarvestError::Config("harvest.retry.max_attempts must be at least 1".into()));
    }
    if self.harvest.retry.multiplier == 0 {
      return Err(HarvestError::Config("harvest.retry.multiplier must be at least 1".into()));
    }
    Ok(())
  }

  /// Sets the corpus location.
  pub fn with_output_path(mut self, path: &Path) -> Self {
    self.paths.output = path.to_path_buf();
    self
  }

  /// Sets the checkpoint location.
  pub fn with_checkpoint_path(mut self, path: &Path) -> Self {
    self.paths.checkpoint = path.to_path_buf();
    self
  }

  /// Sets the pause between requests to the same partition.
  pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
    self.harvest.politeness_delay_ms = delay.as_millis() as u64;
    self
  }

  /// Sets the API endpoint.
  pub fn with_base_url(mut self, base_url: &str) -> Self {
    self.api.base_url = base_url.to_string();
    self
  }
}
