//! Error types for the harvester library.
//!
//! Two enums cover the failure modes of a harvest:
//!
//! - [`FetchError`]: what went wrong talking to the remote API, classified so the controller can
//!   decide between retrying and stopping.
//! - [`HarvestError`]: the crate-wide error, wrapping fetch failures together with persistence,
//!   configuration and request validation errors.
//!
//! # Examples
//!
//! ```
//! use harvester::error::{FetchError, HarvestError};
//!
//! let err = FetchError::Malformed("unexpected end of document".into());
//! assert!(err.is_retryable());
//!
//! let err = HarvestError::from(FetchError::Query("bad search_query".into()));
//! assert!(matches!(err, HarvestError::Fetch(FetchError::Query(_))));
//! ```

use thiserror::Error;

/// Error type alias used for the [`harvester`](crate) crate.
pub type Result<T> = core::result::Result<T, HarvestError>;

/// Failures of a single batch request, classified for retry decisions.
///
/// An empty result set is not a failure: it is returned as an empty
/// [`Batch`](crate::fetch::Batch) and signals the end of a partition.
#[derive(Error, Debug)]
pub enum FetchError {
  /// The request never produced a usable response.
  ///
  /// This covers connection failures, timeouts and interrupted bodies. Retryable.
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  /// The server answered with a non-success status.
  ///
  /// Server-side failures (5xx) and throttling (429) are retryable, every other status is
  /// treated as a rejected query.
  #[error("HTTP {status}: {message}")]
  Status {
    /// The HTTP status code returned.
    status:  u16,
    /// Error text extracted from the response body, if any.
    message: String,
  },

  /// The response body could not be decoded as an Atom feed.
  ///
  /// The remote service is assumed to be at fault, so this is retryable.
  #[error("malformed response: {0}")]
  Malformed(String),

  /// The query itself was rejected. Retrying would repeat the failure.
  #[error("query rejected: {0}")]
  Query(String),
}

impl FetchError {
  /// Whether repeating the identical request may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      FetchError::Transport(_) | FetchError::Malformed(_) => true,
      FetchError::Status { status, .. } => *status == 429 || *status >= 500,
      FetchError::Query(_) => false,
    }
  }
}

/// Errors that can occur while harvesting.
#[derive(Error, Debug)]
pub enum HarvestError {
  /// A batch could not be fetched.
  #[error(transparent)]
  Fetch(#[from] FetchError),

  /// Writing the corpus or the checkpoint failed.
  ///
  /// The checkpoint is never advanced past a persistence failure.
  #[error("persistence error: {0}")]
  Persistence(#[from] std::io::Error),

  /// A record or checkpoint could not be serialized.
  #[error(transparent)]
  Serialization(#[from] serde_json::Error),

  /// The harvest request failed validation.
  #[error("invalid harvest request: {0}")]
  InvalidRequest(String),

  /// The stored checkpoint belongs to a different query.
  #[error(
    "checkpoint was written for query \"{checkpoint}\" but this run asks for \"{request}\"; \
     reset the checkpoint to start over"
  )]
  CheckpointMismatch {
    /// Query recorded in the checkpoint.
    checkpoint: String,
    /// Query of the current request.
    request:    String,
  },

  /// The run was cancelled before it finished.
  #[error("harvest cancelled")]
  Cancelled,

  /// Configuration was missing or inconsistent.
  #[error("{0}")]
  Config(String),

  /// A configuration file could not be parsed.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// A configuration could not be written as TOML.
  #[error(transparent)]
  TomlSer(#[from] toml::ser::Error),
}
