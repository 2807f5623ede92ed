//! One bounded request against the arXiv API.
//!
//! A [`BatchFetcher`] turns `(partition, offset, size)` into a [`Batch`] of records. It makes
//! exactly one request per call and never retries: deciding whether a failure is worth another
//! attempt is the [`Harvester`](crate::harvest::Harvester)'s job, guided by
//! [`FetchError::is_retryable`].
//!
//! # Examples
//!
//! ```no_run
//! use harvester::{
//!   configuration::ApiConfig,
//!   fetch::{ArxivFetcher, BatchFetcher},
//!   partition::{FlatPartitioner, Partitioner},
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = ArxivFetcher::from_config(&ApiConfig::default())?;
//! let partition = FlatPartitioner::new("cat:cs.LG").first().unwrap();
//!
//! let batch = fetcher.fetch(&partition, 0, 50).await?;
//! println!("{} records from {}", batch.records.len(), batch.partition_key);
//! # Ok(())
//! # }
//! ```

use reqwest::{
  header::{HeaderMap, HeaderValue, USER_AGENT},
  Client, StatusCode,
};
use url::Url;

use crate::{configuration::ApiConfig, parse::parse_feed};

use super::*;

/// The records returned for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
  /// Partition the batch was fetched from
  pub partition_key: String,
  /// Offset of the first record within the partition
  pub offset:        u64,
  /// Number of records asked for
  pub requested:     usize,
  /// Records actually returned; fewer than `requested` means the partition is exhausted
  pub records:       Vec<Record>,
}

impl Batch {
  /// Whether the API returned nothing at all.
  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  /// Whether the API returned fewer records than were asked for.
  pub fn is_short(&self) -> bool { self.records.len() < self.requested }
}

/// Fetches one page of a partition.
#[async_trait]
pub trait BatchFetcher: Send + Sync {
  /// Requests up to `size` records of `partition` starting at `offset`.
  ///
  /// An empty page is a successful, empty [`Batch`].
  async fn fetch(
    &self,
    partition: &Partition,
    offset: u64,
    size: usize,
  ) -> core::result::Result<Batch, FetchError>;
}

#[async_trait]
impl<T: BatchFetcher + ?Sized> BatchFetcher for std::sync::Arc<T> {
  async fn fetch(
    &self,
    partition: &Partition,
    offset: u64,
    size: usize,
  ) -> core::result::Result<Batch, FetchError> {
    (**self).fetch(partition, offset, size).await
  }
}

/// [`BatchFetcher`] for the arXiv `query` API.
///
/// Results are requested newest first (`sortBy=submittedDate`, `sortOrder=descending`), so offsets
/// within a partition stay stable while older papers are not being added to it.
#[derive(Debug, Clone)]
pub struct ArxivFetcher {
  /// Shared HTTP client carrying the timeout and user agent
  client:   Client,
  /// Query endpoint, e.g. `http://export.arxiv.org/api/query`
  endpoint: Url,
}

impl ArxivFetcher {
  /// Builds a fetcher from the `[api]` section of the configuration.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::Config`] if the base URL or user agent is invalid, or
  /// [`HarvestError::Fetch`] if the HTTP client cannot be constructed.
  pub fn from_config(config: &ApiConfig) -> Result<Self> {
    let endpoint = Url::parse(&config.base_url).map_err(|e| {
      HarvestError::Config(format!("invalid API base URL {}: {e}", config.base_url))
    })?;

    let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|e| {
      HarvestError::Config(format!("invalid user agent {:?}: {e}", config.user_agent))
    })?;
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, user_agent);

    let client = Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(FetchError::from)?;

    Ok(Self { client, endpoint })
  }

  /// The full request URL for one page of `partition`.
  pub fn page_url(&self, partition: &Partition, offset: u64, size: usize) -> Url {
    let mut url = self.endpoint.clone();
    url
      .query_pairs_mut()
      .append_pair("search_query", &partition.query)
      .append_pair("start", &offset.to_string())
      .append_pair("max_results", &size.to_string())
      .append_pair("sortBy", "submittedDate")
      .append_pair("sortOrder", "descending");
    url
  }
}

#[async_trait]
impl BatchFetcher for ArxivFetcher {
  async fn fetch(
    &self,
    partition: &Partition,
    offset: u64,
    size: usize,
  ) -> core::result::Result<Batch, FetchError> {
    if size > MAX_BATCH_SIZE {
      return Err(FetchError::Query(format!(
        "page size {size} exceeds the server-safe maximum of {MAX_BATCH_SIZE}"
      )));
    }

    let url = self.page_url(partition, offset, size);
    trace!("GET {url}");

    let response = self.client.get(url).send().await?;
    let status = response.status();
    let data = response.bytes().await?;
    trace!("{partition}@{offset}: HTTP {status}, {} bytes", data.len());

    if !status.is_success() {
      return Err(classify_status(status, &data));
    }

    let feed = parse_feed(&data)?;
    if feed.skipped > 0 {
      warn!("{partition}@{offset}: skipped {} malformed entries", feed.skipped);
    }
    debug!(
      "{partition}@{offset}: {} of {size} records (result set {:?})",
      feed.records.len(),
      feed.total_results
    );

    Ok(Batch {
      partition_key: partition.key.clone(),
      offset,
      requested: size,
      records: feed.records,
    })
  }
}

/// Maps a non-success status to a [`FetchError`], keeping arXiv's own error text when the body is
/// an error feed.
fn classify_status(status: StatusCode, body: &[u8]) -> FetchError {
  let message = crate::parse::api_error_message(body)
    .unwrap_or_else(|| status.canonical_reason().unwrap_or("unexpected status").to_string());

  if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
    FetchError::Query(format!("HTTP {}: {message}", status.as_u16()))
  } else {
    FetchError::Status { status: status.as_u16(), message }
  }
}
