use std::{collections::HashMap, error::Error, ops::Range, path::Path, sync::Arc, time::Duration};

use harvester::{
  checkpoint::FileCheckpointStore,
  configuration::ApiConfig,
  error::{FetchError, HarvestError},
  fetch::ArxivFetcher,
  harvest::{CompletionReason, HarvestOutcome, Harvester, RetryPolicy},
  prelude::*,
  request::{DateWindow, YearMonth},
  sink::JsonlSink,
  Config,
};
use tempfile::tempdir;
use tracing_test::traced_test;
use wiremock::{
  matchers::{header, method, path, query_param},
  Mock, MockServer, Request, ResponseTemplate,
};

mod fetch;
mod workflows;

pub type TestResult<T> = Result<T, Box<dyn Error>>;

/// An Atom page holding the papers numbered `ids`.
pub fn feed(ids: impl IntoIterator<Item = u32>) -> String {
  let entries: String = ids
    .into_iter()
    .map(|i| {
      format!(
        r#"
  <entry>
    <id>http://arxiv.org/abs/2401.{i:05}v1</id>
    <published>2024-01-15T12:00:00Z</published>
    <title>Paper {i}</title>
    <summary>Abstract of paper {i}.</summary>
    <author><name>Author {i}</name></author>
  </entry>"#
      )
    })
    .collect();
  format!(
    r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/test</id>{entries}
</feed>"#
  )
}

/// The feed arXiv sends back when it rejects a query.
pub fn error_feed(message: &str) -> String {
  format!(
    r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=</title>
  <id>http://arxiv.org/api/errors</id>
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format</id>
    <title>Error</title>
    <summary>{message}</summary>
  </entry>
</feed>"#
  )
}

pub fn atom(body: String) -> ResponseTemplate {
  ResponseTemplate::new(200).set_body_raw(body, "application/atom+xml; charset=utf-8")
}

/// A fetcher pointed at the mock server.
pub fn fetcher_for(server: &MockServer) -> ArxivFetcher {
  let config = Config::default().with_base_url(&format!("{}/api/query", server.uri()));
  ArxivFetcher::from_config(&config.api).unwrap()
}

/// Serves an archive in which each `search_query` matches the papers numbered by its range, paged
/// by `start` and `max_results` the way the live API pages.
pub async fn serve_archive(server: &MockServer, archive: Vec<(String, Range<u32>)>) {
  Mock::given(method("GET"))
    .and(path("/api/query"))
    .respond_with(move |request: &Request| {
      let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
      let number = |name: &str| params.get(name).and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
      let papers = archive
        .iter()
        .find(|(query, _)| params.get("search_query") == Some(query))
        .map(|(_, papers)| papers.clone())
        .unwrap_or(0..0);
      let first = papers.start.saturating_add(number("start")).min(papers.end);
      let last = first.saturating_add(number("max_results")).min(papers.end);
      atom(feed(first..last))
    })
    .mount(server)
    .await;
}

pub fn flat_partition(query: &str) -> Partition {
  harvester::partition::FlatPartitioner::new(query).first().unwrap()
}

/// Titles of every line in a JSON Lines corpus.
pub fn corpus_titles(path: &Path) -> Vec<String> {
  std::fs::read_to_string(path)
    .unwrap()
    .lines()
    .map(|line| serde_json::from_str::<Record>(line).unwrap().title)
    .collect()
}
