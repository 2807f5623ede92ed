use super::*;

#[traced_test]
#[tokio::test]
async fn sends_the_page_parameters_and_user_agent() -> TestResult<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/api/query"))
    .and(query_param("search_query", "cat:cs.LG"))
    .and(query_param("start", "10"))
    .and(query_param("max_results", "5"))
    .and(query_param("sortBy", "submittedDate"))
    .and(query_param("sortOrder", "descending"))
    .and(header("user-agent", ApiConfig::default().user_agent.as_str()))
    .respond_with(atom(feed(10..12)))
    .expect(1)
    .mount(&server)
    .await;

  let batch = fetcher_for(&server).fetch(&flat_partition("cat:cs.LG"), 10, 5).await?;

  assert_eq!(batch.partition_key, "all");
  assert_eq!(batch.offset, 10);
  assert_eq!(batch.records.len(), 2);
  assert!(batch.is_short());
  assert_eq!(batch.records[0].title, "Paper 10");
  assert_eq!(batch.records[0].arxiv_id, "2401.00010v1");
  assert_eq!(batch.records[1].authors, ["Author 11"]);
  Ok(())
}

#[tokio::test]
async fn empty_feed_is_an_empty_batch() -> TestResult<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET")).respond_with(atom(feed([]))).mount(&server).await;

  let batch = fetcher_for(&server).fetch(&flat_partition("cat:cs.LG"), 0, 5).await?;
  assert!(batch.is_empty());
  Ok(())
}

#[tokio::test]
async fn server_errors_are_retryable() {
  let server = MockServer::start().await;
  Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

  let err = fetcher_for(&server).fetch(&flat_partition("cat:cs.LG"), 0, 5).await.unwrap_err();
  assert!(matches!(err, FetchError::Status { status: 503, .. }));
  assert!(err.is_retryable());
}

#[tokio::test]
async fn throttling_is_retryable() {
  let server = MockServer::start().await;
  Mock::given(method("GET")).respond_with(ResponseTemplate::new(429)).mount(&server).await;

  let err = fetcher_for(&server).fetch(&flat_partition("cat:cs.LG"), 0, 5).await.unwrap_err();
  assert!(err.is_retryable());
}

#[tokio::test]
async fn rejected_query_keeps_the_api_message() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(
      ResponseTemplate::new(400)
        .set_body_raw(error_feed("malformed id: 1234.12345"), "application/atom+xml"),
    )
    .mount(&server)
    .await;

  let err = fetcher_for(&server).fetch(&flat_partition("id:1234"), 0, 5).await.unwrap_err();
  let FetchError::Query(message) = &err else { panic!("expected a query error, got {err:?}") };
  assert!(message.contains("malformed id"), "{message}");
  assert!(!err.is_retryable());
}

#[tokio::test]
async fn error_feed_with_success_status_is_a_query_error() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(atom(error_feed("max_results must be non-negative")))
    .mount(&server)
    .await;

  let err = fetcher_for(&server).fetch(&flat_partition("cat:cs.LG"), 0, 5).await.unwrap_err();
  assert!(matches!(err, FetchError::Query(_)));
}

#[tokio::test]
async fn garbage_body_is_malformed() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(200).set_body_raw("<html>busy</html>", "text/html"))
    .mount(&server)
    .await;

  let err = fetcher_for(&server).fetch(&flat_partition("cat:cs.LG"), 0, 5).await.unwrap_err();
  assert!(matches!(err, FetchError::Malformed(_)));
  assert!(err.is_retryable());
}

#[tokio::test]
async fn truncated_feed_is_malformed() {
  let server = MockServer::start().await;
  let mut body = feed(0..3);
  body.truncate(body.len() / 2);
  Mock::given(method("GET")).respond_with(atom(body)).mount(&server).await;

  let err = fetcher_for(&server).fetch(&flat_partition("cat:cs.LG"), 0, 5).await.unwrap_err();
  assert!(matches!(err, FetchError::Malformed(_)));
}
