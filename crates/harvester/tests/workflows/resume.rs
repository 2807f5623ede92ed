use super::*;

/// Serves papers 0..7 of a flat harvest.
async fn mount_pages(server: &MockServer) {
  serve_archive(server, vec![("cat:cs.LG".to_string(), 0..7)]).await;
}

/// Serves papers 100..105 for February 2024 and 200..204 for January 2024.
async fn mount_months(server: &MockServer) {
  let month = |range: &str| format!("(cat:cs.LG) AND submittedDate:[{range}]");
  serve_archive(server, vec![
    (month("20240201 TO 20240229"), 100..105),
    (month("20240101 TO 20240131"), 200..204),
  ])
  .await;
}

fn no_retries() -> RetryPolicy {
  RetryPolicy {
    max_attempts:    1,
    initial_backoff: Duration::ZERO,
    multiplier:      1,
    max_backoff:     Duration::ZERO,
  }
}

fn flat() -> TestResult<HarvestRequest> { Ok(HarvestRequest::new("cat:cs.LG", 100, 3)?) }

fn two_months() -> TestResult<HarvestRequest> {
  let window = DateWindow::new(YearMonth::new(2024, 2)?, YearMonth::new(2024, 1)?)?;
  Ok(flat()?.with_window(window))
}

async fn harvest(server: &MockServer, dir: &Path) -> TestResult<HarvestOutcome> {
  harvest_with(flat()?, server, dir).await
}

async fn harvest_with(
  request: HarvestRequest,
  server: &MockServer,
  dir: &Path,
) -> TestResult<HarvestOutcome> {
  let store = FileCheckpointStore::new(dir.join("checkpoint.json"));
  let sink = JsonlSink::open(dir.join("corpus.jsonl")).await?;
  let mut harvester = Harvester::new(request, fetcher_for(server), store, sink)
    .with_retry_policy(no_retries())
    .with_politeness_delay(Duration::ZERO);
  Ok(harvester.run().await)
}

fn expected_titles() -> Vec<String> { (0..7).map(|i| format!("Paper {i}")).collect() }

#[traced_test]
#[tokio::test]
async fn harvests_every_page_into_the_corpus() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_pages(&server).await;
  let dir = tempdir()?;

  let outcome = harvest(&server, dir.path()).await?;

  let summary = outcome.summary().ok_or("harvest should complete")?;
  assert_eq!(summary.total, 7);
  assert_eq!(summary.reason, CompletionReason::PartitionsExhausted);
  assert_eq!(corpus_titles(&dir.path().join("corpus.jsonl")), expected_titles());

  let checkpoint = FileCheckpointStore::new(dir.path().join("checkpoint.json")).load().await?;
  let checkpoint = checkpoint.ok_or("checkpoint should exist")?;
  assert!(checkpoint.exhausted);
  assert_eq!((checkpoint.offset, checkpoint.total), (7, 7));
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn interrupted_harvest_resumes_without_gaps_or_duplicates() -> TestResult<()> {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(query_param("start", "3"))
    .respond_with(ResponseTemplate::new(503))
    .up_to_n_times(1)
    .with_priority(1)
    .mount(&server)
    .await;
  mount_pages(&server).await;
  let dir = tempdir()?;

  let outcome = harvest(&server, dir.path()).await?;
  let HarvestOutcome::Aborted { error, checkpoint } = outcome else {
    panic!("first run should stop on the outage")
  };
  assert!(matches!(error, HarvestError::Fetch(FetchError::Status { status: 503, .. })));
  assert_eq!((checkpoint.offset, checkpoint.total), (3, 3));

  // A write that died half way leaves a torn line behind.
  let corpus = dir.path().join("corpus.jsonl");
  let mut content = std::fs::read_to_string(&corpus)?;
  content.push_str(r#"{"title":"Paper 3","abs"#);
  std::fs::write(&corpus, content)?;

  let outcome = harvest(&server, dir.path()).await?;
  assert_eq!(outcome.summary().ok_or("second run should complete")?.total, 7);
  assert_eq!(corpus_titles(&corpus), expected_titles());
  Ok(())
}

async fn request_count(server: &MockServer) -> usize {
  server.received_requests().await.map(|r| r.len()).unwrap_or_default()
}

/// Moves the stored checkpoint back to `offset` within `partition_key`, as an operator would.
async fn rewind(dir: &Path, partition_key: &str, offset: u64, total: u64) -> TestResult<()> {
  let store = FileCheckpointStore::new(dir.join("checkpoint.json"));
  let checkpoint = store.load().await?.ok_or("checkpoint should exist")?;
  let rewound =
    Checkpoint { partition_key: partition_key.to_string(), offset, total, ..checkpoint };
  store.save(&rewound).await?;
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn rerunning_a_finished_harvest_adds_nothing() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_pages(&server).await;
  let dir = tempdir()?;

  harvest(&server, dir.path()).await?;
  let requests = request_count(&server).await;

  let outcome = harvest(&server, dir.path()).await?;
  let summary = outcome.summary().ok_or("rerun should complete")?;
  assert_eq!((summary.total, summary.reason), (7, CompletionReason::PartitionsExhausted));
  // Only the end of the last partition is checked again.
  assert_eq!(request_count(&server).await, requests + 1);
  assert_eq!(corpus_titles(&dir.path().join("corpus.jsonl")), expected_titles());
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn rewound_flat_harvest_replays_without_gaps() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_pages(&server).await;
  let dir = tempdir()?;
  let corpus = dir.path().join("corpus.jsonl");

  harvest(&server, dir.path()).await?;
  let checkpoint = FileCheckpointStore::new(dir.path().join("checkpoint.json")).load().await?;
  let checkpoint = checkpoint.ok_or("checkpoint should exist")?;
  assert_eq!((checkpoint.offset, checkpoint.total), (7, 7));

  // Back one batch of three.
  rewind(dir.path(), "all", 4, 4).await?;
  let outcome = harvest(&server, dir.path()).await?;

  let summary = outcome.summary().ok_or("replay should complete")?;
  assert_eq!(summary.total, 7);
  let mut expected = expected_titles();
  expected.extend(["Paper 4", "Paper 5", "Paper 6"].map(String::from));
  assert_eq!(corpus_titles(&corpus), expected);

  let checkpoint = FileCheckpointStore::new(dir.path().join("checkpoint.json")).load().await?;
  let checkpoint = checkpoint.ok_or("checkpoint should exist")?;
  assert!(checkpoint.exhausted);
  assert_eq!((checkpoint.offset, checkpoint.total), (7, 7));
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn rewound_monthly_harvest_replays_across_partitions() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_months(&server).await;
  let dir = tempdir()?;
  let corpus = dir.path().join("corpus.jsonl");
  let papers = |ids: &[u32]| ids.iter().map(|i| format!("Paper {i}")).collect::<Vec<_>>();

  let outcome = harvest_with(two_months()?, &server, dir.path()).await?;
  assert_eq!(outcome.summary().ok_or("harvest should complete")?.total, 9);
  let first_run = papers(&[100, 101, 102, 103, 104, 200, 201, 202, 203]);
  assert_eq!(corpus_titles(&corpus), first_run);

  let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
  let checkpoint = store.load().await?.ok_or("checkpoint should exist")?;
  assert_eq!(checkpoint.partition_key, "2024-01");
  assert_eq!((checkpoint.offset, checkpoint.total), (4, 9));

  // Back into February, past the last batch of that month.
  rewind(dir.path(), "2024-02", 3, 3).await?;
  let outcome = harvest_with(two_months()?, &server, dir.path()).await?;

  let summary = outcome.summary().ok_or("replay should complete")?;
  assert_eq!((summary.total, summary.reason), (9, CompletionReason::PartitionsExhausted));
  let mut expected = first_run;
  expected.extend(papers(&[103, 104, 200, 201, 202, 203]));
  assert_eq!(corpus_titles(&corpus), expected);

  let checkpoint = store.load().await?.ok_or("checkpoint should exist")?;
  assert!(checkpoint.exhausted);
  assert_eq!(checkpoint.partition_key, "2024-01");
  assert_eq!((checkpoint.offset, checkpoint.total), (4, 9));
  Ok(())
}

#[tokio::test]
async fn checkpoint_from_another_query_is_refused() -> TestResult<()> {
  let server = MockServer::start().await;
  mount_pages(&server).await;
  let dir = tempdir()?;
  harvest(&server, dir.path()).await?;

  let request = HarvestRequest::new("cat:math.AG", 100, 3)?;
  let store = Arc::new(FileCheckpointStore::new(dir.path().join("checkpoint.json")));
  let sink = JsonlSink::open(dir.path().join("corpus.jsonl")).await?;
  let outcome = Harvester::new(request, fetcher_for(&server), store.clone(), sink).run().await;

  assert!(matches!(outcome, HarvestOutcome::Aborted {
    error: HarvestError::CheckpointMismatch { .. },
    ..
  }));
  assert!(store.reset().await?);
  Ok(())
}
