//! Module for running a harvest.

use chrono::{Local, NaiveDate};
use harvester::{
  fetch::ArxivFetcher,
  harvest::{HarvestOutcome, Harvester},
  request::{
    DateWindow, YearMonth, DEFAULT_BASE_QUERY, DEFAULT_BATCH_SIZE, DEFAULT_TARGET_COUNT,
    DEFAULT_WINDOW_YEARS,
  },
  sink::JsonlSink,
};
use tokio_util::sync::CancellationToken;

use super::*;

/// Options for [`Commands::Run`].
#[derive(Args, Clone, Debug)]
pub struct RunOptions {
  /// arXiv search expression applied to every partition
  #[arg(long, short, default_value = DEFAULT_BASE_QUERY)]
  pub query: String,

  /// Number of records to harvest
  #[arg(long, short, default_value_t = DEFAULT_TARGET_COUNT)]
  pub target: u64,

  /// Records requested per API call (at most 500)
  #[arg(long, short, default_value_t = DEFAULT_BATCH_SIZE)]
  pub batch_size: usize,

  /// Newest month to harvest; defaults to the current month
  #[arg(long, value_name = "YYYY-MM")]
  pub start: Option<YearMonth>,

  /// Oldest month to harvest; defaults to three years before today
  #[arg(long, value_name = "YYYY-MM")]
  pub stop: Option<YearMonth>,

  /// Harvest the query as a whole instead of month by month
  #[arg(long, conflicts_with_all = ["start", "stop"])]
  pub flat: bool,

  /// Corpus file to append to instead of the configured one
  #[arg(long)]
  pub output: Option<PathBuf>,

  /// Checkpoint file to use instead of the configured one
  #[arg(long)]
  pub checkpoint: Option<PathBuf>,

  /// Pause between requests to the same partition, in milliseconds
  #[arg(long)]
  pub delay_ms: Option<u64>,
}

impl RunOptions {
  /// Builds the harvest request, filling in the default window relative to `today`.
  pub fn request(&self, today: NaiveDate) -> Result<HarvestRequest> {
    let request = HarvestRequest::new(&self.query, self.target, self.batch_size)?;
    if self.flat {
      return Ok(request);
    }

    let default = DateWindow::trailing_years(today, DEFAULT_WINDOW_YEARS);
    let window =
      DateWindow::new(self.start.unwrap_or(default.start), self.stop.unwrap_or(default.stop))?;
    Ok(request.with_window(window))
  }

  /// Applies the path and pacing overrides to `config`.
  pub fn apply(&self, mut config: Config) -> Config {
    if let Some(output) = &self.output {
      config = config.with_output_path(output);
    }
    if let Some(checkpoint) = &self.checkpoint {
      config = config.with_checkpoint_path(checkpoint);
    }
    if let Some(delay_ms) = self.delay_ms {
      config = config.with_politeness_delay(std::time::Duration::from_millis(delay_ms));
    }
    config
  }
}

/// Function for the [`Commands::Run`] in the CLI.
pub async fn run(cli: &Cli, options: &RunOptions) -> Result<()> {
  let config = options.apply(cli.load_config()?);
  let request = options.request(Local::now().date_naive())?;

  let fetcher = ArxivFetcher::from_config(&config.api)?;
  let store = FileCheckpointStore::new(&config.paths.checkpoint);
  let sink = JsonlSink::open(&config.paths.output).await?;

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("{} Interrupted, finishing the current step", style(WARNING_PREFIX).yellow());
      on_interrupt.cancel();
    }
  });

  println!(
    "{} Harvesting {} into {}",
    style(INFO_PREFIX).cyan(),
    style(request.base_query()).yellow(),
    style(config.paths.output.display()).cyan()
  );
  let window = match request.window() {
    Some(window) =>
      format!("{} back to {} ({} months)", window.start, window.stop, window.month_count()),
    None => "none, flat query".to_string(),
  };
  item("Window", window, false);
  item("Target", request.target_count(), false);
  item("Checkpoint", config.paths.checkpoint.display(), true);

  let mut harvester = Harvester::new(request, fetcher, store, sink)
    .with_config(&config.harvest)
    .with_cancellation(cancel);

  match harvester.run().await {
    HarvestOutcome::Completed(summary) => {
      let prefix = if summary.target_met {
        style(SUCCESS_PREFIX).green()
      } else {
        style(WARNING_PREFIX).yellow()
      };
      println!("{prefix} Harvest complete: {}", summary.reason);
      item("Records", format!("{} of {}", summary.total, summary.target), false);
      item("Requests", summary.batches, true);
      Ok(())
    },
    HarvestOutcome::Aborted { error: HarvestError::Cancelled, checkpoint } => {
      println!(
        "{} Harvest cancelled after {} records; run again to resume from {} at offset {}",
        style(WARNING_PREFIX).yellow(),
        checkpoint.total,
        checkpoint.partition_key,
        checkpoint.offset
      );
      Ok(())
    },
    HarvestOutcome::Aborted { error, checkpoint } =>
      Err(HarvesterdError::aborted(error, &checkpoint)),
  }
}
