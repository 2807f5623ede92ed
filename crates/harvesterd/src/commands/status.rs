//! Module for inspecting the harvest checkpoint.

use chrono::Local;

use super::*;

/// Options for [`Commands::Status`].
#[derive(Args, Clone, Debug)]
pub struct StatusOptions {
  /// Checkpoint file to inspect instead of the configured one
  #[arg(long)]
  pub checkpoint: Option<PathBuf>,
}

/// Function for the [`Commands::Status`] in the CLI.
pub async fn status(cli: &Cli, options: &StatusOptions) -> Result<()> {
  let config = cli.load_config()?;
  let path = options.checkpoint.clone().unwrap_or(config.paths.checkpoint);

  let Some(checkpoint) = FileCheckpointStore::new(&path).load().await? else {
    println!(
      "{} No checkpoint at {}; the next run starts from the beginning",
      style(INFO_PREFIX).cyan(),
      style(path.display()).yellow()
    );
    return Ok(());
  };

  println!("{} Checkpoint {}", style(INFO_PREFIX).cyan(), style(path.display()).yellow());
  item("Query", checkpoint.query.as_deref().unwrap_or("(not recorded)"), false);
  item("Partition", &checkpoint.partition_key, false);
  item("Offset", checkpoint.offset, false);
  item("Records harvested", checkpoint.total, false);
  let state = if checkpoint.exhausted {
    style("finished").green()
  } else {
    style("in progress").yellow()
  };
  item("State", state, false);
  let updated = checkpoint
    .updated_at
    .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
    .unwrap_or_else(|| "unknown".to_string());
  item("Updated", updated, true);
  Ok(())
}
