//! Module for discarding the harvest checkpoint.

use super::*;

/// Options for [`Commands::Reset`].
#[derive(Args, Clone, Debug)]
pub struct ResetOptions {
  /// Checkpoint file to delete instead of the configured one
  #[arg(long)]
  pub checkpoint: Option<PathBuf>,
}

/// Function for the [`Commands::Reset`] in the CLI.
///
/// The corpus itself is left alone: records already harvested stay, and a fresh harvest appends
/// after them.
pub async fn reset(cli: &Cli, options: &ResetOptions) -> Result<()> {
  let config = cli.load_config()?;
  let path = options.checkpoint.clone().unwrap_or(config.paths.checkpoint);

  if !path.exists() {
    println!(
      "{} No checkpoint found at: {}",
      style(WARNING_PREFIX).yellow(),
      style(path.display()).yellow()
    );
    return Ok(());
  }

  if !cli.accept_defaults
    && !dialoguer::Confirm::new()
      .with_prompt(format!(
        "Delete the checkpoint at {}? The next run will start from the beginning",
        path.display()
      ))
      .default(false)
      .wait_for_newline(true)
      .interact()?
  {
    println!("{} Operation cancelled", style(ERROR_PREFIX).red());
    return Ok(());
  }

  FileCheckpointStore::new(&path).reset().await?;
  println!("{} Checkpoint removed", style(SUCCESS_PREFIX).green());
  Ok(())
}
