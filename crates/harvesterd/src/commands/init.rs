//! Module for writing a default [`harvester`] configuration.

use super::*;

/// Options for [`Commands::Init`].
#[derive(Args, Clone, Debug)]
pub struct InitOptions {
  /// Overwrite an existing configuration file
  #[arg(long)]
  pub force: bool,
}

/// Function for the [`Commands::Init`] in the CLI.
pub async fn init(cli: &Cli, options: &InitOptions) -> Result<()> {
  let path = cli.config_path();

  if path.exists() && !options.force {
    println!(
      "{} Configuration already exists at {}; pass --force to overwrite it",
      style(WARNING_PREFIX).yellow(),
      style(path.display()).yellow()
    );
    return Ok(());
  }

  let config = Config::default();
  config.save(&path)?;

  println!(
    "{} Wrote configuration to {}",
    style(SUCCESS_PREFIX).green(),
    style(path.display()).cyan()
  );
  item("Corpus", config.paths.output.display(), false);
  item("Checkpoint", config.paths.checkpoint.display(), false);
  item("API", &config.api.base_url, true);
  Ok(())
}
