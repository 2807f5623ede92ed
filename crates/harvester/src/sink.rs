//! Append-only corpus output.
//!
//! An [`AppendSink`] receives each batch of records once it has been fetched and parsed. An
//! `append` that returns `Ok` means the records are on disk, not sitting in a buffer: the
//! [`Harvester`](crate::harvest::Harvester) advances the checkpoint only after that.
//!
//! [`JsonlSink`] writes the corpus as JSON Lines, one record per line, in harvest order. If the
//! process died in the middle of a write, the file can end with a partial line; opening the sink
//! cuts that fragment off so every line in the corpus parses on its own. The fragment's records
//! are never counted by a checkpoint, so they are fetched again on resume.

use std::{
  io::SeekFrom,
  sync::{Arc, Mutex},
};

use tokio::{
  fs::{File, OpenOptions},
  io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

use super::*;

/// Size of the chunks read while looking for the last complete line.
const SCAN_CHUNK: u64 = 8 * 1024;

/// Destination for harvested records.
#[async_trait]
pub trait AppendSink: Send {
  /// Durably appends `records`, in order, after everything appended before.
  async fn append(&mut self, records: &[Record]) -> Result<()>;
}

/// Writes records to a JSON Lines file.
#[derive(Debug)]
pub struct JsonlSink {
  /// Location of the corpus file
  path:    PathBuf,
  /// Handle opened in append mode
  file:    File,
  /// Lines appended through this handle
  written: u64,
}

impl JsonlSink {
  /// Opens (creating if needed) the corpus at `path` for appending.
  ///
  /// A partial final line left by an interrupted write is truncated away first.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }

    let mut file =
      OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path).await?;
    let removed = truncate_torn_line(&mut file).await?;
    if removed > 0 {
      warn!("Removed {removed} bytes of an incomplete trailing record from {}", path.display());
    }
    drop(file);

    let file = OpenOptions::new().append(true).open(&path).await?;
    debug!("Appending records to {}", path.display());
    Ok(Self { path, file, written: 0 })
  }

  /// The corpus file location.
  pub fn path(&self) -> &Path { &self.path }

  /// Number of records appended since the sink was opened.
  pub fn written(&self) -> u64 { self.written }
}

#[async_trait]
impl AppendSink for JsonlSink {
  async fn append(&mut self, records: &[Record]) -> Result<()> {
    if records.is_empty() {
      return Ok(());
    }

    let mut lines = Vec::new();
    for record in records {
      serde_json::to_writer(&mut lines, record)?;
      lines.push(b'\n');
    }

    self.file.write_all(&lines).await?;
    self.file.flush().await?;
    self.file.sync_data().await?;
    self.written += records.len() as u64;

    trace!("Appended {} records ({} bytes) to {}", records.len(), lines.len(), self.path.display());
    Ok(())
  }
}

/// Cuts `file` back to just after its last newline, returning how many bytes were removed.
async fn truncate_torn_line(file: &mut File) -> Result<u64> {
  let len = file.metadata().await?.len();
  if len == 0 {
    return Ok(0);
  }

  let mut end = len;
  let mut chunk = Vec::new();
  while end > 0 {
    let start = end.saturating_sub(SCAN_CHUNK);
    chunk.resize((end - start) as usize, 0);
    file.seek(SeekFrom::Start(start)).await?;
    file.read_exact(&mut chunk).await?;

    if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
      let keep = start + pos as u64 + 1;
      if keep < len {
        file.set_len(keep).await?;
        file.sync_all().await?;
      }
      return Ok(len - keep);
    }
    end = start;
  }

  // No newline at all: the whole file is one incomplete record.
  file.set_len(0).await?;
  file.sync_all().await?;
  Ok(len)
}

/// In-memory sink for tests.
///
/// Clones share the same buffer, so a test can keep one handle and give another to the harvester.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
  /// Shared buffer and failure injection state
  inner: Arc<Mutex<MemorySinkState>>,
}

/// Contents of a [`MemorySink`].
#[derive(Debug, Default)]
struct MemorySinkState {
  /// Every record appended, in order
  records:      Vec<Record>,
  /// Size of every successful append, in order
  appends:      Vec<usize>,
  /// Number of upcoming appends that should fail
  fail_appends: usize,
}

impl MemorySink {
  /// An empty sink.
  pub fn new() -> Self { Self::default() }

  /// Makes the next `count` appends fail with an I/O error, writing nothing.
  pub fn fail_next_appends(&self, count: usize) { self.lock().fail_appends = count; }

  /// Every record appended so far.
  pub fn records(&self) -> Vec<Record> { self.lock().records.clone() }

  /// The size of each successful append, in order.
  pub fn appends(&self) -> Vec<usize> { self.lock().appends.clone() }

  /// Locks the state, recovering it if a panicking test poisoned the lock.
  fn lock(&self) -> std::sync::MutexGuard<'_, MemorySinkState> {
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

#[async_trait]
impl AppendSink for MemorySink {
  async fn append(&mut self, records: &[Record]) -> Result<()> {
    let mut state = self.lock();
    if state.fail_appends > 0 {
      state.fail_appends -= 1;
      return Err(std::io::Error::other("injected append failure").into());
    }
    state.records.extend_from_slice(records);
    state.appends.push(records.len());
    Ok(())
  }
}
