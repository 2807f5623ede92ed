//! Durable harvest progress.
//!
//! A [`Checkpoint`] says which partition a harvest is in, how many of that partition's records
//! are already in the corpus, and how many records the harvest has written overall. The
//! [`Harvester`](crate::harvest::Harvester) writes one after every batch that reached the corpus,
//! and reads it on startup to resume.
//!
//! The ordering rule is simple: records are made durable *before* the checkpoint that counts them.
//! A crash between the two leaves the checkpoint behind the corpus, which costs a re-fetch of at
//! most one batch on resume. The checkpoint is never ahead of the corpus.
//!
//! # Storage
//!
//! [`FileCheckpointStore`] keeps the checkpoint as a small pretty-printed JSON document that an
//! operator can read, edit or delete by hand:
//!
//! ```json
//! {
//!   "partition_key": "2024-03",
//!   "offset": 400,
//!   "total": 2600,
//!   "exhausted": false,
//!   "query": "cat:cs.AI OR cat:cs.LG",
//!   "updated_at": "2024-05-17T09:12:44Z"
//! }
//! ```
//!
//! [`MemoryCheckpointStore`] keeps everything in memory and is meant for tests.

use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;

use super::*;

/// Progress of a harvest, as persisted between batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
  /// Key of the partition currently being harvested
  pub partition_key: String,
  /// Records of `partition_key` already written to the corpus
  pub offset:        u64,
  /// Records written to the corpus by this harvest overall
  pub total:         u64,
  /// Set once the partition sequence has run out
  #[serde(default)]
  pub exhausted:     bool,
  /// Base query of the harvest that wrote this checkpoint
  #[serde(default)]
  pub query:         Option<String>,
  /// When the checkpoint was last written
  #[serde(default)]
  pub updated_at:    Option<DateTime<Utc>>,
}

impl Checkpoint {
  /// A checkpoint at the very beginning of `partition`.
  pub fn start_of(partition: &Partition, query: &str) -> Self {
    Self {
      partition_key: partition.key.clone(),
      offset:        0,
      total:         0,
      exhausted:     false,
      query:         Some(query.to_string()),
      updated_at:    None,
    }
  }

  /// The same harvest, moved to the beginning of `partition`.
  pub fn entering(&self, partition: &Partition) -> Self {
    Self { partition_key: partition.key.clone(), offset: 0, ..self.clone() }
  }

  /// The same position, with `count` more records written.
  pub fn advanced_by(&self, count: u64) -> Self {
    Self { offset: self.offset + count, total: self.total + count, ..self.clone() }
  }

  /// The same position, marked as the end of the partition sequence.
  ///
  /// The offset is kept, so resuming from a finished checkpoint rechecks the last partition from
  /// where it stopped.
  pub fn finished(&self) -> Self { Self { exhausted: true, ..self.clone() } }
}

/// Somewhere a [`Checkpoint`] can be kept between runs.
///
/// `save` must replace the previous checkpoint atomically: a `load` after a crash returns either
/// the old or the new checkpoint in full.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
  /// Reads the stored checkpoint.
  ///
  /// Missing, unreadable or corrupt data is reported as `None`, never as an error, so a harvest
  /// can always fall back to starting fresh.
  async fn load(&self) -> Result<Option<Checkpoint>>;

  /// Replaces the stored checkpoint.
  async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

  /// Deletes the stored checkpoint, returning whether there was one.
  async fn reset(&self) -> Result<bool>;
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
  async fn load(&self) -> Result<Option<Checkpoint>> { (**self).load().await }

  async fn save(&self, checkpoint: &Checkpoint) -> Result<()> { (**self).save(checkpoint).await }

  async fn reset(&self) -> Result<bool> { (**self).reset().await }
}

/// Keeps the checkpoint as a JSON file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
  /// Location of the checkpoint document
  path: PathBuf,
}

impl FileCheckpointStore {
  /// Creates a store backed by the file at `path`. Nothing is touched until the first `save`.
  pub fn new(path: impl AsRef<Path>) -> Self { Self { path: path.as_ref().to_path_buf() } }

  /// The checkpoint file location.
  pub fn path(&self) -> &Path { &self.path }

  /// Sibling path the next checkpoint is staged at before being renamed into place.
  fn staging_path(&self) -> PathBuf {
    let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    self.path.with_file_name(name)
  }

  /// Directory holding the checkpoint file.
  fn directory(&self) -> &Path {
    self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."))
  }

  /// Flushes the directory entry written by the rename, so the new checkpoint survives power loss.
  #[cfg(unix)]
  async fn sync_directory(&self) -> Result<()> {
    tokio::fs::File::open(self.directory()).await?.sync_all().await?;
    Ok(())
  }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
  async fn load(&self) -> Result<Option<Checkpoint>> {
    let content = match tokio::fs::read_to_string(&self.path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!("No checkpoint at {}", self.path.display());
        return Ok(None);
      },
      Err(e) => {
        warn!("Could not read checkpoint {}: {e}; starting fresh", self.path.display());
        return Ok(None);
      },
    };

    match serde_json::from_str::<Checkpoint>(&content) {
      Ok(checkpoint) => {
        trace!("Loaded checkpoint {checkpoint:?}");
        Ok(Some(checkpoint))
      },
      Err(e) => {
        warn!("Checkpoint {} is corrupt ({e}); starting fresh", self.path.display());
        Ok(None)
      },
    }
  }

  async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      tokio::fs::create_dir_all(parent).await?;
    }

    let stamped = Checkpoint { updated_at: Some(Utc::now()), ..checkpoint.clone() };
    let mut content = serde_json::to_vec_pretty(&stamped)?;
    content.push(b'\n');

    let staging = self.staging_path();
    let mut file = tokio::fs::File::create(&staging).await?;
    file.write_all(&content).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&staging, &self.path).await?;
    #[cfg(unix)]
    self.sync_directory().await?;

    trace!(
      "Saved checkpoint {}@{} (total {}) to {}",
      checkpoint.partition_key,
      checkpoint.offset,
      checkpoint.total,
      self.path.display()
    );
    Ok(())
  }

  async fn reset(&self) -> Result<bool> {
    match tokio::fs::remove_file(&self.path).await {
      Ok(()) => {
        info!("Removed checkpoint {}", self.path.display());
        Ok(true)
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(e.into()),
    }
  }
}

/// In-memory checkpoint store for tests.
///
/// Every saved checkpoint is also appended to a history, so tests can check what was persisted and
/// in which order.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
  /// Current checkpoint and every checkpoint saved so far
  state: Mutex<MemoryState>,
}

/// Contents of a [`MemoryCheckpointStore`].
#[derive(Debug, Default)]
struct MemoryState {
  /// What `load` returns
  current:    Option<Checkpoint>,
  /// Every checkpoint passed to `save`, oldest first
  history:    Vec<Checkpoint>,
  /// Number of upcoming saves that should fail
  fail_saves: usize,
}

impl MemoryCheckpointStore {
  /// An empty store.
  pub fn new() -> Self { Self::default() }

  /// A store that already holds `checkpoint`.
  pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
    let store = Self::new();
    store.lock().current = Some(checkpoint);
    store
  }

  /// Makes the next `count` saves fail with an I/O error.
  pub fn fail_next_saves(&self, count: usize) { self.lock().fail_saves = count; }

  /// The checkpoint `load` would return.
  pub fn current(&self) -> Option<Checkpoint> { self.lock().current.clone() }

  /// All successfully saved checkpoints, oldest first.
  pub fn history(&self) -> Vec<Checkpoint> { self.lock().history.clone() }

  /// Locks the state, recovering it if a panicking test poisoned the lock.
  fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
  async fn load(&self) -> Result<Option<Checkpoint>> { Ok(self.current()) }

  async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
    let mut state = self.lock();
    if state.fail_saves > 0 {
      state.fail_saves -= 1;
      return Err(std::io::Error::other("injected checkpoint failure").into());
    }
    state.current = Some(checkpoint.clone());
    state.history.push(checkpoint.clone());
    Ok(())
  }

  async fn reset(&self) -> Result<bool> { Ok(self.lock().current.take().is_some()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Checkpoint {
    Checkpoint {
      partition_key: "2024-03".into(),
      offset:        400,
      total:         2600,
      exhausted:     false,
      query:         Some("cat:cs.AI".into()),
      updated_at:    None,
    }
  }

  #[traced_test]
  #[tokio::test]
  async fn file_store_round_trip() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("nested/checkpoint.json"));

    assert_eq!(store.load().await.unwrap(), None);
    store.save(&sample()).await.unwrap();

    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.partition_key, "2024-03");
    assert_eq!(loaded.offset, 400);
    assert_eq!(loaded.total, 2600);
    assert!(loaded.updated_at.is_some());
    assert!(!store.staging_path().exists());
  }

  #[tokio::test]
  async fn save_replaces_the_previous_checkpoint() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
    assert_eq!(store.directory(), dir.path());

    store.save(&sample()).await.unwrap();
    store.save(&sample().advanced_by(25).finished()).await.unwrap();

    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!((loaded.offset, loaded.total), (425, 2625));
    assert!(loaded.exhausted);
    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1);
  }

  #[test]
  fn bare_file_name_lives_in_the_working_directory() {
    let store = FileCheckpointStore::new("checkpoint.json");
    assert_eq!(store.directory(), Path::new("."));
  }

  #[traced_test]
  #[tokio::test]
  async fn corrupt_file_loads_as_absent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");
    std::fs::write(&path, "{ \"partition_key\": \"2024-0").unwrap();

    let store = FileCheckpointStore::new(&path);
    assert_eq!(store.load().await.unwrap(), None);
    assert!(logs_contain("is corrupt"));
  }

  #[tokio::test]
  async fn hand_written_minimal_checkpoint_loads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");
    std::fs::write(&path, r#"{"partition_key":"2023-11","offset":0,"total":120}"#).unwrap();

    let loaded = FileCheckpointStore::new(&path).load().await.unwrap().unwrap();
    assert_eq!(loaded.partition_key, "2023-11");
    assert_eq!(loaded.total, 120);
    assert!(!loaded.exhausted);
    assert_eq!(loaded.query, None);
  }

  #[tokio::test]
  async fn reset_removes_the_file() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
    assert!(!store.reset().await.unwrap());
    store.save(&sample()).await.unwrap();
    assert!(store.reset().await.unwrap());
    assert!(!store.path().exists());
  }

  #[test]
  fn transitions_keep_the_running_total() {
    let checkpoint = sample().advanced_by(50);
    assert_eq!((checkpoint.offset, checkpoint.total), (450, 2650));

    let partition = Partition { key: "2024-02".into(), query: String::new(), month: None };
    let entered = checkpoint.entering(&partition);
    assert_eq!(entered.partition_key, "2024-02");
    assert_eq!((entered.offset, entered.total), (0, 2650));

    let finished = checkpoint.finished();
    assert!(finished.exhausted);
    assert_eq!((finished.partition_key.as_str(), finished.offset), ("2024-03", 450));
    assert_eq!(finished.total, 2650);
  }

  #[tokio::test]
  async fn memory_store_failure_injection() {
    let store = MemoryCheckpointStore::new();
    store.fail_next_saves(1);
    assert!(store.save(&sample()).await.is_err());
    assert_eq!(store.current(), None);
    store.save(&sample()).await.unwrap();
    assert_eq!(store.history().len(), 1);
  }
}
