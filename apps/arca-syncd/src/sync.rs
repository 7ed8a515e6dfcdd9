use std::{
	path::Path,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{sync::watch, task::JoinHandle};

use arca_domain::event::{EmbeddingRegistered, LedgerEvent};
use arca_index::{MetadataIndex, SharedIndex, models::IndexedEmbedding, snapshot::Snapshot};
use arca_store::{content::ContentStoreClient, ledger::LedgerSource, models::ContentRef};

use crate::Result;

/// Names the latest snapshot in the content store. Written atomically next to
/// the daemon so a restart can find its way back.
#[derive(Debug, Deserialize, Serialize)]
pub struct SnapshotPointer {
	pub locator: String,
	pub checkpoint: u64,
	#[serde(with = "arca_domain::time_serde")]
	pub saved_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncState {
	Stopped,
	Running,
}

/// Feeds ledger events into the metadata index and periodically snapshots
/// index + checkpoint to the content store. Both loops log and back off on
/// failure instead of terminating; availability of the live index outweighs
/// any single missed cycle.
pub struct Synchronizer {
	index: SharedIndex,
	ledger: Arc<dyn LedgerSource>,
	content: Arc<ContentStoreClient>,
	cfg: arca_config::Sync,
	checkpoint: Arc<AtomicU64>,
	shutdown: watch::Sender<bool>,
	tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
	state: std::sync::Mutex<SyncState>,
}
impl Synchronizer {
	pub fn new(
		index: SharedIndex,
		ledger: Arc<dyn LedgerSource>,
		content: Arc<ContentStoreClient>,
		cfg: arca_config::Sync,
		initial_checkpoint: u64,
	) -> Self {
		let (shutdown, _) = watch::channel(false);

		Self {
			index,
			ledger,
			content,
			cfg,
			checkpoint: Arc::new(AtomicU64::new(initial_checkpoint)),
			shutdown,
			tasks: tokio::sync::Mutex::new(Vec::new()),
			state: std::sync::Mutex::new(SyncState::Stopped),
		}
	}

	pub fn state(&self) -> SyncState {
		*self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	/// Never moves backward, even across restarts.
	pub fn checkpoint(&self) -> u64 {
		self.checkpoint.load(Ordering::SeqCst)
	}

	/// Spawns the event-poll loop and the snapshot loop. Idempotent while
	/// running.
	pub async fn start(&self) {
		{
			let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			if *state == SyncState::Running {
				return;
			}

			*state = SyncState::Running;
		}

		let mut tasks = self.tasks.lock().await;

		tasks.push(tokio::spawn(run_event_poll(
			self.index.clone(),
			self.ledger.clone(),
			self.content.clone(),
			self.checkpoint.clone(),
			self.cfg.clone(),
			self.shutdown.subscribe(),
		)));
		tasks.push(tokio::spawn(run_snapshot_loop(
			self.index.clone(),
			self.content.clone(),
			self.checkpoint.clone(),
			self.cfg.clone(),
			self.shutdown.subscribe(),
		)));

		tracing::info!(checkpoint = self.checkpoint(), "Synchronizer started.");
	}

	/// Signals both loops, waits for any in-flight work to finish, then takes
	/// one final snapshot before the caller releases client handles.
	pub async fn stop(&self) {
		{
			let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			if *state == SyncState::Stopped {
				return;
			}

			*state = SyncState::Stopped;
		}

		let _ = self.shutdown.send(true);

		let mut tasks = self.tasks.lock().await;

		for task in tasks.drain(..) {
			if let Err(err) = task.await {
				tracing::error!(error = %err, "Synchronizer task ended abnormally.");
			}
		}

		if let Err(err) =
			snapshot_once(&self.index, &self.content, &self.checkpoint, &self.cfg).await
		{
			tracing::error!(error = %err, "Final snapshot failed.");
		}

		tracing::info!(checkpoint = self.checkpoint(), "Synchronizer stopped.");
	}
}

/// Restores the index from the latest snapshot named by the pointer file. A
/// missing pointer starts fresh; a corrupt or incompatible snapshot logs a
/// warning and starts fresh rather than refusing to start.
pub async fn restore_index(
	index_cfg: &arca_config::Index,
	pointer_path: &Path,
	content: &ContentStoreClient,
) -> (MetadataIndex, u64) {
	match try_restore(index_cfg, pointer_path, content).await {
		Ok(Some((index, checkpoint))) => {
			tracing::info!(checkpoint, records = index.len(), "Restored index from snapshot.");

			(index, checkpoint)
		},
		Ok(None) => (MetadataIndex::new(index_cfg), 0),
		Err(err) => {
			tracing::warn!(
				error = %err,
				"Failed to restore snapshot. Starting with an empty index."
			);

			(MetadataIndex::new(index_cfg), 0)
		},
	}
}

async fn try_restore(
	index_cfg: &arca_config::Index,
	pointer_path: &Path,
	content: &ContentStoreClient,
) -> Result<Option<(MetadataIndex, u64)>> {
	let raw = match std::fs::read(pointer_path) {
		Ok(raw) => raw,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(err) => return Err(err.into()),
	};
	let pointer: SnapshotPointer = serde_json::from_slice(&raw)?;
	let bytes = content.get(&pointer.locator).await?;
	let snapshot = Snapshot::decode(&bytes)?;
	let index = MetadataIndex::restore(index_cfg, &snapshot)?;

	Ok(Some((index, snapshot.checkpoint)))
}

async fn run_event_poll(
	index: SharedIndex,
	ledger: Arc<dyn LedgerSource>,
	content: Arc<ContentStoreClient>,
	checkpoint: Arc<AtomicU64>,
	cfg: arca_config::Sync,
	mut shutdown: watch::Receiver<bool>,
) {
	let poll_interval = Duration::from_millis(cfg.poll_interval_ms);
	let base_backoff = Duration::from_millis(cfg.base_backoff_ms);
	let max_backoff = Duration::from_millis(cfg.max_backoff_ms);
	let mut backoff = base_backoff;

	loop {
		if *shutdown.borrow() {
			break;
		}

		let delay = match poll_once(&index, &ledger, &content, &checkpoint).await {
			Ok(applied) => {
				if applied > 0 {
					tracing::debug!(applied, "Applied ledger events.");
				}

				backoff = base_backoff;

				poll_interval
			},
			Err(err) => {
				tracing::error!(error = %err, "Ledger poll failed.");

				let delay = backoff;

				backoff = backoff.saturating_mul(2).min(max_backoff);

				delay
			},
		};

		tokio::select! {
			_ = shutdown.changed() => break,
			_ = tokio::time::sleep(delay) => {},
		}
	}
}

async fn poll_once(
	index: &SharedIndex,
	ledger: &Arc<dyn LedgerSource>,
	content: &Arc<ContentStoreClient>,
	checkpoint: &Arc<AtomicU64>,
) -> Result<usize> {
	let since = checkpoint.load(Ordering::SeqCst);
	let events = ledger.events_since(since).await?;
	let applied = events.len();

	for event in events {
		let position = event.position();

		match event {
			LedgerEvent::Registered(registered) => apply_registered(index, registered),
			LedgerEvent::Removed(removed) => {
				apply_removed(index, content, &removed.embedding_id).await;
			},
		}

		checkpoint.fetch_max(position, Ordering::SeqCst);
	}

	Ok(applied)
}

fn apply_registered(index: &SharedIndex, event: EmbeddingRegistered) {
	let record = IndexedEmbedding {
		embedding_id: event.embedding_id.clone(),
		owner: event.owner,
		category: event.category,
		metadata_vector: event.metadata_vector,
		content_reference: event.content_reference,
		encryption_identity: event.encryption_identity,
		access_policy_digest: String::new(),
		entities: Default::default(),
		relationships: Vec::new(),
		confidence: 1.0,
		similarity_threshold: 0.0,
		storage_layer: Default::default(),
		created_at: event.timestamp,
	};
	let result = index.lock().unwrap_or_else(|err| err.into_inner()).insert(record);

	// A bad event is fatal to that event only, never to the loop.
	if let Err(err) = result {
		tracing::error!(
			error = %err,
			embedding_id = %event.embedding_id,
			"Failed to index registered embedding."
		);
	}
}

async fn apply_removed(
	index: &SharedIndex,
	content: &Arc<ContentStoreClient>,
	embedding_id: &str,
) {
	let reference = {
		let mut index = index.lock().unwrap_or_else(|err| err.into_inner());
		let reference =
			index.get(embedding_id).and_then(|record| record.content_reference.clone());

		if !index.remove(embedding_id) {
			return;
		}

		reference
	};

	// Blob removal is best-effort; the index entry is already gone.
	if let Some(reference) = reference {
		match reference.parse::<ContentRef>() {
			Ok(content_ref) =>
				if let Err(err) = content.delete(&content_ref.container).await {
					tracing::warn!(
						error = %err,
						embedding_id,
						"Failed to delete removed embedding's blob."
					);
				},
			Err(err) => {
				tracing::debug!(error = %err, embedding_id, "Unparseable content reference.");
			},
		}
	}
}

async fn run_snapshot_loop(
	index: SharedIndex,
	content: Arc<ContentStoreClient>,
	checkpoint: Arc<AtomicU64>,
	cfg: arca_config::Sync,
	mut shutdown: watch::Receiver<bool>,
) {
	let snapshot_interval = Duration::from_millis(cfg.snapshot_interval_ms);
	let base_backoff = Duration::from_millis(cfg.base_backoff_ms);
	let max_backoff = Duration::from_millis(cfg.max_backoff_ms);
	let mut backoff = base_backoff;

	loop {
		tokio::select! {
			_ = shutdown.changed() => break,
			_ = tokio::time::sleep(snapshot_interval) => {},
		}

		if *shutdown.borrow() {
			break;
		}

		match snapshot_once(&index, &content, &checkpoint, &cfg).await {
			Ok(()) => {
				backoff = base_backoff;
			},
			Err(err) => {
				tracing::error!(error = %err, "Snapshot failed.");
				tokio::time::sleep(backoff).await;

				backoff = backoff.saturating_mul(2).min(max_backoff);
			},
		}
	}
}

async fn snapshot_once(
	index: &SharedIndex,
	content: &Arc<ContentStoreClient>,
	checkpoint: &Arc<AtomicU64>,
	cfg: &arca_config::Sync,
) -> Result<()> {
	let snapshot = {
		let index = index.lock().unwrap_or_else(|err| err.into_inner());

		index.to_snapshot(checkpoint.load(Ordering::SeqCst))
	};
	let bytes = snapshot.encode()?;
	let locator = content.put(&bytes).await?;
	let pointer = SnapshotPointer {
		locator,
		checkpoint: snapshot.checkpoint,
		saved_at: snapshot.saved_at,
	};

	write_pointer(&cfg.snapshot_pointer_path, &pointer)?;
	tracing::debug!(
		checkpoint = snapshot.checkpoint,
		records = snapshot.records.len(),
		"Snapshot written."
	);

	Ok(())
}

/// Temp-file-and-rename so a crash mid-write never leaves a torn pointer.
fn write_pointer(path: &Path, pointer: &SnapshotPointer) -> Result<()> {
	let payload = serde_json::to_vec(pointer)?;
	let tmp_path = path.with_extension("tmp");

	if let Some(parent) = path.parent()
		&& !parent.as_os_str().is_empty()
	{
		std::fs::create_dir_all(parent)?;
	}

	std::fs::write(&tmp_path, payload)?;
	std::fs::rename(&tmp_path, path)?;

	Ok(())
}
