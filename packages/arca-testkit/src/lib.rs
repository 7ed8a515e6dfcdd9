mod error;

pub use error::{Error, Result};

use std::{
	collections::{HashMap, VecDeque},
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::Map;

use arca_config::{
	Batching, Config, ContentStore, EmbeddingProviderConfig, Encryption, Index, Ledger, Providers,
	Search, Service, Sync,
};
use arca_domain::event::LedgerEvent;
use arca_providers::{BoxFuture, EmbeddingProvider};
use arca_store::{
	content::ContentTransport,
	ledger::LedgerSource,
	models::{BatchEntry, BatchReceipt, PatchRef},
};

/// A fully valid configuration pointing at nowhere, for tests that construct
/// services against in-memory fakes.
pub fn test_config(dimension: u32, batch_capacity: u32) -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		index: Index {
			dimension,
			capacity: 1_024,
			max_connections: 16,
			ef_construction: 200,
			ef_search: 64,
			oversample_factor: 3,
		},
		batching: Batching { capacity: batch_capacity },
		content_store: ContentStore {
			api_base: "http://127.0.0.1:1".to_string(),
			api_key: None,
			timeout_ms: 1_000,
			max_attempts: 3,
			base_backoff_ms: 1,
		},
		encryption: Encryption {
			mode: arca_config::ENCRYPTION_MODE_SIMULATED.to_string(),
			api_base: None,
			api_key: None,
			timeout_ms: 1_000,
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "static".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "static-embedder".to_string(),
				dimensions: dimension,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		ledger: Ledger {
			api_base: "http://127.0.0.1:1".to_string(),
			api_key: None,
			timeout_ms: 1_000,
			page_size: 256,
		},
		sync: Sync {
			poll_interval_ms: 10,
			snapshot_interval_ms: 50,
			base_backoff_ms: 1,
			max_backoff_ms: 20,
			snapshot_pointer_path: std::env::temp_dir().join(format!(
				"arca_test_pointer_{}.json",
				uuid::Uuid::new_v4().simple()
			)),
		},
		search: Search {
			default_top_k: 8,
			relevance_cutoff: 0.0,
			max_context_items: 16,
		},
	}
}

/// Deterministic embedder. Texts can be pinned to exact vectors; anything
/// else hashes to a stable pseudo-random vector of the right dimension.
pub struct StaticEmbedder {
	dimension: usize,
	pinned: Mutex<HashMap<String, Vec<f32>>>,
}
impl StaticEmbedder {
	pub fn new(dimension: usize) -> Self {
		Self { dimension, pinned: Mutex::new(HashMap::new()) }
	}

	pub fn pin(&self, text: &str, vector: Vec<f32>) {
		self.pinned
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.insert(text.to_string(), vector);
	}

	fn derive(&self, text: &str) -> Vec<f32> {
		let mut bytes = vec![0_u8; self.dimension * 4];
		let mut hasher = blake3::Hasher::new();

		hasher.update(text.as_bytes());
		hasher.finalize_xof().fill(&mut bytes);

		bytes
			.chunks_exact(4)
			.map(|chunk| {
				let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);

				(raw as f32 / u32::MAX as f32) * 2.0 - 1.0
			})
			.collect()
	}
}
impl EmbeddingProvider for StaticEmbedder {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, arca_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			let pinned = self.pinned.lock().unwrap_or_else(|err| err.into_inner());

			Ok(texts
				.iter()
				.map(|text| pinned.get(text).cloned().unwrap_or_else(|| self.derive(text)))
				.collect())
		})
	}
}

#[derive(Clone, Copy, Debug)]
pub enum FailureKind {
	Transport,
	Rejected,
}

/// In-memory content transport. Failures can be scripted per operation and
/// batch visibility can be delayed to model store propagation.
#[derive(Default)]
pub struct MemoryTransport {
	blobs: Mutex<HashMap<String, Vec<u8>>>,
	containers: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
	scripted_failures: Mutex<HashMap<&'static str, VecDeque<FailureKind>>>,
	next_ordinal: AtomicUsize,
	put_calls: AtomicUsize,
	put_batch_calls: AtomicUsize,
	deleted: Mutex<Vec<String>>,
	invisible_probes: AtomicUsize,
}
impl MemoryTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Scripts the next calls of `op` ("put", "get", "put_batch",
	/// "get_from_batch", "delete") to fail.
	pub fn fail_next(&self, op: &'static str, kind: FailureKind, count: usize) {
		let mut scripted = self.scripted_failures.lock().unwrap_or_else(|err| err.into_inner());
		let queue = scripted.entry(op).or_default();

		for _ in 0..count {
			queue.push_back(kind);
		}
	}

	/// Makes the next `count` `get_from_batch` probes miss, regardless of
	/// content, to model propagation delay.
	pub fn delay_visibility(&self, count: usize) {
		self.invisible_probes.store(count, Ordering::SeqCst);
	}

	pub fn put_calls(&self) -> usize {
		self.put_calls.load(Ordering::SeqCst)
	}

	pub fn put_batch_calls(&self) -> usize {
		self.put_batch_calls.load(Ordering::SeqCst)
	}

	pub fn deleted_locators(&self) -> Vec<String> {
		self.deleted.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn container_count(&self) -> usize {
		self.containers.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	fn scripted_failure(&self, op: &'static str) -> Option<arca_store::Error> {
		let mut scripted = self.scripted_failures.lock().unwrap_or_else(|err| err.into_inner());

		scripted.get_mut(op).and_then(VecDeque::pop_front).map(|kind| match kind {
			FailureKind::Transport =>
				arca_store::Error::Transport { message: format!("scripted {op} timeout") },
			FailureKind::Rejected =>
				arca_store::Error::Rejected { message: format!("scripted {op} rejection") },
		})
	}
}
impl ContentTransport for MemoryTransport {
	fn put<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, arca_store::Result<String>> {
		Box::pin(async move {
			self.put_calls.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.scripted_failure("put") {
				return Err(err);
			}

			let locator = format!("blob-{}", self.next_ordinal.fetch_add(1, Ordering::SeqCst));

			self.blobs
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.insert(locator.clone(), bytes.to_vec());

			Ok(locator)
		})
	}

	fn get<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, arca_store::Result<Vec<u8>>> {
		Box::pin(async move {
			if let Some(err) = self.scripted_failure("get") {
				return Err(err);
			}

			self.blobs
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.get(locator)
				.cloned()
				.ok_or_else(|| arca_store::Error::NotFound { message: locator.to_string() })
		})
	}

	fn delete<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, arca_store::Result<()>> {
		Box::pin(async move {
			if let Some(err) = self.scripted_failure("delete") {
				return Err(err);
			}

			self.blobs.lock().unwrap_or_else(|err| err.into_inner()).remove(locator);
			self.containers.lock().unwrap_or_else(|err| err.into_inner()).remove(locator);
			self.deleted
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.push(locator.to_string());

			Ok(())
		})
	}

	fn put_batch<'a>(
		&'a self,
		entries: &'a [BatchEntry],
	) -> BoxFuture<'a, arca_store::Result<BatchReceipt>> {
		Box::pin(async move {
			self.put_batch_calls.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.scripted_failure("put_batch") {
				return Err(err);
			}

			let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
			let container = format!("container-{ordinal}");
			let mut items = HashMap::new();
			let mut patches = Vec::with_capacity(entries.len());

			for (index, entry) in entries.iter().enumerate() {
				items.insert(entry.identifier.clone(), entry.bytes.clone());
				patches.push(PatchRef {
					identifier: entry.identifier.clone(),
					patch_id: format!("{container}/patch-{index}"),
				});
			}

			self.containers
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.insert(container.clone(), items);

			Ok(BatchReceipt { container, patches })
		})
	}

	fn get_from_batch<'a>(
		&'a self,
		container: &'a str,
		identifier: &'a str,
	) -> BoxFuture<'a, arca_store::Result<Vec<u8>>> {
		Box::pin(async move {
			if let Some(err) = self.scripted_failure("get_from_batch") {
				return Err(err);
			}

			let remaining = self.invisible_probes.load(Ordering::SeqCst);

			if remaining > 0 {
				self.invisible_probes.store(remaining - 1, Ordering::SeqCst);

				return Err(arca_store::Error::NotFound {
					message: "batch not yet propagated".to_string(),
				});
			}

			self.containers
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.get(container)
				.and_then(|items| items.get(identifier))
				.cloned()
				.ok_or_else(|| arca_store::Error::NotFound {
					message: format!("{container}#{identifier}"),
				})
		})
	}
}

/// Ledger fake replaying a scripted event sequence.
#[derive(Default)]
pub struct ScriptedLedger {
	events: Mutex<Vec<LedgerEvent>>,
	fail_next: Mutex<VecDeque<FailureKind>>,
	polls: AtomicUsize,
}
impl ScriptedLedger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&self, event: LedgerEvent) {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).push(event);
	}

	pub fn fail_next_poll(&self, kind: FailureKind) {
		self.fail_next.lock().unwrap_or_else(|err| err.into_inner()).push_back(kind);
	}

	pub fn polls(&self) -> usize {
		self.polls.load(Ordering::SeqCst)
	}
}
impl LedgerSource for ScriptedLedger {
	fn events_since<'a>(
		&'a self,
		position: u64,
	) -> BoxFuture<'a, arca_store::Result<Vec<LedgerEvent>>> {
		Box::pin(async move {
			self.polls.fetch_add(1, Ordering::SeqCst);

			if let Some(kind) =
				self.fail_next.lock().unwrap_or_else(|err| err.into_inner()).pop_front()
			{
				return Err(match kind {
					FailureKind::Transport => arca_store::Error::Transport {
						message: "scripted ledger timeout".to_string(),
					},
					FailureKind::Rejected => arca_store::Error::Rejected {
						message: "scripted ledger rejection".to_string(),
					},
				});
			}

			let mut events: Vec<LedgerEvent> = self
				.events
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.iter()
				.filter(|event| event.position() > position)
				.cloned()
				.collect();

			events.sort_by_key(LedgerEvent::position);

			Ok(events)
		})
	}
}
