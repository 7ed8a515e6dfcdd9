pub mod context;
pub mod notify;
pub mod remember;
pub mod retrieve;
pub mod search;

mod error;

pub use error::{Error, Result};

use std::sync::{Arc, MutexGuard};

pub use context::{ContextBundle, ContextItem};
pub use notify::{AccessEvent, AccessNotifier, LogNotifier};
pub use remember::{MemoryOp, RememberRequest, RememberResponse};
pub use retrieve::{RetrievalFailure, RetrievalResult};
pub use search::{SearchCandidate, SearchRequest, SearchResponse};

use arca_config::Config;
use arca_index::{MetadataIndex, SharedIndex};
use arca_providers::{EmbeddingProvider, HttpEmbedder, encryption::EncryptionProvider};
use arca_store::{batch::CategoryBatchManager, content::ContentStoreClient};

/// Every external capability the service needs, chosen once at construction.
/// Tests swap in fakes without any call site branching on the environment.
#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub encryption: Arc<dyn EncryptionProvider>,
	pub notifier: Arc<dyn AccessNotifier>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		encryption: Arc<dyn EncryptionProvider>,
		notifier: Arc<dyn AccessNotifier>,
	) -> Self {
		Self { embedding, encryption, notifier }
	}

	pub fn from_config(cfg: &Config) -> arca_providers::Result<Self> {
		Ok(Self {
			embedding: Arc::new(HttpEmbedder),
			encryption: arca_providers::encryption::from_config(&cfg.encryption)?,
			notifier: Arc::new(LogNotifier),
		})
	}
}

pub struct MemoryService {
	pub cfg: Config,
	pub index: SharedIndex,
	pub content: Arc<ContentStoreClient>,
	pub batches: CategoryBatchManager,
	pub providers: Providers,
}
impl MemoryService {
	pub fn new(
		cfg: Config,
		index: SharedIndex,
		content: Arc<ContentStoreClient>,
		providers: Providers,
	) -> Self {
		let batches = CategoryBatchManager::new(content.clone(), &cfg.batching);

		Self { cfg, index, content, batches, providers }
	}

	pub(crate) fn index(&self) -> MutexGuard<'_, MetadataIndex> {
		self.index.lock().unwrap_or_else(|err| err.into_inner())
	}
}
