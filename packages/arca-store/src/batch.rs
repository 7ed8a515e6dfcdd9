use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
};

use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
	Error, Result,
	content::ContentStoreClient,
	models::{BatchEntry, CategoryBatch, ContentRef, StoredBlob},
};

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct BatchKey {
	owner: String,
	category: String,
}
impl BatchKey {
	fn new(owner: &str, category: &str) -> Self {
		Self { owner: owner.to_string(), category: category.to_string() }
	}
}

/// Routes encrypted payloads into capacity-bounded logical batches keyed by
/// (owner, category). The underlying store's batches are immutable, so a
/// logical batch maps to one container per item after the first; grouping is
/// cost accounting, not physical merging.
pub struct CategoryBatchManager {
	client: Arc<ContentStoreClient>,
	capacity: u32,
	// Guards the capacity check and batch creation together; two concurrent
	// inserts for one key must not both open a fresh batch.
	state: Mutex<HashMap<BatchKey, Vec<CategoryBatch>>>,
}
impl CategoryBatchManager {
	pub fn new(client: Arc<ContentStoreClient>, cfg: &arca_config::Batching) -> Self {
		Self { client, capacity: cfg.capacity.max(1), state: Mutex::new(HashMap::new()) }
	}

	/// Returns the open batch for the key, sealing and replacing a full one.
	pub async fn get_or_create_batch(&self, owner: &str, category: &str) -> CategoryBatch {
		let mut state = self.state.lock().await;

		Self::open_batch(&mut state, owner, category, self.capacity).clone()
	}

	/// Every tracked batch for the key, oldest first. Sealed batches keep
	/// their `batch_id` forever.
	pub async fn batches(&self, owner: &str, category: &str) -> Vec<CategoryBatch> {
		let state = self.state.lock().await;

		state.get(&BatchKey::new(owner, category)).cloned().unwrap_or_default()
	}

	/// Writes one encrypted payload into the open batch for the key. The
	/// first item of a batch mints its `batch_id`; later items land in their
	/// own single-item containers tracked under the same batch. Store
	/// failures propagate untouched; nothing is dropped silently.
	pub async fn store(
		&self,
		owner: &str,
		category: &str,
		encrypted_payload: &[u8],
		tags: BTreeMap<String, String>,
	) -> Result<StoredBlob> {
		let identifier = Uuid::new_v4().to_string();
		let entry = BatchEntry {
			identifier: identifier.clone(),
			bytes: encrypted_payload.to_vec(),
			tags,
		};
		let mut state = self.state.lock().await;
		let receipt = self.client.put_batch(std::slice::from_ref(&entry)).await?;
		let patch_id = receipt
			.patches
			.iter()
			.find(|patch| patch.identifier == identifier)
			.map(|patch| patch.patch_id.clone())
			.ok_or_else(|| Error::InvalidResponse {
				message: "Batch receipt is missing the stored item's patch.".to_string(),
			})?;
		let batch = Self::open_batch(&mut state, owner, category, self.capacity);
		let batch_id = batch.batch_id.get_or_insert_with(|| receipt.container.clone()).clone();

		batch.items.push(crate::models::BatchItem {
			identifier: identifier.clone(),
			container: receipt.container.clone(),
			patch_id: patch_id.clone(),
		});
		batch.blob_count += 1;
		batch.last_updated = OffsetDateTime::now_utc();

		let sealed = batch.is_sealed();

		Ok(StoredBlob {
			batch_id,
			content_ref: ContentRef::new(&receipt.container, &identifier),
			patch_id,
			sealed,
		})
	}

	fn open_batch<'s>(
		state: &'s mut HashMap<BatchKey, Vec<CategoryBatch>>,
		owner: &str,
		category: &str,
		capacity: u32,
	) -> &'s mut CategoryBatch {
		let history = state.entry(BatchKey::new(owner, category)).or_default();

		if history.last().map(CategoryBatch::is_sealed).unwrap_or(true) {
			let now = OffsetDateTime::now_utc();

			history.push(CategoryBatch {
				owner: owner.to_string(),
				category: category.to_string(),
				batch_id: None,
				blob_count: 0,
				capacity,
				items: Vec::new(),
				created_at: now,
				last_updated: now,
			});
		}

		let index = history.len() - 1;

		&mut history[index]
	}
}
