use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use arca_domain::{layer::StorageLayer, policy::AccessPolicy};
use arca_index::models::{IndexedEmbedding, Relationship};

use crate::{Error, MemoryService, Result};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RememberRequest {
	/// Producer-assigned id; minted locally when absent.
	pub embedding_id: Option<String>,
	pub owner: String,
	pub category: String,
	/// Embedded via the provider when no `metadata_vector` is supplied.
	pub text: Option<String>,
	pub metadata_vector: Option<Vec<f32>>,
	/// The private payload; encrypted before it leaves this process.
	pub content: serde_json::Value,
	#[serde(default)]
	pub entities: BTreeMap<String, Vec<String>>,
	#[serde(default)]
	pub relationships: Vec<Relationship>,
	pub confidence: Option<f32>,
	pub similarity_threshold: Option<f32>,
	#[serde(default)]
	pub storage_layer: StorageLayer,
	#[serde(default)]
	pub extra_access_rules: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryOp {
	Added,
	/// The embedding id was already indexed; the first write wins.
	Unchanged,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RememberResponse {
	pub embedding_id: String,
	pub internal_id: u64,
	pub op: MemoryOp,
	pub batch_id: Option<String>,
	pub content_reference: Option<String>,
	pub batch_sealed: bool,
}

impl MemoryService {
	/// Ingest path: embed, encrypt, batch-store, index. The index insert
	/// happens before the content-store write completes, so a store failure
	/// leaves the record searchable with a pending content reference and
	/// surfaces the error for the caller to decide on a fallback.
	pub async fn remember(&self, req: RememberRequest) -> Result<RememberResponse> {
		let owner = req.owner.trim();
		let category = req.category.trim();

		if owner.is_empty() || category.is_empty() {
			return Err(Error::InvalidRequest {
				message: "owner and category are required.".to_string(),
			});
		}

		let embedding_id = req
			.embedding_id
			.as_deref()
			.map(str::trim)
			.filter(|id| !id.is_empty())
			.map(str::to_string)
			.unwrap_or_else(|| Uuid::new_v4().to_string());

		{
			let index = self.index();

			if let Some(existing) = index.get(&embedding_id) {
				let internal_id = index.internal_id(&embedding_id).unwrap_or_default() as u64;
				let content_reference = existing.content_reference.clone();

				return Ok(RememberResponse {
					embedding_id,
					internal_id,
					op: MemoryOp::Unchanged,
					batch_id: None,
					content_reference,
					batch_sealed: false,
				});
			}
		}

		let metadata_vector = match req.metadata_vector {
			Some(vector) => vector,
			None => {
				let text = req.text.as_deref().map(str::trim).filter(|text| !text.is_empty());
				let Some(text) = text else {
					return Err(Error::InvalidRequest {
						message: "Either metadata_vector or text is required.".to_string(),
					});
				};
				let vectors = self
					.providers
					.embedding
					.embed(&self.cfg.providers.embedding, &[text.to_string()])
					.await?;

				vectors.into_iter().next().ok_or_else(|| Error::Provider {
					message: "Embedding provider returned no vectors.".to_string(),
				})?
			},
		};
		let policy = AccessPolicy::new(owner, category, &req.extra_access_rules);
		let payload = serde_json::to_vec(&req.content).map_err(|err| Error::InvalidRequest {
			message: format!("Content is not encodable: {err}."),
		})?;
		let encrypted =
			self.providers.encryption.encrypt(&payload, &policy, Some(embedding_id.as_str())).await?;
		let record = IndexedEmbedding {
			embedding_id: embedding_id.clone(),
			owner: owner.to_string(),
			category: category.to_string(),
			metadata_vector,
			content_reference: None,
			encryption_identity: encrypted.identity.clone(),
			access_policy_digest: policy.policy_digest.clone(),
			entities: req.entities,
			relationships: req.relationships,
			confidence: req.confidence.unwrap_or(1.0),
			similarity_threshold: req.similarity_threshold.unwrap_or(0.0),
			storage_layer: req.storage_layer,
			created_at: OffsetDateTime::now_utc(),
		};
		let internal_id = self.index().insert(record)?;
		let mut tags = BTreeMap::new();

		tags.insert("owner".to_string(), owner.to_string());
		tags.insert("category".to_string(), category.to_string());
		tags.insert("embedding_id".to_string(), embedding_id.clone());

		let stored = self.batches.store(owner, category, &encrypted.ciphertext, tags).await?;
		let content_reference = stored.content_ref.to_string();

		self.index().set_content_reference(&embedding_id, &content_reference)?;

		Ok(RememberResponse {
			embedding_id,
			internal_id: internal_id as u64,
			op: MemoryOp::Added,
			batch_id: Some(stored.batch_id),
			content_reference: Some(content_reference),
			batch_sealed: stored.sealed,
		})
	}
}
