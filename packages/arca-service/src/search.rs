use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use arca_index::models::SearchFilters;

use crate::{Error, MemoryService, Result};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchRequest {
	pub query: String,
	pub top_k: Option<u32>,
	#[serde(default)]
	pub filters: SearchFilters,
}

/// Stage-1 result: public metadata only, never decrypted content.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchCandidate {
	pub embedding_id: String,
	pub owner: String,
	pub category: String,
	pub similarity: f32,
	pub content_reference: Option<String>,
	pub encryption_identity: String,
	#[serde(with = "arca_domain::time_serde")]
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchResponse {
	pub candidates: Vec<SearchCandidate>,
}

impl MemoryService {
	/// Stage 1: embed the query and rank public metadata vectors. Decryption
	/// never happens here; callers go through [`MemoryService::retrieve`] for
	/// content.
	pub async fn search_metadata(&self, req: SearchRequest) -> Result<SearchResponse> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query is required.".to_string() });
		}

		let k = req.top_k.unwrap_or(self.cfg.search.default_top_k).max(1) as usize;
		let vectors = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &[query.to_string()])
			.await?;
		let query_vector = vectors.into_iter().next().ok_or_else(|| Error::Provider {
			message: "Embedding provider returned no vectors.".to_string(),
		})?;
		let hits = self.index().search(&query_vector, k, &req.filters)?;
		let candidates = hits
			.into_iter()
			.map(|hit| SearchCandidate {
				embedding_id: hit.record.embedding_id,
				owner: hit.record.owner,
				category: hit.record.category,
				similarity: hit.similarity,
				content_reference: hit.record.content_reference,
				encryption_identity: hit.record.encryption_identity,
				created_at: hit.record.created_at,
			})
			.collect();

		Ok(SearchResponse { candidates })
	}
}
