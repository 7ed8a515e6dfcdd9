use serde::{Deserialize, Serialize};

use arca_index::models::SearchFilters;

use crate::{MemoryService, Result, SearchRequest};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContextItem {
	pub embedding_id: String,
	pub category: String,
	pub similarity: f32,
	pub content: serde_json::Value,
}

/// Caller-facing bundle of decrypted memories relevant to one query.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContextBundle {
	pub query: String,
	pub items: Vec<ContextItem>,
	/// Stage-1 candidates above the relevance cutoff.
	pub searched: usize,
	/// Candidates that made it through stage 2.
	pub retrieved: usize,
}

impl MemoryService {
	/// Composes stage 1 and stage 2: searches the requester's memories, then
	/// retrieves each sufficiently relevant candidate. Individual stage-2
	/// failures are skipped, never fatal to the whole operation.
	pub async fn recall_context(
		&self,
		query_text: &str,
		requester: &str,
		max_items: Option<u32>,
	) -> Result<ContextBundle> {
		let limit = max_items
			.unwrap_or(self.cfg.search.max_context_items)
			.min(self.cfg.search.max_context_items)
			.max(1) as usize;
		let response = self
			.search_metadata(SearchRequest {
				query: query_text.to_string(),
				top_k: Some(limit as u32),
				filters: SearchFilters { owner: Some(requester.to_string()), ..Default::default() },
			})
			.await?;
		let relevant: Vec<_> = response
			.candidates
			.into_iter()
			.filter(|candidate| candidate.similarity >= self.cfg.search.relevance_cutoff)
			.collect();
		let searched = relevant.len();
		let mut items = Vec::new();

		for candidate in relevant {
			if items.len() >= limit {
				break;
			}

			match self.retrieve(&candidate.embedding_id, requester).await {
				Ok(result) if result.decrypted => {
					if let Some(content) = result.content {
						items.push(ContextItem {
							embedding_id: candidate.embedding_id,
							category: candidate.category,
							similarity: candidate.similarity,
							content,
						});
					}
				},
				Ok(result) => {
					tracing::debug!(
						embedding_id = %candidate.embedding_id,
						failure = ?result.failure,
						"Skipping candidate that did not decrypt."
					);
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						embedding_id = %candidate.embedding_id,
						"Context retrieval failed. Skipping candidate."
					);
				},
			}
		}

		let retrieved = items.len();

		Ok(ContextBundle { query: query_text.to_string(), items, searched, retrieved })
	}
}
