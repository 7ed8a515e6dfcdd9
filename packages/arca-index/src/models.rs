use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use arca_domain::layer::StorageLayer;

/// One stored memory: the public, searchable half of a record whose content
/// lives encrypted in the content store. Immutable after insertion except for
/// `content_reference`, which is filled in once the content-store write
/// completes.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IndexedEmbedding {
	pub embedding_id: String,
	pub owner: String,
	pub category: String,
	/// Unit-normalized at insert time.
	pub metadata_vector: Vec<f32>,
	#[serde(default)]
	pub content_reference: Option<String>,
	pub encryption_identity: String,
	pub access_policy_digest: String,
	#[serde(default)]
	pub entities: BTreeMap<String, Vec<String>>,
	#[serde(default)]
	pub relationships: Vec<Relationship>,
	#[serde(default = "default_confidence")]
	pub confidence: f32,
	#[serde(default)]
	pub similarity_threshold: f32,
	#[serde(default)]
	pub storage_layer: StorageLayer,
	#[serde(with = "arca_domain::time_serde")]
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Relationship {
	pub subject: String,
	pub relation: String,
	pub object: String,
}

/// Conjunctive post-filters applied to ANN candidates. An unset filter is a
/// no-op.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SearchFilters {
	pub owner: Option<String>,
	pub category: Option<String>,
	pub entity_type: Option<String>,
	pub relationship_type: Option<String>,
	pub min_confidence: Option<f32>,
	#[serde(default, with = "arca_domain::time_serde::option")]
	pub created_after: Option<OffsetDateTime>,
}
impl SearchFilters {
	pub fn matches(&self, record: &IndexedEmbedding) -> bool {
		if let Some(owner) = self.owner.as_deref()
			&& record.owner != owner
		{
			return false;
		}
		if let Some(category) = self.category.as_deref()
			&& record.category != category
		{
			return false;
		}
		if let Some(entity_type) = self.entity_type.as_deref()
			&& !record.entities.contains_key(entity_type)
		{
			return false;
		}
		if let Some(relationship_type) = self.relationship_type.as_deref()
			&& !record.relationships.iter().any(|rel| rel.relation == relationship_type)
		{
			return false;
		}
		if let Some(min_confidence) = self.min_confidence
			&& record.confidence < min_confidence
		{
			return false;
		}
		if let Some(created_after) = self.created_after
			&& record.created_at <= created_after
		{
			return false;
		}

		true
	}
}

#[derive(Clone, Debug)]
pub struct SearchHit {
	pub internal_id: usize,
	pub similarity: f32,
	pub record: IndexedEmbedding,
}

fn default_confidence() -> f32 {
	1.0
}
