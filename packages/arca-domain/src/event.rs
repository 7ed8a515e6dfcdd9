use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Events emitted by the external ledger, as a closed set. New event kinds
/// are a compile-time-checked addition here, not a new dispatch-table key.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
	Registered(EmbeddingRegistered),
	Removed(EmbeddingRemoved),
}
impl LedgerEvent {
	pub fn position(&self) -> u64 {
		match self {
			Self::Registered(event) => event.position,
			Self::Removed(event) => event.position,
		}
	}

	pub fn embedding_id(&self) -> &str {
		match self {
			Self::Registered(event) => &event.embedding_id,
			Self::Removed(event) => &event.embedding_id,
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmbeddingRegistered {
	pub embedding_id: String,
	pub owner: String,
	pub category: String,
	pub metadata_vector: Vec<f32>,
	#[serde(default)]
	pub content_reference: Option<String>,
	pub encryption_identity: String,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
	pub position: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmbeddingRemoved {
	pub embedding_id: String,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
	pub position: u64,
}
