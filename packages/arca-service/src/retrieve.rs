use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use arca_domain::proof::{AuthorizationProof, authorize_requester};
use arca_index::models::IndexedEmbedding;
use arca_store::models::ContentRef;

use self::RetrievalFailure::{ContentPending, ContentUnavailable, Decryption, KeyExchange, NotFound};
use crate::{AccessEvent, MemoryService, Result};

pub const ACCESS_FUNCTION_RETRIEVE: &str = "memory.retrieve";

/// Stage-2 outcome. Denials and missing records are ordinary values so the
/// caller can render them; only infrastructure misconfiguration is an error.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RetrievalResult {
	pub embedding_id: String,
	pub access_granted: bool,
	pub decrypted: bool,
	pub content: Option<serde_json::Value>,
	pub failure: Option<RetrievalFailure>,
}
impl RetrievalResult {
	fn denied(embedding_id: &str) -> Self {
		Self {
			embedding_id: embedding_id.to_string(),
			access_granted: false,
			decrypted: false,
			content: None,
			failure: None,
		}
	}

	fn failed(embedding_id: &str, access_granted: bool, failure: RetrievalFailure) -> Self {
		Self {
			embedding_id: embedding_id.to_string(),
			access_granted,
			decrypted: false,
			content: None,
			failure: Some(failure),
		}
	}
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalFailure {
	NotFound,
	/// The record exists but its content-store write has not completed.
	ContentPending,
	ContentUnavailable { message: String },
	KeyExchange { message: String },
	Decryption { message: String },
}

impl MemoryService {
	/// Stage 2: authorize, exchange the proof for a key, fetch the encrypted
	/// payload, decrypt. Each failure mode maps to a distinct result so
	/// callers can tell a denial from a missing blob.
	pub async fn retrieve(&self, embedding_id: &str, requester: &str) -> Result<RetrievalResult> {
		let record: Option<IndexedEmbedding> = self.index().get(embedding_id).cloned();
		let Some(record) = record else {
			return Ok(RetrievalResult::failed(embedding_id, false, NotFound));
		};

		if !authorize_requester(requester, &record.owner) {
			return Ok(RetrievalResult::denied(embedding_id));
		}

		let proof = AuthorizationProof::new(
			&record.encryption_identity,
			requester,
			embedding_id,
			ACCESS_FUNCTION_RETRIEVE,
			OffsetDateTime::now_utc(),
		);
		let key =
			match self.providers.encryption.request_key(&record.encryption_identity, &proof).await
			{
				Ok(key) => key,
				Err(err) =>
					return Ok(RetrievalResult::failed(
						embedding_id,
						true,
						KeyExchange { message: err.to_string() },
					)),
			};
		let Some(reference) = record.content_reference.as_deref() else {
			return Ok(RetrievalResult::failed(embedding_id, true, ContentPending));
		};
		let content_ref: ContentRef = match reference.parse() {
			Ok(content_ref) => content_ref,
			Err(err) =>
				return Ok(RetrievalResult::failed(
					embedding_id,
					true,
					ContentUnavailable { message: err.to_string() },
				)),
		};
		let ciphertext = match self.content.get_ref(&content_ref).await {
			Ok(ciphertext) => ciphertext,
			Err(err) =>
				return Ok(RetrievalResult::failed(
					embedding_id,
					true,
					ContentUnavailable { message: err.to_string() },
				)),
		};
		let payload = match self
			.providers
			.encryption
			.decrypt(&ciphertext, &key, &record.encryption_identity)
			.await
		{
			Ok(payload) => payload,
			Err(err) =>
				return Ok(RetrievalResult::failed(
					embedding_id,
					true,
					Decryption { message: err.to_string() },
				)),
		};
		let content: serde_json::Value = match serde_json::from_slice(&payload) {
			Ok(content) => content,
			Err(err) =>
				return Ok(RetrievalResult::failed(
					embedding_id,
					true,
					Decryption { message: format!("Payload is not valid JSON: {err}.") },
				)),
		};

		self.notify_access(&record, requester);

		Ok(RetrievalResult {
			embedding_id: embedding_id.to_string(),
			access_granted: true,
			decrypted: true,
			content: Some(content),
			failure: None,
		})
	}

	/// Fire-and-forget; a notifier failure is logged, never propagated.
	fn notify_access(&self, record: &IndexedEmbedding, requester: &str) {
		let notifier = self.providers.notifier.clone();
		let event = AccessEvent {
			embedding_id: record.embedding_id.clone(),
			owner: record.owner.clone(),
			requester: requester.to_string(),
			category: record.category.clone(),
			accessed_at: OffsetDateTime::now_utc(),
		};

		tokio::spawn(async move {
			if let Err(err) = notifier.notify(event).await {
				tracing::warn!(error = %err, "Access notification failed.");
			}
		});
	}
}
