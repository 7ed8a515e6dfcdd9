use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use arca_index::{MetadataIndex, models::SearchFilters};
use arca_providers::{BoxFuture, encryption::SimulatedEncryption};
use arca_service::{
	AccessEvent, AccessNotifier, MemoryOp, MemoryService, Providers, RememberRequest,
	RetrievalFailure, SearchRequest,
};
use arca_store::content::ContentStoreClient;
use arca_testkit::{FailureKind, MemoryTransport, StaticEmbedder, test_config};

#[derive(Default)]
struct RecordingNotifier {
	events: Mutex<Vec<AccessEvent>>,
}
impl RecordingNotifier {
	fn events(&self) -> Vec<AccessEvent> {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl AccessNotifier for RecordingNotifier {
	fn notify(&self, event: AccessEvent) -> BoxFuture<'_, arca_service::Result<()>> {
		Box::pin(async move {
			self.events.lock().unwrap_or_else(|err| err.into_inner()).push(event);

			Ok(())
		})
	}
}

struct Harness {
	service: MemoryService,
	embedder: Arc<StaticEmbedder>,
	transport: Arc<MemoryTransport>,
	notifier: Arc<RecordingNotifier>,
}

fn harness(dimension: u32, batch_capacity: u32) -> Harness {
	let cfg = test_config(dimension, batch_capacity);
	let embedder = Arc::new(StaticEmbedder::new(dimension as usize));
	let transport = Arc::new(MemoryTransport::new());
	let notifier = Arc::new(RecordingNotifier::default());
	let index = MetadataIndex::new(&cfg.index).into_shared();
	let content = Arc::new(ContentStoreClient::new(transport.clone(), &cfg.content_store));
	let providers = Providers::new(
		embedder.clone(),
		Arc::new(SimulatedEncryption),
		notifier.clone(),
	);
	let service = MemoryService::new(cfg, index, content, providers);

	Harness { service, embedder, transport, notifier }
}

fn remember_request(text: &str, owner: &str, category: &str) -> RememberRequest {
	RememberRequest {
		embedding_id: None,
		owner: owner.to_string(),
		category: category.to_string(),
		text: Some(text.to_string()),
		metadata_vector: None,
		content: serde_json::json!({ "note": text }),
		entities: Default::default(),
		relationships: Vec::new(),
		confidence: None,
		similarity_threshold: None,
		storage_layer: Default::default(),
		extra_access_rules: Vec::new(),
	}
}

#[tokio::test]
async fn remembered_memories_are_searchable_and_retrievable_by_their_owner() {
	let harness = harness(4, 8);

	harness.embedder.pin("blood pressure is stable", vec![1.0, 0.0, 0.0, 0.0]);
	harness.embedder.pin("rent went up", vec![0.0, 1.0, 0.0, 0.0]);
	harness.embedder.pin("how is my health", vec![1.0, 0.0, 0.0, 0.0]);

	let first = harness
		.service
		.remember(remember_request("blood pressure is stable", "U1", "health"))
		.await
		.expect("remember failed");

	harness
		.service
		.remember(remember_request("rent went up", "U1", "finance"))
		.await
		.expect("remember failed");

	let response = harness
		.service
		.search_metadata(SearchRequest {
			query: "how is my health".to_string(),
			top_k: Some(1),
			filters: SearchFilters::default(),
		})
		.await
		.expect("search failed");

	assert_eq!(response.candidates.len(), 1);

	let candidate = &response.candidates[0];

	assert_eq!(candidate.embedding_id, first.embedding_id);
	assert!((candidate.similarity - 1.0).abs() < 1e-5);
	assert!(candidate.content_reference.is_some());

	let result = harness
		.service
		.retrieve(&first.embedding_id, "U1")
		.await
		.expect("retrieve failed");

	assert!(result.access_granted);
	assert!(result.decrypted);
	assert_eq!(
		result.content,
		Some(serde_json::json!({ "note": "blood pressure is stable" }))
	);

	// The access notification is fire-and-forget; give the task a beat.
	tokio::time::sleep(Duration::from_millis(50)).await;

	let events = harness.notifier.events();

	assert_eq!(events.len(), 1);
	assert_eq!(events[0].requester, "U1");
	assert_eq!(events[0].embedding_id, first.embedding_id);
}

#[tokio::test]
async fn stage_two_denies_non_owners_without_erroring() {
	let harness = harness(4, 8);

	harness.embedder.pin("private fact", vec![0.5, 0.5, 0.0, 0.0]);

	let stored = harness
		.service
		.remember(remember_request("private fact", "U1", "health"))
		.await
		.expect("remember failed");
	let result =
		harness.service.retrieve(&stored.embedding_id, "U2").await.expect("retrieve failed");

	assert!(!result.access_granted);
	assert!(!result.decrypted);
	assert!(result.content.is_none());
	assert!(result.failure.is_none());

	// Owner comparison is case-insensitive.
	let result =
		harness.service.retrieve(&stored.embedding_id, "u1").await.expect("retrieve failed");

	assert!(result.access_granted);
	assert!(result.decrypted);
}

#[tokio::test]
async fn unknown_ids_yield_a_not_found_result() {
	let harness = harness(4, 8);
	let result = harness.service.retrieve("missing", "U1").await.expect("retrieve failed");

	assert!(!result.access_granted);
	assert_eq!(result.failure, Some(RetrievalFailure::NotFound));
}

#[tokio::test]
async fn content_fetch_failures_are_distinct_from_denials() {
	let harness = harness(4, 8);

	harness.embedder.pin("private fact", vec![0.5, 0.5, 0.0, 0.0]);

	let stored = harness
		.service
		.remember(remember_request("private fact", "U1", "health"))
		.await
		.expect("remember failed");

	harness.transport.fail_next("get_from_batch", FailureKind::Rejected, 1);

	let result =
		harness.service.retrieve(&stored.embedding_id, "U1").await.expect("retrieve failed");

	assert!(result.access_granted);
	assert!(!result.decrypted);
	assert!(matches!(result.failure, Some(RetrievalFailure::ContentUnavailable { .. })));
}

#[tokio::test]
async fn store_failure_leaves_a_pending_record_behind() {
	let harness = harness(4, 8);

	harness.embedder.pin("private fact", vec![0.5, 0.5, 0.0, 0.0]);
	harness.transport.fail_next("put_batch", FailureKind::Rejected, 1);

	let request = {
		let mut request = remember_request("private fact", "U1", "health");

		request.embedding_id = Some("e-pending".to_string());

		request
	};
	let result = harness.service.remember(request).await;

	assert!(matches!(result, Err(arca_service::Error::Store { .. })));

	// The index insert preceded the failed write; stage 2 reports the pending
	// content rather than a missing record.
	let result = harness.service.retrieve("e-pending", "U1").await.expect("retrieve failed");

	assert!(result.access_granted);
	assert_eq!(result.failure, Some(RetrievalFailure::ContentPending));
}

#[tokio::test]
async fn batch_capacity_rolls_over_across_remembers() {
	let harness = harness(4, 2);

	for (ordinal, text) in ["first", "second", "third"].iter().enumerate() {
		harness.embedder.pin(text, vec![1.0, ordinal as f32, 0.0, 0.0]);
	}

	let first = harness
		.service
		.remember(remember_request("first", "U1", "finance"))
		.await
		.expect("remember failed");
	let second = harness
		.service
		.remember(remember_request("second", "U1", "finance"))
		.await
		.expect("remember failed");
	let third = harness
		.service
		.remember(remember_request("third", "U1", "finance"))
		.await
		.expect("remember failed");

	assert_eq!(first.batch_id, second.batch_id);
	assert!(!first.batch_sealed);
	assert!(second.batch_sealed);
	assert_ne!(third.batch_id, first.batch_id);
	assert!(!third.batch_sealed);
}

#[tokio::test]
async fn duplicate_embedding_ids_are_idempotent_at_the_service_layer() {
	let harness = harness(4, 8);

	harness.embedder.pin("first text", vec![1.0, 0.0, 0.0, 0.0]);
	harness.embedder.pin("second text", vec![0.0, 1.0, 0.0, 0.0]);

	let mut request = remember_request("first text", "U1", "health");

	request.embedding_id = Some("e-dup".to_string());

	let first = harness.service.remember(request).await.expect("remember failed");
	let mut request = remember_request("second text", "U1", "health");

	request.embedding_id = Some("e-dup".to_string());

	let second = harness.service.remember(request).await.expect("remember failed");

	assert_eq!(first.op, MemoryOp::Added);
	assert_eq!(second.op, MemoryOp::Unchanged);
	assert_eq!(first.internal_id, second.internal_id);
	assert_eq!(second.content_reference, first.content_reference);
	assert_eq!(harness.transport.put_batch_calls(), 1);

	// The record keeps the first vector: a query matching the first text
	// still finds it with unit similarity.
	let response = harness
		.service
		.search_metadata(SearchRequest {
			query: "first text".to_string(),
			top_k: Some(1),
			filters: SearchFilters::default(),
		})
		.await
		.expect("search failed");

	assert_eq!(response.candidates.len(), 1);
	assert!((response.candidates[0].similarity - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn owner_filter_confines_search_results() {
	let harness = harness(4, 8);

	harness.embedder.pin("u1 memory", vec![1.0, 0.0, 0.0, 0.0]);
	harness.embedder.pin("u2 memory", vec![1.0, 0.1, 0.0, 0.0]);

	harness
		.service
		.remember(remember_request("u1 memory", "U1", "health"))
		.await
		.expect("remember failed");
	harness
		.service
		.remember(remember_request("u2 memory", "U2", "health"))
		.await
		.expect("remember failed");

	let response = harness
		.service
		.search_metadata(SearchRequest {
			query: "u1 memory".to_string(),
			top_k: Some(10),
			filters: SearchFilters { owner: Some("U1".to_string()), ..Default::default() },
		})
		.await
		.expect("search failed");

	assert_eq!(response.candidates.len(), 1);
	assert_eq!(response.candidates[0].owner, "U1");
}

#[tokio::test]
async fn default_providers_honor_the_configured_encryption_mode() {
	let cfg = test_config(4, 8);
	let providers = arca_service::Providers::from_config(&cfg).expect("providers failed");
	let policy = arca_domain::policy::AccessPolicy::new("U1", "health", &[]);
	let encrypted =
		providers.encryption.encrypt(b"hello", &policy, Some("e1")).await.expect("encrypt failed");

	assert_eq!(encrypted.metadata.scheme, "simulated-xor");
}

#[tokio::test]
async fn recall_context_skips_failing_candidates() {
	let mut harness = harness(4, 8);

	harness.service.cfg.search.relevance_cutoff = 0.3;
	harness.embedder.pin("alpha memory", vec![1.0, 0.0, 0.0, 0.0]);
	harness.embedder.pin("beta memory", vec![0.9, 0.1, 0.0, 0.0]);
	harness.embedder.pin("unrelated memory", vec![0.0, 0.0, 0.0, 1.0]);
	harness.embedder.pin("alpha question", vec![1.0, 0.0, 0.0, 0.0]);

	harness
		.service
		.remember(remember_request("alpha memory", "U1", "health"))
		.await
		.expect("remember failed");
	harness
		.service
		.remember(remember_request("beta memory", "U1", "health"))
		.await
		.expect("remember failed");
	harness
		.service
		.remember(remember_request("unrelated memory", "U1", "health"))
		.await
		.expect("remember failed");

	// The most similar candidate fails its content fetch (retries exhaust on
	// transport errors) and is skipped rather than failing the bundle.
	harness.transport.fail_next("get_from_batch", FailureKind::Transport, 3);

	let bundle = harness
		.service
		.recall_context("alpha question", "U1", Some(4))
		.await
		.expect("recall failed");

	assert_eq!(bundle.searched, 2);
	assert_eq!(bundle.retrieved, 1);
	assert_eq!(bundle.items.len(), 1);
	assert_eq!(bundle.items[0].content, serde_json::json!({ "note": "beta memory" }));
}
