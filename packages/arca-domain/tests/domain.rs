use time::OffsetDateTime;

use arca_domain::{
	event::{EmbeddingRegistered, EmbeddingRemoved, LedgerEvent},
	layer::StorageLayer,
	policy::{AccessPolicy, derive_identity},
	proof::{AuthorizationProof, authorize_requester},
};

#[test]
fn equivalent_policies_share_digest_and_identity() {
	let extras_a = vec!["allow:read".to_string(), "expire:2027-01-01".to_string()];
	let extras_b = vec!["expire:2027-01-01".to_string(), "allow:read".to_string()];
	let a = AccessPolicy::new("  u1 ", "health", &extras_a);
	let b = AccessPolicy::new("u1", "health", &extras_b);

	assert_eq!(a.policy_digest, b.policy_digest);
	assert_eq!(derive_identity(&a, Some("e1")), derive_identity(&b, Some("e1")));
}

#[test]
fn identity_depends_on_object_id() {
	let policy = AccessPolicy::new("u1", "health", &[]);

	assert_ne!(derive_identity(&policy, Some("e1")), derive_identity(&policy, Some("e2")));
	assert_ne!(derive_identity(&policy, Some("e1")), derive_identity(&policy, None));
}

#[test]
fn proof_serializes_with_rfc3339_timestamp() {
	let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
	let proof = AuthorizationProof::new("u1::health::d", "u1", "e1", "retrieve", ts);
	let json = serde_json::to_value(&proof).expect("Failed to encode proof.");

	assert_eq!(json["requester"], "u1");
	assert_eq!(json["access_function"], "retrieve");
	assert!(json["requested_at"].as_str().expect("requested_at").starts_with("2023-11-14"));
}

#[test]
fn requester_authorization_matches_owner_only() {
	assert!(authorize_requester("U1", "u1"));
	assert!(!authorize_requester("u2", "u1"));
}

#[test]
fn ledger_events_round_trip_through_tagged_json() {
	let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
	let registered = LedgerEvent::Registered(EmbeddingRegistered {
		embedding_id: "e1".to_string(),
		owner: "u1".to_string(),
		category: "health".to_string(),
		metadata_vector: vec![1.0, 0.0],
		content_reference: None,
		encryption_identity: "u1::health::d".to_string(),
		timestamp: ts,
		position: 7,
	});
	let json = serde_json::to_value(&registered).expect("Failed to encode event.");

	assert_eq!(json["kind"], "registered");

	let decoded: LedgerEvent = serde_json::from_value(json).expect("Failed to decode event.");

	assert_eq!(decoded.position(), 7);
	assert_eq!(decoded.embedding_id(), "e1");

	let removed = LedgerEvent::Removed(EmbeddingRemoved {
		embedding_id: "e1".to_string(),
		timestamp: ts,
		position: 8,
	});
	let json = serde_json::to_value(&removed).expect("Failed to encode event.");

	assert_eq!(json["kind"], "removed");
}

#[test]
fn storage_layer_defaults_to_long_lived() {
	assert_eq!(StorageLayer::default(), StorageLayer::LongLived);
	assert_eq!(StorageLayer::ShortLived.as_str(), "short_lived");
}
