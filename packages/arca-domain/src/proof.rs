use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Asserts who is requesting a decryption key, for which identity, and when.
/// Built by the retrieval caller; the encryption provider only forwards it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthorizationProof {
	pub identity: String,
	pub requester: String,
	pub embedding_id: String,
	pub access_function: String,
	#[serde(with = "crate::time_serde")]
	pub requested_at: OffsetDateTime,
}
impl AuthorizationProof {
	pub fn new(
		identity: &str,
		requester: &str,
		embedding_id: &str,
		access_function: &str,
		requested_at: OffsetDateTime,
	) -> Self {
		Self {
			identity: identity.to_string(),
			requester: requester.to_string(),
			embedding_id: embedding_id.to_string(),
			access_function: access_function.to_string(),
			requested_at,
		}
	}
}

/// Owner check gating stage-2 retrieval: a case-insensitive identity match.
/// This is a development-grade placeholder, not a cryptographic verification
/// of the requester's claimed identity; a signature scheme replaces this
/// function without changing retrieval control flow.
pub fn authorize_requester(requester: &str, owner: &str) -> bool {
	let requester = requester.trim();
	let owner = owner.trim();

	!requester.is_empty() && requester.eq_ignore_ascii_case(owner)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn owner_match_is_case_insensitive() {
		assert!(authorize_requester("U1", "u1"));
		assert!(authorize_requester("alice", "ALICE"));
	}

	#[test]
	fn different_identities_are_denied() {
		assert!(!authorize_requester("u2", "u1"));
		assert!(!authorize_requester("", "u1"));
	}
}
