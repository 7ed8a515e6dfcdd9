use serde::{Deserialize, Serialize};

const IDENTITY_SEPARATOR: &str = "::";

/// Access rules for one (owner, category) pair. The digest is stable across
/// rule ordering, so two policies built from the same logical rule set are
/// interchangeable downstream.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccessPolicy {
	pub owner: String,
	pub category: String,
	pub access_rules: Vec<String>,
	pub policy_digest: String,
}
impl AccessPolicy {
	pub fn new(owner: &str, category: &str, extra_rules: &[String]) -> Self {
		let owner = owner.trim().to_string();
		let category = category.trim().to_string();
		let mut access_rules = Vec::with_capacity(2 + extra_rules.len());

		access_rules.push(format!("owner:{owner}"));
		access_rules.push(format!("category:{category}"));

		for rule in extra_rules {
			let rule = rule.trim();

			if !rule.is_empty() {
				access_rules.push(rule.to_string());
			}
		}

		let policy_digest = digest_rules(&access_rules);

		Self { owner, category, access_rules, policy_digest }
	}
}

/// Derives the encryption identity for a policy, optionally pinned to one
/// object. Re-deriving from the same inputs always yields the same string;
/// a legitimate requester recomputes it to ask for a key.
pub fn derive_identity(policy: &AccessPolicy, object_id: Option<&str>) -> String {
	let mut identity = format!(
		"{}{IDENTITY_SEPARATOR}{}{IDENTITY_SEPARATOR}{}",
		policy.owner, policy.category, policy.policy_digest
	);

	if let Some(object_id) = object_id.map(str::trim).filter(|id| !id.is_empty()) {
		identity.push_str(IDENTITY_SEPARATOR);
		identity.push_str(object_id);
	}

	identity
}

fn digest_rules(rules: &[String]) -> String {
	let mut canonical = rules.to_vec();

	canonical.sort();
	canonical.dedup();

	let mut hasher = blake3::Hasher::new();

	for rule in &canonical {
		hasher.update(rule.as_bytes());
		hasher.update(b"\n");
	}

	hasher.finalize().to_hex().to_string()
}
