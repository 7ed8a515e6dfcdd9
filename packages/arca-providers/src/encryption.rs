use std::{sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use arca_domain::{policy::AccessPolicy, proof::AuthorizationProof};

use crate::{BoxFuture, Error, Result};

const SIMULATED_SCHEME: &str = "simulated-xor";
const NETWORK_SCHEME: &str = "threshold-ibe";
const SIMULATED_KEY_CONTEXT: &str = "arca simulated encryption 2026-06-01 identity key";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EncryptionMetadata {
	pub scheme: String,
	pub policy_digest: String,
}

#[derive(Clone, Debug)]
pub struct EncryptedPayload {
	pub ciphertext: Vec<u8>,
	pub identity: String,
	pub metadata: EncryptionMetadata,
}

#[derive(Clone)]
pub struct DecryptionKey {
	pub material: Vec<u8>,
}
impl std::fmt::Debug for DecryptionKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DecryptionKey").finish_non_exhaustive()
	}
}

pub trait EncryptionProvider
where
	Self: Send + Sync,
{
	fn encrypt<'a>(
		&'a self,
		payload: &'a [u8],
		policy: &'a AccessPolicy,
		object_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<EncryptedPayload>>;

	fn request_key<'a>(
		&'a self,
		identity: &'a str,
		proof: &'a AuthorizationProof,
	) -> BoxFuture<'a, Result<DecryptionKey>>;

	fn decrypt<'a>(
		&'a self,
		ciphertext: &'a [u8],
		key: &'a DecryptionKey,
		identity: &'a str,
	) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Chooses the provider implementation once, at construction. No call site
/// branches on the mode afterwards.
pub fn from_config(cfg: &arca_config::Encryption) -> Result<Arc<dyn EncryptionProvider>> {
	match cfg.mode.as_str() {
		arca_config::ENCRYPTION_MODE_NETWORK => Ok(Arc::new(NetworkEncryption::new(cfg)?)),
		arca_config::ENCRYPTION_MODE_SIMULATED => Ok(Arc::new(SimulatedEncryption)),
		other => Err(Error::InvalidConfig {
			message: format!("Unknown encryption mode {other:?}."),
		}),
	}
}

/// Delegates to the external threshold identity-encryption service.
pub struct NetworkEncryption {
	api_base: String,
	api_key: Option<String>,
	timeout: Duration,
}
impl NetworkEncryption {
	pub fn new(cfg: &arca_config::Encryption) -> Result<Self> {
		let api_base = cfg
			.api_base
			.as_deref()
			.map(str::trim)
			.filter(|base| !base.is_empty())
			.ok_or_else(|| Error::InvalidConfig {
				message: "encryption.api_base is required in network mode.".to_string(),
			})?
			.to_string();

		Ok(Self {
			api_base,
			api_key: cfg.api_key.clone(),
			timeout: Duration::from_millis(cfg.timeout_ms),
		})
	}

	fn client(&self) -> Result<Client> {
		Ok(Client::builder().timeout(self.timeout).build()?)
	}

	async fn post(&self, path: &str, body: Value) -> Result<Value> {
		let client = self.client()?;
		let mut request = client.post(format!("{}{path}", self.api_base)).json(&body);

		if let Some(api_key) = self.api_key.as_deref() {
			request = request.bearer_auth(api_key);
		}

		let res = request.send().await?;

		Ok(res.error_for_status()?.json().await?)
	}
}
impl EncryptionProvider for NetworkEncryption {
	fn encrypt<'a>(
		&'a self,
		payload: &'a [u8],
		policy: &'a AccessPolicy,
		object_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<EncryptedPayload>> {
		Box::pin(async move {
			let identity = arca_domain::policy::derive_identity(policy, object_id);
			let body = serde_json::json!({
				"identity": identity,
				"access_rules": policy.access_rules,
				"payload": STANDARD.encode(payload),
			});
			let json = self.post("/encrypt", body).await?;
			let ciphertext = decode_b64_field(&json, "ciphertext")?;

			Ok(EncryptedPayload {
				ciphertext,
				identity,
				metadata: EncryptionMetadata {
					scheme: NETWORK_SCHEME.to_string(),
					policy_digest: policy.policy_digest.clone(),
				},
			})
		})
	}

	fn request_key<'a>(
		&'a self,
		identity: &'a str,
		proof: &'a AuthorizationProof,
	) -> BoxFuture<'a, Result<DecryptionKey>> {
		Box::pin(async move {
			let body = serde_json::json!({
				"identity": identity,
				"proof": proof,
			});
			let json = self.post("/keys", body).await?;
			let material = decode_b64_field(&json, "key")?;

			Ok(DecryptionKey { material })
		})
	}

	fn decrypt<'a>(
		&'a self,
		ciphertext: &'a [u8],
		key: &'a DecryptionKey,
		identity: &'a str,
	) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			let body = serde_json::json!({
				"identity": identity,
				"ciphertext": STANDARD.encode(ciphertext),
				"key": STANDARD.encode(&key.material),
			});
			let json = self.post("/decrypt", body).await?;

			decode_b64_field(&json, "payload")
		})
	}
}

/// Reversible keystream transform for environments without a key-release
/// service. NOT cryptographically secure; never enable outside development.
pub struct SimulatedEncryption;
impl SimulatedEncryption {
	fn identity_key(identity: &str) -> [u8; 32] {
		blake3::derive_key(SIMULATED_KEY_CONTEXT, identity.as_bytes())
	}

	fn apply_keystream(data: &[u8], key: &[u8; 32], identity: &str) -> Vec<u8> {
		let mut keystream = vec![0_u8; data.len()];
		let mut hasher = blake3::Hasher::new_keyed(key);

		hasher.update(identity.as_bytes());
		hasher.finalize_xof().fill(&mut keystream);

		data.iter().zip(keystream.iter()).map(|(byte, mask)| byte ^ mask).collect()
	}
}
impl EncryptionProvider for SimulatedEncryption {
	fn encrypt<'a>(
		&'a self,
		payload: &'a [u8],
		policy: &'a AccessPolicy,
		object_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<EncryptedPayload>> {
		Box::pin(async move {
			let identity = arca_domain::policy::derive_identity(policy, object_id);
			let key = Self::identity_key(&identity);
			let ciphertext = Self::apply_keystream(payload, &key, &identity);

			Ok(EncryptedPayload {
				ciphertext,
				identity,
				metadata: EncryptionMetadata {
					scheme: SIMULATED_SCHEME.to_string(),
					policy_digest: policy.policy_digest.clone(),
				},
			})
		})
	}

	fn request_key<'a>(
		&'a self,
		identity: &'a str,
		proof: &'a AuthorizationProof,
	) -> BoxFuture<'a, Result<DecryptionKey>> {
		Box::pin(async move {
			if proof.identity != identity {
				return Err(Error::Rejected {
					message: "Authorization proof does not cover the requested identity."
						.to_string(),
				});
			}

			Ok(DecryptionKey { material: Self::identity_key(identity).to_vec() })
		})
	}

	fn decrypt<'a>(
		&'a self,
		ciphertext: &'a [u8],
		key: &'a DecryptionKey,
		identity: &'a str,
	) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			let expected = Self::identity_key(identity);

			if key.material != expected {
				return Err(Error::Rejected {
					message: "Decryption key does not match identity.".to_string(),
				});
			}

			Ok(Self::apply_keystream(ciphertext, &expected, identity))
		})
	}
}

fn decode_b64_field(json: &Value, field: &str) -> Result<Vec<u8>> {
	let raw = json.get(field).and_then(|v| v.as_str()).ok_or_else(|| Error::InvalidResponse {
		message: format!("Response is missing {field} field."),
	})?;

	STANDARD.decode(raw).map_err(|_| Error::InvalidResponse {
		message: format!("Response {field} field is not valid base64."),
	})
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use super::*;

	fn policy() -> AccessPolicy {
		AccessPolicy::new("u1", "health", &[])
	}

	fn proof_for(identity: &str, requester: &str) -> AuthorizationProof {
		AuthorizationProof::new(
			identity,
			requester,
			"e1",
			"retrieve",
			OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp"),
		)
	}

	#[tokio::test]
	async fn simulated_round_trip_recovers_the_payload() {
		let provider = SimulatedEncryption;
		let encrypted =
			provider.encrypt(b"hello", &policy(), Some("e1")).await.expect("encrypt failed");

		assert_ne!(encrypted.ciphertext, b"hello");
		assert_eq!(encrypted.metadata.scheme, SIMULATED_SCHEME);

		let proof = proof_for(&encrypted.identity, "u1");
		let key =
			provider.request_key(&encrypted.identity, &proof).await.expect("key request failed");
		let decrypted = provider
			.decrypt(&encrypted.ciphertext, &key, &encrypted.identity)
			.await
			.expect("decrypt failed");

		assert_eq!(decrypted, b"hello");
	}

	#[tokio::test]
	async fn simulated_key_is_deterministic_per_identity() {
		let provider = SimulatedEncryption;
		let identity = arca_domain::policy::derive_identity(&policy(), Some("e1"));
		let proof = proof_for(&identity, "u1");
		let first = provider.request_key(&identity, &proof).await.expect("key request failed");
		let second = provider.request_key(&identity, &proof).await.expect("key request failed");

		assert_eq!(first.material, second.material);
	}

	#[tokio::test]
	async fn simulated_rejects_key_for_wrong_identity() {
		let provider = SimulatedEncryption;
		let encrypted =
			provider.encrypt(b"hello", &policy(), Some("e1")).await.expect("encrypt failed");
		let other_identity =
			arca_domain::policy::derive_identity(&AccessPolicy::new("u1", "finance", &[]), None);
		let proof = proof_for(&other_identity, "u1");
		let wrong_key =
			provider.request_key(&other_identity, &proof).await.expect("key request failed");
		let result = provider.decrypt(&encrypted.ciphertext, &wrong_key, &encrypted.identity).await;

		assert!(matches!(result, Err(Error::Rejected { .. })));
	}

	#[tokio::test]
	async fn simulated_rejects_proof_for_other_identity() {
		let provider = SimulatedEncryption;
		let identity = arca_domain::policy::derive_identity(&policy(), Some("e1"));
		let proof = proof_for("someone::else::digest", "u1");
		let result = provider.request_key(&identity, &proof).await;

		assert!(matches!(result, Err(Error::Rejected { .. })));
	}
}
