use std::{sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::Value;

use crate::{
	BoxFuture, Error, Result,
	models::{BatchEntry, BatchReceipt, ContentRef, PatchRef},
};

const AVAILABILITY_PROBE_BACKOFF_MS: u64 = 100;
const AVAILABILITY_PROBE_BACKOFF_CAP_MS: u64 = 2_000;

/// Single-attempt operations against the content-addressable store. Retry
/// policy lives in [`ContentStoreClient`], not here.
pub trait ContentTransport
where
	Self: Send + Sync,
{
	fn put<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, Result<String>>;

	fn get<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;

	fn delete<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, Result<()>>;

	fn put_batch<'a>(&'a self, entries: &'a [BatchEntry]) -> BoxFuture<'a, Result<BatchReceipt>>;

	fn get_from_batch<'a>(
		&'a self,
		container: &'a str,
		identifier: &'a str,
	) -> BoxFuture<'a, Result<Vec<u8>>>;
}

pub struct HttpTransport {
	api_base: String,
	api_key: Option<String>,
	timeout: Duration,
}
impl HttpTransport {
	pub fn new(cfg: &arca_config::ContentStore) -> Result<Self> {
		let api_base = cfg.api_base.trim();

		if api_base.is_empty() {
			return Err(Error::InvalidConfig {
				message: "content_store.api_base must be non-empty.".to_string(),
			});
		}

		Ok(Self {
			api_base: api_base.trim_end_matches('/').to_string(),
			api_key: cfg.api_key.clone(),
			timeout: Duration::from_millis(cfg.timeout_ms),
		})
	}

	fn client(&self) -> Result<Client> {
		Ok(Client::builder().timeout(self.timeout).build()?)
	}

	fn request(
		&self,
		method: reqwest::Method,
		path: &str,
	) -> Result<reqwest::RequestBuilder> {
		let mut request = self.client()?.request(method, format!("{}{path}", self.api_base));

		if let Some(api_key) = self.api_key.as_deref() {
			request = request.bearer_auth(api_key);
		}

		Ok(request)
	}
}
impl ContentTransport for HttpTransport {
	fn put<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			let body = serde_json::json!({ "data": STANDARD.encode(bytes) });
			let res = self.request(reqwest::Method::POST, "/blobs")?.json(&body).send().await?;
			let json: Value = res.error_for_status()?.json().await?;

			string_field(&json, "locator")
		})
	}

	fn get<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			let res =
				self.request(reqwest::Method::GET, &format!("/blobs/{locator}"))?.send().await?;
			let json: Value = res.error_for_status()?.json().await?;

			bytes_field(&json, "data")
		})
	}

	fn delete<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let res =
				self.request(reqwest::Method::DELETE, &format!("/blobs/{locator}"))?.send().await?;

			res.error_for_status()?;

			Ok(())
		})
	}

	fn put_batch<'a>(&'a self, entries: &'a [BatchEntry]) -> BoxFuture<'a, Result<BatchReceipt>> {
		Box::pin(async move {
			let items: Vec<Value> = entries
				.iter()
				.map(|entry| {
					serde_json::json!({
						"identifier": entry.identifier,
						"data": STANDARD.encode(&entry.bytes),
						"tags": entry.tags,
					})
				})
				.collect();
			let body = serde_json::json!({ "items": items });
			let res = self.request(reqwest::Method::POST, "/batches")?.json(&body).send().await?;
			let json: Value = res.error_for_status()?.json().await?;
			let container = string_field(&json, "locator")?;
			let patches: Vec<PatchRef> = json
				.get("patches")
				.cloned()
				.map(serde_json::from_value)
				.transpose()
				.map_err(|err| Error::InvalidResponse {
					message: format!("Batch response patches are malformed: {err}."),
				})?
				.unwrap_or_default();

			Ok(BatchReceipt { container, patches })
		})
	}

	fn get_from_batch<'a>(
		&'a self,
		container: &'a str,
		identifier: &'a str,
	) -> BoxFuture<'a, Result<Vec<u8>>> {
		Box::pin(async move {
			let res = self
				.request(reqwest::Method::GET, &format!("/batches/{container}/items/{identifier}"))?
				.send()
				.await?;
			let json: Value = res.error_for_status()?.json().await?;

			bytes_field(&json, "data")
		})
	}
}

/// Wraps a transport with bounded retry and exponential backoff. Transport
/// failures retry; rejections and not-found surface immediately.
pub struct ContentStoreClient {
	transport: Arc<dyn ContentTransport>,
	max_attempts: u32,
	base_backoff: Duration,
}
impl ContentStoreClient {
	pub fn new(transport: Arc<dyn ContentTransport>, cfg: &arca_config::ContentStore) -> Self {
		Self {
			transport,
			max_attempts: cfg.max_attempts.max(1),
			base_backoff: Duration::from_millis(cfg.base_backoff_ms),
		}
	}

	pub async fn put(&self, bytes: &[u8]) -> Result<String> {
		self.with_retry("put", || self.transport.put(bytes)).await
	}

	pub async fn get(&self, locator: &str) -> Result<Vec<u8>> {
		self.with_retry("get", || self.transport.get(locator)).await
	}

	pub async fn get_ref(&self, content_ref: &ContentRef) -> Result<Vec<u8>> {
		self.get_from_batch(&content_ref.container, &content_ref.item).await
	}

	/// Best-effort removal; a single attempt, no retry.
	pub async fn delete(&self, locator: &str) -> Result<()> {
		self.transport.delete(locator).await
	}

	pub async fn put_batch(&self, entries: &[BatchEntry]) -> Result<BatchReceipt> {
		self.with_retry("put_batch", || self.transport.put_batch(entries)).await
	}

	pub async fn get_from_batch(&self, container: &str, identifier: &str) -> Result<Vec<u8>> {
		self.with_retry("get_from_batch", || self.transport.get_from_batch(container, identifier))
			.await
	}

	/// Polls a just-written batch until the store has propagated it or the
	/// deadline elapses. Callers needing read-your-write consistency call this
	/// before relying on the batch.
	pub async fn await_batch_availability(
		&self,
		container: &str,
		probe_identifier: &str,
		max_wait: Duration,
	) -> bool {
		let deadline = tokio::time::Instant::now() + max_wait;
		let mut backoff = Duration::from_millis(AVAILABILITY_PROBE_BACKOFF_MS);

		loop {
			if self.transport.get_from_batch(container, probe_identifier).await.is_ok() {
				return true;
			}

			let now = tokio::time::Instant::now();

			if now >= deadline {
				tracing::warn!(
					container,
					"Batch did not become available within the allotted wait."
				);

				return false;
			}

			tokio::time::sleep(backoff.min(deadline - now)).await;

			backoff = backoff
				.saturating_mul(2)
				.min(Duration::from_millis(AVAILABILITY_PROBE_BACKOFF_CAP_MS));
		}
	}

	async fn with_retry<'a, T>(
		&self,
		op: &str,
		mut run: impl FnMut() -> BoxFuture<'a, Result<T>>,
	) -> Result<T> {
		let mut backoff = self.base_backoff;
		let mut attempt = 0;

		loop {
			attempt += 1;

			match run().await {
				Ok(value) => return Ok(value),
				Err(err) if err.is_transport() && attempt < self.max_attempts => {
					tracing::warn!(error = %err, attempt, "Content store {op} failed. Retrying.");
					tokio::time::sleep(backoff).await;

					backoff = backoff.saturating_mul(2);
				},
				Err(err) => return Err(err),
			}
		}
	}
}

fn string_field(json: &Value, field: &str) -> Result<String> {
	json.get(field)
		.and_then(|v| v.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: format!("Response is missing {field} field."),
		})
}

fn bytes_field(json: &Value, field: &str) -> Result<Vec<u8>> {
	let raw = string_field(json, field)?;

	STANDARD.decode(raw).map_err(|_| Error::InvalidResponse {
		message: format!("Response {field} field is not valid base64."),
	})
}
