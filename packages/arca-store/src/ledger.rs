use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use arca_domain::event::LedgerEvent;

use crate::{BoxFuture, Error, Result};

/// Read side of the external append-only event log.
pub trait LedgerSource
where
	Self: Send + Sync,
{
	/// Events with `position` strictly greater than the given checkpoint,
	/// ascending.
	fn events_since<'a>(&'a self, position: u64) -> BoxFuture<'a, Result<Vec<LedgerEvent>>>;
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
	events: Vec<LedgerEvent>,
}

pub struct HttpLedger {
	api_base: String,
	api_key: Option<String>,
	timeout: Duration,
	page_size: u32,
}
impl HttpLedger {
	pub fn new(cfg: &arca_config::Ledger) -> Result<Self> {
		let api_base = cfg.api_base.trim();

		if api_base.is_empty() {
			return Err(Error::InvalidConfig {
				message: "ledger.api_base must be non-empty.".to_string(),
			});
		}

		Ok(Self {
			api_base: api_base.trim_end_matches('/').to_string(),
			api_key: cfg.api_key.clone(),
			timeout: Duration::from_millis(cfg.timeout_ms),
			page_size: cfg.page_size.max(1),
		})
	}
}
impl LedgerSource for HttpLedger {
	fn events_since<'a>(&'a self, position: u64) -> BoxFuture<'a, Result<Vec<LedgerEvent>>> {
		Box::pin(async move {
			let client = Client::builder().timeout(self.timeout).build()?;
			let mut request = client
				.get(format!("{}/events", self.api_base))
				.query(&[("since", position.to_string()), ("limit", self.page_size.to_string())]);

			if let Some(api_key) = self.api_key.as_deref() {
				request = request.bearer_auth(api_key);
			}

			let res = request.send().await?;
			let body: EventsResponse = res.error_for_status()?.json().await?;

			Ok(body.events)
		})
	}
}
