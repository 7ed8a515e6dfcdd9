use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use arca_providers::BoxFuture;

use crate::Result;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccessEvent {
	pub embedding_id: String,
	pub owner: String,
	pub requester: String,
	pub category: String,
	#[serde(with = "arca_domain::time_serde")]
	pub accessed_at: OffsetDateTime,
}

/// Receives fire-and-forget access notifications. A notifier failure must
/// never fail the retrieval that triggered it.
pub trait AccessNotifier
where
	Self: Send + Sync,
{
	fn notify(&self, event: AccessEvent) -> BoxFuture<'_, Result<()>>;
}

pub struct LogNotifier;
impl AccessNotifier for LogNotifier {
	fn notify(&self, event: AccessEvent) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			tracing::info!(
				embedding_id = %event.embedding_id,
				requester = %event.requester,
				category = %event.category,
				"Memory accessed."
			);

			Ok(())
		})
	}
}
