use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

const CONTENT_REF_SEPARATOR: char = '#';

/// Locates one encrypted payload: the storage container holding it plus the
/// item identifier inside that container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentRef {
	pub container: String,
	pub item: String,
}
impl ContentRef {
	pub fn new(container: &str, item: &str) -> Self {
		Self { container: container.to_string(), item: item.to_string() }
	}
}
impl fmt::Display for ContentRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{CONTENT_REF_SEPARATOR}{}", self.container, self.item)
	}
}
impl FromStr for ContentRef {
	type Err = crate::Error;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		let (container, item) =
			raw.split_once(CONTENT_REF_SEPARATOR).ok_or_else(|| crate::Error::InvalidResponse {
				message: format!("Content reference {raw:?} is missing a container separator."),
			})?;

		if container.is_empty() || item.is_empty() {
			return Err(crate::Error::InvalidResponse {
				message: format!("Content reference {raw:?} has an empty component."),
			});
		}

		Ok(Self { container: container.to_string(), item: item.to_string() })
	}
}
impl Serialize for ContentRef {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_string())
	}
}
impl<'de> Deserialize<'de> for ContentRef {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		raw.parse().map_err(serde::de::Error::custom)
	}
}

#[derive(Clone, Debug)]
pub struct BatchEntry {
	pub identifier: String,
	pub bytes: Vec<u8>,
	pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PatchRef {
	pub identifier: String,
	pub patch_id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BatchReceipt {
	pub container: String,
	pub patches: Vec<PatchRef>,
}

/// One payload tracked under a logical category batch. Every item records its
/// own container because the underlying store's batches are immutable once
/// written.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BatchItem {
	pub identifier: String,
	pub container: String,
	pub patch_id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CategoryBatch {
	pub owner: String,
	pub category: String,
	/// Unset until the first payload flush mints the initial container.
	pub batch_id: Option<String>,
	pub blob_count: u32,
	pub capacity: u32,
	pub items: Vec<BatchItem>,
	#[serde(with = "arca_domain::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "arca_domain::time_serde")]
	pub last_updated: OffsetDateTime,
}
impl CategoryBatch {
	pub fn is_sealed(&self) -> bool {
		self.blob_count >= self.capacity
	}
}

#[derive(Clone, Debug)]
pub struct StoredBlob {
	pub batch_id: String,
	pub content_ref: ContentRef,
	pub patch_id: String,
	pub sealed: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn content_ref_round_trips_through_its_string_form() {
		let content_ref = ContentRef::new("batch-1", "item-7");
		let parsed: ContentRef = content_ref.to_string().parse().expect("parse failed");

		assert_eq!(parsed, content_ref);
	}

	#[test]
	fn content_ref_rejects_malformed_strings() {
		assert!("no-separator".parse::<ContentRef>().is_err());
		assert!("#item".parse::<ContentRef>().is_err());
		assert!("container#".parse::<ContentRef>().is_err());
	}
}
