use serde::{Deserialize, Serialize};

/// Retention class of a stored memory.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLayer {
	ShortLived,
	#[default]
	LongLived,
}
impl StorageLayer {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::ShortLived => "short_lived",
			Self::LongLived => "long_lived",
		}
	}
}
