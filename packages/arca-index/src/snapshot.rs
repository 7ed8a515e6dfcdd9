use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, MetadataIndex, Result, models::IndexedEmbedding};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized index + checkpoint state. The version is checked before any
/// field is interpreted, so an incompatible snapshot fails loudly instead of
/// deserializing into the wrong shape.
#[derive(Debug, Deserialize, Serialize)]
pub struct Snapshot {
	pub version: u32,
	pub checkpoint: u64,
	pub dimension: u32,
	pub next_internal_id: u64,
	#[serde(with = "arca_domain::time_serde")]
	pub saved_at: OffsetDateTime,
	pub records: Vec<SnapshotRecord>,
}
impl Snapshot {
	pub fn encode(&self) -> Result<Vec<u8>> {
		serde_json::to_vec(self)
			.map_err(|err| Error::Snapshot { message: format!("Failed to encode snapshot: {err}.") })
	}

	pub fn decode(bytes: &[u8]) -> Result<Self> {
		let probe: VersionProbe = serde_json::from_slice(bytes).map_err(|err| Error::Snapshot {
			message: format!("Failed to decode snapshot: {err}."),
		})?;

		if probe.version != SNAPSHOT_VERSION {
			return Err(Error::Snapshot {
				message: format!(
					"Unsupported snapshot version {}, expected {SNAPSHOT_VERSION}.",
					probe.version
				),
			});
		}

		serde_json::from_slice(bytes).map_err(|err| Error::Snapshot {
			message: format!("Failed to decode snapshot: {err}."),
		})
	}
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SnapshotRecord {
	pub internal_id: u64,
	pub record: IndexedEmbedding,
}

#[derive(Debug, Deserialize)]
struct VersionProbe {
	version: u32,
}

impl MetadataIndex {
	pub fn to_snapshot(&self, checkpoint: u64) -> Snapshot {
		let mut records: Vec<SnapshotRecord> = self
			.live_records()
			.map(|(internal_id, record)| SnapshotRecord {
				internal_id: internal_id as u64,
				record: record.clone(),
			})
			.collect();

		records.sort_by_key(|entry| entry.internal_id);

		Snapshot {
			version: SNAPSHOT_VERSION,
			checkpoint,
			dimension: self.dimension() as u32,
			next_internal_id: self.next_internal_id() as u64,
			saved_at: OffsetDateTime::now_utc(),
			records,
		}
	}

	/// Rebuilds an index from a snapshot by re-inserting every live vector
	/// into a fresh graph, preserving internal ids so the append-only mapping
	/// survives restarts.
	pub fn restore(cfg: &arca_config::Index, snapshot: &Snapshot) -> Result<Self> {
		if snapshot.dimension as usize != cfg.dimension as usize {
			return Err(Error::Snapshot {
				message: format!(
					"Snapshot dimension {} does not match configured dimension {}.",
					snapshot.dimension, cfg.dimension
				),
			});
		}

		let mut index = Self::new(cfg);

		for entry in &snapshot.records {
			index.restore_record(entry.internal_id as usize, entry.record.clone())?;
		}

		index.set_next_internal_id(snapshot.next_internal_id as usize);

		Ok(index)
	}
}
