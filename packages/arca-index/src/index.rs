use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex},
};

use hnsw_rs::prelude::*;

use crate::{
	Error, Result,
	models::{IndexedEmbedding, SearchFilters, SearchHit},
};

const HNSW_MAX_LAYER: usize = 16;

/// The index is shared by ingest callers, the sync loop, and search callers.
/// The HNSW structure is not guaranteed safe for a writer overlapping a
/// reader, so every operation takes the one lock.
pub type SharedIndex = Arc<Mutex<MetadataIndex>>;

/// In-memory ANN index over public metadata vectors. Internal ids are
/// sequential and append-only; an id is never reused or reassigned.
pub struct MetadataIndex {
	dimension: usize,
	capacity: usize,
	oversample_factor: usize,
	ef_search: usize,
	hnsw: Hnsw<'static, f32, DistCosine>,
	records: HashMap<usize, IndexedEmbedding>,
	ids: HashMap<String, usize>,
	removed: HashSet<usize>,
	next_internal_id: usize,
}
impl std::fmt::Debug for MetadataIndex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MetadataIndex")
			.field("dimension", &self.dimension)
			.field("capacity", &self.capacity)
			.field("oversample_factor", &self.oversample_factor)
			.field("ef_search", &self.ef_search)
			.field("records", &self.records)
			.field("ids", &self.ids)
			.field("removed", &self.removed)
			.field("next_internal_id", &self.next_internal_id)
			.finish_non_exhaustive()
	}
}
impl MetadataIndex {
	pub fn new(cfg: &arca_config::Index) -> Self {
		let capacity = cfg.capacity as usize;
		let hnsw = Hnsw::<f32, DistCosine>::new(
			cfg.max_connections as usize,
			capacity,
			HNSW_MAX_LAYER,
			cfg.ef_construction as usize,
			DistCosine {},
		);

		Self {
			dimension: cfg.dimension as usize,
			capacity,
			oversample_factor: cfg.oversample_factor.max(1) as usize,
			ef_search: cfg.ef_search.max(1) as usize,
			hnsw,
			records: HashMap::new(),
			ids: HashMap::new(),
			removed: HashSet::new(),
			next_internal_id: 0,
		}
	}

	pub fn into_shared(self) -> SharedIndex {
		Arc::new(Mutex::new(self))
	}

	pub fn dimension(&self) -> usize {
		self.dimension
	}

	/// Live record count. Tombstoned entries do not count.
	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}

	pub fn get(&self, embedding_id: &str) -> Option<&IndexedEmbedding> {
		self.ids.get(embedding_id).and_then(|id| self.records.get(id))
	}

	pub fn internal_id(&self, embedding_id: &str) -> Option<usize> {
		self.ids.get(embedding_id).copied()
	}

	/// Inserts a record, normalizing its vector. Re-inserting a known
	/// `embedding_id` is a no-op returning the existing internal id.
	pub fn insert(&mut self, mut record: IndexedEmbedding) -> Result<usize> {
		if let Some(&existing) = self.ids.get(&record.embedding_id) {
			return Ok(existing);
		}
		if record.metadata_vector.len() != self.dimension {
			return Err(Error::DimensionMismatch {
				expected: self.dimension,
				actual: record.metadata_vector.len(),
			});
		}
		if self.next_internal_id >= self.capacity {
			return Err(Error::CapacityExceeded { capacity: self.capacity });
		}

		normalize(&mut record.metadata_vector)?;

		let internal_id = self.next_internal_id;

		self.next_internal_id += 1;
		self.hnsw.insert_slice((record.metadata_vector.as_slice(), internal_id));
		self.ids.insert(record.embedding_id.clone(), internal_id);
		self.records.insert(internal_id, record);

		Ok(internal_id)
	}

	/// k-nearest search with oversampling to compensate for post-filtering.
	/// Results are sorted by similarity, descending, and never include a hit
	/// below its own record's similarity threshold.
	pub fn search(
		&self,
		query_vector: &[f32],
		k: usize,
		filters: &SearchFilters,
	) -> Result<Vec<SearchHit>> {
		if k == 0 || self.ids.is_empty() {
			return Ok(Vec::new());
		}
		if query_vector.len() != self.dimension {
			return Err(Error::DimensionMismatch {
				expected: self.dimension,
				actual: query_vector.len(),
			});
		}

		let mut query = query_vector.to_vec();

		normalize(&mut query)?;

		let candidates = k.saturating_mul(self.oversample_factor).min(self.next_internal_id);
		let neighbours = self.hnsw.search(&query, candidates, self.ef_search.max(candidates));
		let mut hits = Vec::with_capacity(neighbours.len());

		for neighbour in neighbours {
			if self.removed.contains(&neighbour.d_id) {
				continue;
			}

			let Some(record) = self.records.get(&neighbour.d_id) else {
				continue;
			};
			let similarity = 1.0 - neighbour.distance;

			if similarity < record.similarity_threshold {
				continue;
			}
			if !filters.matches(record) {
				continue;
			}

			hits.push(SearchHit { internal_id: neighbour.d_id, similarity, record: record.clone() });
		}

		hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
		hits.truncate(k);

		Ok(hits)
	}

	/// Tombstones a record. The vector stays in the HNSW graph but the id no
	/// longer surfaces in results or answers duplicate detection.
	pub fn remove(&mut self, embedding_id: &str) -> bool {
		let Some(internal_id) = self.ids.remove(embedding_id) else {
			return false;
		};

		self.removed.insert(internal_id);
		self.records.remove(&internal_id);

		true
	}

	/// The single permitted post-insert mutation: recording where the
	/// encrypted payload landed once its write completed.
	pub fn set_content_reference(&mut self, embedding_id: &str, reference: &str) -> Result<()> {
		let record = self
			.ids
			.get(embedding_id)
			.and_then(|id| self.records.get_mut(id))
			.ok_or_else(|| Error::NotFound { embedding_id: embedding_id.to_string() })?;

		record.content_reference = Some(reference.to_string());

		Ok(())
	}

	pub(crate) fn next_internal_id(&self) -> usize {
		self.next_internal_id
	}

	pub(crate) fn live_records(&self) -> impl Iterator<Item = (usize, &IndexedEmbedding)> {
		self.records.iter().map(|(&id, record)| (id, record))
	}

	pub(crate) fn restore_record(
		&mut self,
		internal_id: usize,
		record: IndexedEmbedding,
	) -> Result<()> {
		if record.metadata_vector.len() != self.dimension {
			return Err(Error::DimensionMismatch {
				expected: self.dimension,
				actual: record.metadata_vector.len(),
			});
		}

		self.hnsw.insert_slice((record.metadata_vector.as_slice(), internal_id));
		self.ids.insert(record.embedding_id.clone(), internal_id);
		self.records.insert(internal_id, record);
		self.next_internal_id = self.next_internal_id.max(internal_id + 1);

		Ok(())
	}

	pub(crate) fn set_next_internal_id(&mut self, next: usize) {
		self.next_internal_id = self.next_internal_id.max(next);
	}
}

fn normalize(vector: &mut [f32]) -> Result<()> {
	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm < f32::EPSILON {
		return Err(Error::ZeroVector);
	}

	for value in vector.iter_mut() {
		*value /= norm;
	}

	Ok(())
}
