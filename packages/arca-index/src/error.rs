pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Vector dimension {actual} does not match index dimension {expected}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Vector has zero magnitude and cannot be normalized.")]
	ZeroVector,
	#[error("Index is at its configured capacity of {capacity}.")]
	CapacityExceeded { capacity: usize },
	#[error("Not found: {embedding_id}")]
	NotFound { embedding_id: String },
	#[error("Snapshot error: {message}")]
	Snapshot { message: String },
}
