pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Store error: {message}")]
	Store { message: String },
	#[error("Index error: {message}")]
	Index { message: String },
}
impl From<arca_providers::Error> for Error {
	fn from(err: arca_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<arca_store::Error> for Error {
	fn from(err: arca_store::Error) -> Self {
		Self::Store { message: err.to_string() }
	}
}

impl From<arca_index::Error> for Error {
	fn from(err: arca_index::Error) -> Self {
		Self::Index { message: err.to_string() }
	}
}
