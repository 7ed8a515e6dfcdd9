pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Message(String),
	#[error(transparent)]
	Config(#[from] arca_config::Error),
	#[error(transparent)]
	Store(#[from] arca_store::Error),
	#[error(transparent)]
	Index(#[from] arca_index::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
