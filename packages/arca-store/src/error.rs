pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Only `Transport` is eligible for retry; everything else surfaces
/// immediately.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Transport failure: {message}")]
	Transport { message: String },
	#[error("Store rejected the request: {message}")]
	Rejected { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Invalid response: {message}")]
	InvalidResponse { message: String },
	#[error("{message}")]
	InvalidConfig { message: String },
}
impl Error {
	pub fn is_transport(&self) -> bool {
		matches!(self, Self::Transport { .. })
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.status() == Some(reqwest::StatusCode::NOT_FOUND) {
			Self::NotFound { message: err.to_string() }
		} else if err.is_status() {
			Self::Rejected { message: err.to_string() }
		} else if err.is_decode() || err.is_body() {
			Self::InvalidResponse { message: err.to_string() }
		} else {
			Self::Transport { message: err.to_string() }
		}
	}
}
