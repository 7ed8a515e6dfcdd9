pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport failures are eligible for retry; rejections are not. The split
/// is load-bearing for every caller that wraps a provider in backoff.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Transport failure: {message}")]
	Transport { message: String },
	#[error("Service rejected the request: {message}")]
	Rejected { message: String },
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
		if err.is_status() {
			Self::Rejected { message: err.to_string() }
		} else if err.is_decode() || err.is_body() {
			Self::InvalidResponse { message: err.to_string() }
		} else {
			Self::Transport { message: err.to_string() }
		}
	}
}

impl From<reqwest::header::InvalidHeaderName> for Error {
	fn from(err: reqwest::header::InvalidHeaderName) -> Self {
		Self::InvalidConfig { message: err.to_string() }
	}
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
	fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
		Self::InvalidConfig { message: err.to_string() }
	}
}
