mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Batching, Config, ContentStore, EmbeddingProviderConfig, Encryption, Index, Ledger, Providers,
	Search, Service, Sync,
};

use std::{fs, path::Path};

pub const ENCRYPTION_MODE_NETWORK: &str = "network";
pub const ENCRYPTION_MODE_SIMULATED: &str = "simulated";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.index.dimension == 0 {
		return Err(Error::Validation {
			message: "index.dimension must be greater than zero.".to_string(),
		});
	}
	if cfg.index.capacity == 0 {
		return Err(Error::Validation {
			message: "index.capacity must be greater than zero.".to_string(),
		});
	}
	if cfg.index.max_connections == 0 {
		return Err(Error::Validation {
			message: "index.max_connections must be greater than zero.".to_string(),
		});
	}
	if cfg.index.oversample_factor == 0 {
		return Err(Error::Validation {
			message: "index.oversample_factor must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.index.dimension {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match index.dimension.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.batching.capacity == 0 {
		return Err(Error::Validation {
			message: "batching.capacity must be greater than zero.".to_string(),
		});
	}
	if cfg.content_store.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "content_store.api_base must be non-empty.".to_string(),
		});
	}
	if cfg.content_store.max_attempts == 0 {
		return Err(Error::Validation {
			message: "content_store.max_attempts must be greater than zero.".to_string(),
		});
	}

	match cfg.encryption.mode.as_str() {
		ENCRYPTION_MODE_NETWORK => {
			if cfg.encryption.api_base.as_deref().map(str::trim).unwrap_or_default().is_empty() {
				return Err(Error::Validation {
					message: "encryption.api_base must be non-empty in network mode.".to_string(),
				});
			}
		},
		ENCRYPTION_MODE_SIMULATED => {},
		other => {
			return Err(Error::Validation {
				message: format!("encryption.mode must be network or simulated, got {other:?}."),
			});
		},
	}

	if cfg.ledger.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "ledger.api_base must be non-empty.".to_string(),
		});
	}
	if cfg.ledger.page_size == 0 {
		return Err(Error::Validation {
			message: "ledger.page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "sync.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.snapshot_interval_ms == 0 {
		return Err(Error::Validation {
			message: "sync.snapshot_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.max_backoff_ms < cfg.sync.base_backoff_ms {
		return Err(Error::Validation {
			message: "sync.max_backoff_ms must be at least sync.base_backoff_ms.".to_string(),
		});
	}
	if cfg.search.default_top_k == 0 {
		return Err(Error::Validation {
			message: "search.default_top_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.relevance_cutoff.is_finite() {
		return Err(Error::Validation {
			message: "search.relevance_cutoff must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.search.relevance_cutoff) {
		return Err(Error::Validation {
			message: "search.relevance_cutoff must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.search.max_context_items == 0 {
		return Err(Error::Validation {
			message: "search.max_context_items must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.content_store.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.content_store.api_key = None;
	}
	if cfg.encryption.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.encryption.api_key = None;
	}
	if cfg.ledger.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.ledger.api_key = None;
	}
}
