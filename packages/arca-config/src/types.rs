use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub index: Index,
	pub batching: Batching,
	pub content_store: ContentStore,
	pub encryption: Encryption,
	pub providers: Providers,
	pub ledger: Ledger,
	pub sync: Sync,
	pub search: Search,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Index {
	pub dimension: u32,
	pub capacity: u32,
	#[serde(default = "default_max_connections")]
	pub max_connections: u32,
	#[serde(default = "default_ef_construction")]
	pub ef_construction: u32,
	#[serde(default = "default_ef_search")]
	pub ef_search: u32,
	#[serde(default = "default_oversample_factor")]
	pub oversample_factor: u32,
}

#[derive(Debug, Deserialize)]
pub struct Batching {
	pub capacity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ContentStore {
	pub api_base: String,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_base_backoff_ms")]
	pub base_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Encryption {
	/// "network" delegates to the external key-release service; "simulated" is a
	/// reversible local transform for environments without one.
	pub mode: String,
	pub api_base: Option<String>,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Ledger {
	pub api_base: String,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	#[serde(default = "default_page_size")]
	pub page_size: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Sync {
	pub poll_interval_ms: u64,
	pub snapshot_interval_ms: u64,
	#[serde(default = "default_sync_base_backoff_ms")]
	pub base_backoff_ms: u64,
	#[serde(default = "default_sync_max_backoff_ms")]
	pub max_backoff_ms: u64,
	pub snapshot_pointer_path: std::path::PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	pub default_top_k: u32,
	pub relevance_cutoff: f32,
	pub max_context_items: u32,
}

fn default_max_connections() -> u32 {
	16
}

fn default_ef_construction() -> u32 {
	200
}

fn default_ef_search() -> u32 {
	64
}

fn default_oversample_factor() -> u32 {
	3
}

fn default_max_attempts() -> u32 {
	3
}

fn default_base_backoff_ms() -> u64 {
	250
}

fn default_page_size() -> u32 {
	256
}

fn default_sync_base_backoff_ms() -> u64 {
	500
}

fn default_sync_max_backoff_ms() -> u64 {
	30_000
}
