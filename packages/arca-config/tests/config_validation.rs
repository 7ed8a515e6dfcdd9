use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use arca_config::Config;

fn sample_toml() -> String {
	let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

	path.push("../../arca.example.toml");

	fs::read_to_string(&path).expect("Failed to read arca.example.toml.")
}

fn base_config() -> Config {
	toml::from_str(&sample_toml()).expect("Failed to parse test config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("arca_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

#[test]
fn arca_example_toml_is_valid() {
	let payload = sample_toml();
	let path = write_temp_config(payload);
	let result = arca_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result.expect("Expected arca.example.toml to be a valid config.");
}

#[test]
fn index_dimension_must_be_positive() {
	let mut cfg = base_config();

	cfg.index.dimension = 0;

	let err = arca_config::validate(&cfg).expect_err("Expected dimension validation error.");

	assert!(
		err.to_string().contains("index.dimension must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn embedding_dimensions_must_match_index_dimension() {
	let mut cfg = base_config();

	cfg.providers.embedding.dimensions = cfg.index.dimension + 1;

	let err = arca_config::validate(&cfg).expect_err("Expected dimension mismatch error.");

	assert!(
		err.to_string().contains("providers.embedding.dimensions must match index.dimension."),
		"Unexpected error: {err}"
	);
}

#[test]
fn batching_capacity_must_be_positive() {
	let mut cfg = base_config();

	cfg.batching.capacity = 0;

	let err = arca_config::validate(&cfg).expect_err("Expected batching validation error.");

	assert!(
		err.to_string().contains("batching.capacity must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn encryption_mode_must_be_known() {
	let mut cfg = base_config();

	cfg.encryption.mode = "plaintext".to_string();

	let err = arca_config::validate(&cfg).expect_err("Expected encryption mode validation error.");

	assert!(
		err.to_string().contains("encryption.mode must be network or simulated"),
		"Unexpected error: {err}"
	);
}

#[test]
fn network_encryption_requires_api_base() {
	let mut cfg = base_config();

	cfg.encryption.mode = "network".to_string();
	cfg.encryption.api_base = Some("   ".to_string());

	let err = arca_config::validate(&cfg).expect_err("Expected encryption api_base error.");

	assert!(
		err.to_string().contains("encryption.api_base must be non-empty in network mode."),
		"Unexpected error: {err}"
	);
}

#[test]
fn content_store_requires_at_least_one_attempt() {
	let mut cfg = base_config();

	cfg.content_store.max_attempts = 0;

	let err = arca_config::validate(&cfg).expect_err("Expected max_attempts validation error.");

	assert!(
		err.to_string().contains("content_store.max_attempts must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn sync_backoff_bounds_must_be_ordered() {
	let mut cfg = base_config();

	cfg.sync.base_backoff_ms = 10_000;
	cfg.sync.max_backoff_ms = 1_000;

	let err = arca_config::validate(&cfg).expect_err("Expected backoff bound validation error.");

	assert!(
		err.to_string().contains("sync.max_backoff_ms must be at least sync.base_backoff_ms."),
		"Unexpected error: {err}"
	);
}

#[test]
fn relevance_cutoff_must_be_in_range() {
	let mut cfg = base_config();

	cfg.search.relevance_cutoff = 1.5;

	let err = arca_config::validate(&cfg).expect_err("Expected relevance cutoff validation error.");

	assert!(
		err.to_string().contains("search.relevance_cutoff must be in the range 0.0-1.0."),
		"Unexpected error: {err}"
	);
}

#[test]
fn relevance_cutoff_must_be_finite() {
	let mut cfg = base_config();

	cfg.search.relevance_cutoff = f32::NAN;

	let err = arca_config::validate(&cfg).expect_err("Expected relevance cutoff validation error.");

	assert!(
		err.to_string().contains("search.relevance_cutoff must be a finite number."),
		"Unexpected error: {err}"
	);
}

#[test]
fn blank_optional_api_keys_normalize_to_none() {
	let payload = sample_toml();
	let path = write_temp_config(payload);
	let cfg = arca_config::load(&path).expect("Expected valid config.");

	fs::remove_file(&path).expect("Failed to remove test config.");

	assert!(cfg.content_store.api_key.is_none());
	assert!(cfg.encryption.api_key.is_none());
	assert!(cfg.ledger.api_key.is_none());
}
