use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub memory: Memory,
	#[serde(default)]
	pub search: Search,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub vectors: Vectors,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vectors {
	/// Dimension of the `memory_items.vec` column. Must match the embedding provider.
	pub dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm_judge: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
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

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	#[serde(default = "default_judge_timeout_ms")]
	pub timeout_ms: u64,
	/// Fold system-role messages into the leading user turn for providers that reject the
	/// system role.
	#[serde(default = "default_true")]
	pub fold_system_messages: bool,
	/// Send `response_format = {"type": "json_object"}` with every request.
	#[serde(default = "default_true")]
	pub json_mode: bool,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	/// Entry ceiling per (provider, model) pair.
	pub max_entries: u64,
	/// Fraction of the current entry count removed by one eviction sweep.
	pub prune_ratio: f64,
	/// Treat backing-store read errors as cache misses instead of surfacing them.
	pub read_errors_as_miss: bool,
}
impl Default for Cache {
	fn default() -> Self {
		Self { enabled: true, max_entries: 50_000, prune_ratio: 0.10, read_errors_as_miss: true }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Memory {
	/// Related memories fetched per extracted fact before the merge decision.
	pub related_k: u32,
	pub max_facts_per_add: u32,
	pub compact_decay_days: u32,
	/// Target size of a compacted set as a fraction of the current set.
	pub default_compact_ratio: f32,
}
impl Default for Memory {
	fn default() -> Self {
		Self {
			related_k: 5,
			max_facts_per_add: 32,
			compact_decay_days: 0,
			default_compact_ratio: 0.5,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_limit: u32,
	/// Hard cap on candidates fetched from the vector store for one query.
	pub max_candidates: u32,
	pub mmr_lambda: f32,
	pub overfetch_ratio: u32,
	pub decay_half_life_days: f32,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_limit: 10,
			max_candidates: 200,
			mmr_lambda: 0.7,
			overfetch_ratio: 3,
			decay_half_life_days: 30.0,
		}
	}
}

fn default_judge_timeout_ms() -> u64 {
	10_000
}

fn default_true() -> bool {
	true
}
