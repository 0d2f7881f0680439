mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, EmbeddingProviderConfig, LlmProviderConfig, Memory, Postgres, Providers,
	Search, Service, Storage, Vectors,
};

use std::{fs, path::Path};

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
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vectors.dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vectors.dim.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("llm_judge", &cfg.providers.llm_judge.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}
	for (label, model) in [
		("embedding", &cfg.providers.embedding.model),
		("llm_judge", &cfg.providers.llm_judge.model),
	] {
		if model.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} model must be non-empty."),
			});
		}
	}

	if cfg.providers.embedding.timeout_ms == 0 || cfg.providers.llm_judge.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "Provider timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "cache.max_entries must be greater than zero.".to_string(),
		});
	}
	if !cfg.cache.prune_ratio.is_finite()
		|| cfg.cache.prune_ratio <= 0.0
		|| cfg.cache.prune_ratio > 1.0
	{
		return Err(Error::Validation {
			message: "cache.prune_ratio must be in the range (0.0, 1.0].".to_string(),
		});
	}
	if cfg.memory.related_k == 0 {
		return Err(Error::Validation {
			message: "memory.related_k must be greater than zero.".to_string(),
		});
	}
	if cfg.memory.max_facts_per_add == 0 {
		return Err(Error::Validation {
			message: "memory.max_facts_per_add must be greater than zero.".to_string(),
		});
	}
	if !cfg.memory.default_compact_ratio.is_finite()
		|| cfg.memory.default_compact_ratio <= 0.0
		|| cfg.memory.default_compact_ratio > 1.0
	{
		return Err(Error::Validation {
			message: "memory.default_compact_ratio must be in the range (0.0, 1.0].".to_string(),
		});
	}
	if cfg.search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_candidates < cfg.search.default_limit {
		return Err(Error::Validation {
			message: "search.max_candidates must be at least search.default_limit.".to_string(),
		});
	}
	if !cfg.search.mmr_lambda.is_finite() || !(0.0..=1.0).contains(&cfg.search.mmr_lambda) {
		return Err(Error::Validation {
			message: "search.mmr_lambda must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.search.overfetch_ratio == 0 {
		return Err(Error::Validation {
			message: "search.overfetch_ratio must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.decay_half_life_days.is_finite() || cfg.search.decay_half_life_days <= 0.0 {
		return Err(Error::Validation {
			message: "search.decay_half_life_days must be a finite number greater than zero."
				.to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for api_base in
		[&mut cfg.providers.embedding.api_base, &mut cfg.providers.llm_judge.api_base]
	{
		let trimmed = api_base.trim().trim_end_matches('/').to_string();

		*api_base = trimmed;
	}

	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}
