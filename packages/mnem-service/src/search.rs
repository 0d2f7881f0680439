use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use mnem_domain::{
	memory::{MemoryItem, OwnerScope},
	ranking::RankCandidate,
};

use crate::{Error, MemoryService, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(flatten)]
	pub scope: OwnerScope,
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub use_mmr: bool,
	/// 0.0 favors diversity, 1.0 favors relevance.
	#[serde(default)]
	pub mmr_lambda: Option<f32>,
	#[serde(default)]
	pub overfetch_ratio: Option<u32>,
	#[serde(default)]
	pub use_temporal_decay: bool,
	#[serde(default)]
	pub decay_half_life_days: Option<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
	pub results: Vec<MemoryItem>,
}

impl MemoryService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::invalid("query is required."));
		}
		if req.scope.is_empty() {
			return Err(Error::invalid("bot_id, agent_id, or run_id is required."));
		}
		if let Some(lambda) = req.mmr_lambda
			&& !(0.0..=1.0).contains(&lambda)
		{
			return Err(Error::invalid("mmr_lambda must be in [0, 1]."));
		}

		let limit = req.limit.unwrap_or(self.cfg.search.default_limit);

		if limit == 0 {
			return Err(Error::invalid("limit must be greater than zero."));
		}

		let fetch_k = self.candidate_count(limit, req.use_mmr, req.overfetch_ratio);
		let vector = self.embed_one(query).await?;
		let hits = self.store.similarity_search(&vector, fetch_k, &req.scope).await?;
		let candidates: Vec<RankCandidate> = hits
			.into_iter()
			.map(|hit| RankCandidate { item: hit.item, relevance: hit.score, embedding: hit.vector })
			.collect();
		let opts = self.ranker.options(
			limit as usize,
			req.use_mmr,
			req.mmr_lambda,
			req.use_temporal_decay,
			req.decay_half_life_days,
		);
		let results = self.ranker.rank(candidates, &opts, OffsetDateTime::now_utc());

		tracing::info!(fetch_k, results = results.len(), "Memory search completed.");

		Ok(SearchResponse { results })
	}

	/// Candidates fetched from the store: `limit × overfetch_ratio` with MMR, capped by
	/// `search.max_candidates` but never below `limit`.
	pub fn candidate_count(&self, limit: u32, use_mmr: bool, overfetch_ratio: Option<u32>) -> u32 {
		if !use_mmr {
			return limit;
		}

		let ratio = overfetch_ratio.unwrap_or(self.cfg.search.overfetch_ratio).max(1);

		limit.saturating_mul(ratio).min(self.cfg.search.max_candidates).max(limit)
	}
}
