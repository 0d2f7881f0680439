use time::OffsetDateTime;

use mnem_domain::{
	memory::MemoryItem,
	ranking::{self, RankCandidate, RankOptions},
};

/// Applies configured defaults to ranking requests and orders candidates.
#[derive(Clone, Debug)]
pub struct RetrievalRanker {
	default_mmr_lambda: f32,
	default_half_life_days: f32,
}
impl RetrievalRanker {
	pub fn new(cfg: &mnem_config::Search) -> Self {
		Self {
			default_mmr_lambda: cfg.mmr_lambda,
			default_half_life_days: cfg.decay_half_life_days,
		}
	}

	pub fn options(
		&self,
		limit: usize,
		use_mmr: bool,
		mmr_lambda: Option<f32>,
		use_temporal_decay: bool,
		decay_half_life_days: Option<f32>,
	) -> RankOptions {
		RankOptions {
			limit,
			use_mmr,
			mmr_lambda: mmr_lambda.unwrap_or(self.default_mmr_lambda),
			use_temporal_decay,
			decay_half_life_days: decay_half_life_days.unwrap_or(self.default_half_life_days),
		}
	}

	pub fn rank(
		&self,
		candidates: Vec<RankCandidate>,
		opts: &RankOptions,
		now: OffsetDateTime,
	) -> Vec<MemoryItem> {
		let candidate_count = candidates.len();
		let ranked = ranking::rank(candidates, opts, now);

		tracing::debug!(
			candidates = candidate_count,
			results = ranked.len(),
			use_mmr = opts.use_mmr,
			use_temporal_decay = opts.use_temporal_decay,
			"Retrieval ranking completed."
		);

		ranked
	}
}
