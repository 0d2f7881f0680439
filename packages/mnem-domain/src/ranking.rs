//! Final ordering of retrieval candidates: optional temporal decay, then optional MMR.

use std::cmp::Ordering;

use time::OffsetDateTime;

use crate::memory::MemoryItem;

pub const DEFAULT_MMR_LAMBDA: f32 = 0.7;
pub const DEFAULT_OVERFETCH_RATIO: u32 = 3;
pub const DEFAULT_DECAY_HALF_LIFE_DAYS: f32 = 30.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Clone, Debug)]
pub struct RankCandidate {
	pub item: MemoryItem,
	/// Similarity to the query as reported by the vector store.
	pub relevance: f32,
	pub embedding: Option<Vec<f32>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankOptions {
	pub limit: usize,
	pub use_mmr: bool,
	pub mmr_lambda: f32,
	pub use_temporal_decay: bool,
	pub decay_half_life_days: f32,
}
impl Default for RankOptions {
	fn default() -> Self {
		Self {
			limit: 10,
			use_mmr: false,
			mmr_lambda: DEFAULT_MMR_LAMBDA,
			use_temporal_decay: false,
			decay_half_life_days: DEFAULT_DECAY_HALF_LIFE_DAYS,
		}
	}
}

struct Scored {
	candidate: RankCandidate,
	adjusted: f32,
}
impl Scored {
	// Higher adjusted score, then higher raw relevance, then lower id.
	fn cmp_rank(&self, other: &Self) -> Ordering {
		other
			.adjusted
			.total_cmp(&self.adjusted)
			.then_with(|| other.candidate.relevance.total_cmp(&self.candidate.relevance))
			.then_with(|| self.candidate.item.id.cmp(&other.candidate.item.id))
	}

	fn wins_tie(&self, other: &Self) -> bool {
		self.candidate
			.relevance
			.total_cmp(&other.candidate.relevance)
			.then_with(|| other.candidate.item.id.cmp(&self.candidate.item.id))
			== Ordering::Greater
	}

	fn into_item(self) -> MemoryItem {
		let mut item = self.candidate.item;

		item.score = Some(self.adjusted);

		item
	}
}

/// Age in fractional days. Future timestamps count as age zero.
pub fn age_days(created_at: OffsetDateTime, now: OffsetDateTime) -> f32 {
	let seconds = (now - created_at).as_seconds_f64();

	if seconds <= 0.0 { 0.0 } else { (seconds / SECONDS_PER_DAY) as f32 }
}

/// `0.5^(age / half_life)`; a non-positive half-life or age disables decay.
pub fn decay_factor(age_days: f32, half_life_days: f32) -> f32 {
	if half_life_days.is_nan() || half_life_days <= 0.0 || age_days.is_nan() || age_days <= 0.0 {
		return 1.0;
	}

	0.5_f32.powf(age_days / half_life_days)
}

pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}

/// Orders candidates and returns at most `opts.limit` items with `score` set.
pub fn rank(
	candidates: Vec<RankCandidate>,
	opts: &RankOptions,
	now: OffsetDateTime,
) -> Vec<MemoryItem> {
	if candidates.is_empty() || opts.limit == 0 {
		return Vec::new();
	}

	let mut scored: Vec<Scored> = candidates
		.into_iter()
		.map(|candidate| {
			let adjusted = if opts.use_temporal_decay {
				let age = age_days(candidate.item.created_at, now);

				candidate.relevance * decay_factor(age, opts.decay_half_life_days)
			} else {
				candidate.relevance
			};

			Scored { candidate, adjusted }
		})
		.collect();

	if opts.use_mmr {
		return select_mmr(scored, opts.limit, opts.mmr_lambda.clamp(0.0, 1.0));
	}
	if opts.use_temporal_decay {
		scored.sort_by(Scored::cmp_rank);
	}

	scored.into_iter().take(opts.limit).map(Scored::into_item).collect()
}

fn select_mmr(mut remaining: Vec<Scored>, limit: usize, lambda: f32) -> Vec<MemoryItem> {
	remaining.sort_by(Scored::cmp_rank);

	let mut selected: Vec<Scored> = Vec::with_capacity(limit.min(remaining.len()));

	while selected.len() < limit && !remaining.is_empty() {
		let mut best_idx = 0;
		let mut best_score = f32::NEG_INFINITY;

		for (idx, candidate) in remaining.iter().enumerate() {
			// Nothing selected yet means nothing to be redundant with.
			let max_sim = selected
				.iter()
				.map(|picked| pair_similarity(candidate, picked))
				.reduce(f32::max)
				.unwrap_or(0.0);
			let mmr_score = lambda * candidate.adjusted - (1.0 - lambda) * max_sim;

			if mmr_score > best_score
				|| (mmr_score == best_score && candidate.wins_tie(&remaining[best_idx]))
			{
				best_idx = idx;
				best_score = mmr_score;
			}
		}

		selected.push(remaining.remove(best_idx));
	}

	selected.into_iter().map(Scored::into_item).collect()
}

fn pair_similarity(lhs: &Scored, rhs: &Scored) -> f32 {
	match (&lhs.candidate.embedding, &rhs.candidate.embedding) {
		(Some(lhs), Some(rhs)) => cosine_similarity(lhs, rhs).unwrap_or(0.0),
		_ => 0.0,
	}
}
