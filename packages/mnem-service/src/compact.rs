use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use time::OffsetDateTime;

use mnem_domain::{
	ParseError, facts,
	memory::{CandidateMemory, MemoryItem, Message, OwnerScope},
};

use crate::{Error, Judge, MemoryService, Result};

const COMPACTION_PROMPT: &str = "You condense a user's long-term memories. \
Merge duplicates and closely related memories, drop statements that later memories supersede, \
and keep every distinct, still-relevant fact. Write each result as one short, self-contained \
statement in the language of the originals. Produce at most the requested number of facts. \
Respond with a JSON object of the form {\"facts\": [\"...\"]}.";

pub struct Compactor {
	judge: Judge,
}
impl Compactor {
	pub fn new(judge: Judge) -> Self {
		Self { judge }
	}

	/// Proposes a replacement set of at most `target_count` facts. Nothing is written.
	pub async fn compact(
		&self,
		memories: &[CandidateMemory],
		target_count: u32,
		decay_days: u32,
	) -> Result<Vec<String>> {
		if memories.is_empty() {
			return Err(Error::invalid("Compaction needs at least one memory."));
		}

		tracing::debug!(memories = memories.len(), target_count, "Compaction started.");

		let prompt = build_compaction_messages(memories, target_count, decay_days);
		let raw = self.judge.complete(&prompt).await?;
		let facts = facts::parse_fact_list(&raw).map_err(|source| {
			tracing::warn!(
				error = %source.message,
				content_prefix = %source.raw_prefix,
				"Compaction response could not be parsed."
			);

			Error::CompactionFailed { source }
		})?;

		tracing::info!(facts = facts.len(), "Compaction completed.");

		Ok(facts)
	}
}

pub fn build_compaction_messages(
	memories: &[CandidateMemory],
	target_count: u32,
	decay_days: u32,
) -> Vec<Message> {
	let entries: Vec<_> = memories
		.iter()
		.map(|memory| {
			let mut entry = json!({ "id": memory.id, "text": memory.memory });

			if let Some(created_at) = memory.created_at_rfc3339() {
				entry["created_at"] = json!(created_at);
			}

			entry
		})
		.collect();
	let mut instructions = format!("Condense these memories into at most {target_count} facts.");

	if decay_days > 0 {
		instructions.push_str(&format!(
			" Memories older than {decay_days} days matter less: merge or drop them first \
unless they still describe the user."
		));
	}

	let payload = json!({ "memories": entries });

	vec![
		Message::new("system", COMPACTION_PROMPT),
		Message::user(format!("{instructions}\n{payload}")),
	]
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompactRequest {
	#[serde(flatten)]
	pub scope: OwnerScope,
	/// Target size as a fraction of the current set. Ignored when `target_count` is set.
	#[serde(default)]
	pub ratio: Option<f32>,
	#[serde(default)]
	pub target_count: Option<u32>,
	#[serde(default)]
	pub decay_days: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompactionReport {
	pub before_count: usize,
	pub after_count: usize,
	/// `after_count / before_count`; 1.0 when there was nothing to compact.
	pub ratio: f32,
	pub results: Vec<MemoryItem>,
}

impl MemoryService {
	/// Replaces the scope's memories with a condensed set: new facts are written first, then
	/// the old items are deleted.
	///
	/// Items under a broad request scope may carry narrower agent or run owners. Each distinct
	/// owner is condensed on its own so facts never move between them.
	pub async fn compact(&self, req: CompactRequest) -> Result<CompactionReport> {
		if req.scope.is_empty() {
			return Err(Error::invalid("Compaction requires bot_id, agent_id, or run_id."));
		}
		if let Some(ratio) = req.ratio
			&& (ratio.is_nan() || ratio <= 0.0 || ratio > 1.0)
		{
			return Err(Error::invalid("ratio must be in (0, 1]."));
		}

		let existing = self.store.list(&req.scope, None).await?;
		let before_count = existing.len();

		if before_count == 0 {
			return Ok(CompactionReport {
				before_count: 0,
				after_count: 0,
				ratio: 1.0,
				results: Vec::new(),
			});
		}

		let ratio = req.ratio.unwrap_or(self.cfg.memory.default_compact_ratio);
		let decay_days = req.decay_days.unwrap_or(self.cfg.memory.compact_decay_days);
		let groups = group_by_owner(existing);
		let mut proposals = Vec::with_capacity(groups.len());

		// Every group is proposed before anything is written.
		for (owner, items) in &groups {
			let target_count = resolve_target_count(items.len(), req.target_count, ratio);
			let candidates: Vec<CandidateMemory> =
				items.iter().map(MemoryItem::to_candidate).collect();
			let facts = self.compactor.compact(&candidates, target_count, decay_days).await?;

			if facts.is_empty() {
				tracing::warn!(?owner, "Compaction proposed no facts.");

				return Err(Error::CompactionFailed {
					source: ParseError::new(
						"Compaction proposed no facts; keeping the originals.",
						"",
					),
				});
			}

			proposals.push(facts);
		}

		let now = OffsetDateTime::now_utc();
		let mut results = Vec::new();
		let mut delete_failures = 0_usize;

		for ((owner, items), facts) in groups.into_iter().zip(proposals) {
			let vectors = self.embed_cached(&facts).await?;

			for (fact, vector) in facts.into_iter().zip(vectors) {
				let item = MemoryItem::new(fact, owner.clone(), Map::new(), now);

				self.store.upsert(&item, &vector).await?;
				results.push(item);
			}

			for item in &items {
				if let Err(err) = self.store.delete(item.id).await {
					delete_failures += 1;

					tracing::warn!(
						error = %err,
						memory_id = %item.id,
						"Compaction failed to delete memory."
					);
				}
			}
		}

		let after_count = results.len() + delete_failures;

		tracing::info!(before_count, after_count, "Memories compacted.");

		Ok(CompactionReport {
			before_count,
			after_count,
			ratio: after_count as f32 / before_count as f32,
			results,
		})
	}
}

/// Groups items by their normalized owner scope, in first-seen order.
fn group_by_owner(items: Vec<MemoryItem>) -> Vec<(OwnerScope, Vec<MemoryItem>)> {
	let mut groups: Vec<(OwnerScope, Vec<MemoryItem>)> = Vec::new();

	for item in items {
		let owner = item.scope.normalized();

		match groups.iter_mut().find(|(scope, _)| *scope == owner) {
			Some((_, members)) => members.push(item),
			None => groups.push((owner, vec![item])),
		}
	}

	groups
}

/// Explicit counts win over ratios; the result is clamped to `1..=before_count`.
pub fn resolve_target_count(before_count: usize, target_count: Option<u32>, ratio: f32) -> u32 {
	let before = u32::try_from(before_count).unwrap_or(u32::MAX);
	let target = match target_count {
		Some(count) => count,
		None => (before as f32 * ratio).ceil() as u32,
	};

	target.clamp(1, before.max(1))
}
