use serde_json::json;

use mnem_domain::{
	decision::{self, DecisionAction},
	memory::{CandidateMemory, Message},
};

use crate::{Error, Judge, Result};

const DECISION_PROMPT: &str = "You are the memory manager of an assistant. \
Compare newly retrieved facts with the existing memories and decide, for every fact, one of: \
ADD (new information, no existing id), UPDATE (refines or corrects an existing memory; keep \
its id and put the merged text in \"text\"), DELETE (the fact contradicts an existing memory; \
use that memory's id), or NONE (already known). \
Never invent ids; only use ids from the existing memories. \
Respond with a JSON object of the form \
{\"memory\": [{\"id\": \"...\", \"text\": \"...\", \"event\": \"ADD|UPDATE|DELETE|NONE\", \
\"old_memory\": \"...\"}]}.";

pub struct DecisionEngine {
	judge: Judge,
}
impl DecisionEngine {
	pub fn new(judge: Judge) -> Self {
		Self { judge }
	}

	/// Asks the judge how `facts` merge into `candidates`. NONE actions are filtered out.
	pub async fn decide(
		&self,
		facts: &[String],
		candidates: &[CandidateMemory],
	) -> Result<Vec<DecisionAction>> {
		if facts.is_empty() {
			return Err(Error::invalid("Merge decision needs at least one fact."));
		}

		let prompt = build_decision_messages(facts, candidates);
		let raw = self.judge.complete(&prompt).await?;
		let actions = decision::parse_decision_response(&raw).map_err(|source| {
			tracing::warn!(
				error = %source.message,
				content_prefix = %source.raw_prefix,
				"Merge decision response could not be parsed."
			);

			Error::DecisionFailed { source }
		})?;

		tracing::info!(
			facts = facts.len(),
			candidates = candidates.len(),
			actions = actions.len(),
			"Merge decision completed."
		);

		Ok(actions)
	}
}

pub fn build_decision_messages(facts: &[String], candidates: &[CandidateMemory]) -> Vec<Message> {
	let existing: Vec<_> = candidates
		.iter()
		.map(|candidate| json!({ "id": candidate.id, "text": candidate.memory }))
		.collect();
	let payload = json!({
		"existing_memories": existing,
		"new_facts": facts,
	});

	vec![Message::new("system", DECISION_PROMPT), Message::user(payload.to_string())]
}
