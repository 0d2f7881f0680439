use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use mnem_domain::{
	decision::{DecisionAction, DecisionEvent},
	memory::{CandidateMemory, MemoryItem, Message, OwnerScope, content_hash},
};

use crate::{Error, MemoryService, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AddRequest {
	#[serde(default)]
	pub messages: Vec<Message>,
	/// Shortcut for a single user message.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(flatten)]
	pub scope: OwnerScope,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	/// When false, message contents are stored verbatim without consulting the judge.
	#[serde(default)]
	pub infer: Option<bool>,
}
impl AddRequest {
	pub fn conversation(&self) -> Vec<Message> {
		let mut messages = self.messages.clone();

		if let Some(message) = self.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
			messages.push(Message::user(message));
		}

		messages
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedAction {
	pub event: DecisionEvent,
	pub id: Uuid,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub memory: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub previous_memory: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedAction {
	pub action: DecisionAction,
	pub error: String,
}

/// Outcome of one decision batch. Nothing is rolled back; `failed` lists what did not apply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
	pub applied: Vec<AppliedAction>,
	pub failed: Vec<FailedAction>,
}
impl ApplyReport {
	pub fn is_empty(&self) -> bool {
		self.applied.is_empty() && self.failed.is_empty()
	}
}

impl MemoryService {
	/// Consolidates a conversation into the scope's memories.
	pub async fn add(&self, req: AddRequest) -> Result<ApplyReport> {
		if req.scope.is_empty() {
			return Err(Error::invalid("bot_id, agent_id, or run_id is required."));
		}

		let messages = req.conversation();

		if messages.is_empty() {
			return Err(Error::invalid("message or messages is required."));
		}

		if !req.infer.unwrap_or(true) {
			let actions: Vec<DecisionAction> = messages
				.iter()
				.map(|message| message.content.trim())
				.filter(|content| !content.is_empty())
				.map(DecisionAction::add)
				.collect();

			return self.apply(&actions, &req.scope, &req.metadata).await;
		}

		let mut facts = self.extractor.extract(&messages).await?;

		facts.truncate(self.cfg.memory.max_facts_per_add as usize);

		if facts.is_empty() {
			tracing::info!("No facts extracted; nothing to consolidate.");

			return Ok(ApplyReport::default());
		}

		let candidates = self.related_candidates(&facts, &req.scope).await?;
		let actions = self.decisions.decide(&facts, &candidates).await?;

		self.apply(&actions, &req.scope, &req.metadata).await
	}

	/// Existing memories near any of `facts`, de-duplicated by id in first-seen order.
	pub async fn related_candidates(
		&self,
		facts: &[String],
		scope: &OwnerScope,
	) -> Result<Vec<CandidateMemory>> {
		let vectors = self.embed_cached(facts).await?;
		let mut seen = HashSet::new();
		let mut candidates = Vec::new();

		for vector in &vectors {
			let hits = self.store.similarity_search(vector, self.cfg.memory.related_k, scope).await?;

			for hit in hits {
				if seen.insert(hit.item.id) {
					candidates.push(hit.item.to_candidate());
				}
			}
		}

		Ok(candidates)
	}

	/// Applies actions in order. A failing action is recorded and the rest still run; the call
	/// fails only when every action failed.
	pub async fn apply(
		&self,
		actions: &[DecisionAction],
		scope: &OwnerScope,
		metadata: &Map<String, Value>,
	) -> Result<ApplyReport> {
		let mut report = ApplyReport::default();

		for action in actions {
			match self.apply_one(action, scope, metadata).await {
				Ok(applied) => report.applied.push(applied),
				Err(err) => {
					tracing::warn!(
						error = %err,
						event = action.event.as_str(),
						memory_id = action.id.as_deref().unwrap_or(""),
						"Decision action failed."
					);

					report.failed.push(FailedAction { action: action.clone(), error: err.to_string() });
				},
			}
		}

		tracing::info!(
			applied = report.applied.len(),
			failed = report.failed.len(),
			"Decision batch applied."
		);

		if report.applied.is_empty() && !report.failed.is_empty() {
			return Err(Error::ApplyFailed { report });
		}

		Ok(report)
	}

	async fn apply_one(
		&self,
		action: &DecisionAction,
		scope: &OwnerScope,
		metadata: &Map<String, Value>,
	) -> Result<AppliedAction> {
		let now = OffsetDateTime::now_utc();

		match action.event {
			DecisionEvent::Add => {
				let text = action_text(action)?;

				if let Some(existing) = self.store.find_by_hash(scope, &content_hash(text)).await? {
					tracing::debug!(memory_id = %existing.id, "ADD matches a stored memory; skipped.");

					return Ok(AppliedAction {
						event: DecisionEvent::None,
						id: existing.id,
						memory: Some(existing.memory),
						previous_memory: None,
					});
				}

				let vector = self.embed_one(text).await?;
				let item = MemoryItem::new(text, scope.clone(), metadata.clone(), now);

				self.store.upsert(&item, &vector).await?;

				Ok(AppliedAction {
					event: DecisionEvent::Add,
					id: item.id,
					memory: Some(item.memory),
					previous_memory: None,
				})
			},
			DecisionEvent::Update => {
				let text = action_text(action)?;
				let mut item = self.scoped_item(action, scope).await?;
				let previous = item.memory.clone();
				let vector = self.embed_one(text).await?;

				item.revise(text, now);

				for (key, value) in metadata {
					item.metadata.insert(key.clone(), value.clone());
				}

				self.store.upsert(&item, &vector).await?;

				Ok(AppliedAction {
					event: DecisionEvent::Update,
					id: item.id,
					memory: Some(item.memory),
					previous_memory: Some(previous),
				})
			},
			DecisionEvent::Delete => {
				let item = self.scoped_item(action, scope).await?;

				if !self.store.delete(item.id).await? {
					return Err(Error::NotFound { message: format!("Memory {} is gone.", item.id) });
				}

				Ok(AppliedAction {
					event: DecisionEvent::Delete,
					id: item.id,
					memory: None,
					previous_memory: Some(item.memory),
				})
			},
			DecisionEvent::None => Err(Error::invalid("NONE actions carry no mutation.")),
		}
	}

	async fn scoped_item(&self, action: &DecisionAction, scope: &OwnerScope) -> Result<MemoryItem> {
		let raw_id = action.id.as_deref().unwrap_or_default();
		let id = Uuid::parse_str(raw_id.trim())
			.map_err(|_| Error::NotFound { message: format!("Unknown memory id {raw_id:?}.") })?;
		let item = self
			.store
			.get(id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Memory {id} does not exist.") })?;

		if !scope.matches(&item.scope) {
			return Err(Error::NotFound { message: format!("Memory {id} is outside the scope.") });
		}

		Ok(item)
	}
}

fn action_text(action: &DecisionAction) -> Result<&str> {
	action
		.text
		.as_deref()
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.ok_or_else(|| Error::invalid(format!("{} action has no text.", action.event.as_str())))
}
