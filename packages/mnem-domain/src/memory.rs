use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// Partition key for memories. A filter matches an item when every field set on the filter
/// equals the item's field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerScope {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bot_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub agent_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub run_id: Option<String>,
}
impl OwnerScope {
	pub fn bot(bot_id: impl Into<String>) -> Self {
		Self { bot_id: Some(bot_id.into()), ..Self::default() }
	}

	pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
		self.agent_id = Some(agent_id.into());

		self
	}

	pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
		self.run_id = Some(run_id.into());

		self
	}

	/// True when no field carries a non-blank value.
	pub fn is_empty(&self) -> bool {
		self.fields().iter().all(|(_, value)| value.is_none())
	}

	/// Set fields as `(column, value)` pairs, blank values treated as unset.
	pub fn fields(&self) -> [(&'static str, Option<&str>); 3] {
		fn pick(value: &Option<String>) -> Option<&str> {
			value.as_deref().map(str::trim).filter(|value| !value.is_empty())
		}

		[
			("bot_id", pick(&self.bot_id)),
			("agent_id", pick(&self.agent_id)),
			("run_id", pick(&self.run_id)),
		]
	}

	/// Copy with blank fields cleared and values trimmed. Equal owners compare equal.
	pub fn normalized(&self) -> Self {
		let [(_, bot_id), (_, agent_id), (_, run_id)] = self.fields();

		Self {
			bot_id: bot_id.map(str::to_string),
			agent_id: agent_id.map(str::to_string),
			run_id: run_id.map(str::to_string),
		}
	}

	pub fn matches(&self, item_scope: &OwnerScope) -> bool {
		let item_fields = item_scope.fields();

		self.fields().iter().zip(item_fields.iter()).all(|((_, want), (_, have))| match want {
			Some(want) => have.map(|have| have == *want).unwrap_or(false),
			None => true,
		})
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	pub role: String,
	pub content: String,
}
impl Message {
	pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
		Self { role: role.into(), content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self::new("user", content)
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
	pub id: Uuid,
	pub memory: String,
	pub hash: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
	/// Populated only on retrieval.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub score: Option<f32>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub metadata: Map<String, Value>,
	#[serde(flatten)]
	pub scope: OwnerScope,
}
impl MemoryItem {
	pub fn new(
		memory: impl Into<String>,
		scope: OwnerScope,
		metadata: Map<String, Value>,
		now: OffsetDateTime,
	) -> Self {
		let memory = memory.into();
		let hash = content_hash(&memory);

		Self {
			id: Uuid::new_v4(),
			memory,
			hash,
			created_at: now,
			updated_at: now,
			score: None,
			metadata,
			scope,
		}
	}

	/// Replaces the text in place, keeping id, creation time, and owner scope.
	pub fn revise(&mut self, memory: impl Into<String>, now: OffsetDateTime) {
		self.memory = memory.into();
		self.hash = content_hash(&self.memory);
		self.updated_at = now;
	}

	pub fn to_candidate(&self) -> CandidateMemory {
		CandidateMemory {
			id: self.id.to_string(),
			memory: self.memory.clone(),
			created_at: Some(self.created_at),
			metadata: self.metadata.clone(),
		}
	}
}

/// Read-only projection of a [`MemoryItem`] handed to the judge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateMemory {
	pub id: String,
	pub memory: String,
	#[serde(default, skip_serializing_if = "Option::is_none", with = "crate::time_serde::option")]
	pub created_at: Option<OffsetDateTime>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub metadata: Map<String, Value>,
}
impl CandidateMemory {
	pub fn new(id: impl Into<String>, memory: impl Into<String>) -> Self {
		Self { id: id.into(), memory: memory.into(), created_at: None, metadata: Map::new() }
	}

	pub fn created_at_rfc3339(&self) -> Option<String> {
		self.created_at.and_then(|ts| ts.format(&Rfc3339).ok())
	}
}

/// Content fingerprint used to spot duplicate memories.
pub fn content_hash(text: &str) -> String {
	blake3::hash(text.as_bytes()).to_hex().to_string()
}
