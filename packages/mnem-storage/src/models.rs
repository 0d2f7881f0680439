use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct MemoryItemRow {
	pub id: Uuid,
	pub memory: String,
	pub hash: String,
	pub bot_id: Option<String>,
	pub agent_id: Option<String>,
	pub run_id: Option<String>,
	pub metadata: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScoredMemoryRow {
	#[sqlx(flatten)]
	pub item: MemoryItemRow,
	/// Cosine similarity to the query vector.
	pub similarity: f32,
	pub vec_text: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct CacheEntry {
	pub provider: String,
	pub model: String,
	pub hash: String,
	pub embedding: Vec<f32>,
	pub dims: i32,
	pub updated_at: OffsetDateTime,
}

/// Owner filter; `None` fields match anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct OwnerFilter<'a> {
	pub bot_id: Option<&'a str>,
	pub agent_id: Option<&'a str>,
	pub run_id: Option<&'a str>,
}
impl OwnerFilter<'_> {
	pub fn is_unbounded(&self) -> bool {
		self.bot_id.is_none() && self.agent_id.is_none() && self.run_id.is_none()
	}
}
