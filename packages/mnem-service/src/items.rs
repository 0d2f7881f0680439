use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use mnem_domain::memory::{MemoryItem, OwnerScope};

use crate::{Error, MemoryService, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListRequest {
	#[serde(flatten)]
	pub scope: OwnerScope,
	#[serde(default)]
	pub limit: Option<u32>,
}

/// Storage footprint of one scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
	pub count: usize,
	pub total_text_bytes: u64,
	pub avg_text_bytes: u64,
	/// Text plus one `f32` vector per item.
	pub estimated_storage_bytes: u64,
}

impl MemoryService {
	/// Replaces an item's text, keeping its id, creation time, owner and metadata.
	pub async fn update(&self, id: Uuid, text: &str) -> Result<MemoryItem> {
		let text = text.trim();

		if text.is_empty() {
			return Err(Error::invalid("memory text is required."));
		}

		let mut item = self
			.store
			.get(id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Memory {id} does not exist.") })?;
		let vector = self.embed_one(text).await?;

		item.revise(text, OffsetDateTime::now_utc());
		self.store.upsert(&item, &vector).await?;

		tracing::info!(memory_id = %id, "Memory updated.");

		Ok(item)
	}

	pub async fn delete(&self, id: Uuid) -> Result<()> {
		if !self.store.delete(id).await? {
			return Err(Error::NotFound { message: format!("Memory {id} does not exist.") });
		}

		tracing::info!(memory_id = %id, "Memory deleted.");

		Ok(())
	}

	pub async fn delete_all(&self, scope: &OwnerScope) -> Result<u64> {
		if scope.is_empty() {
			return Err(Error::invalid("bot_id, agent_id, or run_id is required."));
		}

		let removed = self.store.delete_all(scope).await?;

		tracing::info!(removed, "Scope memories deleted.");

		Ok(removed)
	}

	pub async fn list(&self, req: ListRequest) -> Result<Vec<MemoryItem>> {
		if req.scope.is_empty() {
			return Err(Error::invalid("bot_id, agent_id, or run_id is required."));
		}

		self.store.list(&req.scope, req.limit).await
	}

	pub async fn usage(&self, scope: &OwnerScope) -> Result<UsageReport> {
		let items = self.list(ListRequest { scope: scope.clone(), limit: None }).await?;

		Ok(usage_of(&items, self.cfg.storage.vectors.dim))
	}
}

pub fn usage_of(items: &[MemoryItem], vector_dim: u32) -> UsageReport {
	let count = items.len();
	let total_text_bytes: u64 = items.iter().map(|item| item.memory.len() as u64).sum();
	let avg_text_bytes = if count == 0 { 0 } else { total_text_bytes / count as u64 };
	let vector_bytes = u64::from(vector_dim) * size_of::<f32>() as u64;

	UsageReport {
		count,
		total_text_bytes,
		avg_text_bytes,
		estimated_storage_bytes: total_text_bytes + vector_bytes * count as u64,
	}
}
