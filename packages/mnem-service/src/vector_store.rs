use serde_json::{Map, Value};
use uuid::Uuid;

use mnem_domain::memory::{MemoryItem, OwnerScope};
use mnem_storage::{
	db::Db,
	memory_items,
	models::{MemoryItemRow, OwnerFilter},
	vector,
};

use crate::{BoxFuture, Error, Result};

/// A similarity hit. `score` is comparable only within one result set.
#[derive(Clone, Debug)]
pub struct ScoredItem {
	pub item: MemoryItem,
	pub score: f32,
	pub vector: Option<Vec<f32>>,
}

/// Persistence and nearest-neighbor lookup for memory items. Each call is atomic per item.
pub trait VectorStore
where
	Self: Send + Sync,
{
	fn upsert<'a>(&'a self, item: &'a MemoryItem, vector: &'a [f32]) -> BoxFuture<'a, Result<()>>;

	fn get<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Option<MemoryItem>>>;

	/// An item with this content hash owned by exactly `scope`, not by a narrower owner.
	fn find_by_hash<'a>(
		&'a self,
		scope: &'a OwnerScope,
		hash: &'a str,
	) -> BoxFuture<'a, Result<Option<MemoryItem>>>;

	/// Returns whether the item existed.
	fn delete<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<bool>>;

	fn similarity_search<'a>(
		&'a self,
		vector: &'a [f32],
		k: u32,
		scope: &'a OwnerScope,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>>;

	/// Items in scope, newest first.
	fn list<'a>(
		&'a self,
		scope: &'a OwnerScope,
		limit: Option<u32>,
	) -> BoxFuture<'a, Result<Vec<MemoryItem>>>;

	fn delete_all<'a>(&'a self, scope: &'a OwnerScope) -> BoxFuture<'a, Result<u64>>;
}

/// [`VectorStore`] over the `memory_items` table with a pgvector column.
#[derive(Clone)]
pub struct PgVectorStore {
	db: Db,
}
impl PgVectorStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

impl VectorStore for PgVectorStore {
	fn upsert<'a>(&'a self, item: &'a MemoryItem, vector: &'a [f32]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			memory_items::upsert_item(&self.db, &item_to_row(item), vector).await?;

			Ok(())
		})
	}

	fn get<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Option<MemoryItem>>> {
		Box::pin(async move {
			let row = memory_items::get_item(&self.db, id).await?;

			Ok(row.map(row_to_item))
		})
	}

	fn find_by_hash<'a>(
		&'a self,
		scope: &'a OwnerScope,
		hash: &'a str,
	) -> BoxFuture<'a, Result<Option<MemoryItem>>> {
		Box::pin(async move {
			let row = memory_items::find_by_hash(&self.db, owner_filter(scope), hash).await?;

			Ok(row.map(row_to_item))
		})
	}

	fn delete<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(memory_items::delete_item(&self.db, id).await?) })
	}

	fn similarity_search<'a>(
		&'a self,
		vector: &'a [f32],
		k: u32,
		scope: &'a OwnerScope,
	) -> BoxFuture<'a, Result<Vec<ScoredItem>>> {
		Box::pin(async move {
			let rows =
				memory_items::similarity_search(&self.db, vector, k, owner_filter(scope)).await?;
			let mut hits = Vec::with_capacity(rows.len());

			for row in rows {
				let vector = vector::parse_pg_vector(&row.vec_text).map_err(|err| {
					Error::Storage { message: format!("Stored vector is unreadable: {err}") }
				})?;

				hits.push(ScoredItem {
					item: row_to_item(row.item),
					score: row.similarity,
					vector: Some(vector),
				});
			}

			Ok(hits)
		})
	}

	fn list<'a>(
		&'a self,
		scope: &'a OwnerScope,
		limit: Option<u32>,
	) -> BoxFuture<'a, Result<Vec<MemoryItem>>> {
		Box::pin(async move {
			let rows = memory_items::list_items(&self.db, owner_filter(scope), limit).await?;

			Ok(rows.into_iter().map(row_to_item).collect())
		})
	}

	fn delete_all<'a>(&'a self, scope: &'a OwnerScope) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(memory_items::delete_items(&self.db, owner_filter(scope)).await?) })
	}
}

fn owner_filter(scope: &OwnerScope) -> OwnerFilter<'_> {
	let [(_, bot_id), (_, agent_id), (_, run_id)] = scope.fields();

	OwnerFilter { bot_id, agent_id, run_id }
}

fn item_to_row(item: &MemoryItem) -> MemoryItemRow {
	let [(_, bot_id), (_, agent_id), (_, run_id)] = item.scope.fields();

	MemoryItemRow {
		id: item.id,
		memory: item.memory.clone(),
		hash: item.hash.clone(),
		bot_id: bot_id.map(str::to_string),
		agent_id: agent_id.map(str::to_string),
		run_id: run_id.map(str::to_string),
		metadata: Value::Object(item.metadata.clone()),
		created_at: item.created_at,
		updated_at: item.updated_at,
	}
}

fn row_to_item(row: MemoryItemRow) -> MemoryItem {
	let metadata = match row.metadata {
		Value::Object(map) => map,
		_ => Map::new(),
	};

	MemoryItem {
		id: row.id,
		memory: row.memory,
		hash: row.hash,
		created_at: row.created_at,
		updated_at: row.updated_at,
		score: None,
		metadata,
		scope: OwnerScope { bot_id: row.bot_id, agent_id: row.agent_id, run_id: row.run_id },
	}
}
