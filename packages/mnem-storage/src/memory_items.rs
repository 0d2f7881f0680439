use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{MemoryItemRow, OwnerFilter, ScoredMemoryRow},
	vector,
};

const ITEM_COLUMNS: &str =
	"id, memory, hash, bot_id, agent_id, run_id, metadata, created_at, updated_at";

/// Inserts the item or replaces every mutable column of an existing row with the same id.
pub async fn upsert_item(db: &Db, item: &MemoryItemRow, vec: &[f32]) -> Result<()> {
	let vec_text = vector::vector_to_pg(vec);

	sqlx::query(
		"\
INSERT INTO memory_items (
	id,
	memory,
	hash,
	bot_id,
	agent_id,
	run_id,
	metadata,
	vec,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8::text::vector, $9, $10)
ON CONFLICT (id) DO UPDATE
SET
	memory = EXCLUDED.memory,
	hash = EXCLUDED.hash,
	metadata = EXCLUDED.metadata,
	vec = EXCLUDED.vec,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(item.id)
	.bind(item.memory.as_str())
	.bind(item.hash.as_str())
	.bind(item.bot_id.as_deref())
	.bind(item.agent_id.as_deref())
	.bind(item.run_id.as_deref())
	.bind(&item.metadata)
	.bind(vec_text.as_str())
	.bind(item.created_at)
	.bind(item.updated_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn get_item(db: &Db, id: Uuid) -> Result<Option<MemoryItemRow>> {
	let sql = format!("SELECT {ITEM_COLUMNS} FROM memory_items WHERE id = $1");
	let row = sqlx::query_as::<_, MemoryItemRow>(&sql).bind(id).fetch_optional(&db.pool).await?;

	Ok(row)
}

/// Returns whether a row was removed.
pub async fn delete_item(db: &Db, id: Uuid) -> Result<bool> {
	let result =
		sqlx::query("DELETE FROM memory_items WHERE id = $1").bind(id).execute(&db.pool).await?;

	Ok(result.rows_affected() > 0)
}

/// The item with this content hash owned by exactly this owner. Unset fields match NULL only.
pub async fn find_by_hash(
	db: &Db,
	owner: OwnerFilter<'_>,
	hash: &str,
) -> Result<Option<MemoryItemRow>> {
	let sql = format!(
		"\
SELECT {ITEM_COLUMNS}
FROM memory_items
WHERE hash = $1
	AND bot_id IS NOT DISTINCT FROM $2
	AND agent_id IS NOT DISTINCT FROM $3
	AND run_id IS NOT DISTINCT FROM $4
ORDER BY created_at ASC, id ASC
LIMIT 1"
	);
	let row = sqlx::query_as::<_, MemoryItemRow>(&sql)
		.bind(hash)
		.bind(owner.bot_id)
		.bind(owner.agent_id)
		.bind(owner.run_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(row)
}

/// Nearest items by cosine distance, most similar first.
pub async fn similarity_search(
	db: &Db,
	vec: &[f32],
	k: u32,
	owner: OwnerFilter<'_>,
) -> Result<Vec<ScoredMemoryRow>> {
	if k == 0 {
		return Ok(Vec::new());
	}

	let vec_text = vector::vector_to_pg(vec);
	let sql = format!(
		"\
SELECT
	{ITEM_COLUMNS},
	(1 - (vec <=> $1::text::vector))::real AS similarity,
	vec::text AS vec_text
FROM memory_items
WHERE ($2::text IS NULL OR bot_id = $2)
	AND ($3::text IS NULL OR agent_id = $3)
	AND ($4::text IS NULL OR run_id = $4)
ORDER BY vec <=> $1::text::vector ASC, id ASC
LIMIT $5"
	);
	let rows = sqlx::query_as::<_, ScoredMemoryRow>(&sql)
		.bind(vec_text.as_str())
		.bind(owner.bot_id)
		.bind(owner.agent_id)
		.bind(owner.run_id)
		.bind(i64::from(k))
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// Items of an owner, newest first.
pub async fn list_items(
	db: &Db,
	owner: OwnerFilter<'_>,
	limit: Option<u32>,
) -> Result<Vec<MemoryItemRow>> {
	let sql = format!(
		"\
SELECT {ITEM_COLUMNS}
FROM memory_items
WHERE ($1::text IS NULL OR bot_id = $1)
	AND ($2::text IS NULL OR agent_id = $2)
	AND ($3::text IS NULL OR run_id = $3)
ORDER BY created_at DESC, id ASC
LIMIT $4"
	);
	let rows = sqlx::query_as::<_, MemoryItemRow>(&sql)
		.bind(owner.bot_id)
		.bind(owner.agent_id)
		.bind(owner.run_id)
		.bind(limit.map(i64::from))
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// Removes every item of an owner. An unbounded filter is rejected.
pub async fn delete_items(db: &Db, owner: OwnerFilter<'_>) -> Result<u64> {
	if owner.is_unbounded() {
		return Err(Error::InvalidArgument(
			"Bulk delete requires at least one owner field.".to_string(),
		));
	}

	let result = sqlx::query(
		"\
DELETE FROM memory_items
WHERE ($1::text IS NULL OR bot_id = $1)
	AND ($2::text IS NULL OR agent_id = $2)
	AND ($3::text IS NULL OR run_id = $3)",
	)
	.bind(owner.bot_id)
	.bind(owner.agent_id)
	.bind(owner.run_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}
