use time::OffsetDateTime;

use crate::{Result, db::Db, models::CacheEntry};

pub async fn get_entry(
	db: &Db,
	provider: &str,
	model: &str,
	hash: &str,
) -> Result<Option<CacheEntry>> {
	let row = sqlx::query_as::<_, CacheEntry>(
		"\
SELECT provider, model, hash, embedding, dims, updated_at
FROM embedding_cache
WHERE provider = $1 AND model = $2 AND hash = $3",
	)
	.bind(provider)
	.bind(model)
	.bind(hash)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn touch_entry(
	db: &Db,
	provider: &str,
	model: &str,
	hash: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE embedding_cache
SET updated_at = $4
WHERE provider = $1 AND model = $2 AND hash = $3",
	)
	.bind(provider)
	.bind(model)
	.bind(hash)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn upsert_entry(
	db: &Db,
	provider: &str,
	model: &str,
	hash: &str,
	embedding: &[f32],
	now: OffsetDateTime,
) -> Result<()> {
	let dims = i32::try_from(embedding.len()).unwrap_or(i32::MAX);

	sqlx::query(
		"\
INSERT INTO embedding_cache (provider, model, hash, embedding, dims, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $6)
ON CONFLICT (provider, model, hash) DO UPDATE
SET
	embedding = EXCLUDED.embedding,
	dims = EXCLUDED.dims,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(provider)
	.bind(model)
	.bind(hash)
	.bind(embedding)
	.bind(dims)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn count_entries(db: &Db, provider: &str, model: &str) -> Result<u64> {
	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM embedding_cache WHERE provider = $1 AND model = $2",
	)
	.bind(provider)
	.bind(model)
	.fetch_one(&db.pool)
	.await?;

	Ok(u64::try_from(count).unwrap_or_default())
}

/// Deletes the `n` least recently used entries of one (provider, model) pair.
pub async fn delete_oldest(db: &Db, provider: &str, model: &str, n: u64) -> Result<u64> {
	let limit = i64::try_from(n).unwrap_or(i64::MAX);
	let result = sqlx::query(
		"\
DELETE FROM embedding_cache
WHERE (provider, model, hash) IN (
	SELECT provider, model, hash
	FROM embedding_cache
	WHERE provider = $1 AND model = $2
	ORDER BY updated_at ASC, hash ASC
	LIMIT $3
)",
	)
	.bind(provider)
	.bind(model)
	.bind(limit)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}
