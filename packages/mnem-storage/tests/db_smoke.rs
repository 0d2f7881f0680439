use serde_json::Map;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use mnem_config::Postgres;
use mnem_storage::{
	db::Db,
	embedding_cache, memory_items,
	models::{MemoryItemRow, OwnerFilter},
};
use mnem_testkit::TestDatabase;

const DIM: u32 = 3;

async fn bootstrap(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(DIM).await.expect("Failed to ensure schema.");

	db
}

fn row(memory: &str, bot_id: &str, created_at: OffsetDateTime) -> MemoryItemRow {
	MemoryItemRow {
		id: Uuid::new_v4(),
		memory: memory.to_string(),
		hash: format!("hash-{memory}"),
		bot_id: Some(bot_id.to_string()),
		agent_id: None,
		run_id: None,
		metadata: serde_json::Value::Object(Map::new()),
		created_at,
		updated_at: created_at,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set MNEM_PG_DSN to run."]
async fn schema_bootstrap_is_idempotent() {
	let Some(base_dsn) = mnem_testkit::env_dsn() else {
		eprintln!("Skipping schema_bootstrap_is_idempotent; set MNEM_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	db.ensure_schema(DIM).await.expect("Second bootstrap failed.");

	for table in ["memory_items", "embedding_cache"] {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
		)
		.bind(table)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to query schema tables.");

		assert_eq!(count, 1, "missing table {table}");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set MNEM_PG_DSN to run."]
async fn memory_items_round_trip_and_rank_by_similarity() {
	let Some(base_dsn) = mnem_testkit::env_dsn() else {
		eprintln!("Skipping memory_items_round_trip_and_rank_by_similarity; set MNEM_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let near = row("near", "b1", now);
	let far = row("far", "b1", now - Duration::days(1));
	let other_bot = row("other", "b2", now);

	memory_items::upsert_item(&db, &near, &[1.0, 0.0, 0.0]).await.expect("Upsert failed.");
	memory_items::upsert_item(&db, &far, &[0.0, 1.0, 0.0]).await.expect("Upsert failed.");
	memory_items::upsert_item(&db, &other_bot, &[1.0, 0.0, 0.0]).await.expect("Upsert failed.");

	let owner = OwnerFilter { bot_id: Some("b1"), ..OwnerFilter::default() };
	let hits = memory_items::similarity_search(&db, &[0.9, 0.1, 0.0], 10, owner)
		.await
		.expect("Search failed.");

	assert_eq!(hits.len(), 2);
	assert_eq!(hits[0].item.id, near.id);
	assert!(hits[0].similarity > hits[1].similarity);
	assert_eq!(
		mnem_storage::vector::parse_pg_vector(&hits[0].vec_text).expect("Bad vector text."),
		vec![1.0, 0.0, 0.0]
	);

	let listed = memory_items::list_items(&db, owner, None).await.expect("List failed.");

	assert_eq!(listed.iter().map(|item| item.id).collect::<Vec<_>>(), vec![near.id, far.id]);

	let duplicate =
		memory_items::find_by_hash(&db, owner, "hash-near").await.expect("Hash lookup failed.");
	let narrower = OwnerFilter { agent_id: Some("a1"), ..owner };

	assert_eq!(duplicate.map(|item| item.id), Some(near.id));
	assert!(
		memory_items::find_by_hash(&db, narrower, "hash-near")
			.await
			.expect("Hash lookup failed.")
			.is_none()
	);
	assert!(memory_items::delete_item(&db, far.id).await.expect("Delete failed."));
	assert!(!memory_items::delete_item(&db, far.id).await.expect("Delete failed."));
	assert_eq!(memory_items::delete_items(&db, owner).await.expect("Bulk delete failed."), 1);
	assert!(memory_items::delete_items(&db, OwnerFilter::default()).await.is_err());
	assert!(
		memory_items::get_item(&db, other_bot.id).await.expect("Get failed.").is_some(),
		"other owners must be untouched"
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set MNEM_PG_DSN to run."]
async fn embedding_cache_evicts_least_recently_used() {
	let Some(base_dsn) = mnem_testkit::env_dsn() else {
		eprintln!("Skipping embedding_cache_evicts_least_recently_used; set MNEM_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let start = OffsetDateTime::now_utc() - Duration::hours(1);

	for (offset, hash) in ["a", "b", "c"].iter().enumerate() {
		embedding_cache::upsert_entry(
			&db,
			"p",
			"m",
			hash,
			&[offset as f32],
			start + Duration::minutes(offset as i64),
		)
		.await
		.expect("Upsert failed.");
	}

	embedding_cache::touch_entry(&db, "p", "m", "a", start + Duration::minutes(10))
		.await
		.expect("Touch failed.");

	assert_eq!(embedding_cache::count_entries(&db, "p", "m").await.expect("Count failed."), 3);
	assert_eq!(embedding_cache::delete_oldest(&db, "p", "m", 1).await.expect("Evict failed."), 1);
	assert!(embedding_cache::get_entry(&db, "p", "m", "b").await.expect("Get failed.").is_none());

	let kept = embedding_cache::get_entry(&db, "p", "m", "a")
		.await
		.expect("Get failed.")
		.expect("Recently touched entry was evicted.");

	assert_eq!(kept.embedding, vec![0.0]);
	assert_eq!(kept.dims, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
