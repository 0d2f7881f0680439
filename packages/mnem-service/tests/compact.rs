mod support;

use serde_json::Map;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use mnem_domain::memory::{MemoryItem, OwnerScope};
use mnem_service::{CompactRequest, Error, ListRequest};
use support::{Harness, ScriptedJudge, keyword_vector, scope};

fn seed_texts(harness: &Harness, texts: &[&str]) -> Vec<MemoryItem> {
	let now = OffsetDateTime::now_utc();

	texts
		.iter()
		.map(|text| {
			let item = MemoryItem::new(*text, scope(), Map::new(), now);

			harness.store.seed(item.clone(), keyword_vector(text));

			item
		})
		.collect()
}

fn compact_request() -> CompactRequest {
	CompactRequest { scope: scope(), ..Default::default() }
}

#[tokio::test]
async fn compaction_replaces_the_scope_with_condensed_facts() {
	let harness = Harness::new(ScriptedJudge::new([
		r#"{"facts": ["Lives in Berlin", "Drinks coffee daily"]}"#,
	]));
	let originals = seed_texts(
		&harness,
		&["Lives in Munich", "Moved to Berlin", "Likes coffee", "Drinks coffee every morning"],
	);
	let report = harness.service.compact(compact_request()).await.expect("Compaction failed.");

	assert_eq!(report.before_count, 4);
	assert_eq!(report.after_count, 2);
	assert!((report.ratio - 0.5).abs() < f32::EPSILON);

	let remaining = harness.store.items();

	assert_eq!(remaining.len(), 2);
	assert!(remaining.iter().all(|item| originals.iter().all(|old| old.id != item.id)));
	assert!(harness.store.find("Drinks coffee daily").is_some());

	let prompt = &harness.judge.requests()[0][1].content;

	assert!(prompt.contains("at most 2 facts"));
}

#[tokio::test]
async fn compaction_keeps_agent_memories_under_their_agent() {
	// Newest owner first: the bot-level items, then the older agent items.
	let harness = Harness::new(ScriptedJudge::new([
		r#"{"facts": ["Lives in Berlin"]}"#,
		r#"{"facts": ["Prefers short answers"]}"#,
	]));
	let yesterday = OffsetDateTime::now_utc() - Duration::days(1);
	let agent = scope().with_agent("a1");

	for text in ["Wants short answers", "Prefers brief replies"] {
		let item = MemoryItem::new(text, agent.clone(), Map::new(), yesterday);

		harness.store.seed(item, keyword_vector(text));
	}

	seed_texts(&harness, &["Lives in Munich", "Moved to Berlin"]);

	let report = harness.service.compact(compact_request()).await.expect("Compaction failed.");

	assert_eq!((report.before_count, report.after_count), (4, 2));
	assert_eq!(harness.judge.call_count(), 2);

	let agent_fact = harness.store.find("Prefers short answers").expect("Agent fact missing.");
	let bot_fact = harness.store.find("Lives in Berlin").expect("Bot fact missing.");

	assert_eq!(agent_fact.scope, agent);
	assert_eq!(bot_fact.scope, scope());

	let listed = harness
		.service
		.list(ListRequest { scope: agent, limit: None })
		.await
		.expect("List failed.");

	assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn one_failed_owner_group_leaves_every_group_untouched() {
	let harness = Harness::new(ScriptedJudge::new([
		r#"{"facts": ["Lives in Berlin"]}"#,
		"not json at all",
	]));
	let yesterday = OffsetDateTime::now_utc() - Duration::days(1);
	let agent = scope().with_agent("a1");

	harness.store.seed(
		MemoryItem::new("Wants short answers", agent, Map::new(), yesterday),
		keyword_vector("Wants short answers"),
	);
	seed_texts(&harness, &["Lives in Munich"]);

	let err = harness.service.compact(compact_request()).await;

	assert!(matches!(err, Err(Error::CompactionFailed { .. })));
	assert_eq!(harness.store.items().len(), 2);
	assert!(harness.store.find("Lives in Berlin").is_none());
}

#[tokio::test]
async fn explicit_target_count_reaches_the_prompt() {
	let harness = Harness::new(ScriptedJudge::new([r#"{"facts": ["Likes tea"]}"#]));

	seed_texts(&harness, &["Likes tea", "Likes green tea", "Enjoys tea"]);

	let req = CompactRequest { target_count: Some(1), decay_days: Some(14), ..compact_request() };

	harness.service.compact(req).await.expect("Compaction failed.");

	let prompt = &harness.judge.requests()[0][1].content;

	assert!(prompt.contains("at most 1 facts"));
	assert!(prompt.contains("older than 14 days"));
}

#[tokio::test]
async fn empty_scope_compacts_to_nothing_without_a_judge_call() {
	let harness = Harness::new(ScriptedJudge::default());
	let report = harness.service.compact(compact_request()).await.expect("Compaction failed.");

	assert_eq!((report.before_count, report.after_count), (0, 0));
	assert!((report.ratio - 1.0).abs() < f32::EPSILON);
	assert_eq!(harness.judge.call_count(), 0);
}

#[tokio::test]
async fn failed_or_empty_proposals_keep_the_originals() {
	for reply in ["not json at all", r#"{"facts": []}"#] {
		let harness = Harness::new(ScriptedJudge::new([reply]));

		seed_texts(&harness, &["Lives in Munich", "Likes tea"]);

		let err = harness.service.compact(compact_request()).await;

		assert!(matches!(err, Err(Error::CompactionFailed { .. })));
		assert_eq!(harness.store.items().len(), 2);
	}
}

#[tokio::test]
async fn invalid_compaction_requests_are_rejected() {
	let harness = Harness::new(ScriptedJudge::default());

	for req in [
		CompactRequest::default(),
		CompactRequest { ratio: Some(0.0), ..compact_request() },
		CompactRequest { ratio: Some(1.5), ..compact_request() },
	] {
		assert!(matches!(harness.service.compact(req).await, Err(Error::InvalidInput { .. })));
	}
}

#[tokio::test]
async fn items_can_be_updated_listed_and_deleted() {
	let harness = Harness::new(ScriptedJudge::default());
	let seeded = seed_texts(&harness, &["Lives in Munich", "Likes tea"]);
	let munich = &seeded[0];
	let updated = harness.service.update(munich.id, "Lives in Berlin").await.expect("Update failed.");

	assert_eq!(updated.id, munich.id);
	assert_eq!(updated.created_at, munich.created_at);
	assert_eq!(harness.store.find("Lives in Berlin").map(|item| item.id), Some(munich.id));

	let listed = harness
		.service
		.list(ListRequest { scope: scope(), limit: Some(1) })
		.await
		.expect("List failed.");

	assert_eq!(listed.len(), 1);

	let usage = harness.service.usage(&scope()).await.expect("Usage failed.");

	assert_eq!(usage.count, 2);
	assert_eq!(usage.total_text_bytes, ("Lives in Berlin".len() + "Likes tea".len()) as u64);

	harness.service.delete(seeded[1].id).await.expect("Delete failed.");

	assert!(matches!(harness.service.delete(seeded[1].id).await, Err(Error::NotFound { .. })));
	assert!(matches!(
		harness.service.update(Uuid::new_v4(), "anything").await,
		Err(Error::NotFound { .. })
	));
}

#[tokio::test]
async fn delete_all_is_bounded_by_scope() {
	let harness = Harness::new(ScriptedJudge::default());
	let foreign =
		MemoryItem::new("Other bot", OwnerScope::bot("bot-2"), Map::new(), OffsetDateTime::now_utc());

	harness.store.seed(foreign, keyword_vector("Other bot"));
	seed_texts(&harness, &["Lives in Munich", "Likes tea"]);

	assert_eq!(harness.service.delete_all(&scope()).await.expect("Delete failed."), 2);
	assert_eq!(harness.store.items().len(), 1);
	assert!(matches!(
		harness.service.delete_all(&OwnerScope::default()).await,
		Err(Error::InvalidInput { .. })
	));
}
