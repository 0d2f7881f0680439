//! Content-addressed embedding cache with size-bounded LRU eviction.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use mnem_storage::{db::Db, embedding_cache as queries};

use crate::{BoxFuture, Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub provider: String,
	pub model: String,
	/// Hex SHA-256 of the embedded text.
	pub hash: String,
}
impl CacheKey {
	pub fn new(provider: &str, model: &str, text: &str) -> Self {
		Self { provider: provider.to_string(), model: model.to_string(), hash: text_hash(text) }
	}
}

/// Backing medium of the cache. Implementations must tolerate concurrent callers.
pub trait CacheStore
where
	Self: Send + Sync,
{
	fn lookup<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<Option<Vec<f32>>>>;

	fn touch<'a>(&'a self, key: &'a CacheKey, now: OffsetDateTime) -> BoxFuture<'a, Result<()>>;

	fn upsert<'a>(
		&'a self,
		key: &'a CacheKey,
		vector: &'a [f32],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn count<'a>(&'a self, provider: &'a str, model: &'a str) -> BoxFuture<'a, Result<u64>>;

	/// Removes the `n` entries with the oldest `updated_at` and returns how many went.
	fn delete_oldest<'a>(
		&'a self,
		provider: &'a str,
		model: &'a str,
		n: u64,
	) -> BoxFuture<'a, Result<u64>>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachePolicy {
	/// Entry ceiling per (provider, model).
	pub max_entries: u64,
	pub prune_ratio: f64,
	pub read_errors_as_miss: bool,
}
impl CachePolicy {
	pub fn from_config(cfg: &mnem_config::Cache) -> Self {
		Self {
			max_entries: cfg.max_entries,
			prune_ratio: cfg.prune_ratio,
			read_errors_as_miss: cfg.read_errors_as_miss,
		}
	}

	/// Entries to drop for a current `count`, zero while within capacity.
	pub fn eviction_count(&self, count: u64) -> u64 {
		if count <= self.max_entries {
			return 0;
		}

		let share = (self.prune_ratio * count as f64).ceil() as u64;

		share.max(1)
	}
}

#[derive(Clone)]
pub struct EmbeddingCache {
	store: Arc<dyn CacheStore>,
	policy: CachePolicy,
}
impl EmbeddingCache {
	pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
		Self { store, policy }
	}

	pub fn policy(&self) -> CachePolicy {
		self.policy
	}

	/// Cached vector for `text`. A hit refreshes the entry's recency.
	pub async fn get(&self, provider: &str, model: &str, text: &str) -> Result<Option<Vec<f32>>> {
		let key = CacheKey::new(provider, model, text);
		let hit = match self.store.lookup(&key).await {
			Ok(hit) => hit,
			Err(err) if self.policy.read_errors_as_miss => {
				tracing::warn!(
					error = %err,
					provider,
					model,
					"Embedding cache read failed; treating as miss."
				);

				return Ok(None);
			},
			Err(err) => return Err(Error::CacheDegraded { message: err.to_string() }),
		};

		if hit.is_some()
			&& let Err(err) = self.store.touch(&key, OffsetDateTime::now_utc()).await
		{
			tracing::warn!(error = %err, provider, model, "Embedding cache touch failed.");
		}

		Ok(hit)
	}

	/// Stores `vector` for `text`, then schedules eviction without waiting for it.
	pub async fn set(&self, provider: &str, model: &str, text: &str, vector: &[f32]) -> Result<()> {
		let key = CacheKey::new(provider, model, text);

		self.store
			.upsert(&key, vector, OffsetDateTime::now_utc())
			.await
			.map_err(|err| Error::CacheDegraded { message: err.to_string() })?;

		let cache = self.clone();

		tokio::spawn(async move {
			if let Err(err) = cache.prune(&key.provider, &key.model).await {
				tracing::warn!(
					error = %err,
					provider = %key.provider,
					model = %key.model,
					"Embedding cache eviction failed."
				);
			}
		});

		Ok(())
	}

	/// Evicts least recently used entries of one (provider, model) pair when over capacity.
	pub async fn prune(&self, provider: &str, model: &str) -> Result<u64> {
		let count = self.store.count(provider, model).await?;
		let excess = self.policy.eviction_count(count);

		if excess == 0 {
			return Ok(0);
		}

		let removed = self.store.delete_oldest(provider, model, excess).await?;

		tracing::info!(provider, model, count, removed, "Embedding cache pruned.");

		Ok(removed)
	}
}

pub fn text_hash(text: &str) -> String {
	hex::encode(Sha256::digest(text.as_bytes()))
}

struct MemoryEntry {
	vector: Vec<f32>,
	updated_at: OffsetDateTime,
	// Tie-break for equal timestamps.
	tick: u64,
}

#[derive(Default)]
struct MemoryState {
	entries: HashMap<CacheKey, MemoryEntry>,
	tick: u64,
}
impl MemoryState {
	fn next_tick(&mut self) -> u64 {
		self.tick += 1;

		self.tick
	}
}

/// Process-local [`CacheStore`].
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
	state: Arc<Mutex<MemoryState>>,
}
impl InMemoryCacheStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.with_state(|state| state.entries.len())
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn contains(&self, provider: &str, model: &str, text: &str) -> bool {
		let key = CacheKey::new(provider, model, text);

		self.with_state(|state| state.entries.contains_key(&key))
	}

	fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		f(&mut state)
	}
}

impl CacheStore for InMemoryCacheStore {
	fn lookup<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<Option<Vec<f32>>>> {
		let hit = self.with_state(|state| state.entries.get(key).map(|entry| entry.vector.clone()));

		Box::pin(async move { Ok(hit) })
	}

	fn touch<'a>(&'a self, key: &'a CacheKey, now: OffsetDateTime) -> BoxFuture<'a, Result<()>> {
		self.with_state(|state| {
			let tick = state.next_tick();

			if let Some(entry) = state.entries.get_mut(key) {
				entry.updated_at = now;
				entry.tick = tick;
			}
		});

		Box::pin(async move { Ok(()) })
	}

	fn upsert<'a>(
		&'a self,
		key: &'a CacheKey,
		vector: &'a [f32],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		self.with_state(|state| {
			let tick = state.next_tick();

			state
				.entries
				.insert(key.clone(), MemoryEntry { vector: vector.to_vec(), updated_at: now, tick });
		});

		Box::pin(async move { Ok(()) })
	}

	fn count<'a>(&'a self, provider: &'a str, model: &'a str) -> BoxFuture<'a, Result<u64>> {
		let count = self.with_state(|state| {
			state.entries.keys().filter(|key| key.provider == provider && key.model == model).count()
		});

		Box::pin(async move { Ok(count as u64) })
	}

	fn delete_oldest<'a>(
		&'a self,
		provider: &'a str,
		model: &'a str,
		n: u64,
	) -> BoxFuture<'a, Result<u64>> {
		let removed = self.with_state(|state| {
			let mut scoped: Vec<(OffsetDateTime, u64, CacheKey)> = state
				.entries
				.iter()
				.filter(|(key, _)| key.provider == provider && key.model == model)
				.map(|(key, entry)| (entry.updated_at, entry.tick, key.clone()))
				.collect();

			scoped.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

			let victims: Vec<CacheKey> = scoped
				.into_iter()
				.take(usize::try_from(n).unwrap_or(usize::MAX))
				.map(|(_, _, key)| key)
				.collect();

			for key in &victims {
				state.entries.remove(key);
			}

			victims.len() as u64
		});

		Box::pin(async move { Ok(removed) })
	}
}

/// [`CacheStore`] over the `embedding_cache` table.
#[derive(Clone)]
pub struct PgCacheStore {
	db: Db,
}
impl PgCacheStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

impl CacheStore for PgCacheStore {
	fn lookup<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, Result<Option<Vec<f32>>>> {
		Box::pin(async move {
			let entry = queries::get_entry(&self.db, &key.provider, &key.model, &key.hash).await?;

			Ok(entry.map(|entry| entry.embedding))
		})
	}

	fn touch<'a>(&'a self, key: &'a CacheKey, now: OffsetDateTime) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::touch_entry(&self.db, &key.provider, &key.model, &key.hash, now).await?;

			Ok(())
		})
	}

	fn upsert<'a>(
		&'a self,
		key: &'a CacheKey,
		vector: &'a [f32],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::upsert_entry(&self.db, &key.provider, &key.model, &key.hash, vector, now)
				.await?;

			Ok(())
		})
	}

	fn count<'a>(&'a self, provider: &'a str, model: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(queries::count_entries(&self.db, provider, model).await?) })
	}

	fn delete_oldest<'a>(
		&'a self,
		provider: &'a str,
		model: &'a str,
		n: u64,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(queries::delete_oldest(&self.db, provider, model, n).await?) })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_is_hex_sha256_of_text() {
		let key = CacheKey::new("openai", "small", "hello");

		assert_eq!(key.hash, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
		assert_eq!(key, CacheKey::new("openai", "small", "hello"));
		assert_ne!(key, CacheKey::new("openai", "large", "hello"));
	}

	#[test]
	fn eviction_count_removes_at_least_one_over_capacity() {
		let policy = CachePolicy { max_entries: 10, prune_ratio: 0.10, read_errors_as_miss: true };

		assert_eq!(policy.eviction_count(10), 0);
		assert_eq!(policy.eviction_count(11), 2);
		assert_eq!(policy.eviction_count(55_000), 5_500);

		let tiny = CachePolicy { prune_ratio: 0.001, ..policy };

		assert_eq!(tiny.eviction_count(11), 1);
	}

	#[tokio::test]
	async fn in_memory_eviction_breaks_timestamp_ties_by_write_order() {
		let store = InMemoryCacheStore::new();
		let at = time::macros::datetime!(2026-01-01 00:00 UTC);

		for text in ["first", "second", "third"] {
			store.upsert(&CacheKey::new("p", "m", text), &[1.0], at).await.expect("Upsert failed.");
		}

		store.upsert(&CacheKey::new("other", "m", "x"), &[1.0], at).await.expect("Upsert failed.");
		store.touch(&CacheKey::new("p", "m", "first"), at).await.expect("Touch failed.");

		assert_eq!(store.delete_oldest("p", "m", 2).await.expect("Evict failed."), 2);
		assert!(store.contains("p", "m", "first"));
		assert!(!store.contains("p", "m", "second"));
		assert!(!store.contains("p", "m", "third"));
		assert!(store.contains("other", "m", "x"));
	}
}
