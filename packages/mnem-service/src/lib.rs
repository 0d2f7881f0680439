//! Memory consolidation and retrieval service.
//!
//! [`MemoryService`] wires the judge-driven components ([`FactExtractor`], [`DecisionEngine`],
//! [`Compactor`], [`LanguageDetector`]) to an [`EmbeddingCache`], a [`VectorStore`] and the
//! [`RetrievalRanker`].

pub mod compact;
pub mod decide;
pub mod embedding_cache;
pub mod extract;
pub mod ingest;
pub mod items;
pub mod judge;
pub mod language;
pub mod ranking;
pub mod search;
pub mod vector_store;

mod error;

pub use compact::{CompactRequest, CompactionReport, Compactor};
pub use decide::DecisionEngine;
pub use embedding_cache::{
	CacheKey, CachePolicy, CacheStore, EmbeddingCache, InMemoryCacheStore, PgCacheStore,
};
pub use error::{Error, Result};
pub use extract::FactExtractor;
pub use ingest::{AddRequest, AppliedAction, ApplyReport, FailedAction};
pub use items::{ListRequest, UsageReport};
pub use judge::Judge;
pub use language::LanguageDetector;
pub use ranking::RetrievalRanker;
pub use search::{SearchRequest, SearchResponse};
pub use vector_store::{PgVectorStore, ScoredItem, VectorStore};

use std::{future::Future, pin::Pin, sync::Arc};

use mnem_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use mnem_domain::memory::Message;
use mnem_providers::{embedding as embedding_client, judge as judge_client};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait JudgeProvider
where
	Self: Send + Sync,
{
	fn chat<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Message],
	) -> BoxFuture<'a, Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub judge: Arc<dyn JudgeProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, judge: Arc<dyn JudgeProvider>) -> Self {
		Self { embedding, judge }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), judge: provider }
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			embedding_client::embed(cfg, texts)
				.await
				.map_err(|err| Error::Embedding { message: err.to_string() })
		})
	}
}

impl JudgeProvider for DefaultProviders {
	fn chat<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Message],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			judge_client::chat(cfg, messages)
				.await
				.map_err(|err| Error::JudgeUnavailable { message: err.to_string() })
		})
	}
}

pub struct MemoryService {
	pub cfg: Config,
	pub store: Arc<dyn VectorStore>,
	pub cache: Option<EmbeddingCache>,
	pub providers: Providers,
	pub extractor: FactExtractor,
	pub decisions: DecisionEngine,
	pub compactor: Compactor,
	pub language: LanguageDetector,
	pub ranker: RetrievalRanker,
}
impl MemoryService {
	/// Builds a service over `store` with HTTP providers. The cache is `None` when
	/// `cache.enabled` is false.
	pub fn new(
		cfg: Config,
		store: Arc<dyn VectorStore>,
		cache_store: Arc<dyn CacheStore>,
	) -> Self {
		Self::with_providers(cfg, store, cache_store, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		store: Arc<dyn VectorStore>,
		cache_store: Arc<dyn CacheStore>,
		providers: Providers,
	) -> Self {
		let judge = Judge::new(cfg.providers.llm_judge.clone(), providers.judge.clone());
		let cache = cfg
			.cache
			.enabled
			.then(|| EmbeddingCache::new(cache_store, CachePolicy::from_config(&cfg.cache)));

		Self {
			extractor: FactExtractor::new(judge.clone()),
			decisions: DecisionEngine::new(judge.clone()),
			compactor: Compactor::new(judge.clone()),
			language: LanguageDetector::new(judge),
			ranker: RetrievalRanker::new(&cfg.search),
			cfg,
			store,
			cache,
			providers,
		}
	}

	/// Embeds `texts`, serving repeats from the cache and embedding only the misses in a single
	/// provider call.
	pub async fn embed_cached(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let emb_cfg = &self.cfg.providers.embedding;
		let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

		if let Some(cache) = &self.cache {
			for (slot, text) in vectors.iter_mut().zip(texts) {
				match cache.get(&emb_cfg.provider_id, &emb_cfg.model, text).await {
					Ok(hit) => *slot = hit,
					Err(err) => tracing::warn!(error = %err, "Embedding cache read failed."),
				}
			}
		}

		let misses: Vec<usize> =
			vectors.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(idx, _)| idx).collect();

		tracing::debug!(
			texts = texts.len(),
			misses = misses.len(),
			"Embedding cache lookup completed."
		);

		if !misses.is_empty() {
			let miss_texts: Vec<String> = misses.iter().map(|idx| texts[*idx].clone()).collect();
			let fresh = self.providers.embedding.embed(emb_cfg, &miss_texts).await?;

			if fresh.len() != miss_texts.len() {
				return Err(Error::Embedding {
					message: format!(
						"Embedding provider returned {} vectors for {} inputs.",
						fresh.len(),
						miss_texts.len()
					),
				});
			}

			for (idx, vector) in misses.into_iter().zip(fresh) {
				if vector.len() != self.cfg.storage.vectors.dim as usize {
					return Err(Error::Embedding {
						message: format!(
							"Embedding has {} dimensions, expected {}.",
							vector.len(),
							self.cfg.storage.vectors.dim
						),
					});
				}
				if let Some(cache) = &self.cache
					&& let Err(err) =
						cache.set(&emb_cfg.provider_id, &emb_cfg.model, &texts[idx], &vector).await
				{
					tracing::warn!(error = %err, "Embedding cache write failed.");
				}

				vectors[idx] = Some(vector);
			}
		}

		Ok(vectors.into_iter().flatten().collect())
	}

	pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		let mut vectors = self.embed_cached(&[text.to_string()]).await?;

		vectors.pop().ok_or_else(|| Error::Embedding {
			message: "Embedding provider returned no vectors.".to_string(),
		})
	}
}
