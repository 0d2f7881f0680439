use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use mnem_config::Config;
use mnem_domain::memory::{Message, OwnerScope};
use mnem_service::{
	AddRequest, CompactRequest, ListRequest, MemoryService, PgCacheStore, PgVectorStore,
	SearchRequest,
};
use mnem_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = mnem_cli::VERSION,
	rename_all = "kebab",
	styles = mnem_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Create the extension, tables and indexes.
	Schema,
	/// Consolidate messages into the scope's memories.
	Add {
		#[command(flatten)]
		scope: ScopeArgs,
		#[arg(long, short = 'm', value_name = "TEXT", required = true)]
		message: Vec<String>,
		/// Store messages verbatim without consulting the judge.
		#[arg(long)]
		no_infer: bool,
		/// JSON object merged into every written memory.
		#[arg(long, value_name = "JSON")]
		metadata: Option<String>,
	},
	Search {
		#[command(flatten)]
		scope: ScopeArgs,
		#[arg(long, short = 'q')]
		query: String,
		#[arg(long, value_name = "N")]
		limit: Option<u32>,
		#[arg(long)]
		mmr: bool,
		#[arg(long, value_name = "LAMBDA")]
		mmr_lambda: Option<f32>,
		#[arg(long, value_name = "N")]
		overfetch_ratio: Option<u32>,
		#[arg(long)]
		decay: bool,
		#[arg(long, value_name = "DAYS")]
		half_life_days: Option<f32>,
	},
	Compact {
		#[command(flatten)]
		scope: ScopeArgs,
		#[arg(long)]
		ratio: Option<f32>,
		#[arg(long, value_name = "N")]
		target_count: Option<u32>,
		#[arg(long, value_name = "DAYS")]
		decay_days: Option<u32>,
	},
	List {
		#[command(flatten)]
		scope: ScopeArgs,
		#[arg(long, value_name = "N")]
		limit: Option<u32>,
	},
	Usage {
		#[command(flatten)]
		scope: ScopeArgs,
	},
	Update {
		id: Uuid,
		text: String,
	},
	Delete {
		id: Uuid,
	},
	DeleteAll {
		#[command(flatten)]
		scope: ScopeArgs,
	},
	DetectLanguage {
		text: String,
	},
	/// Evict least recently used cache entries of the configured embedding model.
	///
	/// Cache writes schedule eviction on a background task that a one-shot process does not
	/// wait for, so commands that embed text prune inline before exiting.
	PruneCache,
}
impl Command {
	/// True for commands that may write new entries to the embedding cache.
	pub fn fills_embedding_cache(&self) -> bool {
		matches!(
			self,
			Self::Add { .. } | Self::Search { .. } | Self::Compact { .. } | Self::Update { .. }
		)
	}
}

#[derive(Debug, clap::Args)]
pub struct ScopeArgs {
	#[arg(long)]
	pub bot_id: Option<String>,
	#[arg(long)]
	pub agent_id: Option<String>,
	#[arg(long)]
	pub run_id: Option<String>,
}
impl From<ScopeArgs> for OwnerScope {
	fn from(args: ScopeArgs) -> Self {
		Self { bot_id: args.bot_id, agent_id: args.agent_id, run_id: args.run_id }
	}
}

#[derive(Serialize)]
struct Deleted {
	deleted: u64,
}

#[derive(Serialize)]
struct Language {
	language: String,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = mnem_config::load(&args.config)?;

	init_tracing(&config)?;

	let db = Db::connect(&config.storage.postgres).await?;

	if let Command::Schema = args.command {
		db.ensure_schema(config.storage.vectors.dim).await?;

		tracing::info!(dim = config.storage.vectors.dim, "Schema is ready.");

		return Ok(());
	}

	let service = MemoryService::new(
		config,
		Arc::new(PgVectorStore::new(db.clone())),
		Arc::new(PgCacheStore::new(db)),
	);

	let prune_after = args.command.fills_embedding_cache();

	run_command(&service, args.command).await?;

	if prune_after {
		prune_embedding_cache(&service).await;
	}

	Ok(())
}

async fn run_command(service: &MemoryService, command: Command) -> color_eyre::Result<()> {
	match command {
		Command::Schema => Ok(()),
		Command::Add { scope, message, no_infer, metadata } => {
			let metadata = match metadata {
				Some(raw) => serde_json::from_str::<Map<String, Value>>(&raw)
					.map_err(|err| eyre::eyre!("--metadata must be a JSON object: {err}"))?,
				None => Map::new(),
			};
			let req = AddRequest {
				messages: message.into_iter().map(Message::user).collect(),
				message: None,
				scope: scope.into(),
				metadata,
				infer: Some(!no_infer),
			};

			print_json(&service.add(req).await?)
		},
		Command::Search {
			scope,
			query,
			limit,
			mmr,
			mmr_lambda,
			overfetch_ratio,
			decay,
			half_life_days,
		} => {
			let req = SearchRequest {
				query,
				scope: scope.into(),
				limit,
				use_mmr: mmr,
				mmr_lambda,
				overfetch_ratio,
				use_temporal_decay: decay,
				decay_half_life_days: half_life_days,
			};

			print_json(&service.search(req).await?)
		},
		Command::Compact { scope, ratio, target_count, decay_days } => {
			let req = CompactRequest { scope: scope.into(), ratio, target_count, decay_days };

			print_json(&service.compact(req).await?)
		},
		Command::List { scope, limit } =>
			print_json(&service.list(ListRequest { scope: scope.into(), limit }).await?),
		Command::Usage { scope } => print_json(&service.usage(&scope.into()).await?),
		Command::Update { id, text } => print_json(&service.update(id, &text).await?),
		Command::Delete { id } => {
			service.delete(id).await?;

			print_json(&Deleted { deleted: 1 })
		},
		Command::DeleteAll { scope } =>
			print_json(&Deleted { deleted: service.delete_all(&scope.into()).await? }),
		Command::DetectLanguage { text } => {
			let language = service.language.detect_language(&text).await?;

			print_json(&Language { language })
		},
		Command::PruneCache => {
			let cache = service
				.cache
				.as_ref()
				.ok_or_else(|| eyre::eyre!("The embedding cache is disabled."))?;
			let emb = &service.cfg.providers.embedding;
			let removed = cache.prune(&emb.provider_id, &emb.model).await?;

			print_json(&Deleted { deleted: removed })
		},
	}
}

/// Eviction failures do not fail a command whose work already succeeded.
async fn prune_embedding_cache(service: &MemoryService) {
	let Some(cache) = service.cache.as_ref() else {
		return;
	};
	let emb = &service.cfg.providers.embedding;

	match cache.prune(&emb.provider_id, &emb.model).await {
		Ok(0) => {},
		Ok(removed) => tracing::info!(removed, "Embedding cache pruned."),
		Err(err) => tracing::warn!(error = %err, "Embedding cache pruning failed."),
	}
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: Serialize,
{
	let json = serde_json::to_string_pretty(value)?;

	println!("{json}");

	Ok(())
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn add_command_parses_scope_and_messages() {
		let args = Args::try_parse_from([
			"mnem-ctl",
			"-c",
			"mnem.toml",
			"add",
			"--bot-id",
			"b1",
			"-m",
			"Hi, I'm John.",
			"-m",
			"I live in Berlin.",
			"--no-infer",
		])
		.expect("Failed to parse arguments.");

		match args.command {
			Command::Add { scope, message, no_infer, metadata } => {
				assert_eq!(OwnerScope::from(scope), OwnerScope::bot("b1"));
				assert_eq!(message.len(), 2);
				assert!(no_infer);
				assert!(metadata.is_none());
			},
			other => panic!("Unexpected command: {other:?}"),
		}
	}

	#[test]
	fn embedding_commands_prune_the_cache_inline() {
		let parse = |argv: &[&str]| {
			let mut full = vec!["mnem-ctl", "-c", "mnem.toml"];

			full.extend_from_slice(argv);

			Args::try_parse_from(full).expect("Failed to parse arguments.").command
		};

		assert!(parse(&["add", "--bot-id", "b1", "-m", "Likes tea"]).fills_embedding_cache());
		assert!(parse(&["search", "--bot-id", "b1", "--query", "tea"]).fills_embedding_cache());
		assert!(parse(&["compact", "--bot-id", "b1"]).fills_embedding_cache());
		assert!(!parse(&["list", "--bot-id", "b1"]).fills_embedding_cache());
		assert!(!parse(&["prune-cache"]).fills_embedding_cache());
	}

	#[test]
	fn add_requires_a_message() {
		let parsed = Args::try_parse_from(["mnem-ctl", "-c", "mnem.toml", "add", "--bot-id", "b1"]);

		assert!(parsed.is_err());
	}
}
