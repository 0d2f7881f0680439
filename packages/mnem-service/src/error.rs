use mnem_domain::ParseError;

use crate::ingest::ApplyReport;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid input: {message}")]
	InvalidInput { message: String },
	#[error("Judge unavailable: {message}")]
	JudgeUnavailable { message: String },
	#[error("Fact extraction failed: {source}")]
	ExtractionFailed { source: ParseError },
	#[error("Merge decision failed: {source}")]
	DecisionFailed { source: ParseError },
	#[error("Compaction failed: {source}")]
	CompactionFailed { source: ParseError },
	#[error("Embedding cache degraded: {message}")]
	CacheDegraded { message: String },
	#[error("Embedding error: {message}")]
	Embedding { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("All {} decision actions failed.", .report.failed.len())]
	ApplyFailed { report: ApplyReport },
}
impl Error {
	pub(crate) fn invalid(message: impl Into<String>) -> Self {
		Self::InvalidInput { message: message.into() }
	}
}

impl From<mnem_storage::Error> for Error {
	fn from(err: mnem_storage::Error) -> Self {
		match err {
			mnem_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			mnem_storage::Error::InvalidArgument(message) => Self::InvalidInput { message },
		}
	}
}
