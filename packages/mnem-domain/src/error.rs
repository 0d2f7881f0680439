const RAW_PREFIX_CHARS: usize = 200;

/// A judge response that could not be turned into the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} Response prefix: {raw_prefix:?}.")]
pub struct ParseError {
	pub message: String,
	/// Leading slice of the raw response, kept for operator diagnosis.
	pub raw_prefix: String,
}
impl ParseError {
	pub fn new(message: impl Into<String>, raw: &str) -> Self {
		Self { message: message.into(), raw_prefix: truncate_chars(raw, RAW_PREFIX_CHARS) }
	}
}

pub(crate) fn truncate_chars(raw: &str, max_chars: usize) -> String {
	match raw.char_indices().nth(max_chars) {
		Some((byte_idx, _)) => raw[..byte_idx].to_string(),
		None => raw.to_string(),
	}
}
