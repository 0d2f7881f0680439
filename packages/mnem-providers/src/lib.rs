//! OpenAI-compatible HTTP clients for the judge and the embedding provider.

pub mod embedding;
pub mod judge;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	if api_key.trim().is_empty() {
		return Err(Error::InvalidConfig { message: "Provider api_key is required.".to_string() });
	}

	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

pub(crate) fn endpoint(api_base: &str, path: &str) -> String {
	format!("{}{}", api_base.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_non_string_default_headers() {
		let mut extra = Map::new();

		extra.insert("x-team".to_string(), Value::from(7));

		assert!(matches!(auth_headers("key", &extra), Err(Error::InvalidConfig { .. })));
	}

	#[test]
	fn rejects_blank_api_key() {
		assert!(auth_headers("  ", &Map::new()).is_err());
	}

	#[test]
	fn endpoint_joins_without_double_slash() {
		assert_eq!(endpoint("http://llm/v1/", "/chat/completions"), "http://llm/v1/chat/completions");
	}
}
