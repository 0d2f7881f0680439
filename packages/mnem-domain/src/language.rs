use serde::Deserialize;

use crate::{ParseError, response};

/// Language codes the lexical pipeline can handle.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
	"ar", "bg", "ca", "cjk", "ckb", "da", "de", "el", "en", "es", "eu", "fa", "fi", "fr", "ga", "gl",
	"hi", "hr", "hu", "hy", "id", "in", "it", "nl", "no", "pl", "pt", "ro", "ru", "sv", "tr",
];

#[derive(Deserialize)]
struct LanguageAnswer {
	language: String,
}

pub fn is_supported_language(code: &str) -> bool {
	let code = code.trim().to_ascii_lowercase();

	SUPPORTED_LANGUAGES.contains(&code.as_str())
}

/// Parses `{"language": "<code>"}` and returns the lower-cased code.
pub fn parse_language_response(raw: &str) -> Result<String, ParseError> {
	let value = response::parse_json(raw, "Language response")?;
	let answer: LanguageAnswer = serde_json::from_value(value).map_err(|err| {
		ParseError::new(format!("Language response is missing a language code: {err}."), raw)
	})?;
	let code = answer.language.trim().to_ascii_lowercase();

	if !is_supported_language(&code) {
		return Err(ParseError::new(format!("Unsupported language code {code:?}."), raw));
	}

	Ok(code)
}
