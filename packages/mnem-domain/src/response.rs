//! Cleanup shared by every judge response parser.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::ParseError;

static THINK_BLOCK: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").ok());
static CODE_FENCE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").ok());

/// Removes reasoning blocks and unwraps the first Markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> String {
	let mut text = raw.trim().to_string();

	if let Some(re) = THINK_BLOCK.as_ref() {
		text = re.replace_all(&text, "").trim().to_string();
	}
	if let Some(inner) = CODE_FENCE
		.as_ref()
		.and_then(|re| re.captures(&text))
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str().trim().to_string())
	{
		return inner;
	}

	text
}

pub(crate) fn parse_json(raw: &str, what: &str) -> Result<Value, ParseError> {
	let cleaned = strip_code_fences(raw);

	serde_json::from_str(&cleaned)
		.map_err(|err| ParseError::new(format!("{what} is not valid JSON: {err}."), raw))
}

/// Reads a scalar the judge may emit as either a string or a number.
pub(crate) fn scalar_string(value: Option<&Value>) -> Option<String> {
	let text = match value? {
		Value::String(text) => text.trim().to_string(),
		Value::Number(number) =>
			if let Some(int) = number.as_i64() {
				int.to_string()
			} else if let Some(int) = number.as_u64() {
				int.to_string()
			} else {
				let float = number.as_f64()?;

				if float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
					(float as i64).to_string()
				} else {
					float.to_string()
				}
			},
		_ => return None,
	};

	if text.is_empty() { None } else { Some(text) }
}
