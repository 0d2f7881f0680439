use serde::Deserialize;

use crate::{ParseError, memory::Message, response};

#[derive(Deserialize)]
struct FactList {
	facts: Vec<String>,
}

/// Parses a `{"facts": [...]}` response. Blank facts are dropped after trimming.
pub fn parse_fact_list(raw: &str) -> Result<Vec<String>, ParseError> {
	let value = response::parse_json(raw, "Fact response")?;
	let list: FactList = serde_json::from_value(value).map_err(|err| {
		ParseError::new(format!("Fact response does not match {{\"facts\": [string]}}: {err}."), raw)
	})?;

	Ok(list
		.facts
		.into_iter()
		.map(|fact| fact.trim().to_string())
		.filter(|fact| !fact.is_empty())
		.collect())
}

/// Renders a conversation as `role: content` lines.
pub fn format_messages(messages: &[Message]) -> String {
	messages
		.iter()
		.map(|message| format!("{}: {}", message.role.trim(), message.content.trim()))
		.collect::<Vec<_>>()
		.join("\n")
}
