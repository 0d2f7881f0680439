use mnem_domain::{facts, memory::Message};

use crate::{Error, Judge, Result};

const EXTRACTION_PROMPT: &str = "You are a personal information organizer. \
Extract durable facts about the user from the conversation: identity, preferences, plans, \
relationships, locations, and other details worth remembering across sessions. \
Each fact must be one short, self-contained statement in the language the user wrote in. \
Skip greetings, small talk, and anything the assistant said that the user did not confirm. \
Respond with a JSON object of the form {\"facts\": [\"...\"]}. \
Return {\"facts\": []} when nothing is worth remembering.";

pub struct FactExtractor {
	judge: Judge,
}
impl FactExtractor {
	pub fn new(judge: Judge) -> Self {
		Self { judge }
	}

	/// Extracts candidate facts from a conversation. One judge call, no retry.
	pub async fn extract(&self, messages: &[Message]) -> Result<Vec<String>> {
		if messages.is_empty() {
			return Err(Error::invalid("Fact extraction needs at least one message."));
		}

		let prompt = build_extraction_messages(messages);
		let raw = self.judge.complete(&prompt).await?;
		let facts = facts::parse_fact_list(&raw).map_err(|source| {
			tracing::warn!(
				error = %source.message,
				content_prefix = %source.raw_prefix,
				"Fact extraction response could not be parsed."
			);

			Error::ExtractionFailed { source }
		})?;

		tracing::info!(facts = facts.len(), "Fact extraction completed.");

		Ok(facts)
	}
}

pub fn build_extraction_messages(messages: &[Message]) -> Vec<Message> {
	vec![
		Message::new("system", EXTRACTION_PROMPT),
		Message::user(format!(
			"Extract facts from this conversation:\n{}",
			facts::format_messages(messages)
		)),
	]
}
