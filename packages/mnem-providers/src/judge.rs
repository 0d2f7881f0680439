//! Chat-completions client used as the judge.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use mnem_domain::memory::Message;

use crate::{Error, Result};

/// Sends one chat request and returns the first choice's message content.
///
/// Requests are deterministic (`temperature = 0`) and, when `json_mode` is set, ask for a JSON
/// object. There is no retry; the caller decides what a failure means.
pub async fn chat(cfg: &mnem_config::LlmProviderConfig, messages: &[Message]) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = crate::endpoint(&cfg.api_base, &cfg.path);
	let body = build_request_body(cfg, messages);
	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await
		.inspect_err(|err| {
			tracing::warn!(
				error = %err,
				url = %url,
				model = %cfg.model,
				"Judge request failed."
			);
		})?;
	let status = res.status();

	if !status.is_success() {
		tracing::warn!(%status, url = %url, model = %cfg.model, "Judge returned an error status.");
	}

	let json: Value = res.error_for_status()?.json().await?;

	parse_chat_content(&json).inspect_err(|err| {
		tracing::warn!(error = %err, model = %cfg.model, "Judge response has no usable content.");
	})
}

pub fn build_request_body(cfg: &mnem_config::LlmProviderConfig, messages: &[Message]) -> Value {
	let messages =
		if cfg.fold_system_messages { merge_system_messages(messages) } else { messages.to_vec() };
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": 0,
		"messages": messages,
	});

	if cfg.json_mode {
		body["response_format"] = serde_json::json!({ "type": "json_object" });
	}

	body
}

/// Folds system messages into the leading user message, synthesizing one when the
/// conversation does not start with a user turn.
pub fn merge_system_messages(messages: &[Message]) -> Vec<Message> {
	let system: Vec<&str> = messages
		.iter()
		.filter(|message| message.role == "system")
		.map(|message| message.content.as_str())
		.collect();
	let mut rest: Vec<Message> =
		messages.iter().filter(|message| message.role != "system").cloned().collect();

	if system.is_empty() {
		return rest;
	}

	let prefix = system.join("\n");

	if rest.first().is_some_and(|first| first.role == "user") {
		rest[0].content = format!("{prefix}\n\n{}", rest[0].content);
	} else {
		rest.insert(0, Message::user(prefix));
	}

	rest
}

fn parse_chat_content(json: &Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Chat response is missing choices[0].message.content.".to_string(),
		})?;

	if content.trim().is_empty() {
		return Err(Error::InvalidResponse { message: "Chat response content is empty.".to_string() });
	}

	Ok(content.to_string())
}
