//! Merge decisions returned by the judge.
//!
//! Judges answer in several JSON shapes. [`parse_decision_response`] classifies the payload
//! into one [`RecordShape`], flattens it into records, and normalizes each record into a
//! [`DecisionAction`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
	ParseError,
	response::{self, scalar_string},
};

const WHAT: &str = "Decision response";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionEvent {
	Add,
	Update,
	Delete,
	None,
}
impl DecisionEvent {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Add => "ADD",
			Self::Update => "UPDATE",
			Self::Delete => "DELETE",
			Self::None => "NONE",
		}
	}

	fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_uppercase().as_str() {
			"ADD" => Some(Self::Add),
			"UPDATE" => Some(Self::Update),
			"DELETE" => Some(Self::Delete),
			"NONE" => Some(Self::None),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionAction {
	pub event: DecisionEvent,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub old_memory: Option<String>,
}
impl DecisionAction {
	pub fn add(text: impl Into<String>) -> Self {
		Self { event: DecisionEvent::Add, id: None, text: Some(text.into()), old_memory: None }
	}

	pub fn update(id: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			event: DecisionEvent::Update,
			id: Some(id.into()),
			text: Some(text.into()),
			old_memory: None,
		}
	}

	pub fn delete(id: impl Into<String>) -> Self {
		Self { event: DecisionEvent::Delete, id: Some(id.into()), text: None, old_memory: None }
	}
}

/// Payload classification before records are normalized.
#[derive(Debug, PartialEq)]
pub enum RecordShape {
	/// A JSON array; only its object elements are records.
	Records(Vec<Value>),
	/// One object carrying `text`, `fact` or `event`.
	SingleRecord(Map<String, Value>),
	/// An object keyed by arbitrary labels whose object values are records.
	RecordMap(Map<String, Value>),
}
impl RecordShape {
	pub fn classify_object(map: Map<String, Value>) -> Self {
		if ["text", "fact", "event"].iter().any(|key| map.contains_key(*key)) {
			Self::SingleRecord(map)
		} else {
			Self::RecordMap(map)
		}
	}

	/// Record objects in payload order. `None` for a non-empty map with no object values.
	pub fn into_records(self) -> Option<Vec<Map<String, Value>>> {
		match self {
			Self::Records(items) => Some(
				items
					.into_iter()
					.filter_map(|item| match item {
						Value::Object(map) => Some(map),
						_ => None,
					})
					.collect(),
			),
			Self::SingleRecord(map) => Some(vec![map]),
			Self::RecordMap(map) => {
				let was_empty = map.is_empty();
				let records: Vec<_> = map
					.into_iter()
					.filter_map(|(_, value)| match value {
						Value::Object(record) => Some(record),
						_ => None,
					})
					.collect();

				if records.is_empty() && !was_empty { None } else { Some(records) }
			},
		}
	}
}

/// Locates the record payload inside a parsed response.
pub fn classify_payload(value: Value, raw: &str) -> Result<RecordShape, ParseError> {
	match value {
		Value::Array(items) => Ok(RecordShape::Records(items)),
		Value::Object(mut map) => match map.remove("memory") {
			Some(Value::Array(items)) => Ok(RecordShape::Records(items)),
			Some(Value::Object(inner)) => Ok(RecordShape::classify_object(inner)),
			Some(other) => Err(ParseError::new(
				format!("{WHAT} has a \"memory\" value of unsupported type {}.", json_kind(&other)),
				raw,
			)),
			None => {
				if map.is_empty() {
					return Err(ParseError::new(
						format!("{WHAT} is an empty object without \"memory\"."),
						raw,
					));
				}

				Ok(RecordShape::classify_object(map))
			},
		},
		other => Err(ParseError::new(
			format!("{WHAT} must be a JSON object or array, got {}.", json_kind(&other)),
			raw,
		)),
	}
}

/// Normalizes one record. `Ok(None)` marks a record that is dropped on purpose.
pub fn normalize_record(
	record: &Map<String, Value>,
	raw: &str,
) -> Result<Option<DecisionAction>, ParseError> {
	let event = match record.get("event") {
		None | Some(Value::Null) => DecisionEvent::Add,
		Some(Value::String(tag)) if tag.trim().is_empty() => DecisionEvent::Add,
		Some(Value::String(tag)) => DecisionEvent::parse(tag).ok_or_else(|| {
			ParseError::new(format!("{WHAT} has unknown event {:?}.", tag.trim()), raw)
		})?,
		Some(other) => {
			return Err(ParseError::new(
				format!("{WHAT} has an event of type {}.", json_kind(other)),
				raw,
			));
		},
	};

	if event == DecisionEvent::None {
		return Ok(None);
	}

	let text = scalar_string(record.get("text")).or_else(|| scalar_string(record.get("fact")));
	let id = scalar_string(record.get("id"));
	let old_memory = scalar_string(record.get("old_memory"));

	match event {
		DecisionEvent::Add | DecisionEvent::Update if text.is_none() => Ok(None),
		DecisionEvent::Update | DecisionEvent::Delete if id.is_none() => Err(ParseError::new(
			format!("{WHAT} has a {} action without an id.", event.as_str()),
			raw,
		)),
		_ => Ok(Some(DecisionAction { event, id, text, old_memory })),
	}
}

/// Parses raw judge output into merge actions, NONE actions removed, in payload order.
pub fn parse_decision_response(raw: &str) -> Result<Vec<DecisionAction>, ParseError> {
	let value = response::parse_json(raw, WHAT)?;
	let shape = classify_payload(value, raw)?;
	let records = shape.into_records().ok_or_else(|| {
		ParseError::new(format!("{WHAT} map contains no record objects."), raw)
	})?;
	let mut actions = Vec::with_capacity(records.len());

	for record in &records {
		if let Some(action) = normalize_record(record, raw)? {
			actions.push(action);
		}
	}

	Ok(actions)
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn object(value: Value) -> Map<String, Value> {
		match value {
			Value::Object(map) => map,
			_ => panic!("Expected a JSON object."),
		}
	}

	#[test]
	fn classify_single_record_by_marker_keys() {
		for key in ["text", "fact", "event"] {
			let mut map = Map::new();

			map.insert(key.to_string(), Value::String("x".to_string()));

			assert!(matches!(RecordShape::classify_object(map), RecordShape::SingleRecord(_)));
		}

		let map = object(serde_json::json!({ "a": { "text": "x" } }));

		assert!(matches!(RecordShape::classify_object(map), RecordShape::RecordMap(_)));
	}

	#[test]
	fn records_skip_non_object_elements() {
		let shape = RecordShape::Records(vec![
			serde_json::json!("stray"),
			serde_json::json!({ "text": "kept" }),
			serde_json::json!(3),
		]);
		let records = shape.into_records().expect("Expected records.");

		assert_eq!(records.len(), 1);
	}

	#[test]
	fn record_map_without_objects_is_rejected() {
		let shape = RecordShape::RecordMap(object(serde_json::json!({ "a": 1, "b": "x" })));

		assert!(shape.into_records().is_none());
		assert_eq!(RecordShape::RecordMap(Map::new()).into_records(), Some(Vec::new()));
	}

	#[test]
	fn missing_event_defaults_to_add_and_fact_backs_text() {
		let record = object(serde_json::json!({ "fact": "Likes tea" }));
		let action = normalize_record(&record, "").expect("parse failed").expect("dropped");

		assert_eq!(action, DecisionAction::add("Likes tea"));
	}

	#[test]
	fn numeric_ids_are_stringified() {
		let record = object(serde_json::json!({ "event": "delete", "id": 42 }));
		let action = normalize_record(&record, "").expect("parse failed").expect("dropped");

		assert_eq!(action, DecisionAction::delete("42"));
	}

	#[test]
	fn update_without_id_fails() {
		let record = object(serde_json::json!({ "event": "UPDATE", "text": "x" }));

		assert!(normalize_record(&record, "").is_err());
	}

	#[test]
	fn add_with_blank_text_is_dropped() {
		let record = object(serde_json::json!({ "event": "ADD", "text": "   " }));

		assert_eq!(normalize_record(&record, "").expect("parse failed"), None);
	}
}
