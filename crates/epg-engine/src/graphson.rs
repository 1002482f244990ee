//! Untyping of GraphSON v3 values.
//!
//! The engine wraps every value in `{"@type": .., "@value": ..}` envelopes
//! and encodes maps as flat key/value lists. The detectors work on plain
//! JSON, so responses are flattened before they leave the client: envelopes
//! are unwrapped recursively and `g:Map` pair lists become JSON objects.

use serde_json::{Map, Value};

/// Recursively strips GraphSON type envelopes from a value.
pub fn untype(value: Value) -> Value {
	match value {
		Value::Object(object) => untype_object(object),
		Value::Array(items) => Value::Array(items.into_iter().map(untype).collect()),
		other => other,
	}
}

fn untype_object(object: Map<String, Value>) -> Value {
	let is_envelope = object.contains_key("@type") && object.contains_key("@value");
	if !is_envelope {
		return Value::Object(
			object
				.into_iter()
				.map(|(k, v)| (k, untype(v)))
				.collect(),
		);
	}

	let type_name = object
		.get("@type")
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string();
	let inner = object
		.into_iter()
		.find(|(k, _)| k == "@value")
		.map(|(_, v)| v)
		.unwrap_or(Value::Null);

	match type_name.as_str() {
		"g:Map" => untype_map(inner),
		"g:List" | "g:Set" => untype(inner),
		_ => untype(inner),
	}
}

/// Folds a `g:Map` pair list into a JSON object.
///
/// Map keys may themselves be envelopes (`g:T` tokens like `id`/`label`);
/// non-string keys are rendered through their JSON form so nothing is lost.
fn untype_map(inner: Value) -> Value {
	let items = match inner {
		Value::Array(items) => items,
		other => return untype(other),
	};

	let mut object = Map::new();
	let mut pairs = items.into_iter();
	while let Some(raw_key) = pairs.next() {
		let raw_value = pairs.next().unwrap_or(Value::Null);
		let key = match untype(raw_key) {
			Value::String(s) => s,
			other => other.to_string(),
		};
		object.insert(key, untype(raw_value));
	}
	Value::Object(object)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_scalars_pass_through() {
		assert_eq!(untype(json!("0xabc")), json!("0xabc"));
		assert_eq!(untype(json!(true)), json!(true));
		assert_eq!(untype(json!(null)), json!(null));
	}

	#[test]
	fn test_numeric_envelopes_unwrap() {
		assert_eq!(untype(json!({"@type": "g:Int64", "@value": 42})), json!(42));
		assert_eq!(
			untype(json!({"@type": "g:Double", "@value": 1.5})),
			json!(1.5)
		);
	}

	#[test]
	fn test_list_envelope_unwraps_recursively() {
		let value = json!({
			"@type": "g:List",
			"@value": [{"@type": "g:Int32", "@value": 7}, "x"]
		});
		assert_eq!(untype(value), json!([7, "x"]));
	}

	#[test]
	fn test_map_pairs_become_object() {
		let value = json!({
			"@type": "g:Map",
			"@value": [
				"dcfgId", "0:1-4-0",
				{"@type": "g:T", "@value": "label"}, "dcfg",
				"pc", {"@type": "g:Int64", "@value": 17},
			]
		});
		assert_eq!(
			untype(value),
			json!({"dcfgId": "0:1-4-0", "label": "dcfg", "pc": 17})
		);
	}

	#[test]
	fn test_nested_select_result() {
		// Shape of one record from an eight-way select(..).by(elementMap()).
		let value = json!({
			"@type": "g:Map",
			"@value": [
				"victim_flow_dcfg",
				{"@type": "g:Map", "@value": ["dcfgId", "0:1-4-0"]},
				"state_change_dcfg",
				{"@type": "g:Map", "@value": ["dcfgId", "0-9-2"]},
			]
		});
		assert_eq!(
			untype(value),
			json!({
				"victim_flow_dcfg": {"dcfgId": "0:1-4-0"},
				"state_change_dcfg": {"dcfgId": "0-9-2"},
			})
		);
	}
}
