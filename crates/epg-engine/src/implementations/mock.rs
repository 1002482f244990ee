//! Scripted graph client for tests.
//!
//! The mock matches submitted scripts against substring rules and replays
//! canned responses. Rules may be scoped to the graph currently resident in
//! the mock engine, which it tracks by intercepting `io(..).read()`
//! scripts; that lets one mock serve different fixture graphs across a
//! cache-backed run. Every executed script is recorded so tests can assert
//! on engine traffic.

use crate::{GraphClient, GraphClientError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Canned response for one rule.
#[derive(Debug, Clone)]
pub enum MockResponse {
	Values(Vec<Value>),
	Timeout,
	Error(String),
}

struct Rule {
	/// Applies only while the imported graph name contains this key.
	graph: Option<String>,
	needle: String,
	response: MockResponse,
}

/// Graph client replaying scripted responses.
pub struct MockGraphClient {
	endpoint: String,
	rules: Mutex<Vec<Rule>>,
	scripts: Mutex<Vec<String>>,
	current_graph: Mutex<Option<String>>,
}

impl MockGraphClient {
	pub fn new() -> Self {
		Self {
			endpoint: "mock://engine".to_string(),
			rules: Mutex::new(Vec::new()),
			scripts: Mutex::new(Vec::new()),
			current_graph: Mutex::new(None),
		}
	}

	/// Registers a rule matching any script containing `needle`.
	pub fn when(&self, needle: &str, response: MockResponse) {
		self.rules.lock().unwrap().push(Rule {
			graph: None,
			needle: needle.to_string(),
			response,
		});
	}

	/// Registers a rule active only while a graph whose imported file name
	/// contains `graph_key` is resident.
	pub fn when_graph(&self, graph_key: &str, needle: &str, response: MockResponse) {
		self.rules.lock().unwrap().push(Rule {
			graph: Some(graph_key.to_string()),
			needle: needle.to_string(),
			response,
		});
	}

	/// All scripts executed so far, in order.
	pub fn executed_scripts(&self) -> Vec<String> {
		self.scripts.lock().unwrap().clone()
	}

	fn respond(&self, script: &str) -> Result<Vec<Value>, GraphClientError> {
		let current = self.current_graph.lock().unwrap().clone();
		let rules = self.rules.lock().unwrap();
		for rule in rules.iter() {
			if let Some(graph) = &rule.graph {
				let resident = current
					.as_deref()
					.map(|g| g.contains(graph.as_str()))
					.unwrap_or(false);
				if !resident {
					continue;
				}
			}
			if !script.contains(&rule.needle) {
				continue;
			}
			return match &rule.response {
				MockResponse::Values(values) => Ok(values.clone()),
				MockResponse::Timeout => Err(GraphClientError::Timeout),
				MockResponse::Error(message) => {
					Err(GraphClientError::Server(message.clone()))
				}
			};
		}
		// Unmatched count-terminated scripts read as empty engines,
		// everything else as an empty result set.
		if script.ends_with(".count()") {
			return Ok(vec![json!(0)]);
		}
		Ok(Vec::new())
	}
}

impl Default for MockGraphClient {
	fn default() -> Self {
		Self::new()
	}
}

/// Cloneable view over a shared mock.
///
/// A handle consumes its client, so tests hand it a `SharedMock` and keep
/// the underlying [`MockGraphClient`] for rule registration and script
/// inspection.
pub struct SharedMock(pub Arc<MockGraphClient>);

#[async_trait]
impl GraphClient for SharedMock {
	async fn execute(&self, script: &str) -> Result<Vec<Value>, GraphClientError> {
		self.0.execute(script).await
	}

	fn endpoint(&self) -> &str {
		self.0.endpoint()
	}
}

#[async_trait]
impl GraphClient for MockGraphClient {
	async fn execute(&self, script: &str) -> Result<Vec<Value>, GraphClientError> {
		self.scripts.lock().unwrap().push(script.to_string());
		if script.contains(".io(") {
			if script.contains(".read()") {
				*self.current_graph.lock().unwrap() = Some(script.to_string());
			}
			return Ok(Vec::new());
		}
		if script.contains(".drop()") {
			*self.current_graph.lock().unwrap() = None;
			return Ok(Vec::new());
		}
		self.respond(script)
	}

	fn endpoint(&self) -> &str {
		&self.endpoint
	}
}
