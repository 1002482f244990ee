//! HTTP implementation of the graph query client.
//!
//! Submits traversal scripts to a Gremlin-server-compatible HTTP endpoint
//! and flattens the GraphSON response into plain JSON values.

use crate::graphson;
use crate::{GraphClient, GraphClientError};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Gremlin server status code for a query that hit its evaluation deadline.
const STATUS_SERVER_TIMEOUT: u16 = 598;

/// HTTP graph query client bound to one engine endpoint.
pub struct HttpGraphClient {
	endpoint: String,
	http: reqwest::Client,
}

impl HttpGraphClient {
	pub fn new(endpoint: String) -> Self {
		Self {
			endpoint,
			http: reqwest::Client::new(),
		}
	}

	fn status_message(body: &Value) -> &str {
		body.get("status")
			.and_then(|s| s.get("message"))
			.and_then(Value::as_str)
			.unwrap_or_default()
	}
}

#[async_trait]
impl GraphClient for HttpGraphClient {
	async fn execute(&self, script: &str) -> Result<Vec<Value>, GraphClientError> {
		let response = self
			.http
			.post(&self.endpoint)
			.json(&json!({ "gremlin": script }))
			.send()
			.await
			.map_err(|e| GraphClientError::Network(e.to_string()))?;

		let status = response.status();
		let body: Value = response
			.json()
			.await
			.map_err(|e| GraphClientError::Protocol(e.to_string()))?;

		if !status.is_success() {
			let message = Self::status_message(&body);
			if status.as_u16() == STATUS_SERVER_TIMEOUT
				|| message.contains("evaluationTimeout")
				|| message.contains("timed out")
			{
				return Err(GraphClientError::Timeout);
			}
			return Err(GraphClientError::Server(format!(
				"{}: {}",
				status, message
			)));
		}

		let data = body
			.get("result")
			.and_then(|r| r.get("data"))
			.cloned()
			.unwrap_or(Value::Null);

		match graphson::untype(data) {
			Value::Array(values) => Ok(values),
			Value::Null => Ok(Vec::new()),
			other => Err(GraphClientError::Protocol(format!(
				"expected a result list, got {}",
				other
			))),
		}
	}

	fn endpoint(&self) -> &str {
		&self.endpoint
	}
}

/// Factory function to create an HTTP client for one endpoint.
pub fn create_http_client(endpoint: &str) -> Box<dyn GraphClient> {
	Box::new(HttpGraphClient::new(endpoint.to_string()))
}
