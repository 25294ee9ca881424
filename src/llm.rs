use std::{fmt, future::Future};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Why a completion request produced no answer
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
	#[error("completion service returned {status}: {body}")]
	Status { status: StatusCode, body: String },
	#[error("request to completion service failed: {0}")]
	Transport(#[from] reqwest::Error),
	#[error("malformed completion response: {0}")]
	Malformed(String),
}

/// A remote service turning a prompt into one textual reply
pub trait CompletionService: Send + Sync + 'static {
	/// Exactly one attempt; the reply comes back trimmed
	fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, CompletionError>> + Send;
}

/// Build the prompt asking for only the correct option's text
pub fn build_prompt<S: AsRef<str>>(question: &str, options: &[S]) -> String {
	let options = options.iter().map(|o| o.as_ref()).collect::<Vec<_>>().join(", ");
	format!("Question: {question},options is:{options} Return only correct option")
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
	model: &'a str,
	messages: Vec<ChatMessage<'a>>,
	temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
	role: &'static str,
	content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
	#[serde(default)]
	choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
	message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
	content: Option<String>,
}

/// Azure-OpenAI style chat completions endpoint authenticated with an `api-key` header
#[derive(Clone)]
pub struct AzureCompletion {
	http: Client,
	endpoint: String,
	api_key: String,
	model: String,
	temperature: f32,
}

impl AzureCompletion {
	pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
		Self {
			http: Client::new(),
			endpoint: endpoint.into(),
			api_key: api_key.into(),
			model: model.into(),
			temperature,
		}
	}

	pub fn from_config(config: &AppConfig) -> Self {
		Self::new(config.endpoint.clone(), config.api_key.clone(), config.model.clone(), config.temperature)
	}
}

impl fmt::Debug for AzureCompletion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AzureCompletion")
			.field("endpoint", &self.endpoint)
			.field("api_key", &"<redacted>")
			.field("model", &self.model)
			.field("temperature", &self.temperature)
			.finish()
	}
}

impl CompletionService for AzureCompletion {
	async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
		let body = ChatRequest {
			model: &self.model,
			messages: vec![ChatMessage { role: "user", content: prompt }],
			temperature: self.temperature,
		};

		let response = self.http.post(&self.endpoint).header("api-key", &self.api_key).json(&body).send().await?;
		let status = response.status();
		let payload = response.text().await?;
		if !status.is_success() {
			return Err(CompletionError::Status { status, body: payload });
		}

		tracing::debug!("Completion raw response: {}", payload);

		let parsed: ChatResponse = serde_json::from_str(&payload).map_err(|e| CompletionError::Malformed(format!("{e} - raw: '{payload}'")))?;
		let content = parsed
			.choices
			.into_iter()
			.next()
			.and_then(|choice| choice.message)
			.and_then(|message| message.content)
			.ok_or_else(|| CompletionError::Malformed("no message content in first choice".to_string()))?;

		Ok(content.trim().to_string())
	}
}
