/// Selector for the poll's question heading
pub const QUESTION_SELECTOR: &str = r#"h2[data-testid="question-title"]"#;
/// Selector for the clickable option paragraphs
pub const OPTION_SELECTOR: &str = "p.py-4.wrapchoices.pr-4";
/// Completion endpoint; replace before deploying or pass `--endpoint`
pub const ENDPOINT: &str = "https://vevox.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-02-15-preview";
/// Access key sent in the `api-key` header; replace before deploying or pass `--api-key`
pub const API_KEY: &str = "Your Azure Api";
pub const MODEL: &str = "gpt-4o-mini";
pub const TEMPERATURE: f32 = 0.7;
/// Name of the runtime binding the page-side observer calls once per mutation batch
pub const MUTATION_BINDING: &str = "__pollMutationBurst";

#[derive(Clone, Debug)]
pub struct AppConfig {
	pub question_selector: String,
	pub option_selector: String,
	pub endpoint: String,
	/// Never logged
	pub api_key: String,
	pub model: String,
	pub temperature: f32,
	pub mutation_binding: String,
	/// Drop replies that arrive after a newer question has been admitted (default: true)
	pub discard_stale_replies: bool,
	/// Run with visible browser window (non-headless mode)
	pub visible: bool,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			question_selector: QUESTION_SELECTOR.to_string(),
			option_selector: OPTION_SELECTOR.to_string(),
			endpoint: ENDPOINT.to_string(),
			api_key: API_KEY.to_string(),
			model: MODEL.to_string(),
			temperature: TEMPERATURE,
			mutation_binding: MUTATION_BINDING.to_string(),
			discard_stale_replies: true,
			visible: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_the_compiled_constants() {
		let config = AppConfig::default();
		assert_eq!(config.question_selector, QUESTION_SELECTOR);
		assert_eq!(config.option_selector, OPTION_SELECTOR);
		assert_eq!(config.endpoint, ENDPOINT);
		assert_eq!(config.mutation_binding, MUTATION_BINDING);
		assert_eq!(config.model, "gpt-4o-mini");
		assert_eq!(config.temperature, 0.7);
		assert!(config.discard_stale_replies);
		assert!(!config.visible);
	}

	#[test]
	fn struct_update_keeps_remaining_defaults() {
		let config = AppConfig {
			model: "gpt-4o".to_string(),
			discard_stale_replies: false,
			..AppConfig::default()
		};
		assert_eq!(config.model, "gpt-4o");
		assert!(!config.discard_stale_replies);
		assert_eq!(config.endpoint, ENDPOINT);
		assert_eq!(config.api_key, API_KEY);
	}
}
