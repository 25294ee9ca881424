//! Host page access: reading the poll and clicking options

use std::future::Future;

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};

use crate::{MatchedOption, PollSnapshot, config::AppConfig};

/// The slice of the host page the pipeline reads from and acts on
pub trait PollPage: Send + Sync + 'static {
	/// Read the question heading and all option texts
	fn snapshot(&self) -> impl Future<Output = Result<PollSnapshot>> + Send;

	/// Read only the option texts, in document order
	fn option_texts(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

	/// Simulate a user click on the option at `option.index`.
	/// Returns false if that element no longer exists.
	fn activate(&self, option: &MatchedOption) -> impl Future<Output = Result<bool>> + Send;
}

/// Escape a string for embedding in a double-quoted JS literal
fn js_string(s: &str) -> String {
	serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// [`PollPage`] backed by a live browser tab
#[derive(Clone, Debug)]
pub struct BrowserPage {
	page: Page,
	question_selector: String,
	option_selector: String,
}

impl BrowserPage {
	pub fn new(page: Page, config: &AppConfig) -> Self {
		Self {
			page,
			question_selector: config.question_selector.clone(),
			option_selector: config.option_selector.clone(),
		}
	}
}

impl PollPage for BrowserPage {
	async fn snapshot(&self) -> Result<PollSnapshot> {
		let script = format!(
			r#"
			(function() {{
				const questionElement = document.querySelector({});
				const optionElements = document.querySelectorAll({});
				const options = Array.from(optionElements).map(el => el.innerText.trim());
				return JSON.stringify({{
					question: questionElement ? questionElement.innerText.trim() : null,
					options: options
				}});
			}})()
			"#,
			js_string(&self.question_selector),
			js_string(&self.option_selector)
		);

		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to read poll: {}", e))?;
		let json_str = result.value().and_then(|v| v.as_str()).ok_or_else(|| eyre!("Failed to read poll: browser returned no data"))?;

		serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse poll data: {} - raw: '{}'", e, json_str))
	}

	async fn option_texts(&self) -> Result<Vec<String>> {
		let script = format!(
			r#"
			(function() {{
				const optionElements = document.querySelectorAll({});
				return JSON.stringify(Array.from(optionElements).map(el => el.innerText.trim()));
			}})()
			"#,
			js_string(&self.option_selector)
		);

		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to read options: {}", e))?;
		let json_str = result.value().and_then(|v| v.as_str()).ok_or_else(|| eyre!("Failed to read options: browser returned no data"))?;

		serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse options: {} - raw: '{}'", e, json_str))
	}

	async fn activate(&self, option: &MatchedOption) -> Result<bool> {
		let script = format!(
			r#"
			(function() {{
				const optionElements = document.querySelectorAll({});
				const el = optionElements[{}];
				if (el) {{ el.click(); return true; }}
				return false;
			}})()
			"#,
			js_string(&self.option_selector),
			option.index
		);

		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to click option: {}", e))?;

		Ok(result.value().and_then(|v| v.as_bool()) == Some(true))
	}
}
