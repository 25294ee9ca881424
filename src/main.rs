use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use poll_autoanswer::{
	config::AppConfig,
	llm::AzureCompletion,
	page::BrowserPage,
	runner::{Pipeline, run},
	watcher::DomMutationSource,
};
use v_utils::log;

#[derive(Debug, Parser)]
#[command(name = "poll_autoanswer")]
#[command(about = "Answers live polls by asking a completion service and clicking the matching option", long_about = None)]
struct Args {
	/// Poll page to open
	#[arg(short, long)]
	target_url: String,

	/// Run with visible browser window (non-headless mode)
	#[arg(long)]
	visible: bool,

	/// Completion endpoint, overrides the compiled-in one
	#[arg(long, env = "POLL_ENDPOINT")]
	endpoint: Option<String>,

	/// Access key sent as `api-key`, overrides the compiled-in one
	#[arg(long, env = "POLL_API_KEY", hide_env_values = true)]
	api_key: Option<String>,

	/// Model identifier sent with every request
	#[arg(long)]
	model: Option<String>,

	/// Sampling temperature sent with every request
	#[arg(long)]
	temperature: Option<f32>,

	/// Let replies for superseded questions still click an option
	#[arg(long)]
	keep_stale_replies: bool,
}

impl Args {
	fn into_config(self) -> (String, AppConfig) {
		let mut config = AppConfig {
			visible: self.visible,
			discard_stale_replies: !self.keep_stale_replies,
			..AppConfig::default()
		};
		if let Some(endpoint) = self.endpoint {
			config.endpoint = endpoint;
		}
		if let Some(api_key) = self.api_key {
			config.api_key = api_key;
		}
		if let Some(model) = self.model {
			config.model = model;
		}
		if let Some(temperature) = self.temperature {
			config.temperature = temperature;
		}
		(self.target_url, config)
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("poll_autoanswer=info".parse()?))
		.init();

	let (target_url, config) = Args::parse().into_config();

	log!("Visible mode: {}", config.visible);
	log!("Model: {} (temperature {})", config.model, config.temperature);

	// Configure browser based on visibility flag
	let browser_config = if config.visible {
		BrowserConfig::builder()
			.with_head() // Visible browser with UI
			.build()
			.map_err(|e| eyre!("Failed to build browser config: {}", e))?
	} else {
		BrowserConfig::builder()
			.build() // Headless mode
			.map_err(|e| eyre!("Failed to build browser config: {}", e))?
	};

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Spawn a task to handle browser events (suppress errors as they're mostly noise)
	let handle = tokio::spawn(async move {
		while let Some(_event) = handler.next().await {
			// Silently consume events to prevent the browser from hanging
		}
	});

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;

	// Observer must be registered before navigation so it is injected into the poll document too
	let source = DomMutationSource::attach(&page, &config.mutation_binding).await?;

	log!("Navigating to {}", target_url);
	page.goto(&target_url).await.map_err(|e| eyre!("Failed to navigate: {}", e))?;

	let completion = AzureCompletion::from_config(&config);
	let mut pipeline = Pipeline::new(BrowserPage::new(page.clone(), &config), completion, &config);

	log!("Watching for poll questions. Press Ctrl+C to exit...");
	run(&mut pipeline, source, async {
		let _ = tokio::signal::ctrl_c().await;
	})
	.await?;

	// Clean up
	drop(pipeline);
	drop(page);
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
	drop(browser);
	handle.abort();

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flags_override_defaults() {
		let args = Args::parse_from([
			"poll_autoanswer",
			"-t",
			"https://vevox.app/#/m/123",
			"--endpoint",
			"https://example.test/chat",
			"--api-key",
			"secret",
			"--temperature",
			"0.2",
			"--keep-stale-replies",
		]);
		let (target, config) = args.into_config();
		assert_eq!(target, "https://vevox.app/#/m/123");
		assert_eq!(config.endpoint, "https://example.test/chat");
		assert_eq!(config.api_key, "secret");
		assert_eq!(config.temperature, 0.2);
		assert!(!config.discard_stale_replies);
		assert_eq!(config.model, "gpt-4o-mini");
	}
}
