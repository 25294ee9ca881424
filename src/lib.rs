use std::fmt;

use serde::Deserialize;

pub mod config;
pub mod llm;
pub mod matcher;
pub mod page;
pub mod runner;
pub mod timing;
pub mod watcher;

/// What the extractor sees on the page at one point in time
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, derive_new::new)]
pub struct PollSnapshot {
	/// Trimmed question heading text, `None` when no question element is rendered
	pub question: Option<String>,
	/// Trimmed option texts, in document order
	#[serde(default)]
	pub options: Vec<String>,
}

impl PollSnapshot {
	/// Returns true if a question element was found
	pub fn has_question(&self) -> bool {
		self.question.is_some()
	}
}

impl fmt::Display for PollSnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.question {
			Some(q) => writeln!(f, "{}", q)?,
			None => writeln!(f, "<no question>")?,
		}
		for (i, option) in self.options.iter().enumerate() {
			writeln!(f, "( ) {}. {}", i + 1, option)?;
		}
		Ok(())
	}
}

/// Reference to the option element picked by the matcher.
///
/// Only valid for the pipeline cycle that produced it: `index` is the position among the option
/// elements at the time the options were re-read for matching.
#[derive(Clone, Debug, Eq, PartialEq, derive_new::new)]
pub struct MatchedOption {
	/// Document-order position among the option elements
	pub index: usize,
	/// The option's trimmed text
	pub text: String,
}

impl fmt::Display for MatchedOption {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}. {}", self.index + 1, self.text)
	}
}
