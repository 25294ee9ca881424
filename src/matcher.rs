//! Reply-to-option matching

use crate::MatchedOption;

/// Pick the option whose text appears in `reply`.
///
/// Scans in document order and keeps overwriting the candidate, so when several option texts are
/// substrings of the reply the *last* one wins. An empty option text is a substring of every reply.
pub fn match_reply<S: AsRef<str>>(reply: &str, options: &[S]) -> Option<MatchedOption> {
	let mut matched = None;
	for (index, option) in options.iter().enumerate() {
		let text = option.as_ref();
		if reply.contains(text) {
			matched = Some((index, text));
		}
	}
	matched.map(|(index, text)| MatchedOption::new(index, text.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_option_in_reply() {
		let options = ["3", "4", "5"];
		assert_eq!(match_reply("4", &options), Some(MatchedOption::new(1, "4".to_string())));
	}

	#[test]
	fn option_embedded_in_longer_reply() {
		let options = ["Paris", "London", "Berlin"];
		let matched = match_reply("The correct option is London.", &options).unwrap();
		assert_eq!(matched.index, 1);
		assert_eq!(matched.text, "London");
	}

	#[test]
	fn last_matching_option_in_document_order_wins() {
		let options = ["A", "B", "C"];
		let matched = match_reply("A or C", &options).unwrap();
		assert_eq!(matched, MatchedOption::new(2, "C".to_string()));

		// prefix of a later option: both match, later one wins
		let options = ["4", "42"];
		assert_eq!(match_reply("42", &options).unwrap().index, 1);
		// but reversed order flips the winner
		let options = ["42", "4"];
		assert_eq!(match_reply("42", &options).unwrap().index, 1);
	}

	#[test]
	fn no_option_in_reply() {
		let options = ["red", "green"];
		assert_eq!(match_reply("blue", &options), None);
	}

	#[test]
	fn matching_is_case_sensitive() {
		let options = ["Yes", "No"];
		assert_eq!(match_reply("yes", &options), None);
	}

	#[test]
	fn empty_option_text_always_matches() {
		let options = ["x", ""];
		assert_eq!(match_reply("anything", &options), Some(MatchedOption::new(1, String::new())));
	}

	#[test]
	fn empty_options_never_match() {
		let options: [&str; 0] = [];
		assert_eq!(match_reply("4", &options), None);
	}

	#[test]
	fn duplicate_option_text_picks_last_copy() {
		let options = vec!["4".to_string(), "5".to_string(), "4".to_string()];
		assert_eq!(match_reply("4", &options).unwrap().index, 2);
	}
}
