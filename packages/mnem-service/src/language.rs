use mnem_domain::{language, memory::Message};

use crate::{Error, Judge, Result};

const LANGUAGE_PROMPT: &str = "Identify the language of the user's text. \
Respond with a JSON object of the form {\"language\": \"<code>\"} using one of these codes: \
ar, bg, ca, cjk, ckb, da, de, el, en, es, eu, fa, fi, fr, ga, gl, hi, hr, hu, hy, id, in, it, \
nl, no, pl, pt, ro, ru, sv, tr. Use cjk for Chinese, Japanese, and Korean.";

pub struct LanguageDetector {
	judge: Judge,
}
impl LanguageDetector {
	pub fn new(judge: Judge) -> Self {
		Self { judge }
	}

	/// Returns a lower-case language code from the supported set.
	pub async fn detect_language(&self, text: &str) -> Result<String> {
		if text.trim().is_empty() {
			return Err(Error::invalid("Language detection needs non-empty text."));
		}

		let prompt = vec![Message::new("system", LANGUAGE_PROMPT), Message::user(text.trim())];
		let raw = self.judge.complete(&prompt).await?;

		language::parse_language_response(&raw).map_err(|source| {
			tracing::debug!(error = %source.message, "Language detection response rejected.");

			Error::ExtractionFailed { source }
		})
	}
}
