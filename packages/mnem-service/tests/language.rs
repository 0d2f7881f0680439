mod support;

use mnem_service::Error;
use support::{Harness, ScriptedJudge};

#[tokio::test]
async fn detected_code_is_normalized() {
	let harness = Harness::new(ScriptedJudge::new([r#"```json
{"language": "DE"}
```"#]));
	let language = harness
		.service
		.language
		.detect_language("Ich wohne in Berlin.")
		.await
		.expect("Detection failed.");

	assert_eq!(language, "de");
	assert_eq!(harness.judge.requests()[0][1].content, "Ich wohne in Berlin.");
}

#[tokio::test]
async fn unsupported_codes_and_blank_text_are_rejected() {
	let harness = Harness::new(ScriptedJudge::new([r#"{"language": "xx"}"#]));

	assert!(matches!(
		harness.service.language.detect_language("Hola").await,
		Err(Error::ExtractionFailed { .. })
	));
	assert!(matches!(
		harness.service.language.detect_language("  ").await,
		Err(Error::InvalidInput { .. })
	));
	assert_eq!(harness.judge.call_count(), 1);
}
