use std::sync::Arc;

use mnem_config::LlmProviderConfig;
use mnem_domain::memory::Message;

use crate::{JudgeProvider, Result};

/// Judge provider bound to its configuration. Cheap to clone; shared by every judge-driven
/// component.
#[derive(Clone)]
pub struct Judge {
	cfg: Arc<LlmProviderConfig>,
	provider: Arc<dyn JudgeProvider>,
}
impl Judge {
	pub fn new(cfg: LlmProviderConfig, provider: Arc<dyn JudgeProvider>) -> Self {
		Self { cfg: Arc::new(cfg), provider }
	}

	pub fn model(&self) -> &str {
		&self.cfg.model
	}

	pub async fn complete(&self, messages: &[Message]) -> Result<String> {
		self.provider.chat(&self.cfg, messages).await
	}
}
