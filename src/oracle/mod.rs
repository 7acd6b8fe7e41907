// Decision oracle: prompt rendering, response recovery and validation
pub mod prompt;
pub mod recovery;
pub mod validator;

pub use prompt::{Prompt, PromptBuilder};
pub use recovery::{RawPrediction, RecoveryTier};
pub use validator::{validate, ValidatedPrediction};

use crate::api::{ChatBackend, Embedder};
use crate::models::CandleWindow;
use crate::{Error, Result};
use std::sync::Arc;

/// Validated prediction plus the recovery step that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub prediction: ValidatedPrediction,
    pub tier: RecoveryTier,
}

/// Asks the language model for a signal and never fails doing so
pub struct DecisionOracle {
    chat: Arc<dyn ChatBackend>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl DecisionOracle {
    pub fn new(chat: Arc<dyn ChatBackend>) -> Self {
        Self {
            chat,
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// One round-trip; any failure becomes `OracleUnavailable`
    pub async fn infer(&self, prompt: &Prompt) -> Result<String> {
        match self.chat.complete(&prompt.messages()).await {
            Ok(text) => Ok(text),
            Err(e @ Error::OracleUnavailable(_)) => Err(e),
            Err(e) => Err(Error::OracleUnavailable(e.to_string())),
        }
    }

    /// Embedding of the rendered candles, `None` when disabled or failing
    async fn embedding(&self, window: &CandleWindow) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&PromptBuilder::render_candles(window)).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!(error = %e, "Embedding unavailable, prompting without it");
                None
            }
        }
    }

    pub async fn decide(&self, builder: &PromptBuilder, window: &CandleWindow) -> Decision {
        let embedding = self.embedding(window).await;
        let prompt = builder.build(window, embedding.as_deref());

        let recovered = match self.infer(&prompt).await {
            Ok(text) => {
                tracing::debug!(response = %text, "Oracle responded");
                recovery::recover(&text, window.last_close())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Oracle unavailable, holding");
                recovery::Recovered {
                    prediction: RawPrediction::unavailable(),
                    tier: RecoveryTier::Unavailable,
                }
            }
        };

        if recovered.tier == RecoveryTier::FieldPattern {
            tracing::warn!("Oracle output was not JSON, recovered fields by pattern");
        }

        Decision {
            prediction: validate(&recovered.prediction),
            tier: recovered.tier,
        }
    }
}
