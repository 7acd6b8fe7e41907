// External service clients and the traits the decision loop talks through
pub mod bridge;
pub mod ollama;
pub mod openai;
pub mod webdriver;

pub use bridge::{BridgeClient, Credentials, RawRate};
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIClient;
pub use webdriver::{BrowserOptions, Locator, WebDriverClient, WebDriverSession};

use crate::models::{OrderRequest, OrderResult, SymbolInfo, Tick, Timeframe};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// HTTP client whose every request gives up after `timeout`
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Candle and quote queries against the trading terminal
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `count` rate rows, oldest first
    async fn rates(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<Vec<RawRate>>;

    /// Live quote, `None` when the terminal has none yet
    async fn tick(&self, symbol: &str) -> Result<Option<Tick>>;

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo>;

    /// Add the symbol to the terminal's watch list
    async fn select_symbol(&self, symbol: &str) -> Result<bool>;
}

/// Order submission against the brokerage account
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn send_order(&self, request: &OrderRequest) -> Result<OrderResult>;
}

/// Role-tagged chat message
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Text-completion service used as the decision oracle
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Turns text into a numeric vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
