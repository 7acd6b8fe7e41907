use crate::{Error, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

/// Where prompt embeddings come from, if anywhere
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    None,
    Openai,
    Ollama,
}

/// Runtime settings, read from built-in defaults overlaid by the environment
///
/// Variable names are the upper-cased field names (`LOT_SIZE`, `TP_PIPS`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Per-request limit for every HTTP backend
    pub http_timeout_secs: u64,

    // Oracle
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub oracle_model: String,
    pub oracle_max_tokens: u32,

    // Embeddings
    pub embedding_provider: EmbeddingProvider,
    /// Provider default when unset
    pub embedding_model: Option<String>,
    pub ollama_url: String,

    // Terminal
    pub bridge_url: String,
    pub mt5_account: Option<u64>,
    pub mt5_password: Option<String>,
    pub mt5_server: Option<String>,

    // Orders
    pub symbol: String,
    pub lot_size: f64,
    pub deviation: u32,
    pub tp_pips: u32,
    pub sl_pips: u32,
    pub magic: u64,
    pub order_comment: String,
    pub use_oracle_pips: bool,
    pub tick_attempts: u32,
    pub tick_retry_ms: u64,

    // Loop
    pub poll_period_secs: u64,
    pub window_size: usize,

    // Browser
    pub webdriver_url: String,
    pub trading_page_url: String,
    pub ui_wait_secs: u64,
    pub browser_profile_dir: Option<String>,
}

impl Settings {
    /// Load from the process environment (call `dotenvy::dotenv()` first)
    pub fn load() -> Result<Self> {
        Self::from_environment(Environment::default())
    }

    /// Load from an explicit environment source
    pub fn from_environment(environment: Environment) -> Result<Self> {
        let settings: Settings = Config::builder()
            .set_default("http_timeout_secs", 30)?
            .set_default("openai_api_key", "")?
            .set_default("openai_base_url", "https://api.openai.com")?
            .set_default("oracle_model", "gpt-4o-mini")?
            .set_default("oracle_max_tokens", 400)?
            .set_default("embedding_provider", "none")?
            .set_default("ollama_url", "http://127.0.0.1:11434")?
            .set_default("bridge_url", "http://127.0.0.1:8228")?
            .set_default("symbol", "EURUSD")?
            .set_default("lot_size", 0.01)?
            .set_default("deviation", 20)?
            .set_default("tp_pips", 20)?
            .set_default("sl_pips", 100)?
            .set_default("magic", 202003)?
            .set_default("order_comment", "Auto Trade (LLM)")?
            .set_default("use_oracle_pips", false)?
            .set_default("tick_attempts", 20)?
            .set_default("tick_retry_ms", 1000)?
            .set_default("poll_period_secs", 5)?
            .set_default("window_size", 10)?
            .set_default("webdriver_url", "http://127.0.0.1:9515")?
            .set_default(
                "trading_page_url",
                "https://pocketoption.com/en/cabinet/demo-high-low/",
            )?
            .set_default("ui_wait_secs", 30)?
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !(self.lot_size.is_finite() && self.lot_size > 0.0) {
            return Err(Error::Settings(format!(
                "LOT_SIZE must be positive, got {}",
                self.lot_size
            )));
        }
        if self.window_size < 2 {
            return Err(Error::Settings(format!(
                "WINDOW_SIZE must be at least 2, got {}",
                self.window_size
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::Settings("HTTP_TIMEOUT_SECS must be at least 1".to_string()));
        }
        if self.tick_attempts == 0 {
            return Err(Error::Settings("TICK_ATTEMPTS must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_period_secs)
    }

    pub fn tick_retry(&self) -> Duration {
        Duration::from_millis(self.tick_retry_ms)
    }

    pub fn ui_wait(&self) -> Duration {
        Duration::from_secs(self.ui_wait_secs)
    }
}
