use thiserror::Error;

/// Failures surfaced by the decision loop and its backends
#[derive(Debug, Error)]
pub enum Error {
    /// The market feed returned no usable candles for this poll
    #[error("no candle data for {symbol}: {detail}")]
    NoData { symbol: String, detail: String },

    /// No tradeable quote (locked, crossed or missing) for the whole retry budget
    #[error("no valid tick for {symbol} after {attempts} attempts")]
    NoLiquidity { symbol: String, attempts: u32 },

    #[error("decision oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("execution rejected: {0}")]
    ExecutionRejected(String),

    /// Symbol cannot be selected or traded at all
    #[error("symbol {0} is not tradeable")]
    SymbolUnavailable(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("webdriver: {0}")]
    WebDriver(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Whether the failure only spoils the current cycle.
    ///
    /// Setup failures (login, untradeable symbol, bad settings) end the process.
    pub fn is_cycle_scoped(&self) -> bool {
        !matches!(
            self,
            Error::Authentication(_)
                | Error::SymbolUnavailable(_)
                | Error::Settings(_)
                | Error::Config(_)
        )
    }
}
