// Candle ingestion, per-candle dispatch and the two ways of placing a trade
pub mod browser_trader;
pub mod candle_feed;
pub mod executor;
pub mod order_trader;

pub use browser_trader::BrowserTrader;
pub use candle_feed::CandleFeed;
pub use executor::{dispatch, CandleGate, ExecutionAction, ExecutionDecision};
pub use order_trader::{OrderSettings, OrderTrader};

use crate::models::{OrderResult, TradeSide};
use crate::Result;
use async_trait::async_trait;

/// What the decision loop wants executed
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub side: TradeSide,
    pub symbol: String,
    /// Oracle-suggested distances, used only when the trader is told to
    pub take_profit_pips: Option<u32>,
    pub stop_loss_pips: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub side: TradeSide,
    pub accepted: bool,
    pub detail: String,
    /// Terminal verdict, programmatic orders only
    pub order: Option<OrderResult>,
}

/// Places a directional trade, programmatically or through a web UI
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Place the trade. Rejections come back as a report with `accepted = false`;
    /// `Err` is reserved for failures before anything was submitted.
    async fn place(&self, intent: &TradeIntent) -> Result<ExecutionReport>;

    /// Instrument currently shown by the execution surface, if it has one
    async fn active_symbol(&self) -> Result<Option<String>> {
        Ok(None)
    }
}
