use super::{ExecutionReport, TradeExecutor, TradeIntent};
use crate::api::{MarketData, OrderGateway};
use crate::config::Settings;
use crate::models::{
    FillPolicy, OrderRequest, SymbolInfo, Tick, TimeInForce, TradeAction, TradeSide,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Static order parameters
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub lot_size: f64,
    pub deviation: u32,
    pub tp_pips: u32,
    pub sl_pips: u32,
    pub magic: u64,
    pub comment: String,
    pub use_oracle_pips: bool,
    pub tick_attempts: u32,
    pub tick_retry: Duration,
}

impl From<&Settings> for OrderSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            lot_size: settings.lot_size,
            deviation: settings.deviation,
            tp_pips: settings.tp_pips,
            sl_pips: settings.sl_pips,
            magic: settings.magic,
            comment: settings.order_comment.clone(),
            use_oracle_pips: settings.use_oracle_pips,
            tick_attempts: settings.tick_attempts,
            tick_retry: settings.tick_retry(),
        }
    }
}

/// Absolute take-profit and stop-loss prices around `price`
pub fn bracket(side: TradeSide, price: f64, tp_pips: u32, sl_pips: u32, info: &SymbolInfo) -> (f64, f64) {
    let pip = info.pip_size();
    let tp_distance = tp_pips as f64 * pip;
    let sl_distance = sl_pips as f64 * pip;

    let (tp, sl) = match side {
        TradeSide::Buy => (price + tp_distance, price - sl_distance),
        TradeSide::Sell => (price - tp_distance, price + sl_distance),
    };
    (info.normalize(tp), info.normalize(sl))
}

/// Submits bracketed market orders through the terminal
pub struct OrderTrader {
    market: Arc<dyn MarketData>,
    gateway: Arc<dyn OrderGateway>,
    settings: OrderSettings,
}

impl OrderTrader {
    pub fn new(market: Arc<dyn MarketData>, gateway: Arc<dyn OrderGateway>, settings: OrderSettings) -> Self {
        Self {
            market,
            gateway,
            settings,
        }
    }

    /// Select the symbol and confirm it can be traded
    pub async fn prepare_symbol(&self, symbol: &str) -> Result<SymbolInfo> {
        if !self.market.select_symbol(symbol).await? {
            return Err(Error::SymbolUnavailable(symbol.to_string()));
        }

        let info = self.market.symbol_info(symbol).await?;
        if !info.trade_allowed {
            return Err(Error::SymbolUnavailable(symbol.to_string()));
        }

        Ok(info)
    }

    /// Poll until bid and ask differ, up to the configured attempt budget
    pub async fn wait_for_tick(&self, symbol: &str) -> Result<Tick> {
        let attempts = self.settings.tick_attempts;

        for attempt in 1..=attempts {
            match self.market.tick(symbol).await {
                Ok(Some(tick)) if tick.is_tradeable() => return Ok(tick),
                Ok(Some(tick)) => {
                    tracing::debug!(symbol, attempt, bid = tick.bid, ask = tick.ask, "Quote not tradeable, waiting");
                }
                Ok(None) => tracing::debug!(symbol, attempt, "No tick yet"),
                Err(e) => tracing::debug!(symbol, attempt, error = %e, "Tick query failed"),
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.tick_retry).await;
            }
        }

        Err(Error::NoLiquidity {
            symbol: symbol.to_string(),
            attempts,
        })
    }

    pub fn build_order(&self, intent: &TradeIntent, tick: &Tick, info: &SymbolInfo) -> OrderRequest {
        let (tp_pips, sl_pips) = if self.settings.use_oracle_pips {
            (
                intent.take_profit_pips.unwrap_or(self.settings.tp_pips),
                intent.stop_loss_pips.unwrap_or(self.settings.sl_pips),
            )
        } else {
            (self.settings.tp_pips, self.settings.sl_pips)
        };

        let price = info.normalize(tick.price_for(intent.side));
        let (take_profit, stop_loss) = bracket(intent.side, price, tp_pips, sl_pips, info);

        OrderRequest {
            action: TradeAction::Deal,
            symbol: intent.symbol.clone(),
            volume: self.settings.lot_size,
            side: intent.side,
            price,
            stop_loss,
            take_profit,
            deviation: self.settings.deviation,
            magic: self.settings.magic,
            comment: self.settings.comment.clone(),
            time_in_force: TimeInForce::Gtc,
            fill_policy: FillPolicy::Ioc,
        }
    }
}

#[async_trait]
impl TradeExecutor for OrderTrader {
    async fn place(&self, intent: &TradeIntent) -> Result<ExecutionReport> {
        let info = self.prepare_symbol(&intent.symbol).await?;
        let tick = self.wait_for_tick(&intent.symbol).await?;
        let request = self.build_order(intent, &tick, &info);

        tracing::info!(
            symbol = %request.symbol,
            side = %request.side,
            volume = request.volume,
            price = request.price,
            tp = request.take_profit,
            sl = request.stop_loss,
            "Submitting order"
        );

        let result = self.gateway.send_order(&request).await?;
        let detail = match result.return_code {
            Some(code) if result.accepted => format!("order filled (retcode {})", code),
            Some(code) => format!("order rejected (retcode {}): {}", code, result.raw_response),
            None => format!("order rejected: {}", result.raw_response),
        };

        if result.accepted {
            tracing::info!(symbol = %request.symbol, "✅ {}", detail);
        } else {
            tracing::error!(symbol = %request.symbol, "❌ {}", detail);
        }

        Ok(ExecutionReport {
            side: intent.side,
            accepted: result.accepted,
            detail,
            order: Some(result),
        })
    }
}
