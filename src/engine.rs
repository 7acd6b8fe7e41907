use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::Instrument;

use crate::execution::{
    dispatch, CandleFeed, CandleGate, ExecutionReport, TradeExecutor, TradeIntent,
};
use crate::models::Timeframe;
use crate::oracle::{Decision, DecisionOracle, PromptBuilder};
use crate::Result;

/// Back-off when the execution surface shows no instrument
const SYMBOL_BACKOFF: Duration = Duration::from_secs(1);

/// State owned by one trading loop
#[derive(Debug, Default)]
pub struct TradingContext {
    pub symbol: Option<String>,
    pub gate: CandleGate,
}

impl TradingContext {
    pub fn new(symbol: Option<String>) -> Self {
        Self {
            symbol,
            gate: CandleGate::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// No instrument to trade yet
    NoSymbol,
    Skipped { decision: Decision, reason: String },
    Executed { decision: Decision, report: ExecutionReport },
}

/// A cycle up to, but not including, touching the market
enum Prepared {
    Done(CycleOutcome),
    Place { decision: Decision, intent: TradeIntent },
}

/// Resolves once `shutdown` holds true; never if the sender is gone
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// One decision pipeline: candles, oracle, gate, executor
pub struct Engine {
    feed: CandleFeed,
    oracle: DecisionOracle,
    executor: Arc<dyn TradeExecutor>,
    timeframe: Timeframe,
    window_size: usize,
    poll_period: Duration,
}

impl Engine {
    pub fn new(
        feed: CandleFeed,
        oracle: DecisionOracle,
        executor: Arc<dyn TradeExecutor>,
        timeframe: Timeframe,
        window_size: usize,
    ) -> Self {
        Self {
            feed,
            oracle,
            executor,
            timeframe,
            window_size,
            poll_period: Duration::from_secs(5),
        }
    }

    pub fn with_poll_period(mut self, poll_period: Duration) -> Self {
        self.poll_period = poll_period;
        self
    }

    /// Follow the instrument the executor reports, if it reports one
    async fn refresh_symbol(&self, context: &mut TradingContext) {
        match self.executor.active_symbol().await {
            Ok(Some(symbol)) => {
                if context.symbol.as_deref() != Some(symbol.as_str()) {
                    tracing::info!(
                        from = context.symbol.as_deref().unwrap_or("-"),
                        to = %symbol,
                        "🔄 Active symbol changed"
                    );
                    context.symbol = Some(symbol);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Could not read active symbol"),
        }
    }

    /// Run one decision cycle
    ///
    /// Errors are cycle-scoped unless `Error::is_cycle_scoped` says otherwise;
    /// the caller decides whether to continue.
    pub async fn run_cycle(&self, context: &mut TradingContext) -> Result<CycleOutcome> {
        let prepared = self.prepare(context).await?;
        self.finish(prepared).await
    }

    /// Run one cycle unless `shutdown` flips first
    ///
    /// A stop is only honoured before submission: once an order or click is
    /// under way the cycle completes and its report is returned. `None` means
    /// the cycle was abandoned without touching the market.
    pub async fn run_cycle_until(
        &self,
        context: &mut TradingContext,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<CycleOutcome>> {
        let prepared = tokio::select! {
            prepared = self.prepare(context) => prepared?,
            _ = stop_requested(shutdown) => return Ok(None),
        };
        if *shutdown.borrow() {
            if let Prepared::Place { intent, .. } = &prepared {
                tracing::info!(side = %intent.side, symbol = %intent.symbol, "Stop requested, {} not submitted", intent.side);
            }
            return Ok(None);
        }
        self.finish(prepared).await.map(Some)
    }

    async fn prepare(&self, context: &mut TradingContext) -> Result<Prepared> {
        self.refresh_symbol(context).await;
        let Some(symbol) = context.symbol.clone() else {
            return Ok(Prepared::Done(CycleOutcome::NoSymbol));
        };

        let window = self.feed.fetch(&symbol, self.timeframe, self.window_size).await?;
        let builder = PromptBuilder::new(symbol.as_str(), self.timeframe);
        let decision = self.oracle.decide(&builder, &window).await;

        tracing::info!(
            symbol = %symbol,
            candle = %window.newest().timestamp,
            signal = %decision.prediction.signal,
            confidence = decision.prediction.confidence,
            source = decision.tier.as_str(),
            reason = %decision.prediction.reason,
            "🔮 Oracle decision"
        );

        let outcome = dispatch(&window, &decision.prediction, &mut context.gate);
        let Some(side) = outcome.action.side() else {
            tracing::info!(symbol = %symbol, "⏸️  {}", outcome.reason);
            return Ok(Prepared::Done(CycleOutcome::Skipped {
                decision,
                reason: outcome.reason,
            }));
        };

        let intent = TradeIntent {
            side,
            symbol,
            take_profit_pips: decision.prediction.take_profit_pips,
            stop_loss_pips: decision.prediction.stop_loss_pips,
        };
        Ok(Prepared::Place { decision, intent })
    }

    async fn finish(&self, prepared: Prepared) -> Result<CycleOutcome> {
        match prepared {
            Prepared::Done(outcome) => Ok(outcome),
            Prepared::Place { decision, intent } => {
                let report = self.executor.place(&intent).await?;
                Ok(CycleOutcome::Executed { decision, report })
            }
        }
    }

    /// Poll until `shutdown` flips to true or a setup failure occurs
    pub async fn run_loop(
        &self,
        context: &mut TradingContext,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!(
            timeframe = %self.timeframe,
            window = self.window_size,
            poll_secs = self.poll_period.as_secs_f64(),
            "🚀 Trading loop started"
        );

        while !*shutdown.borrow() {
            let span = tracing::info_span!("cycle", id = %uuid::Uuid::new_v4());
            let pause = match self.run_cycle_until(context, &mut shutdown).instrument(span).await {
                Ok(None) => break,
                Ok(Some(CycleOutcome::NoSymbol)) => {
                    tracing::debug!("No active symbol detected");
                    SYMBOL_BACKOFF
                }
                Ok(_) => self.poll_period,
                Err(e) if e.is_cycle_scoped() => {
                    tracing::warn!(error = %e, "Cycle skipped");
                    self.poll_period
                }
                Err(e) => return Err(e),
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(candles_handled = context.gate.len(), "Trading loop stopped");
        Ok(())
    }
}
