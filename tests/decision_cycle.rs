use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use oraclebot::api::{ChatBackend, ChatMessage, MarketData, OrderGateway, RawRate};
use oraclebot::execution::{
    CandleFeed, ExecutionReport, OrderSettings, OrderTrader, TradeExecutor, TradeIntent,
};
use oraclebot::oracle::{DecisionOracle, RecoveryTier};
use oraclebot::{
    CycleOutcome, Engine, Error, OrderRequest, OrderResult, Result, Signal, SymbolInfo, Tick,
    Timeframe, TradeSide, TradingContext,
};
use tokio::sync::watch;
use tokio_test::{assert_err, assert_ok};

const T0: i64 = 1_741_082_400; // 2025-03-04 10:00:00 UTC
const WINDOW: usize = 10;

fn rates(newest_minute: i64, last_close: f64) -> Vec<RawRate> {
    (newest_minute + 1 - WINDOW as i64..=newest_minute)
        .map(|m| RawRate {
            time: T0 + 60 * m,
            open: 1.104,
            high: 1.106,
            low: 1.103,
            close: last_close,
            tick_volume: 100.0,
            spread: 2,
            real_volume: 0.0,
        })
        .collect()
}

/// In-process terminal: scripted candles and ticks, records orders
struct FakeTerminal {
    candles: Mutex<Vec<RawRate>>,
    tick: Mutex<Option<Tick>>,
    tick_calls: Mutex<u32>,
    orders: Mutex<Vec<OrderRequest>>,
}

impl FakeTerminal {
    fn new(candles: Vec<RawRate>, tick: Option<Tick>) -> Arc<Self> {
        Arc::new(Self {
            candles: Mutex::new(candles),
            tick: Mutex::new(tick),
            tick_calls: Mutex::new(0),
            orders: Mutex::new(Vec::new()),
        })
    }

    fn set_candles(&self, candles: Vec<RawRate>) {
        *self.candles.lock().unwrap() = candles;
    }

    fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    fn tick_calls(&self) -> u32 {
        *self.tick_calls.lock().unwrap()
    }
}

#[async_trait]
impl MarketData for FakeTerminal {
    async fn rates(&self, _symbol: &str, _timeframe: Timeframe, _count: usize) -> Result<Vec<RawRate>> {
        Ok(self.candles.lock().unwrap().clone())
    }

    async fn tick(&self, _symbol: &str) -> Result<Option<Tick>> {
        *self.tick_calls.lock().unwrap() += 1;
        Ok(*self.tick.lock().unwrap())
    }

    async fn symbol_info(&self, _symbol: &str) -> Result<SymbolInfo> {
        Ok(SymbolInfo {
            point: 0.00001,
            digits: 5,
            trade_allowed: true,
        })
    }

    async fn select_symbol(&self, _symbol: &str) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl OrderGateway for FakeTerminal {
    async fn send_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        self.orders.lock().unwrap().push(request.clone());
        Ok(OrderResult::from_response(
            serde_json::json!({ "retcode": 10009, "order": 77 }),
        ))
    }
}

/// Replies in order; once the script runs out the oracle is unreachable
struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedOracle {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        })
    }
}

#[async_trait]
impl ChatBackend for ScriptedOracle {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::OracleUnavailable("connection refused".to_string()))
    }
}

/// UI stand-in that records clicks
#[derive(Default)]
struct RecordingClicker {
    clicks: Mutex<Vec<TradeSide>>,
}

#[async_trait]
impl TradeExecutor for RecordingClicker {
    async fn place(&self, intent: &TradeIntent) -> Result<ExecutionReport> {
        self.clicks.lock().unwrap().push(intent.side);
        Ok(ExecutionReport {
            side: intent.side,
            accepted: true,
            detail: "clicked".to_string(),
            order: None,
        })
    }

    async fn active_symbol(&self) -> Result<Option<String>> {
        Ok(Some("EURUSD".to_string()))
    }
}

fn order_settings() -> OrderSettings {
    OrderSettings {
        lot_size: 0.01,
        deviation: 20,
        tp_pips: 20,
        sl_pips: 100,
        magic: 202003,
        comment: "Auto Trade (LLM)".to_string(),
        use_oracle_pips: false,
        tick_attempts: 20,
        tick_retry: Duration::ZERO,
    }
}

fn order_engine(terminal: &Arc<FakeTerminal>, oracle: Arc<ScriptedOracle>) -> Engine {
    let trader = OrderTrader::new(terminal.clone(), terminal.clone(), order_settings());
    Engine::new(
        CandleFeed::new(terminal.clone()),
        DecisionOracle::new(oracle),
        Arc::new(trader),
        Timeframe::M15,
        WINDOW,
    )
}

fn click_engine(
    terminal: &Arc<FakeTerminal>,
    oracle: Arc<ScriptedOracle>,
    clicker: &Arc<RecordingClicker>,
) -> Engine {
    Engine::new(
        CandleFeed::new(terminal.clone()),
        DecisionOracle::new(oracle),
        clicker.clone(),
        Timeframe::M1,
        WINDOW,
    )
    .with_poll_period(Duration::from_millis(1))
}

const BUY: &str = r#"{"signal":"buy","confidence":0.8,"price_target_usd":1.107,"take_profit_pips":20,"stop_loss_pips":100,"reason":"higher lows"}"#;
const SELL: &str = r#"{"signal":"sell","confidence":0.7,"price_target_usd":1.1,"reason":"rejection at highs"}"#;

#[tokio::test]
async fn test_buy_places_bracketed_order_at_ask() {
    let terminal = FakeTerminal::new(rates(20, 1.10500), Some(Tick { bid: 1.10490, ask: 1.10500 }));
    let engine = order_engine(&terminal, ScriptedOracle::new(&[BUY]));
    let mut context = TradingContext::new(Some("EURUSD".to_string()));

    let outcome = assert_ok!(engine.run_cycle(&mut context).await);

    let CycleOutcome::Executed { decision, report } = outcome else {
        panic!("expected an executed trade");
    };
    assert_eq!(decision.prediction.signal, Signal::Buy);
    assert!(report.accepted);

    let orders = terminal.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, TradeSide::Buy);
    assert_eq!(orders[0].price, 1.105);
    assert_eq!(orders[0].take_profit, 1.107);
    assert_eq!(orders[0].stop_loss, 1.095);
    assert_eq!(orders[0].volume, 0.01);
}

#[tokio::test]
async fn test_same_candle_buy_then_sell_dispatches_only_buy() {
    let terminal = FakeTerminal::new(rates(30, 1.105), Some(Tick { bid: 1.1049, ask: 1.105 }));
    let clicker = Arc::new(RecordingClicker::default());
    let engine = click_engine(&terminal, ScriptedOracle::new(&[BUY, SELL]), &clicker);
    let mut context = TradingContext::default();

    let first = assert_ok!(engine.run_cycle(&mut context).await);
    let second = assert_ok!(engine.run_cycle(&mut context).await);

    assert!(matches!(first, CycleOutcome::Executed { .. }));
    match second {
        CycleOutcome::Skipped { decision, reason } => {
            assert_eq!(decision.prediction.signal, Signal::Sell);
            assert!(reason.contains("already handled"));
        }
        other => panic!("second poll should be suppressed, got {:?}", other),
    }
    assert_eq!(*clicker.clicks.lock().unwrap(), vec![TradeSide::Buy]);
}

#[tokio::test]
async fn test_new_candle_reopens_the_gate() {
    let terminal = FakeTerminal::new(rates(30, 1.105), None);
    let clicker = Arc::new(RecordingClicker::default());
    let engine = click_engine(&terminal, ScriptedOracle::new(&[BUY, SELL]), &clicker);
    let mut context = TradingContext::default();

    assert_ok!(engine.run_cycle(&mut context).await);
    terminal.set_candles(rates(31, 1.104));
    assert_ok!(engine.run_cycle(&mut context).await);

    assert_eq!(
        *clicker.clicks.lock().unwrap(),
        vec![TradeSide::Buy, TradeSide::Sell]
    );
}

#[tokio::test]
async fn test_locked_market_is_no_liquidity_and_sends_nothing() {
    let terminal = FakeTerminal::new(rates(20, 1.105), Some(Tick { bid: 1.105, ask: 1.105 }));
    let engine = order_engine(&terminal, ScriptedOracle::new(&[BUY]));
    let mut context = TradingContext::new(Some("EURUSD".to_string()));

    let err = assert_err!(engine.run_cycle(&mut context).await);

    assert!(matches!(err, Error::NoLiquidity { attempts: 20, .. }));
    assert_eq!(terminal.tick_calls(), 20);
    assert!(terminal.orders().is_empty());
}

#[tokio::test]
async fn test_prose_wrapped_reply_is_recovered_and_clamped() {
    let terminal = FakeTerminal::new(rates(20, 1.105), Some(Tick { bid: 1.1049, ask: 1.105 }));
    let reply = r#"Here you go: {"signal":"SELL","confidence":1.5,"reason":"double top"}"#;
    let engine = order_engine(&terminal, ScriptedOracle::new(&[reply]));
    let mut context = TradingContext::new(Some("EURUSD".to_string()));

    let outcome = assert_ok!(engine.run_cycle(&mut context).await);

    let CycleOutcome::Executed { decision, .. } = outcome else {
        panic!("expected a sell order");
    };
    assert_eq!(decision.tier, RecoveryTier::Substring);
    assert_eq!(decision.prediction.signal, Signal::Sell);
    assert_eq!(decision.prediction.confidence, 1.0);

    let orders = terminal.orders();
    assert_eq!(orders[0].price, 1.1049);
    assert_eq!(orders[0].take_profit, 1.1029);
    assert_eq!(orders[0].stop_loss, 1.1149);
}

#[tokio::test]
async fn test_unreachable_oracle_holds_without_touching_market() {
    let terminal = FakeTerminal::new(rates(20, 1.105), Some(Tick { bid: 1.1049, ask: 1.105 }));
    let engine = order_engine(&terminal, ScriptedOracle::new(&[]));
    let mut context = TradingContext::new(Some("EURUSD".to_string()));

    let outcome = assert_ok!(engine.run_cycle(&mut context).await);

    let CycleOutcome::Skipped { decision, .. } = outcome else {
        panic!("expected hold");
    };
    assert_eq!(decision.tier, RecoveryTier::Unavailable);
    assert_eq!(decision.prediction.reason, "model error");
    assert_eq!(terminal.tick_calls(), 0);
    assert!(terminal.orders().is_empty());
}

#[tokio::test]
async fn test_garbled_reply_defaults_missing_fields() {
    let terminal = FakeTerminal::new(rates(20, 1.10432), None);
    let reply = r#"{"signal": "hold", "confidence": 0.35, oops"#;
    let engine = order_engine(&terminal, ScriptedOracle::new(&[reply]));
    let mut context = TradingContext::new(Some("EURUSD".to_string()));

    let outcome = assert_ok!(engine.run_cycle(&mut context).await);

    let CycleOutcome::Skipped { decision, .. } = outcome else {
        panic!("expected hold");
    };
    assert_eq!(decision.tier, RecoveryTier::FieldPattern);
    assert_eq!(decision.prediction.confidence, 0.35);
    assert_eq!(decision.prediction.price_target, Some(1.10432));
    assert_eq!(decision.prediction.reason, "parsing failed");
}

#[tokio::test]
async fn test_missing_candles_skip_cycle_without_consuming_gate() {
    let terminal = FakeTerminal::new(vec![], None);
    let engine = order_engine(&terminal, ScriptedOracle::new(&[BUY]));
    let mut context = TradingContext::new(Some("EURUSD".to_string()));

    let err = assert_err!(engine.run_cycle(&mut context).await);

    assert!(matches!(err, Error::NoData { .. }));
    assert!(err.is_cycle_scoped());
    assert!(context.gate.is_empty());
}

#[tokio::test]
async fn test_gate_grows_by_one_per_distinct_candle() {
    let terminal = FakeTerminal::new(rates(40, 1.105), None);
    let replies = vec![SELL; 12];
    let clicker = Arc::new(RecordingClicker::default());
    let engine = click_engine(&terminal, ScriptedOracle::new(&replies), &clicker);
    let mut context = TradingContext::default();

    for (n, minute) in (40..44).enumerate() {
        terminal.set_candles(rates(minute, 1.105));
        for _ in 0..3 {
            assert_ok!(engine.run_cycle(&mut context).await);
        }
        assert_eq!(context.gate.len(), n + 1);
    }
    assert_eq!(clicker.clicks.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_loop_survives_no_data_and_stops_on_request() {
    let terminal = FakeTerminal::new(vec![], None);
    let clicker = Arc::new(RecordingClicker::default());
    let engine = click_engine(&terminal, ScriptedOracle::new(&[BUY; 50]), &clicker);
    let mut context = TradingContext::default();
    let (stop, shutdown) = watch::channel(false);

    let driver = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        terminal.set_candles(rates(50, 1.105));
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.send(true).unwrap();
    };
    let (result, _) = tokio::join!(engine.run_loop(&mut context, shutdown), driver);

    assert_ok!(result);
    assert_eq!(*clicker.clicks.lock().unwrap(), vec![TradeSide::Buy]);
    assert_eq!(context.gate.len(), 1);
}
