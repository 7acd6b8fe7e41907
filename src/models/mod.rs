use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Return code the terminal reports for a completed deal
pub const TRADE_RETCODE_DONE: u32 = 10009;

/// OHLCV candlestick for one closed (or forming) time bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Fixed-size run of candles, oldest first, newest last
///
/// Timestamps are strictly increasing. A window is built once per poll and
/// feeds exactly one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleWindow {
    candles: Vec<Candle>,
}

impl CandleWindow {
    pub fn new(candles: Vec<Candle>) -> Result<Self, String> {
        if candles.is_empty() {
            return Err("window is empty".to_string());
        }

        for pair in candles.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(format!(
                    "timestamps not strictly increasing ({} then {})",
                    pair[0].timestamp, pair[1].timestamp
                ));
            }
        }

        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Newest candle; a window always holds at least one
    pub fn newest(&self) -> &Candle {
        &self.candles[self.candles.len() - 1]
    }

    pub fn last_close(&self) -> f64 {
        self.newest().close
    }
}

/// Direction classified by the oracle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        }
    }

    /// Trade direction for actionable signals, `None` for hold
    pub fn side(&self) -> Option<TradeSide> {
        match self {
            Signal::Buy => Some(TradeSide::Buy),
            Signal::Sell => Some(TradeSide::Sell),
            Signal::Hold => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => f.write_str("buy"),
            TradeSide::Sell => f.write_str("sell"),
        }
    }
}

/// Candle period understood by the terminal bridge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }

    /// Human label used in prompts ("15-minute", "1-hour", ...)
    pub fn describe(&self) -> String {
        match self.minutes() {
            m if m < 60 => format!("{}-minute", m),
            m if m < 1440 => format!("{}-hour", m / 60),
            _ => "1-day".to_string(),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe: {}", other)),
        }
    }
}

/// Live quote snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    /// Positive finite prices with ask strictly above bid
    ///
    /// Locked (bid == ask) and crossed (ask < bid) quotes are not tradeable.
    pub fn is_tradeable(&self) -> bool {
        self.bid.is_finite() && self.ask.is_finite() && self.bid > 0.0 && self.ask > self.bid
    }

    pub fn price_for(&self, side: TradeSide) -> f64 {
        match side {
            TradeSide::Buy => self.ask,
            TradeSide::Sell => self.bid,
        }
    }
}

/// Static instrument properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolInfo {
    pub point: f64,
    pub digits: u32,
    #[serde(default = "default_trade_allowed")]
    pub trade_allowed: bool,
}

fn default_trade_allowed() -> bool {
    true
}

impl SymbolInfo {
    /// Size of one pip in price units
    ///
    /// Fractional-pip quotes (3 or 5 digits) count ten points per pip.
    pub fn pip_size(&self) -> f64 {
        if self.digits == 3 || self.digits == 5 {
            self.point * 10.0
        } else {
            self.point
        }
    }

    /// Round a price to the instrument's quoted precision
    pub fn normalize(&self, price: f64) -> f64 {
        let scale = 10f64.powi(self.digits as i32);
        (price * scale).round() / scale
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Deal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Gtc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    Ioc,
}

/// Bracketed market order as submitted to the terminal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub action: TradeAction,
    pub symbol: String,
    pub volume: f64,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub price: f64,
    #[serde(rename = "sl")]
    pub stop_loss: f64,
    #[serde(rename = "tp")]
    pub take_profit: f64,
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
    #[serde(rename = "type_time")]
    pub time_in_force: TimeInForce,
    #[serde(rename = "type_filling")]
    pub fill_policy: FillPolicy,
}

/// Terminal verdict on a submitted order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub accepted: bool,
    pub return_code: Option<u32>,
    pub raw_response: serde_json::Value,
}

impl OrderResult {
    pub fn from_response(raw_response: serde_json::Value) -> Self {
        let return_code = raw_response
            .get("retcode")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok());

        Self {
            accepted: return_code == Some(TRADE_RETCODE_DONE),
            return_code,
            raw_response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle_at(minute: u32, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 4, 10, minute, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn test_window_rejects_unordered_timestamps() {
        let result = CandleWindow::new(vec![candle_at(5, 1.1), candle_at(4, 1.2)]);
        assert!(result.is_err());

        let duplicate = CandleWindow::new(vec![candle_at(5, 1.1), candle_at(5, 1.2)]);
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_window_newest_is_last() {
        let window =
            CandleWindow::new(vec![candle_at(1, 1.1), candle_at(2, 1.2), candle_at(3, 1.3)])
                .unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window.last_close(), 1.3);
        assert_eq!(window.newest().timestamp.format("%H:%M").to_string(), "10:03");
    }

    #[test]
    fn test_empty_window_rejected() {
        assert!(CandleWindow::new(Vec::new()).is_err());
    }

    #[test]
    fn test_pip_size_for_fractional_quotes() {
        let eurusd = SymbolInfo { point: 0.00001, digits: 5, trade_allowed: true };
        assert!((eurusd.pip_size() - 0.0001).abs() < 1e-12);

        let index = SymbolInfo { point: 0.01, digits: 2, trade_allowed: true };
        assert!((index.pip_size() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_tick_tradeability() {
        assert!(Tick { bid: 1.1049, ask: 1.105 }.is_tradeable());
        assert!(!Tick { bid: 1.105, ask: 1.105 }.is_tradeable());
        assert!(!Tick { bid: 1.2, ask: 1.1 }.is_tradeable());
        assert!(!Tick { bid: 0.0, ask: 1.1 }.is_tradeable());
        assert!(!Tick { bid: f64::NAN, ask: 1.1 }.is_tradeable());
    }

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("m15".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!(Timeframe::M1.describe(), "1-minute");
        assert_eq!(Timeframe::H4.describe(), "4-hour");
        assert!("M7".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_order_result_acceptance() {
        let done = OrderResult::from_response(serde_json::json!({"retcode": 10009, "deal": 42}));
        assert!(done.accepted);
        assert_eq!(done.return_code, Some(10009));

        let requote = OrderResult::from_response(serde_json::json!({"retcode": 10004}));
        assert!(!requote.accepted);

        let empty = OrderResult::from_response(serde_json::Value::Null);
        assert!(!empty.accepted);
        assert_eq!(empty.return_code, None);
    }

    #[test]
    fn test_order_request_wire_names() {
        let request = OrderRequest {
            action: TradeAction::Deal,
            symbol: "EURUSD".to_string(),
            volume: 0.01,
            side: TradeSide::Sell,
            price: 1.1,
            stop_loss: 1.11,
            take_profit: 1.098,
            deviation: 20,
            magic: 202003,
            comment: "test".to_string(),
            time_in_force: TimeInForce::Gtc,
            fill_policy: FillPolicy::Ioc,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], "deal");
        assert_eq!(value["type"], "sell");
        assert_eq!(value["sl"], 1.11);
        assert_eq!(value["type_time"], "gtc");
        assert_eq!(value["type_filling"], "ioc");
    }
}
