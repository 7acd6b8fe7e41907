use crate::api::{MarketData, RawRate};
use crate::models::{Candle, CandleWindow, Timeframe};
use crate::{Error, Result};
use chrono::DateTime;
use std::sync::Arc;

/// Fetches the most recent candles for one symbol/timeframe
///
/// No retries here; the decision loop owns retry policy.
pub struct CandleFeed {
    market: Arc<dyn MarketData>,
}

impl CandleFeed {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }

    /// Window of exactly `count` candles, oldest first
    pub async fn fetch(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<CandleWindow> {
        let no_data = |detail: String| Error::NoData {
            symbol: symbol.to_string(),
            detail,
        };

        let rows = match self.market.rates(symbol, timeframe, count).await {
            Ok(rows) => rows,
            Err(e @ Error::NoData { .. }) => return Err(e),
            Err(e) => return Err(no_data(e.to_string())),
        };

        if rows.is_empty() {
            return Err(no_data("feed returned zero rows".to_string()));
        }

        let mut candles = normalize(rows).map_err(no_data)?;
        if candles.len() < count {
            return Err(no_data(format!(
                "only {} of {} candles available",
                candles.len(),
                count
            )));
        }
        candles.drain(..candles.len() - count);

        let window = CandleWindow::new(candles).map_err(no_data)?;

        tracing::debug!(
            symbol,
            timeframe = %timeframe,
            newest = %window.newest().timestamp,
            close = window.last_close(),
            "Fetched candle window"
        );

        Ok(window)
    }
}

/// Terminal rows to candles, sorted by time with duplicate timestamps collapsed
fn normalize(rows: Vec<RawRate>) -> std::result::Result<Vec<Candle>, String> {
    let mut candles = rows
        .into_iter()
        .map(|row| {
            let timestamp = DateTime::from_timestamp(row.time, 0)
                .ok_or_else(|| format!("invalid candle time {}", row.time))?;
            Ok(Candle {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.tick_volume,
            })
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;

    candles.sort_by_key(|c| c.timestamp);
    // Keep the latest row reported for a bucket
    candles.reverse();
    candles.dedup_by_key(|c| c.timestamp);
    candles.reverse();

    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SymbolInfo, Tick};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct FixedRates(Result<Vec<RawRate>>);

    #[async_trait]
    impl MarketData for FixedRates {
        async fn rates(&self, _symbol: &str, _tf: Timeframe, _count: usize) -> Result<Vec<RawRate>> {
            match &self.0 {
                Ok(rows) => Ok(rows.clone()),
                Err(e) => Err(Error::WebDriver(e.to_string())),
            }
        }

        async fn tick(&self, _symbol: &str) -> Result<Option<Tick>> {
            Ok(None)
        }

        async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo> {
            Err(Error::SymbolUnavailable(symbol.to_string()))
        }

        async fn select_symbol(&self, _symbol: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn row(time: i64, close: f64) -> RawRate {
        RawRate {
            time,
            open: close,
            high: close,
            low: close,
            close,
            tick_volume: 42.0,
            spread: 1,
            real_volume: 0.0,
        }
    }

    fn feed(rows: Result<Vec<RawRate>>) -> CandleFeed {
        CandleFeed::new(Arc::new(FixedRates(rows)))
    }

    const T0: i64 = 1_741_082_400; // 2025-03-04 10:00:00 UTC

    #[tokio::test]
    async fn test_rows_become_utc_candles() {
        let rows = (0..3).map(|i| row(T0 + 60 * i, 1.1 + i as f64 * 0.001)).collect();
        let window = feed(Ok(rows)).fetch("EURUSD", Timeframe::M1, 3).await.unwrap();

        assert_eq!(window.len(), 3);
        assert_eq!(
            window.candles()[0].timestamp,
            Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap()
        );
        assert_eq!(window.candles()[0].volume, 42.0);
        assert_eq!(window.last_close(), 1.102);
    }

    #[tokio::test]
    async fn test_unordered_rows_are_sorted_and_trimmed() {
        let rows = vec![row(T0 + 120, 3.0), row(T0, 1.0), row(T0 + 60, 2.0), row(T0 + 60, 2.5)];
        let window = feed(Ok(rows)).fetch("EURUSD", Timeframe::M1, 2).await.unwrap();

        let closes: Vec<f64> = window.candles().iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![2.5, 3.0]);
    }

    #[tokio::test]
    async fn test_empty_feed_is_no_data() {
        let result = feed(Ok(vec![])).fetch("EURUSD", Timeframe::M1, 10).await;
        assert!(matches!(result, Err(Error::NoData { .. })));
    }

    #[tokio::test]
    async fn test_short_feed_is_no_data() {
        let rows = vec![row(T0, 1.0), row(T0 + 60, 1.1)];
        let err = feed(Ok(rows)).fetch("EURUSD", Timeframe::M1, 10).await.unwrap_err();
        assert!(err.to_string().contains("only 2 of 10"));
    }

    #[tokio::test]
    async fn test_backend_error_is_no_data() {
        let result = feed(Err(Error::WebDriver("socket closed".to_string())))
            .fetch("EURUSD", Timeframe::M1, 10)
            .await;
        assert!(matches!(result, Err(Error::NoData { symbol, .. }) if symbol == "EURUSD"));
    }
}
