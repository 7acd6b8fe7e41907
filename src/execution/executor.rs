use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{CandleWindow, Signal, TradeSide};
use crate::oracle::ValidatedPrediction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionAction {
    Buy,
    Sell,
    Skip,
}

impl ExecutionAction {
    pub fn side(&self) -> Option<TradeSide> {
        match self {
            ExecutionAction::Buy => Some(TradeSide::Buy),
            ExecutionAction::Sell => Some(TradeSide::Sell),
            ExecutionAction::Skip => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

/// Timestamps of candles that already had their one decision
///
/// Only grows. Lives as long as the trading loop that owns it.
#[derive(Debug, Clone, Default)]
pub struct CandleGate {
    seen: HashSet<DateTime<Utc>>,
}

impl CandleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a candle as acted on; false if it already was
    pub fn admit(&mut self, timestamp: DateTime<Utc>) -> bool {
        self.seen.insert(timestamp)
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.seen.contains(timestamp)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Map a prediction to at most one action per newest candle
pub fn dispatch(
    window: &CandleWindow,
    prediction: &ValidatedPrediction,
    gate: &mut CandleGate,
) -> ExecutionDecision {
    let newest = window.newest().timestamp;

    if !gate.admit(newest) {
        return ExecutionDecision {
            action: ExecutionAction::Skip,
            reason: format!("Candle {} already handled", newest),
        };
    }

    match prediction.signal {
        Signal::Buy => ExecutionDecision {
            action: ExecutionAction::Buy,
            reason: format!("Buy signal ({:.2} confidence)", prediction.confidence),
        },
        Signal::Sell => ExecutionDecision {
            action: ExecutionAction::Sell,
            reason: format!("Sell signal ({:.2} confidence)", prediction.confidence),
        },
        Signal::Hold => ExecutionDecision {
            action: ExecutionAction::Skip,
            reason: "Hold signal".to_string(),
        },
    }
}
