use crate::api::ChatMessage;
use crate::models::{CandleWindow, Timeframe};

/// Embedding dimensions carried into the prompt
pub const EMBEDDING_PREFIX_DIMS: usize = 50;

const SYSTEM_MESSAGE: &str = "\
ROLE: You are a cautious, data-bound short-term trading assistant.
OUTPUT: Emit exactly ONE JSON object. No prose, no markdown, no code fences.
SCOPE: Use ONLY the candles (and embedding, if given) supplied by the user. No outside knowledge.
EVIDENCE: If evidence is insufficient or conflicting, answer \"hold\". Never guess.
CERTAINTY: Never claim certainty; confidence must reflect observable evidence only.
GROUNDING: Do not invent indicators, prices, timestamps or volumes. If a value cannot be grounded, \
use signal \"hold\", confidence <= 0.20 and price_target_usd equal to the last close.
VALIDATION: confidence in [0,1], reason <= 200 characters, no NaN or Infinity, keys exactly as requested.
POLICY: clear micro-trend => buy/sell; conflicting => hold; the embedding only counts when it corroborates the candles.";

/// Rendered oracle input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }
}

/// Renders a candle window into the oracle prompt
///
/// Pure: the same window, embedding and instrument always give the same text.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    symbol: String,
    timeframe: Timeframe,
}

impl PromptBuilder {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }

    /// One `YYYY-MM-DD HH:MM O:.. H:.. L:.. C:..` line per candle, oldest first
    pub fn render_candles(window: &CandleWindow) -> String {
        window
            .candles()
            .iter()
            .map(|c| {
                format!(
                    "{} O:{} H:{} L:{} C:{}",
                    c.timestamp.format("%Y-%m-%d %H:%M"),
                    c.open,
                    c.high,
                    c.low,
                    c.close
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn build(&self, window: &CandleWindow, embedding: Option<&[f32]>) -> Prompt {
        let embedding_block = match embedding {
            Some(vector) if !vector.is_empty() => {
                let prefix = &vector[..vector.len().min(EMBEDDING_PREFIX_DIMS)];
                format!("{:?}", prefix)
            }
            _ => "unavailable".to_string(),
        };

        let user = format!(
            r#"SYMBOL: {symbol}
TIMEFRAME: {timeframe} (last {count} candles; newest last)

CANDLES (ISO_MINUTE O:open H:high L:low C:close):
{candles}

EMBEDDING (first {dims} dims, advisory context only):
{embedding}

TASK:
- Predict the next short-term move for {symbol} using ONLY the data above.
- Return exactly one JSON object with these keys and nothing else:
  "signal": one of "buy", "sell", "hold"
  "confidence": number between 0 and 1
  "price_target_usd": estimated target price (number)
  "take_profit_pips": integer suggested take-profit distance in pips
  "stop_loss_pips": integer suggested stop-loss distance in pips
  "reason": short explanation, at most 200 characters
- If evidence is insufficient or conflicting, prefer "hold" with low confidence and set price_target_usd to the most recent close ({last_close}).
RESPOND WITH ONLY VALID JSON: no surrounding text, no backticks, no code fences."#,
            symbol = self.symbol,
            timeframe = self.timeframe.describe(),
            count = window.len(),
            candles = Self::render_candles(window),
            dims = EMBEDDING_PREFIX_DIMS,
            embedding = embedding_block,
            last_close = window.last_close(),
        );

        Prompt {
            system: SYSTEM_MESSAGE.to_string(),
            user,
        }
    }
}
