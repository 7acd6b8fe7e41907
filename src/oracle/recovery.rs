use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::LazyLock;

macro_rules! re {
    ($pat:expr) => {
        LazyLock::new(|| Regex::new($pat).unwrap())
    };
}

static SIGNAL_RE: LazyLock<Regex> = re!(r#""signal"\s*:\s*"(\w+)""#);
static CONFIDENCE_RE: LazyLock<Regex> = re!(r#""confidence"\s*:\s*(-?[0-9]*\.?[0-9]+)"#);
static PRICE_TARGET_RE: LazyLock<Regex> =
    re!(r#""price_target(?:_usd)?"\s*:\s*(-?[0-9]*\.?[0-9]+)"#);
static TAKE_PROFIT_RE: LazyLock<Regex> = re!(r#""take_profit_pips"\s*:\s*"?([0-9]+)"#);
static STOP_LOSS_RE: LazyLock<Regex> = re!(r#""stop_loss_pips"\s*:\s*"?([0-9]+)"#);
static REASON_RE: LazyLock<Regex> = re!(r#""reason"\s*:\s*"((?:[^"\\]|\\.)*)""#);

const DEFAULT_PIPS: u32 = 10;

/// Oracle answer as it came off the wire, every field loosely typed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "WirePrediction")]
pub struct RawPrediction {
    pub signal: Option<Value>,
    pub confidence: Option<Value>,
    #[serde(rename = "price_target_usd")]
    pub price_target: Option<Value>,
    pub take_profit_pips: Option<Value>,
    pub stop_loss_pips: Option<Value>,
    pub reason: Option<Value>,
}

/// Both target spellings may appear together; `price_target_usd` wins
#[derive(Deserialize)]
struct WirePrediction {
    #[serde(default)]
    signal: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    price_target_usd: Option<Value>,
    #[serde(default)]
    price_target: Option<Value>,
    #[serde(default)]
    take_profit_pips: Option<Value>,
    #[serde(default)]
    stop_loss_pips: Option<Value>,
    #[serde(default)]
    reason: Option<Value>,
}

impl From<WirePrediction> for RawPrediction {
    fn from(wire: WirePrediction) -> Self {
        Self {
            signal: wire.signal,
            confidence: wire.confidence,
            price_target: wire.price_target_usd.or(wire.price_target),
            take_profit_pips: wire.take_profit_pips,
            stop_loss_pips: wire.stop_loss_pips,
            reason: wire.reason,
        }
    }
}

impl RawPrediction {
    /// Stand-in used when the oracle could not be reached
    pub fn unavailable() -> Self {
        Self {
            signal: Some(json!("hold")),
            confidence: Some(json!(0.0)),
            price_target: None,
            take_profit_pips: Some(json!(DEFAULT_PIPS)),
            stop_loss_pips: Some(json!(DEFAULT_PIPS)),
            reason: Some(json!("model error")),
        }
    }
}

/// Which recovery step produced the prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTier {
    /// Oracle call failed, default prediction used
    Unavailable,
    Strict,
    Substring,
    FieldPattern,
}

impl RecoveryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryTier::Unavailable => "unavailable",
            RecoveryTier::Strict => "strict",
            RecoveryTier::Substring => "substring",
            RecoveryTier::FieldPattern => "field_pattern",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub prediction: RawPrediction,
    pub tier: RecoveryTier,
}

type Tier = fn(&str) -> Option<RawPrediction>;

const STRUCTURED_TIERS: [(RecoveryTier, Tier); 2] = [
    (RecoveryTier::Strict, strict),
    (RecoveryTier::Substring, substring),
];

/// Recover a prediction from free-form oracle text
///
/// Never fails: when no JSON object can be parsed the per-field patterns
/// fill whatever they find and default the rest.
pub fn recover(text: &str, last_close: f64) -> Recovered {
    for (tier, parse) in STRUCTURED_TIERS {
        if let Some(prediction) = parse(text) {
            return Recovered { prediction, tier };
        }
    }

    Recovered {
        prediction: field_patterns(text, last_close),
        tier: RecoveryTier::FieldPattern,
    }
}

/// Whole text is one JSON object
pub fn strict(text: &str) -> Option<RawPrediction> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// First `{` through last `}` is one JSON object
pub fn substring(text: &str) -> Option<RawPrediction> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    strict(&text[start..=end])
}

/// Pull individual fields out of text that is not valid JSON
pub fn field_patterns(text: &str, last_close: f64) -> RawPrediction {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    let number = |re: &Regex| {
        capture(re)
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    };

    RawPrediction {
        signal: Some(Value::String(
            capture(&SIGNAL_RE).unwrap_or_else(|| "hold".to_string()),
        )),
        confidence: Some(number(&CONFIDENCE_RE).unwrap_or_else(|| json!(0.0))),
        price_target: Some(number(&PRICE_TARGET_RE).unwrap_or_else(|| json!(last_close))),
        take_profit_pips: number(&TAKE_PROFIT_RE),
        stop_loss_pips: number(&STOP_LOSS_RE),
        reason: Some(Value::String(
            capture(&REASON_RE)
                .map(|raw| unescape(&raw).unwrap_or(raw))
                .unwrap_or_else(|| "parsing failed".to_string()),
        )),
    }
}

/// Decode JSON string escapes in a captured string body
fn unescape(raw: &str) -> Option<String> {
    serde_json::from_str(&format!("\"{}\"", raw)).ok()
}
