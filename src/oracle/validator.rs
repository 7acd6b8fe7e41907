use super::recovery::RawPrediction;
use crate::models::Signal;
use serde::Serialize;
use serde_json::Value;

/// Upper bound on the reason text, in characters
pub const REASON_MAX_CHARS: usize = 200;

const NO_REASON: &str = "no reason given";

/// Prediction with every field coerced into range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedPrediction {
    pub signal: Signal,
    /// Always within [0, 1]
    pub confidence: f64,
    pub price_target: Option<f64>,
    pub take_profit_pips: Option<u32>,
    pub stop_loss_pips: Option<u32>,
    pub reason: String,
}

/// Coerce a raw prediction; total over any input
pub fn validate(raw: &RawPrediction) -> ValidatedPrediction {
    ValidatedPrediction {
        signal: raw.signal.as_ref().map(signal).unwrap_or(Signal::Hold),
        confidence: raw
            .confidence
            .as_ref()
            .and_then(finite_number)
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.0),
        price_target: raw.price_target.as_ref().and_then(finite_number),
        take_profit_pips: raw.take_profit_pips.as_ref().and_then(pips),
        stop_loss_pips: raw.stop_loss_pips.as_ref().and_then(pips),
        reason: reason(raw.reason.as_ref()),
    }
}

fn signal(value: &Value) -> Signal {
    match value.as_str().map(|s| s.trim().to_lowercase()).as_deref() {
        Some("buy") => Signal::Buy,
        Some("sell") => Signal::Sell,
        _ => Signal::Hold,
    }
}

/// Numbers and numeric strings; NaN and infinities are rejected
fn finite_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn pips(value: &Value) -> Option<u32> {
    let n = finite_number(value)?.round();
    (0.0..=u32::MAX as f64).contains(&n).then_some(n as u32)
}

fn reason(value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    if text.is_empty() {
        return NO_REASON.to_string();
    }
    text.chars().take(REASON_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawPrediction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_signal_is_normalized() {
        for (input, expected) in [
            ("BUY", Signal::Buy),
            ("  Sell ", Signal::Sell),
            ("hold", Signal::Hold),
            ("long", Signal::Hold),
            ("", Signal::Hold),
        ] {
            let p = validate(&raw(json!({ "signal": input })));
            assert_eq!(p.signal, expected, "input {:?}", input);
        }
        assert_eq!(validate(&raw(json!({ "signal": 1 }))).signal, Signal::Hold);
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(validate(&raw(json!({ "confidence": 1.5 }))).confidence, 1.0);
        assert_eq!(validate(&raw(json!({ "confidence": -0.3 }))).confidence, 0.0);
        assert_eq!(validate(&raw(json!({ "confidence": "0.65" }))).confidence, 0.65);
        assert_eq!(validate(&raw(json!({ "confidence": "NaN" }))).confidence, 0.0);
        assert_eq!(validate(&raw(json!({ "confidence": "inf" }))).confidence, 0.0);
        assert_eq!(validate(&raw(json!({ "confidence": "high" }))).confidence, 0.0);
        assert_eq!(validate(&raw(json!({}))).confidence, 0.0);
    }

    #[test]
    fn test_price_target_requires_finite_number() {
        assert_eq!(validate(&raw(json!({ "price_target_usd": 1.2 }))).price_target, Some(1.2));
        assert_eq!(validate(&raw(json!({ "price_target_usd": "1.25" }))).price_target, Some(1.25));
        assert_eq!(validate(&raw(json!({ "price_target_usd": "soon" }))).price_target, None);
        assert_eq!(validate(&raw(json!({ "price_target_usd": null }))).price_target, None);
    }

    #[test]
    fn test_pips_coerced() {
        let p = validate(&raw(json!({ "take_profit_pips": "20", "stop_loss_pips": 14.6 })));
        assert_eq!(p.take_profit_pips, Some(20));
        assert_eq!(p.stop_loss_pips, Some(15));

        let p = validate(&raw(json!({ "take_profit_pips": -5, "stop_loss_pips": "wide" })));
        assert_eq!(p.take_profit_pips, None);
        assert_eq!(p.stop_loss_pips, None);
    }

    #[test]
    fn test_reason_truncated_by_characters() {
        let long: String = "é".repeat(250);
        let p = validate(&raw(json!({ "reason": long })));
        assert_eq!(p.reason.chars().count(), REASON_MAX_CHARS);
    }

    #[test]
    fn test_reason_defaults() {
        assert_eq!(validate(&raw(json!({}))).reason, NO_REASON);
        assert_eq!(validate(&raw(json!({ "reason": "   " }))).reason, NO_REASON);
        assert_eq!(validate(&raw(json!({ "reason": 42 }))).reason, "42");
    }

    #[test]
    fn test_model_error_default_survives_validation() {
        let p = validate(&RawPrediction::unavailable());
        assert_eq!(p.signal, Signal::Hold);
        assert_eq!(p.confidence, 0.0);
        assert_eq!(p.price_target, None);
        assert_eq!(p.take_profit_pips, Some(10));
        assert_eq!(p.reason, "model error");
    }
}
