use serde_json::Value;

use crate::judge::{JudgeError, JudgeScore};

/// Pull `{ "score", "rationale" }` out of model text.
///
/// Models wrap JSON in prose or code fences, so decoding starts at the first `{` and stops after
/// the first complete value. A fractional score below 1 is read as a fraction of one; whole
/// numbers are always points out of 100.
pub(crate) fn extract_score(text: &str) -> Result<JudgeScore, JudgeError> {
    let text = text.trim();
    let start = text.find('{').ok_or_else(|| invalid("no JSON object in judge output"))?;

    let value: Value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| invalid("no JSON object in judge output"))?
        .map_err(|e| invalid(format!("invalid JSON: {}", e)))?;

    let raw = match value.get("score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| invalid("judge JSON missing numeric 'score'"))?;

    if !raw.is_finite() {
        return Err(invalid("judge score is not finite"));
    }
    let scaled = if (0.0..1.0).contains(&raw) && raw.fract() != 0.0 {
        raw * 100.0
    } else {
        raw
    };

    let rationale = value
        .get("rationale")
        .or_else(|| value.get("reasoning"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Ok(JudgeScore {
        score: scaled.clamp(0.0, 100.0),
        rationale,
    })
}

fn invalid(message: impl Into<String>) -> JudgeError {
    JudgeError::InvalidResponse {
        message: message.into(),
    }
}
