//! Built-in token prices for cost estimation, in USD per one million tokens.

use crate::model::Usage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub cached_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64, cached_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
            cached_per_million,
        }
    }

    /// Cost of `usage`. Cached tokens are a subset of input tokens and billed at the cached rate.
    pub fn cost(&self, usage: &Usage) -> f64 {
        let uncached = usage.input_tokens.saturating_sub(usage.cached_tokens) as f64;
        let cached = usage.cached_tokens.min(usage.input_tokens) as f64;
        (uncached * self.input_per_million
            + cached * self.cached_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

const PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o", ModelPrice::new(2.50, 10.00, 1.25)),
    ("gpt-4o-mini", ModelPrice::new(0.15, 0.60, 0.075)),
    ("gpt-4.1", ModelPrice::new(2.00, 8.00, 0.50)),
    ("gpt-4.1-mini", ModelPrice::new(0.40, 1.60, 0.10)),
    ("gpt-4.1-nano", ModelPrice::new(0.10, 0.40, 0.025)),
    ("o3-mini", ModelPrice::new(1.10, 4.40, 0.55)),
    ("claude-3-5-sonnet", ModelPrice::new(3.00, 15.00, 0.30)),
    ("claude-3-5-haiku", ModelPrice::new(0.80, 4.00, 0.08)),
    ("claude-3-7-sonnet", ModelPrice::new(3.00, 15.00, 0.30)),
    ("claude-sonnet-4", ModelPrice::new(3.00, 15.00, 0.30)),
    ("gemini-1.5-pro", ModelPrice::new(1.25, 5.00, 0.3125)),
    ("gemini-1.5-flash", ModelPrice::new(0.075, 0.30, 0.01875)),
    ("gemini-2.0-flash", ModelPrice::new(0.10, 0.40, 0.025)),
    ("grok-2", ModelPrice::new(2.00, 10.00, 2.00)),
    ("grok-3", ModelPrice::new(3.00, 15.00, 0.75)),
];

/// Exact name first, then the longest known prefix (`gpt-4o-mini-2024-07-18` -> `gpt-4o-mini`).
pub fn lookup(model: &str) -> Option<ModelPrice> {
    let model = model.trim().to_ascii_lowercase();
    if let Some((_, p)) = PRICES.iter().find(|(name, _)| *name == model) {
        return Some(*p);
    }
    PRICES
        .iter()
        .filter(|(name, _)| model.starts_with(name))
        .max_by_key(|(name, _)| name.len())
        .map(|(_, p)| *p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let p = lookup("gpt-4o-mini-2024-07-18").unwrap();
        assert_eq!(p, ModelPrice::new(0.15, 0.60, 0.075));
        let p = lookup("GPT-4o").unwrap();
        assert_eq!(p.input_per_million, 2.50);
    }

    #[test]
    fn unknown_model_has_no_price() {
        assert!(lookup("my-private-model").is_none());
    }

    #[test]
    fn cached_tokens_use_cached_rate() {
        let p = ModelPrice::new(10.0, 0.0, 1.0);
        let cost = p.cost(&Usage::new(1_000_000, 0, 500_000));
        assert!((cost - 5.5).abs() < 1e-9);
    }
}
