use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Per-token USD rates: (model, prompt rate, completion rate).
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15 / 1_000_000.0, 0.6 / 1_000_000.0),
    ("gpt-4o", 2.5 / 1_000_000.0, 10.0 / 1_000_000.0),
    ("gpt-4.1-mini", 0.4 / 1_000_000.0, 1.6 / 1_000_000.0),
    ("gpt-4.1", 2.0 / 1_000_000.0, 8.0 / 1_000_000.0),
    ("o1", 15.0 / 1_000_000.0, 60.0 / 1_000_000.0),
    ("o4-mini", 1.1 / 1_000_000.0, 4.4 / 1_000_000.0),
    ("o3", 10.0 / 1_000_000.0, 40.0 / 1_000_000.0),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Increment-only token accounting, keyed by model. Shared behind an `Arc`
/// between the completion service and the reporting side; there is no
/// process-wide counter.
#[derive(Debug, Default)]
pub struct UsageLedger {
    usage: Mutex<BTreeMap<String, ModelUsage>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) {
        let mut usage = self.usage.lock().expect("usage ledger poisoned");
        let entry = usage.entry(model.to_string()).or_default();
        entry.prompt_tokens += prompt_tokens;
        entry.completion_tokens += completion_tokens;
        entry.total_tokens += prompt_tokens + completion_tokens;
    }

    pub fn snapshot(&self) -> BTreeMap<String, ModelUsage> {
        self.usage.lock().expect("usage ledger poisoned").clone()
    }

    /// Total USD cost across models. Models absent from the pricing table
    /// contribute zero.
    pub fn total_cost(&self) -> f64 {
        let usage = self.usage.lock().expect("usage ledger poisoned");
        usage
            .iter()
            .map(|(model, counts)| {
                price_for(model)
                    .map(|(prompt_rate, completion_rate)| {
                        counts.prompt_tokens as f64 * prompt_rate
                            + counts.completion_tokens as f64 * completion_rate
                    })
                    .unwrap_or(0.0)
            })
            .sum()
    }
}

fn price_for(model: &str) -> Option<(f64, f64)> {
    PRICING
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, prompt, completion)| (*prompt, *completion))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_cumulative_per_model() {
        let ledger = UsageLedger::new();
        ledger.record("gpt-4.1", 100, 50);
        ledger.record("gpt-4.1", 200, 25);
        ledger.record("o4-mini", 10, 5);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot["gpt-4.1"].prompt_tokens, 300);
        assert_eq!(snapshot["gpt-4.1"].completion_tokens, 75);
        assert_eq!(snapshot["gpt-4.1"].total_tokens, 375);
        assert_eq!(snapshot["o4-mini"].total_tokens, 15);
    }

    #[test]
    fn cost_follows_the_pricing_table() {
        let ledger = UsageLedger::new();
        ledger.record("gpt-4.1", 1_000_000, 1_000_000);
        assert!((ledger.total_cost() - 10.0).abs() < 1e-9);

        ledger.record("some-unknown-model", 1_000_000, 1_000_000);
        assert!((ledger.total_cost() - 10.0).abs() < 1e-9);
    }
}
