use crate::llm::models::TokenUsage;

/// USD per million input tokens.
pub const INPUT_COST_PER_MTOK: f64 = 3.00;
/// USD per million output tokens.
pub const OUTPUT_COST_PER_MTOK: f64 = 15.00;

/// Deterministic token-count to USD conversion. Kept free of any provider
/// state so cost accounting is testable with injected counts.
pub fn estimate_cost(usage: TokenUsage) -> f64 {
    let input = (usage.input_tokens as f64 / 1_000_000.0) * INPUT_COST_PER_MTOK;
    let output = (usage.output_tokens as f64 / 1_000_000.0) * OUTPUT_COST_PER_MTOK;
    input + output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_usage_costs_nothing() {
        assert_eq!(estimate_cost(TokenUsage::default()), 0.0);
    }

    #[test]
    fn cost_from_injected_counts() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
        };
        assert!((estimate_cost(usage) - 18.0).abs() < 1e-9);
    }

    #[test]
    fn typical_query_cost() {
        // 900 input / 600 output tokens, the rough shape of one generation.
        let usage = TokenUsage {
            input_tokens: 900,
            output_tokens: 600,
        };
        let expected = 900.0 / 1_000_000.0 * 3.0 + 600.0 / 1_000_000.0 * 15.0;
        assert!((estimate_cost(usage) - expected).abs() < 1e-12);
    }
}
