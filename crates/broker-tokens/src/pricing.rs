/// Per-1M-token USD pricing. Not exhaustive or kept perfectly current —
/// update as providers change list prices.
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

const MODEL_PRICING: &[(&str, Pricing)] = &[
    ("gpt-4", Pricing { input: 30.0, output: 60.0 }),
    ("gpt-4-turbo", Pricing { input: 10.0, output: 30.0 }),
    ("gpt-4o", Pricing { input: 2.50, output: 10.0 }),
    ("gpt-4o-mini", Pricing { input: 0.15, output: 0.60 }),
    ("gpt-3.5-turbo", Pricing { input: 0.50, output: 1.50 }),
    ("gpt-4o-mini-2024-07-18", Pricing { input: 0.15, output: 0.60 }),
    ("gpt-4-turbo-2024-04-09", Pricing { input: 10.0, output: 30.0 }),
    ("claude-3-opus", Pricing { input: 15.0, output: 75.0 }),
    ("claude-3-sonnet", Pricing { input: 3.0, output: 15.0 }),
    ("claude-3-haiku", Pricing { input: 0.25, output: 1.25 }),
];

const DEFAULT_PRICING: Pricing = Pricing { input: 10.0, output: 30.0 };

/// Looks up pricing for `model`: exact match first, then a bidirectional
/// substring match (handles provider suffixes/date-stamped variants like
/// `gpt-4o-mini-2024-07-18` resolving to `gpt-4o-mini` and vice versa),
/// falling back to [`DEFAULT_PRICING`] for anything unrecognized.
pub fn pricing_for(model: &str) -> &'static Pricing {
    if let Some((_, pricing)) = MODEL_PRICING.iter().find(|(name, _)| *name == model) {
        return pricing;
    }
    if let Some((_, pricing)) = MODEL_PRICING.iter().find(|(name, _)| name.contains(model) || model.contains(name)) {
        return pricing;
    }
    &DEFAULT_PRICING
}

pub fn estimated_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let pricing = pricing_for(model);
    let input_cost = (input_tokens as f64 / 1_000_000.0) * pricing.input;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * pricing.output;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_substring() {
        let p = pricing_for("gpt-4o");
        assert_eq!(p.input, 2.50);
    }

    #[test]
    fn unlisted_dated_variant_matches_via_substring() {
        let p = pricing_for("gpt-4o-mini-2099-01-01");
        assert_eq!(p.input, 0.15);
    }

    #[test]
    fn unrecognized_model_falls_back_to_default() {
        let p = pricing_for("some-unlisted-model");
        assert_eq!(p.input, DEFAULT_PRICING.input);
        assert_eq!(p.output, DEFAULT_PRICING.output);
    }

    #[test]
    fn cost_is_proportional_to_tokens() {
        let cost = estimated_cost("gpt-4o-mini", 1_000_000, 1_000_000);
        assert!((cost - 0.75).abs() < 1e-9);
    }
}
