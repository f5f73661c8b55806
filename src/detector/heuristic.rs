use crate::config::ClassifierSettings;
use crate::detector::{satoshi_to_btc, DetectionMethod, Indicators, Verdict};
use crate::explorer::model::Transaction;

use std::collections::HashMap;

/// Pure rule-based CoinJoin detector. No I/O; deterministic for a fixed
/// configuration.
pub struct HeuristicDetector {
    cfg: ClassifierSettings,
}

impl HeuristicDetector {
    pub fn new(cfg: ClassifierSettings) -> Self {
        Self { cfg }
    }

    pub fn detect(&self, tx: &Transaction) -> Verdict {
        let input_addresses = tx.input_addresses();
        let output_addresses = tx.output_addresses();
        let output_values = tx.output_values();

        let input_count = tx.vin.len();
        let output_count = output_values.len();
        let unique_input_addresses = tx.unique_input_addresses();
        let unique_output_addresses = tx.unique_output_addresses();
        let unique_output_values = tx.unique_output_values();

        let mut value_counts: HashMap<u64, usize> = HashMap::new();
        for value in &output_values {
            *value_counts.entry(*value).or_insert(0) += 1;
        }
        let dominant = value_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(value, count)| (*value, *count));

        let output_uniformity = match dominant {
            Some((_, count)) if output_count > 0 => count as f64 / output_count as f64,
            _ => 0.0,
        };
        let input_diversity = if input_addresses.is_empty() {
            0.0
        } else {
            unique_input_addresses as f64 / input_addresses.len() as f64
        };

        let indicators = Indicators {
            input_count,
            output_count,
            unique_input_addresses,
            unique_output_addresses,
            unique_output_values,
            output_uniformity,
            input_diversity,
            transaction_size: input_count + output_count,
        };

        // Base indicator accumulation; reasons follow accumulation order.
        let mut score = 0.0;
        let mut reasons: Vec<String> = Vec::new();

        if input_count >= self.cfg.min_inputs {
            score += self.cfg.weights.many_inputs;
            reasons.push(format!("many inputs ({})", input_count));
        }
        if output_count >= self.cfg.min_outputs {
            score += self.cfg.weights.many_outputs;
            reasons.push(format!("many outputs ({})", output_count));
        }
        // 값 종류 수로 본 uniformity: distinct 슬롯보다 output이 많을 때만 의미가 있다
        if output_count > self.cfg.max_distinct_output_values
            && unique_output_values <= self.cfg.max_distinct_output_values
        {
            score += self.cfg.weights.output_uniformity;
            reasons.push(format!(
                "output uniformity ({} distinct values)",
                unique_output_values
            ));
        }
        if unique_input_addresses > self.cfg.input_diversity_threshold {
            score += self.cfg.weights.input_diversity;
            reasons.push(format!(
                "input diversity ({} unique addresses)",
                unique_input_addresses
            ));
        }
        if indicators.transaction_size > self.cfg.large_tx_size {
            score += self.cfg.weights.large_transaction;
            reasons.push(format!("large transaction ({})", indicators.transaction_size));
        }

        let mut detection_method = DetectionMethod::Heuristic;

        let wasabi = self.detect_wasabi(&output_addresses, dominant, input_count, &value_counts);
        let samourai = if wasabi.is_none() {
            self.detect_samourai(input_count, output_count, unique_output_values, &output_values)
        } else {
            None
        };

        if let Some(reason) = wasabi {
            score += self.cfg.weights.pattern_bonus;
            reasons.push(reason);
            detection_method = DetectionMethod::Wasabi;
        } else if let Some(reason) = samourai {
            score += self.cfg.weights.pattern_bonus;
            reasons.push(reason);
            detection_method = DetectionMethod::Samourai;
        }

        let is_coinjoin =
            detection_method != DetectionMethod::Heuristic || score > self.cfg.positive_threshold;

        Verdict {
            is_coinjoin,
            detection_method,
            score,
            reasons,
            indicators,
            ml_probability: None,
            ml_threshold: None,
        }
    }

    /// Wasabi fires on a dominant denomination near a round multiple of
    /// 0.1 BTC carried by enough equal outputs, or on a coordinator output
    /// next to repeated equal values.
    fn detect_wasabi(
        &self,
        output_addresses: &[&str],
        dominant: Option<(u64, usize)>,
        input_count: usize,
        value_counts: &HashMap<u64, usize>,
    ) -> Option<String> {
        let cfg = &self.cfg.wasabi;
        let (dominant_value, dominant_count) = dominant?;

        if dominant_count >= cfg.min_equal_outputs
            && input_count >= dominant_count
            && near_round_multiple(dominant_value, cfg.base_denomination_sat, cfg.precision_sat)
        {
            return Some(format!(
                "Wasabi pattern ({} outputs of {} BTC)",
                dominant_count,
                satoshi_to_btc(dominant_value)
            ));
        }

        let pays_coordinator = output_addresses
            .iter()
            .any(|addr| cfg.coordinator_addresses.iter().any(|c| c == addr));
        if pays_coordinator && value_counts.values().any(|count| *count > 2) {
            return Some("Wasabi coordinator output".to_string());
        }

        None
    }

    /// Whirlpool: vin == vout, a single output value matching a known pool
    /// denomination within the configured tolerance.
    fn detect_samourai(
        &self,
        input_count: usize,
        output_count: usize,
        unique_output_values: usize,
        output_values: &[u64],
    ) -> Option<String> {
        let cfg = &self.cfg.samourai;
        if input_count == 0 || input_count != output_count || unique_output_values != 1 {
            return None;
        }
        let value = *output_values.first()?;
        let pool = cfg
            .pool_denominations_sat
            .iter()
            .find(|denom| value.abs_diff(**denom) <= cfg.denomination_tolerance_sat)?;
        Some(format!("Samourai Whirlpool ({} BTC)", satoshi_to_btc(*pool)))
    }
}

fn near_round_multiple(value: u64, base: u64, precision: u64) -> bool {
    if base == 0 || value == 0 {
        return false;
    }
    let lower = (value / base) * base;
    let upper = lower + base;
    let distance = (value - lower).min(upper - value);
    distance <= precision && value + precision >= base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::model::{Prevout, Vin, Vout};

    fn vin(addr: &str, value: u64) -> Vin {
        Vin {
            txid: format!("prev-{}", addr),
            vout: 0,
            prevout: Some(Prevout {
                value,
                scriptpubkey_address: Some(addr.to_string()),
            }),
        }
    }

    fn vout(addr: &str, value: u64) -> Vout {
        Vout {
            value,
            scriptpubkey_address: Some(addr.to_string()),
        }
    }

    fn tx(txid: &str, vin: Vec<Vin>, vout: Vec<Vout>) -> Transaction {
        Transaction {
            txid: txid.to_string(),
            vin,
            vout,
            fee: 1_000,
            size: 800,
        }
    }

    fn detector() -> HeuristicDetector {
        HeuristicDetector::new(ClassifierSettings::default())
    }

    /// 8-in 8-out, all outputs equal, 8 distinct input addresses.
    fn classic_coinjoin() -> Transaction {
        let inputs = (0..8).map(|i| vin(&format!("in{}", i), 11_000_000)).collect();
        let outputs = (0..8).map(|i| vout(&format!("out{}", i), 10_000_000)).collect();
        tx("classic", inputs, outputs)
    }

    #[test]
    fn classic_coinjoin_is_heuristic_positive() {
        let verdict = detector().detect(&classic_coinjoin());

        assert!(verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Heuristic);
        assert!(verdict.score >= 1.0);

        let joined = verdict.reasons.join("; ");
        assert!(joined.contains("many inputs"));
        assert!(joined.contains("many outputs"));
        assert!(joined.contains("output uniformity"));
        assert!(joined.contains("input diversity"));
    }

    #[test]
    fn reasons_follow_accumulation_order() {
        let verdict = detector().detect(&classic_coinjoin());
        let positions: Vec<usize> = ["many inputs", "many outputs", "output uniformity", "input diversity"]
            .iter()
            .map(|needle| {
                verdict
                    .reasons
                    .iter()
                    .position(|r| r.contains(needle))
                    .expect("reason present")
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn wasabi_round_denomination_fires() {
        // 10 equal 0.1 BTC outputs plus assorted change, enough inputs
        let inputs = (0..12).map(|i| vin(&format!("in{}", i), 12_000_000)).collect();
        let mut outputs: Vec<Vout> = (0..10).map(|i| vout(&format!("out{}", i), 10_000_000)).collect();
        outputs.push(vout("change1", 3_123_456));
        outputs.push(vout("change2", 777_777));

        let verdict = detector().detect(&tx("wasabi", inputs, outputs));
        assert!(verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Wasabi);
        assert!(verdict.reasons.iter().any(|r| r.contains("Wasabi")));
        // score carries the pattern bonus on top of the base indicators
        assert!(verdict.score > 1.0);
    }

    #[test]
    fn wasabi_accepts_round_multiples() {
        // 0.2 BTC within precision also counts as a Wasabi denomination
        let inputs = (0..10).map(|i| vin(&format!("in{}", i), 25_000_000)).collect();
        let outputs = (0..10).map(|i| vout(&format!("out{}", i), 20_100_000)).collect();

        let verdict = detector().detect(&tx("wasabi2", inputs, outputs));
        assert_eq!(verdict.detection_method, DetectionMethod::Wasabi);
    }

    #[test]
    fn eight_equal_outputs_stay_heuristic() {
        // below the equal-output floor the 0.1 BTC pattern must not fire
        let verdict = detector().detect(&classic_coinjoin());
        assert_eq!(verdict.detection_method, DetectionMethod::Heuristic);
    }

    #[test]
    fn coordinator_output_fires_wasabi() {
        let inputs = (0..4).map(|i| vin(&format!("in{}", i), 40_000_000)).collect();
        let mut outputs: Vec<Vout> = (0..3).map(|i| vout(&format!("out{}", i), 31_000_000)).collect();
        outputs.push(vout("bc1qs604c7jv6amk4cxqlnvuxv26hv3e48cds4m0ew", 50_000));

        let verdict = detector().detect(&tx("coord", inputs, outputs));
        assert_eq!(verdict.detection_method, DetectionMethod::Wasabi);
        assert!(verdict.is_coinjoin);
    }

    #[test]
    fn whirlpool_pool_denomination_fires_samourai() {
        let inputs = (0..5).map(|i| vin(&format!("in{}", i), 5_050_000)).collect();
        let outputs = (0..5).map(|i| vout(&format!("out{}", i), 5_000_000)).collect();

        let verdict = detector().detect(&tx("whirlpool", inputs, outputs));
        assert!(verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Samourai);
        assert!(verdict.reasons.iter().any(|r| r.contains("Whirlpool")));
    }

    #[test]
    fn whirlpool_requires_equal_in_out_counts() {
        let inputs = (0..4).map(|i| vin(&format!("in{}", i), 5_050_000)).collect();
        let outputs = (0..5).map(|i| vout(&format!("out{}", i), 5_000_000)).collect();

        let verdict = detector().detect(&tx("not-whirlpool", inputs, outputs));
        assert_ne!(verdict.detection_method, DetectionMethod::Samourai);
    }

    #[test]
    fn trivial_spend_is_negative() {
        let inputs = vec![vin("payer", 200_000)];
        let outputs = vec![vout("payee", 150_000), vout("change", 49_000)];

        let verdict = detector().detect(&tx("trivial", inputs, outputs));
        assert!(!verdict.is_coinjoin);
        assert!(verdict.score <= 0.3);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn detection_is_deterministic() {
        let tx = classic_coinjoin();
        let detector = detector();
        let first = detector.detect(&tx);
        let second = detector.detect(&tx);

        assert_eq!(first.is_coinjoin, second.is_coinjoin);
        assert_eq!(first.score, second.score);
        assert_eq!(first.reasons, second.reasons);
        assert_eq!(first.detection_method, second.detection_method);
    }
}
