use crate::config::ClassifierSettings;
use crate::detector::heuristic::HeuristicDetector;
use crate::detector::ml::{extract_features, MlDetector};
use crate::detector::{DetectionMethod, Verdict};
use crate::explorer::model::Transaction;

use log::info;

/// Composes the heuristic and the optional ML detector into one verdict.
/// Pure given the inputs and the loaded model; callers may memoise by txid.
pub struct Classifier {
    heuristic: HeuristicDetector,
    ml: Option<MlDetector>,
    positive_threshold: f64,
}

impl Classifier {
    pub fn from_settings(cfg: &ClassifierSettings) -> Self {
        let ml = MlDetector::load(&cfg.ml);
        match &ml {
            Some(ml) => info!("[Classifier] heuristic + ML '{}' (threshold {})", ml.model_name(), ml.threshold()),
            None => info!("[Classifier] heuristic only, no ML model loaded"),
        }
        Self {
            heuristic: HeuristicDetector::new(cfg.clone()),
            ml,
            positive_threshold: cfg.positive_threshold,
        }
    }

    pub fn with_ml(cfg: &ClassifierSettings, ml: Option<MlDetector>) -> Self {
        Self {
            heuristic: HeuristicDetector::new(cfg.clone()),
            ml,
            positive_threshold: cfg.positive_threshold,
        }
    }

    pub fn ml_available(&self) -> bool {
        self.ml.is_some()
    }

    pub fn classify(&self, tx: &Transaction) -> Verdict {
        let mut verdict = self.heuristic.detect(tx);

        // Specialised pattern detectors take priority; ML never overrides them.
        if matches!(
            verdict.detection_method,
            DetectionMethod::Wasabi | DetectionMethod::Samourai
        ) {
            return verdict;
        }

        let ml = match &self.ml {
            Some(ml) => ml,
            None => return verdict,
        };

        let probability = ml.predict(&extract_features(tx));
        let heuristic_positive = verdict.score > self.positive_threshold;
        let ml_positive = probability >= ml.threshold();

        verdict.is_coinjoin = heuristic_positive || ml_positive;
        match (heuristic_positive, ml_positive) {
            (true, false) => {
                // method stays heuristic; the probability is not part of the verdict
                verdict.detection_method = DetectionMethod::Heuristic;
            }
            (false, true) => {
                verdict.detection_method = DetectionMethod::Ml;
                verdict.ml_probability = Some(probability);
                verdict.ml_threshold = Some(ml.threshold());
                verdict
                    .reasons
                    .push(format!("ml probability {:.3} >= {:.3}", probability, ml.threshold()));
            }
            // agreement on either polarity is a combined verdict
            (true, true) | (false, false) => {
                verdict.detection_method = DetectionMethod::Combined;
                verdict.ml_probability = Some(probability);
                verdict.ml_threshold = Some(ml.threshold());
                if ml_positive {
                    verdict
                        .reasons
                        .push(format!("ml probability {:.3} >= {:.3}", probability, ml.threshold()));
                }
            }
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ml::{ModelSnapshot, FEATURE_COUNT};
    use crate::explorer::model::{Prevout, Vin, Vout};

    fn tx(vin_count: usize, vout_count: usize, value: u64) -> Transaction {
        Transaction {
            txid: "tx".to_string(),
            vin: (0..vin_count)
                .map(|i| Vin {
                    txid: format!("prev{}", i),
                    vout: 0,
                    prevout: Some(Prevout {
                        value: value + 1_000,
                        scriptpubkey_address: Some(format!("in{}", i)),
                    }),
                })
                .collect(),
            vout: (0..vout_count)
                .map(|i| Vout {
                    value,
                    scriptpubkey_address: Some(format!("out{}", i)),
                })
                .collect(),
            fee: 500,
            size: 400,
        }
    }

    fn always(probability_sign: f64) -> MlDetector {
        // all-zero weights: the bias alone decides the probability
        MlDetector::from_snapshot(
            ModelSnapshot {
                model_name: "bias_only".to_string(),
                weights: vec![0.0; FEATURE_COUNT],
                bias: probability_sign,
            },
            0.7,
        )
    }

    #[test]
    fn both_positive_is_combined() {
        let classifier = Classifier::with_ml(&ClassifierSettings::default(), Some(always(10.0)));
        let verdict = classifier.classify(&tx(8, 8, 7_777_777));

        assert!(verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Combined);
        assert!(verdict.ml_probability.expect("probability present") > 0.99);
        assert_eq!(verdict.ml_threshold, Some(0.7));
    }

    #[test]
    fn ml_alone_can_fire() {
        let classifier = Classifier::with_ml(&ClassifierSettings::default(), Some(always(10.0)));
        let verdict = classifier.classify(&tx(1, 2, 42_424));

        assert!(verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Ml);
        assert!(verdict.ml_probability.is_some());
        assert!(verdict.reasons.iter().any(|r| r.contains("ml probability")));
    }

    #[test]
    fn heuristic_alone_keeps_probability_out() {
        let classifier = Classifier::with_ml(&ClassifierSettings::default(), Some(always(-10.0)));
        let verdict = classifier.classify(&tx(8, 8, 7_777_777));

        assert!(verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Heuristic);
        assert!(verdict.ml_probability.is_none());
        assert!(verdict.ml_threshold.is_none());
    }

    #[test]
    fn agreement_on_negative_is_combined() {
        let classifier = Classifier::with_ml(&ClassifierSettings::default(), Some(always(-10.0)));
        let verdict = classifier.classify(&tx(1, 2, 42_424));

        assert!(!verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Combined);
        assert!(verdict.ml_probability.expect("probability present") < 0.01);
    }

    #[test]
    fn specialised_detector_bypasses_ml() {
        // Whirlpool shape: 5-in 5-out single pool denomination
        let classifier = Classifier::with_ml(&ClassifierSettings::default(), Some(always(-10.0)));
        let verdict = classifier.classify(&tx(5, 5, 5_000_000));

        assert!(verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Samourai);
        assert!(verdict.ml_probability.is_none());
    }

    #[test]
    fn without_ml_the_heuristic_verdict_stands() {
        let classifier = Classifier::with_ml(&ClassifierSettings::default(), None);
        let verdict = classifier.classify(&tx(1, 2, 42_424));

        assert!(!verdict.is_coinjoin);
        assert_eq!(verdict.detection_method, DetectionMethod::Heuristic);
        assert!(verdict.ml_probability.is_none());
    }
}
