use crate::config::MlSettings;
use crate::explorer::model::Transaction;

use log::{info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const FEATURE_COUNT: usize = 8;

/// Feature vector derived exclusively from the transaction body, in a fixed
/// order: input count, output count, unique input addresses, unique output
/// values, output uniformity, input diversity, size, fee.
pub fn extract_features(tx: &Transaction) -> [f64; FEATURE_COUNT] {
    let input_count = tx.vin.len();
    let output_values = tx.output_values();
    let output_count = output_values.len();
    let unique_inputs = tx.unique_input_addresses();
    let unique_values = tx.unique_output_values();

    let uniformity = if output_count > 0 {
        let mut counts = std::collections::HashMap::new();
        for v in &output_values {
            *counts.entry(*v).or_insert(0usize) += 1;
        }
        counts.values().max().copied().unwrap_or(0) as f64 / output_count as f64
    } else {
        0.0
    };
    let input_addresses = tx.input_addresses();
    let diversity = if input_addresses.is_empty() {
        0.0
    } else {
        unique_inputs as f64 / input_addresses.len() as f64
    };

    [
        input_count as f64,
        output_count as f64,
        unique_inputs as f64,
        unique_values as f64,
        uniformity,
        diversity,
        tx.size as f64,
        tx.fee as f64,
    ]
}

/// Serialized model snapshot, the output of the offline training pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSnapshot {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    pub weights: Vec<f64>,
    pub bias: f64,
}

fn default_model_name() -> String {
    "coinjoin_model".to_string()
}

/// Adapter around a pre-trained logistic snapshot. Prediction is pure; the
/// only I/O happens once at load time.
pub struct MlDetector {
    snapshot: ModelSnapshot,
    threshold: f64,
}

impl MlDetector {
    /// Loads the configured snapshot. A missing path disables the detector;
    /// an unreadable or invalid snapshot is logged and also disables it.
    pub fn load(settings: &MlSettings) -> Option<Self> {
        let path = settings.model_path.as_ref()?;
        let file = match resolve_snapshot_path(Path::new(path)) {
            Some(file) => file,
            None => {
                warn!("[ML] no model snapshot found under {}, heuristic only", path);
                return None;
            }
        };

        let raw = match std::fs::read_to_string(&file) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[ML] failed to read {}: {}, heuristic only", file.display(), e);
                return None;
            }
        };
        let snapshot: ModelSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("[ML] invalid snapshot {}: {}, heuristic only", file.display(), e);
                return None;
            }
        };
        if snapshot.weights.len() != FEATURE_COUNT {
            warn!(
                "[ML] snapshot {} has {} weights, expected {}, heuristic only",
                file.display(),
                snapshot.weights.len(),
                FEATURE_COUNT
            );
            return None;
        }

        info!("[ML] ✅ model '{}' loaded from {}", snapshot.model_name, file.display());
        Some(Self {
            snapshot,
            threshold: settings.threshold,
        })
    }

    pub fn from_snapshot(snapshot: ModelSnapshot, threshold: f64) -> Self {
        Self { snapshot, threshold }
    }

    pub fn model_name(&self) -> &str {
        &self.snapshot.model_name
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Probability in [0, 1] via the logistic function.
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let z: f64 = self
            .snapshot
            .weights
            .iter()
            .zip(features.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.snapshot.bias;
        sigmoid(z)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// `model_path` may name a snapshot file directly or a directory that holds
/// `coinjoin_model_*.json` files; the lexicographically latest one wins.
fn resolve_snapshot_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if !path.is_dir() {
        return None;
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(path)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("coinjoin_model_") && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::model::{Prevout, Vin, Vout};

    fn snapshot(weights: Vec<f64>, bias: f64) -> ModelSnapshot {
        ModelSnapshot {
            model_name: "test_model".to_string(),
            weights,
            bias,
        }
    }

    #[test]
    fn sigmoid_is_bounded_and_centered() {
        assert!(sigmoid(0.0) > 0.49 && sigmoid(0.0) < 0.51);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn predict_applies_weights_and_bias() {
        let detector = MlDetector::from_snapshot(
            snapshot(vec![0.0; FEATURE_COUNT], 2.0),
            0.7,
        );
        let p = detector.predict(&[0.0; FEATURE_COUNT]);
        assert!((p - sigmoid(2.0)).abs() < 1e-12);
    }

    #[test]
    fn features_come_from_the_body_only() {
        let tx = Transaction {
            txid: "feat".to_string(),
            vin: vec![
                Vin {
                    txid: "p1".to_string(),
                    vout: 0,
                    prevout: Some(Prevout {
                        value: 600,
                        scriptpubkey_address: Some("a1".to_string()),
                    }),
                },
                Vin {
                    txid: "p2".to_string(),
                    vout: 1,
                    prevout: Some(Prevout {
                        value: 600,
                        scriptpubkey_address: Some("a1".to_string()),
                    }),
                },
            ],
            vout: vec![
                Vout {
                    value: 500,
                    scriptpubkey_address: Some("b1".to_string()),
                },
                Vout {
                    value: 500,
                    scriptpubkey_address: Some("b2".to_string()),
                },
            ],
            fee: 200,
            size: 300,
        };

        let features = extract_features(&tx);
        assert_eq!(features[0], 2.0); // inputs
        assert_eq!(features[1], 2.0); // outputs
        assert_eq!(features[2], 1.0); // unique input addresses
        assert_eq!(features[3], 1.0); // unique output values
        assert_eq!(features[4], 1.0); // uniformity
        assert_eq!(features[5], 0.5); // diversity
        assert_eq!(features[6], 300.0);
        assert_eq!(features[7], 200.0);
    }

    #[test]
    fn load_without_path_is_disabled() {
        assert!(MlDetector::load(&MlSettings {
            model_path: None,
            threshold: 0.7,
        })
        .is_none());
    }
}
