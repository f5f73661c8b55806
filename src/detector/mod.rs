pub mod classifier;
pub mod heuristic;
pub mod ml;

pub use classifier::Classifier;
pub use heuristic::HeuristicDetector;
pub use ml::MlDetector;

use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Heuristic,
    Ml,
    Combined,
    Wasabi,
    Samourai,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Heuristic => "heuristic",
            DetectionMethod::Ml => "ml",
            DetectionMethod::Combined => "combined",
            DetectionMethod::Wasabi => "wasabi",
            DetectionMethod::Samourai => "samourai",
        }
    }
}

/// Structural indicators extracted from the transaction body.
#[derive(Debug, Clone, Serialize)]
pub struct Indicators {
    pub input_count: usize,
    pub output_count: usize,
    pub unique_input_addresses: usize,
    pub unique_output_addresses: usize,
    pub unique_output_values: usize,
    /// Share of outputs carrying the dominant value, in [0, 1]
    pub output_uniformity: f64,
    /// Unique input addresses over input count, in [0, 1]
    pub input_diversity: f64,
    /// vin + vout
    pub transaction_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub is_coinjoin: bool,
    pub detection_method: DetectionMethod,
    pub score: f64,
    pub reasons: Vec<String>,
    pub indicators: Indicators,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_threshold: Option<f64>,
}

/// Satoshi를 BTC로 변환
pub fn satoshi_to_btc(satoshi: u64) -> Decimal {
    Decimal::from(satoshi) / Decimal::from(100_000_000u64)
}
