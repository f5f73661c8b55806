use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
  #[serde(default)]
  pub explorer: ExplorerSettings,
  #[serde(default)]
  pub classifier: ClassifierSettings,
  #[serde(default)]
  pub tracer: TracerSettings,
  #[serde(default)]
  pub monitor: MonitorSettings,
  #[serde(default)]
  pub cache: CacheSettings,
  #[serde(default)]
  pub store: StoreSettings,
  #[serde(default)]
  pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ExplorerSettings {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// 연속 요청 사이 최소 간격 (ms)
  #[serde(default = "default_min_request_interval_ms")]
  pub min_request_interval_ms: u64,
  #[serde(default = "default_max_in_flight")]
  pub max_in_flight: usize,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_retry_attempts")]
  pub retry_attempts: u32,
  #[serde(default = "default_retry_base_delay_ms")]
  pub retry_base_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ClassifierSettings {
  /// Base score above which the heuristic alone is positive
  #[serde(default = "default_positive_threshold")]
  pub positive_threshold: f64,
  #[serde(default = "default_min_inputs")]
  pub min_inputs: usize,
  #[serde(default = "default_min_outputs")]
  pub min_outputs: usize,
  /// Output uniformity: at most this many distinct output values
  #[serde(default = "default_max_distinct_output_values")]
  pub max_distinct_output_values: usize,
  /// Input diversity: strictly more than this many unique input addresses
  #[serde(default = "default_input_diversity_threshold")]
  pub input_diversity_threshold: usize,
  /// Large transaction: vin + vout strictly above this
  #[serde(default = "default_large_tx_size")]
  pub large_tx_size: usize,
  #[serde(default)]
  pub weights: IndicatorWeights,
  #[serde(default)]
  pub wasabi: WasabiSettings,
  #[serde(default)]
  pub samourai: SamouraiSettings,
  #[serde(default)]
  pub ml: MlSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct IndicatorWeights {
  #[serde(default = "default_weight_many_inputs")]
  pub many_inputs: f64,
  #[serde(default = "default_weight_many_outputs")]
  pub many_outputs: f64,
  #[serde(default = "default_weight_output_uniformity")]
  pub output_uniformity: f64,
  #[serde(default = "default_weight_input_diversity")]
  pub input_diversity: f64,
  #[serde(default = "default_weight_large_transaction")]
  pub large_transaction: f64,
  /// Bonus added when a specialised pattern detector fires
  #[serde(default = "default_weight_pattern_bonus")]
  pub pattern_bonus: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WasabiSettings {
  /// Canonical Wasabi denomination (0.1 BTC) in satoshi
  #[serde(default = "default_wasabi_base_denomination_sat")]
  pub base_denomination_sat: u64,
  /// Tolerance around a round multiple of the base denomination
  #[serde(default = "default_wasabi_precision_sat")]
  pub precision_sat: u64,
  #[serde(default = "default_wasabi_min_equal_outputs")]
  pub min_equal_outputs: usize,
  #[serde(default = "default_wasabi_coordinator_addresses")]
  pub coordinator_addresses: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SamouraiSettings {
  /// Known Whirlpool pool denominations in satoshi (deployment specific)
  #[serde(default = "default_samourai_pool_denominations_sat")]
  pub pool_denominations_sat: Vec<u64>,
  /// Accepted distance from a pool denomination (covers the entry fee)
  #[serde(default = "default_samourai_denomination_tolerance_sat")]
  pub denomination_tolerance_sat: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MlSettings {
  /// Path to a model snapshot file, or a directory holding
  /// `coinjoin_model_*.json` snapshots. None disables the ML detector.
  #[serde(default)]
  pub model_path: Option<String>,
  #[serde(default = "default_ml_threshold")]
  pub threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TracerSettings {
  #[serde(default = "default_max_depth")]
  pub max_depth: u32,
  #[serde(default = "default_max_branches_per_node")]
  pub max_branches_per_node: usize,
  #[serde(default = "default_max_total_nodes")]
  pub max_total_nodes: usize,
  #[serde(default = "default_max_wall_clock_secs")]
  pub max_wall_clock_secs: u64,
  #[serde(default = "default_consecutive_non_coinjoin_limit")]
  pub consecutive_non_coinjoin_limit: u32,
  #[serde(default = "default_max_outputs_per_tx")]
  pub max_outputs_per_tx: usize,
  #[serde(default = "default_max_txs_per_address")]
  pub max_txs_per_address: usize,
  /// Bounded workers for child expansion within one investigation
  #[serde(default = "default_branch_workers")]
  pub branch_workers: usize,
  #[serde(default = "default_max_concurrent_investigations")]
  pub max_concurrent_investigations: usize,
  /// true: 초과 요청은 즉시 Busy, false: 자리가 날 때까지 대기
  #[serde(default)]
  pub reject_when_busy: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MonitorSettings {
  #[serde(default = "default_tick_interval_secs")]
  pub tick_interval_secs: u64,
  #[serde(default = "default_worker_pool_size")]
  pub worker_pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
  #[serde(default = "default_cache_capacity")]
  pub capacity: usize,
  #[serde(default = "default_cache_ttl_secs")]
  pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
  #[serde(default = "default_store_uri")]
  pub uri: String,
  #[serde(default = "default_store_user")]
  pub user: String,
  #[serde(default)]
  pub password: String,
  #[serde(default = "default_memory_graph")]
  pub memory_graph: bool,
}

/// Bind address for the external REST surface
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
  #[serde(default = "default_server_host")]
  pub host: String,
  #[serde(default = "default_server_port")]
  pub port: u16,
}

fn default_base_url() -> String {
  "https://blockstream.info/api".to_string()
}

fn default_min_request_interval_ms() -> u64 {
  100
}

fn default_max_in_flight() -> usize {
  8
}

fn default_timeout_secs() -> u64 {
  15
}

fn default_retry_attempts() -> u32 {
  3
}

fn default_retry_base_delay_ms() -> u64 {
  200
}

fn default_positive_threshold() -> f64 {
  0.6
}

fn default_min_inputs() -> usize {
  5
}

fn default_min_outputs() -> usize {
  5
}

fn default_max_distinct_output_values() -> usize {
  3
}

fn default_input_diversity_threshold() -> usize {
  3
}

fn default_large_tx_size() -> usize {
  10
}

fn default_weight_many_inputs() -> f64 {
  0.20
}

fn default_weight_many_outputs() -> f64 {
  0.20
}

fn default_weight_output_uniformity() -> f64 {
  0.30
}

fn default_weight_input_diversity() -> f64 {
  0.20
}

fn default_weight_large_transaction() -> f64 {
  0.10
}

fn default_weight_pattern_bonus() -> f64 {
  0.50
}

fn default_wasabi_base_denomination_sat() -> u64 {
  10_000_000
}

fn default_wasabi_precision_sat() -> u64 {
  2_000_000
}

fn default_wasabi_min_equal_outputs() -> usize {
  10
}

fn default_wasabi_coordinator_addresses() -> Vec<String> {
  vec![
    "bc1qs604c7jv6amk4cxqlnvuxv26hv3e48cds4m0ew".to_string(),
    "bc1qa24tsgchvuxsaccp8vrnkfd85hrcpafg20kmjw".to_string(),
  ]
}

fn default_samourai_pool_denominations_sat() -> Vec<u64> {
  // 0.001, 0.01, 0.05, 0.5 BTC
  vec![100_000, 1_000_000, 5_000_000, 50_000_000]
}

fn default_samourai_denomination_tolerance_sat() -> u64 {
  // 0.01 BTC
  1_000_000
}

fn default_ml_threshold() -> f64 {
  0.7
}

fn default_max_depth() -> u32 {
  5
}

fn default_max_branches_per_node() -> usize {
  4
}

fn default_max_total_nodes() -> usize {
  250
}

fn default_max_wall_clock_secs() -> u64 {
  60
}

fn default_consecutive_non_coinjoin_limit() -> u32 {
  10
}

fn default_max_outputs_per_tx() -> usize {
  10
}

fn default_max_txs_per_address() -> usize {
  5
}

fn default_branch_workers() -> usize {
  4
}

fn default_max_concurrent_investigations() -> usize {
  4
}

fn default_tick_interval_secs() -> u64 {
  1
}

fn default_worker_pool_size() -> usize {
  8
}

fn default_cache_capacity() -> usize {
  1000
}

fn default_cache_ttl_secs() -> u64 {
  600
}

fn default_store_uri() -> String {
  "bolt://localhost:7687".to_string()
}

fn default_store_user() -> String {
  "neo4j".to_string()
}

fn default_memory_graph() -> bool {
  false
}

fn default_server_host() -> String {
  "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
  8080
}

impl Default for ExplorerSettings {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      min_request_interval_ms: default_min_request_interval_ms(),
      max_in_flight: default_max_in_flight(),
      timeout_secs: default_timeout_secs(),
      retry_attempts: default_retry_attempts(),
      retry_base_delay_ms: default_retry_base_delay_ms(),
    }
  }
}

impl Default for ClassifierSettings {
  fn default() -> Self {
    Self {
      positive_threshold: default_positive_threshold(),
      min_inputs: default_min_inputs(),
      min_outputs: default_min_outputs(),
      max_distinct_output_values: default_max_distinct_output_values(),
      input_diversity_threshold: default_input_diversity_threshold(),
      large_tx_size: default_large_tx_size(),
      weights: IndicatorWeights::default(),
      wasabi: WasabiSettings::default(),
      samourai: SamouraiSettings::default(),
      ml: MlSettings::default(),
    }
  }
}

impl Default for IndicatorWeights {
  fn default() -> Self {
    Self {
      many_inputs: default_weight_many_inputs(),
      many_outputs: default_weight_many_outputs(),
      output_uniformity: default_weight_output_uniformity(),
      input_diversity: default_weight_input_diversity(),
      large_transaction: default_weight_large_transaction(),
      pattern_bonus: default_weight_pattern_bonus(),
    }
  }
}

impl Default for WasabiSettings {
  fn default() -> Self {
    Self {
      base_denomination_sat: default_wasabi_base_denomination_sat(),
      precision_sat: default_wasabi_precision_sat(),
      min_equal_outputs: default_wasabi_min_equal_outputs(),
      coordinator_addresses: default_wasabi_coordinator_addresses(),
    }
  }
}

impl Default for SamouraiSettings {
  fn default() -> Self {
    Self {
      pool_denominations_sat: default_samourai_pool_denominations_sat(),
      denomination_tolerance_sat: default_samourai_denomination_tolerance_sat(),
    }
  }
}

impl Default for MlSettings {
  fn default() -> Self {
    Self {
      model_path: None,
      threshold: default_ml_threshold(),
    }
  }
}

impl Default for TracerSettings {
  fn default() -> Self {
    Self {
      max_depth: default_max_depth(),
      max_branches_per_node: default_max_branches_per_node(),
      max_total_nodes: default_max_total_nodes(),
      max_wall_clock_secs: default_max_wall_clock_secs(),
      consecutive_non_coinjoin_limit: default_consecutive_non_coinjoin_limit(),
      max_outputs_per_tx: default_max_outputs_per_tx(),
      max_txs_per_address: default_max_txs_per_address(),
      branch_workers: default_branch_workers(),
      max_concurrent_investigations: default_max_concurrent_investigations(),
      reject_when_busy: false,
    }
  }
}

impl Default for MonitorSettings {
  fn default() -> Self {
    Self {
      tick_interval_secs: default_tick_interval_secs(),
      worker_pool_size: default_worker_pool_size(),
    }
  }
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      capacity: default_cache_capacity(),
      ttl_secs: default_cache_ttl_secs(),
    }
  }
}

impl Default for StoreSettings {
  fn default() -> Self {
    Self {
      uri: default_store_uri(),
      user: default_store_user(),
      password: String::new(),
      memory_graph: default_memory_graph(),
    }
  }
}

impl Default for ServerSettings {
  fn default() -> Self {
    Self {
      host: default_server_host(),
      port: default_server_port(),
    }
  }
}

impl Settings {
  pub fn new() -> Result<Self, config::ConfigError> {
    let default_config_path = "./config.toml";
    let env_prefix = "APP"; // e.g. APP_EXPLORER__BASE_URL=... overrides the file

    let builder = config::Config::builder()
      .add_source(config::File::with_name(default_config_path).required(true))
      .add_source(config::Environment::with_prefix(env_prefix).separator("__"));

    builder.build()?.try_deserialize()
  }
}
